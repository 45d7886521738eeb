// src/sweep/template.rs
//
// Configuration templates: named, ordered records whose fields are either a
// single scalar (`Fixed`) or an ordered list of candidates (`Swept`), and may
// nest further templates.
//
// Field order is significant. It fixes both the column order of the
// configuration file and the order in which swept fields are enumerated.
//
// YAML form:
//
//   replacement_policy: [LRURP, LFURP]   # swept
//   big_core_width: 8                    # fixed
//   l3:                                  # nested template
//     sample_seed: [1, 2]

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::error::SweepError;

/// Column name reserved for the experiment index.
pub const EXPERIMENT_INDEX: &str = "experiment_index";

/// Separator used when flattening nested field names into columns.
pub const PATH_SEPARATOR: &str = ".";

/// A single scalar parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    /// Parse a table cell back into a value.
    ///
    /// Inference order: integer, float, boolean, text. Floats are always
    /// written with a fractional part or exponent, so they never read back
    /// as integers.
    pub fn infer(cell: &str) -> Self {
        if let Ok(v) = cell.parse::<i64>() {
            return ParamValue::Int(v);
        }
        if let Ok(v) = cell.parse::<f64>() {
            return ParamValue::Float(v);
        }
        match cell {
            "true" => ParamValue::Bool(true),
            "false" => ParamValue::Bool(false),
            _ => ParamValue::Text(cell.to_string()),
        }
    }

    /// True when the written cell reads back as this exact value.
    ///
    /// Fails for text that looks like a number or boolean ("007", "true",
    /// "1e3") and for NaN.
    pub fn survives_table(&self) -> bool {
        ParamValue::infer(&self.to_string()) == *self
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(v) => Some(*v as f64),
            ParamValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    fn from_yaml(path: &str, value: &Value) -> Result<Self, SweepError> {
        match value {
            Value::Bool(b) => Ok(ParamValue::Bool(*b)),
            Value::Number(n) => {
                if let Some(v) = n.as_i64() {
                    Ok(ParamValue::Int(v))
                } else if n.is_f64() {
                    n.as_f64().map(ParamValue::Float).ok_or_else(|| {
                        SweepError::config(path, format!("unrepresentable number {}", n))
                    })
                } else {
                    Err(SweepError::config(
                        path,
                        format!("integer {} does not fit in i64", n),
                    ))
                }
            }
            Value::String(s) => Ok(ParamValue::Text(s.clone())),
            Value::Null => Err(SweepError::config(path, "null is not a scalar value")),
            Value::Sequence(_) => Err(SweepError::config(
                path,
                "nested lists are not scalar candidates",
            )),
            Value::Mapping(_) => Err(SweepError::config(
                path,
                "a mapping cannot be a sweep candidate",
            )),
            Value::Tagged(tagged) => Err(SweepError::config(
                path,
                format!("tagged value '{}' is not a scalar", tagged.tag),
            )),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{}", b),
            ParamValue::Int(v) => write!(f, "{}", v),
            // Debug keeps the fractional part ("5.0"), so the cell reads
            // back as a float.
            ParamValue::Float(v) => write!(f, "{:?}", v),
            ParamValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        ParamValue::Int(v as i64)
    }
}

impl From<u32> for ParamValue {
    fn from(v: u32) -> Self {
        ParamValue::Int(v as i64)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Text(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Text(v)
    }
}

/// A template parameter: one value for every experiment, or a list of
/// candidates that participate in the cartesian product.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Fixed(ParamValue),
    Swept(Vec<ParamValue>),
}

impl Param {
    pub fn is_swept(&self) -> bool {
        matches!(self, Param::Swept(_))
    }

    /// Number of values this parameter contributes to the product.
    pub fn arity(&self) -> usize {
        match self {
            Param::Fixed(_) => 1,
            Param::Swept(candidates) => candidates.len(),
        }
    }
}

/// Either a parameter or a nested sub-template.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Param(Param),
    Nested(ConfigurationTemplate),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TemplateField {
    pub name: String,
    pub kind: FieldKind,
}

/// A named, ordered parameter description.
///
/// Never mutated after construction; build it with the chaining helpers or
/// parse it from YAML.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "Value")]
pub struct ConfigurationTemplate {
    name: String,
    fields: Vec<TemplateField>,
}

impl ConfigurationTemplate {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Append a field holding a single value.
    pub fn fixed(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.fields.push(TemplateField {
            name: name.into(),
            kind: FieldKind::Param(Param::Fixed(value.into())),
        });
        self
    }

    /// Append a field holding an ordered list of candidates.
    pub fn swept<I, V>(mut self, name: impl Into<String>, candidates: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<ParamValue>,
    {
        self.fields.push(TemplateField {
            name: name.into(),
            kind: FieldKind::Param(Param::Swept(
                candidates.into_iter().map(Into::into).collect(),
            )),
        });
        self
    }

    /// Append a nested template; its columns are prefixed with `name.`.
    pub fn nested(mut self, name: impl Into<String>, template: ConfigurationTemplate) -> Self {
        self.fields.push(TemplateField {
            name: name.into(),
            kind: FieldKind::Nested(template),
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[TemplateField] {
        &self.fields
    }

    /// Load a template from a YAML file. The template is named after the
    /// file stem.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, SweepError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| SweepError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "template".to_string());
        Self::from_yaml_str(name, &contents)
    }

    /// Parse a template from a YAML mapping.
    pub fn from_yaml_str(name: impl Into<String>, yaml: &str) -> Result<Self, SweepError> {
        let value: Value =
            serde_yaml::from_str(yaml).map_err(|e| SweepError::Parse(e.to_string()))?;
        Self::from_yaml_value(name.into(), "", &value)
    }

    fn from_yaml_value(name: String, prefix: &str, value: &Value) -> Result<Self, SweepError> {
        let mapping = match value {
            Value::Mapping(m) => m,
            _ => {
                let field = if prefix.is_empty() { "<root>" } else { prefix };
                return Err(SweepError::config(field, "template must be a mapping"));
            }
        };

        let mut template = ConfigurationTemplate::new(name);
        for (key, field_value) in mapping {
            let key = match key {
                Value::String(s) => s.clone(),
                other => {
                    return Err(SweepError::config(
                        prefix,
                        format!("field names must be strings, got {:?}", other),
                    ))
                }
            };
            let path = join_path(prefix, &key);

            let kind = match field_value {
                Value::Sequence(items) => {
                    let candidates = items
                        .iter()
                        .map(|item| ParamValue::from_yaml(&path, item))
                        .collect::<Result<Vec<_>, _>>()?;
                    FieldKind::Param(Param::Swept(candidates))
                }
                Value::Mapping(_) => FieldKind::Nested(Self::from_yaml_value(
                    key.clone(),
                    &path,
                    field_value,
                )?),
                scalar => FieldKind::Param(Param::Fixed(ParamValue::from_yaml(&path, scalar)?)),
            };
            template.fields.push(TemplateField { name: key, kind });
        }
        Ok(template)
    }

    /// Flatten the template into `(column, param)` pairs in declaration
    /// order, nested fields expanded in place.
    ///
    /// Rejects empty names, the reserved `experiment_index` column and
    /// duplicate columns.
    pub fn flatten(&self) -> Result<Vec<(String, &Param)>, SweepError> {
        let mut columns = Vec::new();
        self.flatten_into("", &mut columns)?;

        let mut seen = HashSet::new();
        for (column, _) in &columns {
            if column == EXPERIMENT_INDEX {
                return Err(SweepError::config(
                    column.clone(),
                    "experiment_index is reserved for the generated index column",
                ));
            }
            if !seen.insert(column.as_str()) {
                return Err(SweepError::config(column.clone(), "duplicate column name"));
            }
        }
        Ok(columns)
    }

    fn flatten_into<'a>(
        &'a self,
        prefix: &str,
        out: &mut Vec<(String, &'a Param)>,
    ) -> Result<(), SweepError> {
        for field in &self.fields {
            if field.name.is_empty() {
                let at = if prefix.is_empty() { "<root>" } else { prefix };
                return Err(SweepError::config(at, "field name cannot be empty"));
            }
            let path = join_path(prefix, &field.name);
            match &field.kind {
                FieldKind::Param(param) => out.push((path, param)),
                FieldKind::Nested(inner) => inner.flatten_into(&path, out)?,
            }
        }
        Ok(())
    }
}

impl TryFrom<Value> for ConfigurationTemplate {
    type Error = SweepError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_yaml_value("template".to_string(), "", &value)
    }
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}{}{}", prefix, PATH_SEPARATOR, name)
    }
}
