// src/sweep/expand.rs
//
// Deterministic cartesian expansion of a configuration template.
//
// Enumeration order (downstream result files are addressed by this index):
// swept fields are taken in flattened declaration order, nested fields in
// place of their parent. The first swept field varies slowest, the last
// varies fastest. `experiment_index` is the 0-based position in that order.
// Fixed fields are copied unchanged into every configuration.
//
// Every value must survive the configuration file unchanged; text that the
// reader would type as a number or boolean is rejected up front.

use serde::Serialize;

use super::template::{ConfigurationTemplate, Param, ParamValue};
use crate::error::SweepError;

/// One fully resolved, runnable configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConcreteConfiguration {
    experiment_index: usize,
    values: Vec<(String, ParamValue)>,
}

impl ConcreteConfiguration {
    pub(crate) fn new(experiment_index: usize, values: Vec<(String, ParamValue)>) -> Self {
        Self {
            experiment_index,
            values,
        }
    }

    pub fn experiment_index(&self) -> usize {
        self.experiment_index
    }

    /// `(column, value)` pairs in column order.
    pub fn values(&self) -> &[(String, ParamValue)] {
        &self.values
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(name, _)| name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, value)| value)
    }

    /// Integer field lookup; missing or non-integer values are configuration errors.
    pub fn get_int(&self, name: &str) -> Result<i64, SweepError> {
        match self.get(name) {
            Some(value) => value
                .as_i64()
                .ok_or_else(|| SweepError::config(name, format!("expected integer, got {}", value))),
            None => Err(SweepError::config(name, "missing field")),
        }
    }

    /// Text field lookup; missing or non-text values are configuration errors.
    pub fn get_text(&self, name: &str) -> Result<&str, SweepError> {
        match self.get(name) {
            Some(value) => value
                .as_str()
                .ok_or_else(|| SweepError::config(name, format!("expected text, got {}", value))),
            None => Err(SweepError::config(name, "missing field")),
        }
    }
}

/// Validated view of a template: flattened columns plus the radix of each
/// swept column.
struct SweepPlan<'a> {
    columns: Vec<(String, &'a Param)>,
    /// Indices into `columns` of the swept fields, in enumeration order.
    axes: Vec<usize>,
    total: usize,
}

impl<'a> SweepPlan<'a> {
    fn build(template: &'a ConfigurationTemplate) -> Result<Self, SweepError> {
        let columns = template.flatten()?;
        let mut axes = Vec::new();
        let mut total: usize = 1;

        for (position, (name, param)) in columns.iter().enumerate() {
            let values = match param {
                Param::Fixed(v) => std::slice::from_ref(v),
                Param::Swept(candidates) => candidates.as_slice(),
            };
            if let Some(bad) = values.iter().find(|v| !v.survives_table()) {
                return Err(SweepError::config(
                    name.clone(),
                    format!(
                        "value {:?} would not read back unchanged from the configuration file",
                        bad
                    ),
                ));
            }

            if let Param::Swept(candidates) = param {
                if candidates.is_empty() {
                    return Err(SweepError::config(
                        name.clone(),
                        "swept field has an empty candidate list",
                    ));
                }
                total = total.checked_mul(candidates.len()).ok_or_else(|| {
                    SweepError::config(name.clone(), "sweep size overflows usize")
                })?;
                axes.push(position);
            }
        }

        Ok(Self {
            columns,
            axes,
            total,
        })
    }

    /// Materialize the configuration for one digit vector (one digit per axis).
    fn materialize(&self, experiment_index: usize, digits: &[usize]) -> ConcreteConfiguration {
        let mut axis = 0;
        let values = self
            .columns
            .iter()
            .map(|(name, param)| {
                let value = match param {
                    Param::Fixed(v) => v.clone(),
                    Param::Swept(candidates) => {
                        let v = candidates[digits[axis]].clone();
                        axis += 1;
                        v
                    }
                };
                (name.clone(), value)
            })
            .collect();
        ConcreteConfiguration::new(experiment_index, values)
    }

    fn radix(&self, axis: usize) -> usize {
        self.columns[self.axes[axis]].1.arity()
    }
}

/// Number of configurations the template expands to.
pub fn count(template: &ConfigurationTemplate) -> Result<usize, SweepError> {
    Ok(SweepPlan::build(template)?.total)
}

/// Expand the template into every concrete configuration, ordered by
/// `experiment_index`.
///
/// A template without swept fields yields exactly one configuration at
/// index 0. Any swept field with an empty candidate list fails the whole
/// expansion.
pub fn expand(template: &ConfigurationTemplate) -> Result<Vec<ConcreteConfiguration>, SweepError> {
    let plan = SweepPlan::build(template)?;
    let mut out = Vec::with_capacity(plan.total);
    let mut digits = vec![0usize; plan.axes.len()];

    for index in 0..plan.total {
        out.push(plan.materialize(index, &digits));

        // Odometer increment, last axis fastest.
        for axis in (0..digits.len()).rev() {
            digits[axis] += 1;
            if digits[axis] < plan.radix(axis) {
                break;
            }
            digits[axis] = 0;
        }
    }

    Ok(out)
}

/// Materialize only the configuration at `index` (mixed-radix decode).
pub fn nth(
    template: &ConfigurationTemplate,
    index: usize,
) -> Result<ConcreteConfiguration, SweepError> {
    let plan = SweepPlan::build(template)?;
    if index >= plan.total {
        return Err(SweepError::config(
            "experiment_index",
            format!("index {} out of range (sweep size {})", index, plan.total),
        ));
    }

    let mut digits = vec![0usize; plan.axes.len()];
    let mut rem = index;
    for axis in (0..digits.len()).rev() {
        let radix = plan.radix(axis);
        digits[axis] = rem % radix;
        rem /= radix;
    }
    Ok(plan.materialize(index, &digits))
}
