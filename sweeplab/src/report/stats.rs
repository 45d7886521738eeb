// src/report/stats.rs
//
// Report aggregator: one raw hierarchical stats report + a role policy ->
// one flat, fixed-width metrics record.
//
// Steps:
// 1. Truncate: keep only lines strictly after the LAST boundary marker.
// 2. Classify every retained line independently (see rules.rs).
// 3. Map entity ids to roles via the policy threshold and average every
//    (role, level, metric) bucket in line order.
//
// A bucket with no samples reports 0.0, not absence. The record's columns
// depend only on the schema and the policy, never on the report contents.

use std::collections::HashMap;

use serde::Serialize;

use super::rules::{Classified, LevelScope, ReportSchema};
use crate::error::ReportError;
use crate::metrics::RunningMean;

/// Maps numeric entity identifiers to one of two role names.
///
/// Entities `< threshold` take `roles[0]`, all others `roles[1]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RolePolicy {
    pub threshold: u32,
    pub roles: [String; 2],
}

impl RolePolicy {
    /// Big/little split: the first `threshold` entities are big cores.
    pub fn new(threshold: u32) -> Self {
        Self::with_roles(threshold, "big", "little")
    }

    pub fn with_roles(threshold: u32, lower: &str, upper: &str) -> Self {
        Self {
            threshold,
            roles: [lower.to_string(), upper.to_string()],
        }
    }

    pub fn role_of(&self, entity: u32) -> usize {
        if entity < self.threshold {
            0
        } else {
            1
        }
    }
}

/// Flat metric name -> value mapping with a fixed column order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricRecord {
    entries: Vec<(String, f64)>,
}

impl MetricRecord {
    pub fn new(entries: Vec<(String, f64)>) -> Self {
        Self { entries }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn entries(&self) -> &[(String, f64)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Slot {
    Scalar(String),
    Bucket {
        role: Option<usize>,
        level: String,
        metric: String,
    },
}

/// Stateless aggregator over a report schema.
#[derive(Debug, Clone, Default)]
pub struct ReportAggregator {
    schema: ReportSchema,
}

impl ReportAggregator {
    pub fn new(schema: ReportSchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &ReportSchema {
        &self.schema
    }

    /// Output slots and their column names, in record order.
    fn layout(&self, policy: &RolePolicy) -> Vec<(Slot, String)> {
        let mut out = Vec::new();
        for name in self.schema.scalar_names() {
            out.push((Slot::Scalar(name.to_string()), name.to_string()));
        }

        let metrics = self.schema.hierarchical_metrics();
        let private = self.schema.level_labels(LevelScope::Private);
        for (role, role_name) in policy.roles.iter().enumerate() {
            for level in &private {
                for metric in &metrics {
                    out.push((
                        Slot::Bucket {
                            role: Some(role),
                            level: level.to_string(),
                            metric: metric.to_string(),
                        },
                        format!("avg_{}_{}_{}", role_name, level, metric),
                    ));
                }
            }
        }
        for level in self.schema.level_labels(LevelScope::Shared) {
            for metric in &metrics {
                out.push((
                    Slot::Bucket {
                        role: None,
                        level: level.to_string(),
                        metric: metric.to_string(),
                    },
                    format!("avg_{}_{}", level, metric),
                ));
            }
        }
        out
    }

    /// Column names of every record produced under `policy`.
    pub fn columns(&self, policy: &RolePolicy) -> Vec<String> {
        self.layout(policy).into_iter().map(|(_, name)| name).collect()
    }

    /// Aggregate a whole report.
    pub fn aggregate(&self, text: &str, policy: &RolePolicy) -> Result<MetricRecord, ReportError> {
        let lines: Vec<&str> = text.lines().collect();
        self.aggregate_lines(&lines, policy)
    }

    /// Aggregate a report given as ordered lines.
    pub fn aggregate_lines(
        &self,
        lines: &[&str],
        policy: &RolePolicy,
    ) -> Result<MetricRecord, ReportError> {
        if self.schema.boundary_marker.trim().is_empty() {
            return Err(ReportError::MalformedReport(
                "section marker is empty".to_string(),
            ));
        }
        let start = lines
            .iter()
            .rposition(|l| l.contains(self.schema.boundary_marker.as_str()))
            .map(|i| i + 1)
            .ok_or_else(|| {
                ReportError::MalformedReport(format!(
                    "section marker '{}' not found",
                    self.schema.boundary_marker
                ))
            })?;

        let mut scalars: HashMap<Slot, f64> = HashMap::new();
        let mut buckets: HashMap<Slot, RunningMean> = HashMap::new();

        for (offset, line) in lines[start..].iter().enumerate() {
            let line_no = start + offset + 1;
            match self.schema.classify(line_no, line)? {
                Classified::Unmatched => {}
                Classified::Scalar { name, value } => {
                    scalars.insert(Slot::Scalar(name.to_string()), value);
                }
                Classified::Hierarchical {
                    metric,
                    level,
                    entity,
                    value,
                } => {
                    let role = match level.scope {
                        LevelScope::Ignored => continue,
                        LevelScope::Shared => None,
                        LevelScope::Private => entity.map(|e| policy.role_of(e)),
                    };
                    buckets
                        .entry(Slot::Bucket {
                            role,
                            level: level.label.clone(),
                            metric: metric.to_string(),
                        })
                        .or_default()
                        .add(value);
                }
            }
        }

        let entries = self
            .layout(policy)
            .into_iter()
            .map(|(slot, name)| {
                let value = match &slot {
                    Slot::Scalar(_) => scalars.get(&slot).copied().unwrap_or(0.0),
                    Slot::Bucket { .. } => buckets.get(&slot).map(|m| m.mean()).unwrap_or(0.0),
                };
                (name, value)
            })
            .collect();

        Ok(MetricRecord::new(entries))
    }
}

/// Aggregate a report with the default gem5 schema.
pub fn aggregate_report(text: &str, policy: &RolePolicy) -> Result<MetricRecord, ReportError> {
    ReportAggregator::default().aggregate(text, policy)
}
