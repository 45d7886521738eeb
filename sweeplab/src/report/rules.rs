// src/report/rules.rs
//
// Declarative classification rules for hierarchical stats keys.
//
// A stats line is `<key> <value> [# comment]`. The key is matched against an
// ordered list of (token predicate -> metric kind) rules; the first rule that
// matches decides how the line is interpreted. Hierarchical keys are then
// tokenized on '.' to find the entity segment and the level segment
// (second-to-last). Adding a metric means adding a rule, not a branch.
//
// Defaults follow the gem5 hybrid big/little cache hierarchy stats layout:
//
//   simSeconds                                           0.002261
//   board.cache_hierarchy.clusters0.l1icache.overallMissRate::total  0.5
//   board.cache_hierarchy.l3_cache.overallMissRate::total            0.096511

use serde::{Deserialize, Serialize};

use crate::error::ReportError;

/// Predicate over a single token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPredicate {
    Equals(String),
    StartsWith(String),
    EndsWith(String),
}

impl TokenPredicate {
    pub fn matches(&self, token: &str) -> bool {
        match self {
            TokenPredicate::Equals(s) => token == s,
            TokenPredicate::StartsWith(s) => token.starts_with(s.as_str()),
            TokenPredicate::EndsWith(s) => token.ends_with(s.as_str()),
        }
    }
}

/// What a matching key contributes to the metrics record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Report-wide value stored under `name`; the last occurrence wins.
    Scalar { name: String },
    /// Per-entity, per-level value averaged into `metric` buckets.
    Hierarchical { metric: String },
}

/// One classification rule applied to the key token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRule {
    pub predicate: TokenPredicate,
    pub kind: MetricKind,
}

/// How values at a given level are bucketed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelScope {
    /// Owned by one entity; bucketed by the entity's role.
    Private,
    /// Shared by all entities; one bucket.
    Shared,
    /// Known level that is not aggregated (e.g. page-table walker caches).
    Ignored,
}

/// Maps a level segment of a hierarchical key to an output label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelRule {
    pub segment: String,
    pub label: String,
    pub scope: LevelScope,
}

impl LevelRule {
    pub fn new(segment: &str, label: &str, scope: LevelScope) -> Self {
        Self {
            segment: segment.to_string(),
            label: label.to_string(),
            scope,
        }
    }
}

/// Complete description of a stats report layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSchema {
    /// Only lines strictly after the last line containing this marker are read.
    pub boundary_marker: String,
    /// Ordered key rules; the first match wins.
    pub key_rules: Vec<KeyRule>,
    /// Keyword immediately followed by the entity's numeric identifier.
    pub entity_keyword: String,
    /// Closed set of level names.
    pub levels: Vec<LevelRule>,
}

impl Default for ReportSchema {
    fn default() -> Self {
        Self {
            boundary_marker: "Begin Simulation Statistics".to_string(),
            key_rules: vec![
                KeyRule {
                    predicate: TokenPredicate::Equals("simSeconds".to_string()),
                    kind: MetricKind::Scalar {
                        name: "simSeconds".to_string(),
                    },
                },
                KeyRule {
                    predicate: TokenPredicate::Equals("simInsts".to_string()),
                    kind: MetricKind::Scalar {
                        name: "simInsts".to_string(),
                    },
                },
                KeyRule {
                    predicate: TokenPredicate::EndsWith(".overallMissRate::total".to_string()),
                    kind: MetricKind::Hierarchical {
                        metric: "missrate".to_string(),
                    },
                },
            ],
            entity_keyword: "clusters".to_string(),
            levels: vec![
                LevelRule::new("l1icache", "l1i", LevelScope::Private),
                LevelRule::new("l1dcache", "l1d", LevelScope::Private),
                LevelRule::new("l2cache", "l2", LevelScope::Private),
                LevelRule::new("l3_cache", "l3", LevelScope::Shared),
                LevelRule::new("iptw_cache", "iptw", LevelScope::Ignored),
                LevelRule::new("dptw_cache", "dptw", LevelScope::Ignored),
                LevelRule::new("iocache", "io", LevelScope::Ignored),
            ],
        }
    }
}

/// Result of classifying one stats line.
#[derive(Debug, Clone, PartialEq)]
pub enum Classified<'s> {
    /// No rule matched the key.
    Unmatched,
    Scalar {
        name: &'s str,
        value: f64,
    },
    Hierarchical {
        metric: &'s str,
        level: &'s LevelRule,
        entity: Option<u32>,
        value: f64,
    },
}

impl ReportSchema {
    /// Scalar output names in rule order.
    pub fn scalar_names(&self) -> Vec<&str> {
        self.key_rules
            .iter()
            .filter_map(|r| match &r.kind {
                MetricKind::Scalar { name } => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Hierarchical metric names in rule order, deduplicated.
    pub fn hierarchical_metrics(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for rule in &self.key_rules {
            if let MetricKind::Hierarchical { metric } = &rule.kind {
                if !out.contains(&metric.as_str()) {
                    out.push(metric.as_str());
                }
            }
        }
        out
    }

    /// Level labels of the given scope in rule order, deduplicated.
    pub fn level_labels(&self, scope: LevelScope) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for level in self.levels.iter().filter(|l| l.scope == scope) {
            if !out.contains(&level.label.as_str()) {
                out.push(level.label.as_str());
            }
        }
        out
    }

    /// Classify one line. `line_no` is 1-based and only used in errors.
    pub fn classify<'s>(&'s self, line_no: usize, line: &str) -> Result<Classified<'s>, ReportError> {
        let mut tokens = line.split_whitespace();
        let key = match tokens.next() {
            Some(k) => k,
            None => return Ok(Classified::Unmatched),
        };

        let rule = match self.key_rules.iter().find(|r| r.predicate.matches(key)) {
            Some(r) => r,
            None => return Ok(Classified::Unmatched),
        };

        let value = parse_value(line_no, key, tokens.next())?;

        match &rule.kind {
            MetricKind::Scalar { name } => Ok(Classified::Scalar {
                name: name.as_str(),
                value,
            }),
            MetricKind::Hierarchical { metric } => {
                let segments: Vec<&str> = key.split('.').collect();
                if segments.len() < 2 {
                    return Err(ReportError::UnrecognizedMetric {
                        line: line_no,
                        key: key.to_string(),
                        reason: "hierarchical key has no level segment".to_string(),
                    });
                }
                let level_name = segments[segments.len() - 2];
                let level = self
                    .levels
                    .iter()
                    .find(|l| l.segment == level_name)
                    .ok_or_else(|| ReportError::UnrecognizedMetric {
                        line: line_no,
                        key: key.to_string(),
                        reason: format!("unknown level '{}'", level_name),
                    })?;

                let entity = self.entity_id(line_no, key, &segments)?;
                if level.scope == LevelScope::Private && entity.is_none() {
                    return Err(ReportError::UnrecognizedMetric {
                        line: line_no,
                        key: key.to_string(),
                        reason: format!(
                            "private level '{}' outside any '{}' segment",
                            level_name, self.entity_keyword
                        ),
                    });
                }

                Ok(Classified::Hierarchical {
                    metric: metric.as_str(),
                    level,
                    entity,
                    value,
                })
            }
        }
    }

    /// Entity identifier from the first segment containing the keyword.
    ///
    /// Only the single character after the keyword is read, so identifiers
    /// above 9 are not supported.
    fn entity_id(
        &self,
        line_no: usize,
        key: &str,
        segments: &[&str],
    ) -> Result<Option<u32>, ReportError> {
        let keyword = self.entity_keyword.as_str();
        let segment = match segments.iter().find(|s| s.contains(keyword)) {
            Some(s) => *s,
            None => return Ok(None),
        };
        let start = segment.find(keyword).unwrap_or(0) + keyword.len();
        segment[start..]
            .chars()
            .next()
            .and_then(|c| c.to_digit(10))
            .map(Some)
            .ok_or_else(|| ReportError::UnrecognizedMetric {
                line: line_no,
                key: key.to_string(),
                reason: format!("'{}' is not followed by a digit in '{}'", keyword, segment),
            })
    }
}

fn parse_value(line_no: usize, key: &str, token: Option<&str>) -> Result<f64, ReportError> {
    let token = token.ok_or_else(|| {
        ReportError::MalformedReport(format!("line {}: key '{}' has no value", line_no, key))
    })?;
    token.parse::<f64>().map_err(|_| {
        ReportError::MalformedReport(format!(
            "line {}: value '{}' for key '{}' is not a number",
            line_no, token, key
        ))
    })
}
