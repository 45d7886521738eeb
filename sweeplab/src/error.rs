// src/error.rs
//
// Error types for sweep expansion, report processing, results files and
// batch orchestration.
//
// Core failures are pure and local: nothing is partially written or mutated
// when one of these is returned, so callers only decide whether to abort the
// batch or record the failure and continue.

use std::io;

use thiserror::Error;

/// Errors raised while expanding templates or reading the configuration file.
#[derive(Debug, Error)]
pub enum SweepError {
    /// A template field is malformed (empty candidate list, unclassifiable
    /// value, reserved or duplicate name, product overflow, ...).
    #[error("configuration error in '{field}': {message}")]
    Configuration { field: String, message: String },
    /// No row in the configuration file carries the requested index.
    #[error("experiment_index {index} not found in '{path}'")]
    IndexNotFound { path: String, index: usize },
    #[error("failed to access '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("malformed configuration table: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to parse template YAML: {0}")]
    Parse(String),
}

impl SweepError {
    pub(crate) fn config(field: impl Into<String>, message: impl Into<String>) -> Self {
        SweepError::Configuration {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Errors raised by the report aggregator.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ReportError {
    /// A hierarchical key matched the general shape but names an unknown
    /// level or carries an unusable entity identifier.
    #[error("unrecognized metric at line {line}: {reason} (key '{key}')")]
    UnrecognizedMetric {
        line: usize,
        key: String,
        reason: String,
    },
    /// The report cannot be interpreted (missing section boundary, value
    /// token that is not a number).
    #[error("malformed report: {0}")]
    MalformedReport(String),
}

/// Errors raised while configuring the segmented block extractor.
///
/// Extraction itself is lenient and never fails.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("block marker must contain at least one line")]
    EmptyMarker,
    #[error("invalid pattern for field '{field}': {source}")]
    InvalidPattern {
        field: String,
        #[source]
        source: regex::Error,
    },
    #[error("pattern for field '{field}' must have exactly one capture group")]
    MissingCapture { field: String },
}

/// Errors raised by the results file writer and reader.
#[derive(Debug, Error)]
pub enum ResultsError {
    #[error("results file '{path}' has header {found:?}, expected {expected:?}")]
    HeaderMismatch {
        path: String,
        expected: Vec<String>,
        found: Vec<String>,
    },
    #[error("metric record columns {found:?} do not match results columns {expected:?}")]
    ColumnMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },
    #[error("malformed results row {row}: {message}")]
    MalformedRow { row: usize, message: String },
    #[error("failed to access '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("results file error: {0}")]
    Csv(#[from] csv::Error),
}

/// Errors raised by batch orchestration.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("failed to read batch manifest '{path}': {source}")]
    ManifestIo {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse batch manifest YAML: {0}")]
    Parse(String),
    #[error("batch validation error in '{field}': {message}")]
    Validation { field: String, message: String },
    #[error("batch directory '{0}' already exists (use --clean to replace it)")]
    OutputExists(String),
    #[error("run {index} failed: {message}")]
    RunFailed { index: usize, message: String },
    #[error("failed to access '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Sweep(#[from] SweepError),
    #[error(transparent)]
    Report(#[from] ReportError),
    #[error(transparent)]
    Results(#[from] ResultsError),
}
