//! Sweeplab core library.
//!
//! Parameter-sweep planning and result collection for batches of simulator
//! runs: a template is expanded into indexed configurations, each run's raw
//! report is reduced to a fixed-width metrics record, and records are
//! appended to a crash-safe results file. The binary (`src/main.rs`) is a
//! thin CLI around these components.

pub mod batch;
pub mod error;
pub mod hybrid;
pub mod logging;
pub mod metrics;
pub mod report;
pub mod results;
pub mod sweep;

// --- Re-exports for ergonomic external use ---------------------------------

pub use batch::{
    run_batch, BatchOutcome, BatchSpec, CommandLauncher, OnFailure, RoleSplit, RunRequest,
    SimulationLauncher, SimulatorSpec,
};

pub use error::{BatchError, ExtractError, ReportError, ResultsError, SweepError};

pub use hybrid::HybridExperiment;

pub use metrics::RunningMean;

pub use report::{
    aggregate_report, BlockExtraction, BlockMarker, ExtractedBlockRecord, FieldPattern,
    MetricRecord, ReportAggregator, ReportSchema, RolePolicy, SegmentedBlockExtractor,
};

pub use results::{read_results, ResultsWriter};

pub use sweep::{
    count, expand, nth, read_configuration_file, write_configuration_file, ConcreteConfiguration,
    ConfigurationTemplate, Param, ParamValue,
};
