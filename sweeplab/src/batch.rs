// src/batch.rs
//
// Batch manifest and the sequential driver that runs it.
//
// A batch expands one template, writes the configuration file, then for each
// experiment index launches the external simulator, aggregates its stats
// report and appends one row to the results file:
//
//   <out_dir>/<batch_id>/experiment_metaparams.csv
//   <out_dir>/<batch_id>/experiment_metaparams.sha256
//   <out_dir>/<batch_id>/raw/<index>/...
//   <out_dir>/<batch_id>/experiment_data.csv
//
// Runs are strictly sequential; the results file is always a loadable prefix.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::BatchError;
use crate::report::{MetricRecord, ReportAggregator, ReportSchema, RolePolicy};
use crate::results::ResultsWriter;
use crate::sweep::{
    count, expand, table_fingerprint, write_configuration_file, ConcreteConfiguration,
    ConfigurationTemplate,
};

/// Current batch manifest version.
pub const BATCH_SCHEMA_VERSION: u32 = 1;

pub const CONFIGURATION_FILE_NAME: &str = "experiment_metaparams.csv";
pub const FINGERPRINT_FILE_NAME: &str = "experiment_metaparams.sha256";
pub const RESULTS_FILE_NAME: &str = "experiment_data.csv";
pub const RAW_DIR_NAME: &str = "raw";
/// File the simulator's standard output is captured into, per run.
pub const STDOUT_FILE_NAME: &str = "stdout.txt";

/// External simulator invocation.
///
/// Arguments may contain the placeholders `{outdir}`, `{param_file}`,
/// `{index}` and `{workload}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SimulatorSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// How entity ids split into the two roles.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RoleSplit {
    /// Same threshold for every run.
    Fixed(u32),
    /// Threshold read from this configuration field for each run.
    Field(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnFailure {
    #[default]
    Abort,
    Skip,
}

/// A batch manifest.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchSpec {
    pub batch_id: String,
    pub batch_version: u32,
    pub out_dir: PathBuf,
    pub template: ConfigurationTemplate,
    pub simulator: SimulatorSpec,
    pub workload: String,
    #[serde(default = "default_report_file")]
    pub report_file: String,
    pub role_split: RoleSplit,
    /// Overrides the default gem5 report layout.
    #[serde(default)]
    pub schema: Option<ReportSchema>,
    #[serde(default)]
    pub on_failure: OnFailure,
}

fn default_report_file() -> String {
    "stats.txt".to_string()
}

impl BatchSpec {
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, BatchError> {
        let contents = fs::read_to_string(path.as_ref()).map_err(|e| BatchError::ManifestIo {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, BatchError> {
        let spec: BatchSpec =
            serde_yaml::from_str(yaml).map_err(|e| BatchError::Parse(e.to_string()))?;
        spec.validate()?;
        Ok(spec)
    }

    pub fn validate(&self) -> Result<(), BatchError> {
        if self.batch_id.is_empty() {
            return Err(validation("batch_id", "batch_id cannot be empty"));
        }
        if self.batch_id.contains(['/', '\\']) || self.batch_id == "." || self.batch_id == ".." {
            return Err(validation(
                "batch_id",
                format!("'{}' is not a plain directory name", self.batch_id),
            ));
        }
        if self.batch_version == 0 {
            return Err(validation("batch_version", "batch_version must be >= 1"));
        }
        if self.batch_version > BATCH_SCHEMA_VERSION {
            return Err(validation(
                "batch_version",
                format!(
                    "unsupported batch_version {} (max {})",
                    self.batch_version, BATCH_SCHEMA_VERSION
                ),
            ));
        }
        if self.simulator.program.is_empty() {
            return Err(validation("simulator.program", "program cannot be empty"));
        }
        if self.report_file.is_empty() {
            return Err(validation("report_file", "report_file cannot be empty"));
        }

        if let Some(schema) = &self.schema {
            if schema.boundary_marker.trim().is_empty() {
                return Err(validation(
                    "schema.boundary_marker",
                    "boundary_marker cannot be empty",
                ));
            }
            if schema.entity_keyword.is_empty() {
                return Err(validation(
                    "schema.entity_keyword",
                    "entity_keyword cannot be empty",
                ));
            }
        }

        // Empty candidate lists and unreadable values fail at load time.
        count(&self.template)?;

        let fields = self.template.flatten()?;
        if let RoleSplit::Field(name) = &self.role_split {
            if !fields.iter().any(|(path, _)| path == name) {
                return Err(validation(
                    "role_split",
                    format!("template has no field '{}'", name),
                ));
            }
        }
        Ok(())
    }

    /// Apply `SWEEPLAB_OUT_DIR` / `SWEEPLAB_SIMULATOR` from the process
    /// environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("SWEEPLAB_OUT_DIR") {
            if raw.is_empty() {
                warn!(
                    "SWEEPLAB_OUT_DIR is empty; keeping out_dir = {}",
                    self.out_dir.display()
                );
            } else {
                self.out_dir = PathBuf::from(&raw);
                info!("SWEEPLAB_OUT_DIR = {} (overrode manifest)", raw);
            }
        }

        if let Some(raw) = lookup("SWEEPLAB_SIMULATOR") {
            if raw.is_empty() {
                warn!(
                    "SWEEPLAB_SIMULATOR is empty; keeping program = {}",
                    self.simulator.program
                );
            } else {
                info!("SWEEPLAB_SIMULATOR = {} (overrode manifest)", raw);
                self.simulator.program = raw;
            }
        }
        self
    }

    pub fn batch_dir(&self) -> PathBuf {
        self.out_dir.join(&self.batch_id)
    }

    /// Role policy for one configuration.
    pub fn role_policy(&self, config: &ConcreteConfiguration) -> Result<RolePolicy, BatchError> {
        let threshold = match &self.role_split {
            RoleSplit::Fixed(n) => *n,
            RoleSplit::Field(name) => {
                let v = config.get_int(name)?;
                u32::try_from(v).map_err(|_| {
                    validation("role_split", format!("field '{}' = {} is out of range", name, v))
                })?
            }
        };
        Ok(RolePolicy::new(threshold))
    }
}

fn validation(field: &str, message: impl Into<String>) -> BatchError {
    BatchError::Validation {
        field: field.to_string(),
        message: message.into(),
    }
}

/// Everything a launcher needs to start one run.
#[derive(Debug, Clone)]
pub struct RunRequest<'a> {
    pub index: usize,
    /// Per-run output directory; already created.
    pub out_dir: &'a Path,
    pub param_file: &'a Path,
    pub workload: &'a str,
}

impl RunRequest<'_> {
    /// Replace the placeholders in one argument template.
    pub fn substitute(&self, arg: &str) -> String {
        arg.replace("{outdir}", &self.out_dir.display().to_string())
            .replace("{param_file}", &self.param_file.display().to_string())
            .replace("{index}", &self.index.to_string())
            .replace("{workload}", self.workload)
    }
}

/// Starts one simulation and waits for it to finish.
pub trait SimulationLauncher {
    fn launch(&mut self, request: &RunRequest<'_>) -> Result<(), BatchError>;
}

/// Launcher that spawns an external program.
///
/// Standard output is captured into `<outdir>/stdout.txt`; standard error is
/// inherited.
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    spec: SimulatorSpec,
}

impl CommandLauncher {
    pub fn new(spec: SimulatorSpec) -> Self {
        Self { spec }
    }
}

impl SimulationLauncher for CommandLauncher {
    fn launch(&mut self, request: &RunRequest<'_>) -> Result<(), BatchError> {
        let args: Vec<String> = self.spec.args.iter().map(|a| request.substitute(a)).collect();
        debug!(program = %self.spec.program, ?args, "launching run {}", request.index);

        let stdout_path = request.out_dir.join(STDOUT_FILE_NAME);
        let stdout = fs::File::create(&stdout_path).map_err(|e| BatchError::Io {
            path: stdout_path.display().to_string(),
            source: e,
        })?;

        let status = Command::new(&self.spec.program)
            .args(&args)
            .stdout(Stdio::from(stdout))
            .status()
            .map_err(|e| BatchError::RunFailed {
                index: request.index,
                message: format!("failed to start '{}': {}", self.spec.program, e),
            })?;

        if !status.success() {
            return Err(BatchError::RunFailed {
                index: request.index,
                message: format!("'{}' exited with {}", self.spec.program, status),
            });
        }
        Ok(())
    }
}

/// Summary of one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchOutcome {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Run a whole batch.
///
/// An existing batch directory is an error unless `clean` is set, in which
/// case it is removed first.
pub fn run_batch(
    spec: &BatchSpec,
    launcher: &mut dyn SimulationLauncher,
    clean: bool,
) -> Result<BatchOutcome, BatchError> {
    // Expansion errors must leave nothing on disk.
    let configs = expand(&spec.template)?;
    let fingerprint = table_fingerprint(&configs)?;

    let batch_dir = spec.batch_dir();
    if batch_dir.exists() {
        if !clean {
            return Err(BatchError::OutputExists(batch_dir.display().to_string()));
        }
        warn!("removing existing batch directory {}", batch_dir.display());
        fs::remove_dir_all(&batch_dir).map_err(|e| io_err(&batch_dir, e))?;
    }
    let raw_dir = batch_dir.join(RAW_DIR_NAME);
    fs::create_dir_all(&raw_dir).map_err(|e| io_err(&raw_dir, e))?;

    let param_file = batch_dir.join(CONFIGURATION_FILE_NAME);
    write_configuration_file(&param_file, &configs)?;

    let fingerprint_path = batch_dir.join(FINGERPRINT_FILE_NAME);
    fs::write(
        &fingerprint_path,
        format!("{}  {}\n", fingerprint, CONFIGURATION_FILE_NAME),
    )
    .map_err(|e| io_err(&fingerprint_path, e))?;
    info!(
        batch = %spec.batch_id,
        experiments = configs.len(),
        sha256 = %fingerprint,
        "configuration file written"
    );

    let aggregator = ReportAggregator::new(spec.schema.clone().unwrap_or_default());
    // Columns depend on role names only, never on the threshold.
    let columns = aggregator.columns(&RolePolicy::new(0));
    let mut results = ResultsWriter::create(batch_dir.join(RESULTS_FILE_NAME), &columns)?;

    let mut outcome = BatchOutcome {
        total: configs.len(),
        ..BatchOutcome::default()
    };

    for config in &configs {
        let index = config.experiment_index();
        let run_dir = raw_dir.join(index.to_string());
        fs::create_dir_all(&run_dir).map_err(|e| io_err(&run_dir, e))?;

        let request = RunRequest {
            index,
            out_dir: &run_dir,
            param_file: &param_file,
            workload: &spec.workload,
        };

        match run_one(spec, &aggregator, launcher, config, &request) {
            Ok(record) => {
                results.append(index, &record)?;
                outcome.completed += 1;
                info!("run {}/{} done", outcome.completed + outcome.failed, outcome.total);
            }
            Err(e) => match spec.on_failure {
                OnFailure::Abort => return Err(e),
                OnFailure::Skip => {
                    warn!("skipping run {}: {}", index, e);
                    outcome.failed += 1;
                }
            },
        }
    }

    info!(
        batch = %spec.batch_id,
        completed = outcome.completed,
        failed = outcome.failed,
        "batch finished"
    );
    Ok(outcome)
}

fn run_one(
    spec: &BatchSpec,
    aggregator: &ReportAggregator,
    launcher: &mut dyn SimulationLauncher,
    config: &ConcreteConfiguration,
    request: &RunRequest<'_>,
) -> Result<MetricRecord, BatchError> {
    let policy = spec.role_policy(config)?;
    launcher.launch(request)?;

    let report_path = request.out_dir.join(&spec.report_file);
    let text = fs::read_to_string(&report_path).map_err(|e| BatchError::RunFailed {
        index: request.index,
        message: format!("cannot read report '{}': {}", report_path.display(), e),
    })?;
    Ok(aggregator.aggregate(&text, &policy)?)
}

fn io_err(path: &Path, source: std::io::Error) -> BatchError {
    BatchError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SweepError;
    use crate::results::read_results;
    use tempfile::tempdir;

    fn manifest(out_dir: &Path, on_failure: &str) -> String {
        format!(
            r#"
batch_id: smoke
batch_version: 1
out_dir: {}
template:
  prefetcher_type: [Stride, Tagged]
  big_core_num: 1
simulator:
  program: gem5.opt
  args: ["--outdir={{outdir}}", "--target_index={{index}}"]
workload: mm
role_split: big_core_num
on_failure: {}
"#,
            out_dir.display(),
            on_failure
        )
    }

    /// Writes a tiny stats report; fails on the listed indices.
    struct FakeLauncher {
        fail_on: Vec<usize>,
        seen: Vec<usize>,
    }

    impl SimulationLauncher for FakeLauncher {
        fn launch(&mut self, request: &RunRequest<'_>) -> Result<(), BatchError> {
            self.seen.push(request.index);
            if self.fail_on.contains(&request.index) {
                return Err(BatchError::RunFailed {
                    index: request.index,
                    message: "boom".to_string(),
                });
            }
            let stats = format!(
                "---------- Begin Simulation Statistics ----------\nsimSeconds {}\n",
                request.index + 1
            );
            fs::write(request.out_dir.join("stats.txt"), stats).unwrap();
            Ok(())
        }
    }

    #[test]
    fn test_parse_manifest_defaults() {
        let temp = tempdir().unwrap();
        let spec = BatchSpec::from_yaml_str(&manifest(temp.path(), "skip")).unwrap();
        assert_eq!(spec.report_file, "stats.txt");
        assert_eq!(spec.on_failure, OnFailure::Skip);
        assert_eq!(spec.role_split, RoleSplit::Field("big_core_num".to_string()));
        assert!(spec.schema.is_none());
    }

    #[test]
    fn test_unknown_role_split_field_rejected() {
        let temp = tempdir().unwrap();
        let yaml = manifest(temp.path(), "abort").replace("role_split: big_core_num", "role_split: cores");
        assert!(matches!(
            BatchSpec::from_yaml_str(&yaml),
            Err(BatchError::Validation { .. })
        ));
    }

    #[test]
    fn test_zero_version_rejected() {
        let temp = tempdir().unwrap();
        let yaml = manifest(temp.path(), "abort").replace("batch_version: 1", "batch_version: 0");
        assert!(matches!(
            BatchSpec::from_yaml_str(&yaml),
            Err(BatchError::Validation { .. })
        ));
    }

    #[test]
    fn test_empty_candidate_list_fails_at_load() {
        let temp = tempdir().unwrap();
        let yaml = manifest(temp.path(), "abort")
            .replace("prefetcher_type: [Stride, Tagged]", "prefetcher_type: []");
        assert!(matches!(
            BatchSpec::from_yaml_str(&yaml),
            Err(BatchError::Sweep(SweepError::Configuration { .. }))
        ));
    }

    #[test]
    fn test_failed_expansion_leaves_no_batch_dir() {
        let temp = tempdir().unwrap();
        let mut spec = BatchSpec::from_yaml_str(&manifest(temp.path(), "abort")).unwrap();
        spec.template = ConfigurationTemplate::new("broken")
            .swept("prefetcher_type", Vec::<String>::new())
            .fixed("big_core_num", 1);
        let mut launcher = FakeLauncher {
            fail_on: vec![],
            seen: vec![],
        };

        for _ in 0..2 {
            assert!(matches!(
                run_batch(&spec, &mut launcher, false),
                Err(BatchError::Sweep(SweepError::Configuration { .. }))
            ));
        }
        assert!(!spec.batch_dir().exists());
        assert!(launcher.seen.is_empty());
    }

    #[test]
    fn test_empty_boundary_marker_rejected() {
        let temp = tempdir().unwrap();
        let mut spec = BatchSpec::from_yaml_str(&manifest(temp.path(), "abort")).unwrap();
        spec.schema = Some(ReportSchema {
            boundary_marker: String::new(),
            ..ReportSchema::default()
        });
        assert!(matches!(
            spec.validate(),
            Err(BatchError::Validation { ref field, .. }) if field == "schema.boundary_marker"
        ));
    }

    #[test]
    fn test_env_overrides() {
        let temp = tempdir().unwrap();
        let spec = BatchSpec::from_yaml_str(&manifest(temp.path(), "abort"))
            .unwrap()
            .with_overrides_from(|key| match key {
                "SWEEPLAB_OUT_DIR" => Some("/tmp/elsewhere".to_string()),
                "SWEEPLAB_SIMULATOR" => Some(String::new()),
                _ => None,
            });
        assert_eq!(spec.out_dir, PathBuf::from("/tmp/elsewhere"));
        assert_eq!(spec.simulator.program, "gem5.opt", "empty override is ignored");
    }

    #[test]
    fn test_substitute_placeholders() {
        let request = RunRequest {
            index: 3,
            out_dir: Path::new("/r/3"),
            param_file: Path::new("/r/p.csv"),
            workload: "mm",
        };
        assert_eq!(request.substitute("--outdir={outdir}"), "--outdir=/r/3");
        assert_eq!(
            request.substitute("--param_file={param_file} --target_index={index} {workload}"),
            "--param_file=/r/p.csv --target_index=3 mm"
        );
    }

    #[test]
    fn test_run_batch_writes_layout() {
        let temp = tempdir().unwrap();
        let spec = BatchSpec::from_yaml_str(&manifest(temp.path(), "abort")).unwrap();
        let mut launcher = FakeLauncher {
            fail_on: vec![],
            seen: vec![],
        };
        let outcome = run_batch(&spec, &mut launcher, false).unwrap();

        assert_eq!(
            outcome,
            BatchOutcome {
                total: 2,
                completed: 2,
                failed: 0
            }
        );
        assert_eq!(launcher.seen, vec![0, 1]);

        let dir = temp.path().join("smoke");
        assert!(dir.join(CONFIGURATION_FILE_NAME).exists());
        assert!(dir.join(FINGERPRINT_FILE_NAME).exists());
        let rows = read_results(dir.join(RESULTS_FILE_NAME)).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].1.get("simSeconds"), Some(2.0));
    }

    #[test]
    fn test_existing_dir_needs_clean() {
        let temp = tempdir().unwrap();
        let spec = BatchSpec::from_yaml_str(&manifest(temp.path(), "abort")).unwrap();
        let mut launcher = FakeLauncher {
            fail_on: vec![],
            seen: vec![],
        };
        run_batch(&spec, &mut launcher, false).unwrap();
        assert!(matches!(
            run_batch(&spec, &mut launcher, false),
            Err(BatchError::OutputExists(_))
        ));
        assert!(run_batch(&spec, &mut launcher, true).is_ok());
    }

    #[test]
    fn test_skip_records_failures() {
        let temp = tempdir().unwrap();
        let spec = BatchSpec::from_yaml_str(&manifest(temp.path(), "skip")).unwrap();
        let mut launcher = FakeLauncher {
            fail_on: vec![0],
            seen: vec![],
        };
        let outcome = run_batch(&spec, &mut launcher, false).unwrap();
        assert_eq!(outcome.completed, 1);
        assert_eq!(outcome.failed, 1);

        let rows = read_results(temp.path().join("smoke").join(RESULTS_FILE_NAME)).unwrap();
        assert_eq!(rows.iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_abort_stops_at_first_failure() {
        let temp = tempdir().unwrap();
        let spec = BatchSpec::from_yaml_str(&manifest(temp.path(), "abort")).unwrap();
        let mut launcher = FakeLauncher {
            fail_on: vec![0],
            seen: vec![],
        };
        assert!(matches!(
            run_batch(&spec, &mut launcher, false),
            Err(BatchError::RunFailed { index: 0, .. })
        ));
        assert_eq!(launcher.seen, vec![0]);
    }
}
