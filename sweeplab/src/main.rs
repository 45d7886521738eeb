// src/main.rs
//
// Thin CLI around the sweeplab library.
//
//   sweeplab expand <template.yaml> --out <csv>
//   sweeplab resolve --param-file <csv> --target-index <n> [--workload <path>]
//   sweeplab aggregate <stats.txt> --role-split <n>
//   sweeplab extract <stdout> [--out <csv>]
//   sweeplab run <batch.yaml> [--clean]

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use tracing::{info, warn};

use sweeplab::logging::init_tracing;
use sweeplab::report::write_block_records;
use sweeplab::sweep::{table_fingerprint, write_configuration_file};
use sweeplab::{
    aggregate_report, expand, read_configuration_file, run_batch, BatchSpec, CommandLauncher,
    ConfigurationTemplate, HybridExperiment, RolePolicy, SegmentedBlockExtractor,
};

#[derive(Debug, Parser)]
#[command(
    name = "sweeplab",
    about = "Parameter sweeps and result collection for simulator batches",
    version
)]
struct Cli {
    /// Verbosity: -v, -vv (RUST_LOG takes precedence)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Expand a YAML template into the configuration file.
    Expand {
        template: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },
    /// Print the hybrid CPU experiment for one configuration row as JSON.
    Resolve {
        #[arg(long)]
        param_file: PathBuf,
        #[arg(long)]
        target_index: usize,
        /// Workload binary; adds the per-core process list.
        #[arg(long)]
        workload: Option<String>,
    },
    /// Aggregate one stats report into `name value` lines.
    Aggregate {
        stats: PathBuf,
        /// Entities below this id are big cores.
        #[arg(long)]
        role_split: u32,
    },
    /// Extract Aladdin result blocks from captured stdout as CSV.
    Extract {
        input: PathBuf,
        /// Defaults to stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Run a batch manifest.
    Run {
        manifest: PathBuf,
        /// Remove an existing batch directory first.
        #[arg(long)]
        clean: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Expand { template, out } => cmd_expand(&template, &out),
        Command::Resolve {
            param_file,
            target_index,
            workload,
        } => cmd_resolve(&param_file, target_index, workload.as_deref()),
        Command::Aggregate { stats, role_split } => cmd_aggregate(&stats, role_split),
        Command::Extract { input, out } => cmd_extract(&input, out.as_deref()),
        Command::Run { manifest, clean } => cmd_run(&manifest, clean),
    }
}

fn cmd_expand(template: &Path, out: &Path) -> Result<()> {
    let template = ConfigurationTemplate::from_yaml_file(template)
        .with_context(|| format!("loading template {}", template.display()))?;
    let configs = expand(&template)?;
    write_configuration_file(out, &configs)?;
    let fingerprint = table_fingerprint(&configs)?;
    info!(sha256 = %fingerprint, "wrote {}", out.display());
    println!("{}", configs.len());
    Ok(())
}

fn cmd_resolve(param_file: &Path, index: usize, workload: Option<&str>) -> Result<()> {
    let config = read_configuration_file(param_file, index)?;
    let experiment = HybridExperiment::from_configuration(&config)
        .with_context(|| format!("experiment_index {}", index))?;

    let json = experiment.to_json(workload)?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

fn cmd_aggregate(stats: &Path, role_split: u32) -> Result<()> {
    let text =
        fs::read_to_string(stats).with_context(|| format!("reading {}", stats.display()))?;
    let record = aggregate_report(&text, &RolePolicy::new(role_split))
        .with_context(|| format!("aggregating {}", stats.display()))?;
    for (name, value) in record.entries() {
        println!("{} {}", name, value);
    }
    Ok(())
}

fn cmd_extract(input: &Path, out: Option<&Path>) -> Result<()> {
    let text =
        fs::read_to_string(input).with_context(|| format!("reading {}", input.display()))?;
    let extractor = SegmentedBlockExtractor::aladdin()?;
    let extraction = extractor.extract(&text);
    if let Some(lines) = extraction.dangling_lines {
        warn!(
            "{}: unterminated block at end of input dropped ({} lines)",
            input.display(),
            lines
        );
    }

    let names = extractor.field_names();
    match out {
        Some(path) => {
            let file = fs::File::create(path)
                .with_context(|| format!("creating {}", path.display()))?;
            write_block_records(file, &names, &extraction.records)?;
        }
        None => write_block_records(io::stdout().lock(), &names, &extraction.records)?,
    }
    info!("{} blocks extracted", extraction.records.len());
    Ok(())
}

fn cmd_run(manifest: &Path, clean: bool) -> Result<()> {
    let spec = BatchSpec::from_yaml_file(manifest)
        .with_context(|| format!("loading batch {}", manifest.display()))?
        .with_env_overrides();
    let mut launcher = CommandLauncher::new(spec.simulator.clone());
    let outcome = run_batch(&spec, &mut launcher, clean)?;
    println!(
        "{}: {} runs, {} completed, {} failed",
        spec.batch_id, outcome.total, outcome.completed, outcome.failed
    );
    Ok(())
}
