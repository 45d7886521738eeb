// tests/batch_run_tests.rs
//
// End-to-end batch flow with an in-process simulator stand-in:
// 1. The launcher resolves its configuration through the param file contract
// 2. Per-run role policy comes from the big_core_num field
// 3. The results file has one row per completed run, in index order

use std::fs;
use std::path::Path;

use sweeplab::batch::{FINGERPRINT_FILE_NAME, RESULTS_FILE_NAME};
use sweeplab::{
    read_configuration_file, read_results, run_batch, BatchError, BatchSpec, HybridExperiment,
    RunRequest, SimulationLauncher,
};
use tempfile::tempdir;

/// Reads its row from the param file like the real executor does, then
/// writes a stats dump where every big core misses 0.25 and every little
/// core misses 0.75 in L1D.
struct StandInSimulator;

impl SimulationLauncher for StandInSimulator {
    fn launch(&mut self, request: &RunRequest<'_>) -> Result<(), BatchError> {
        let config = read_configuration_file(request.param_file, request.index)?;
        let experiment = HybridExperiment::from_configuration(&config)?;

        let mut stats = String::from("---------- Begin Simulation Statistics ----------\n");
        stats.push_str(&format!("simSeconds {}\n", experiment.mat_size));
        for core in 0..experiment.total_cores() {
            let rate = if core < experiment.processor.big_core_num {
                0.25
            } else {
                0.75
            };
            stats.push_str(&format!(
                "board.cache_hierarchy.clusters{}.l1dcache.overallMissRate::total {}\n",
                core, rate
            ));
        }
        stats.push_str("---------- End Simulation Statistics   ----------\n");
        fs::write(request.out_dir.join("stats.txt"), stats).map_err(|e| BatchError::Io {
            path: request.out_dir.display().to_string(),
            source: e,
        })
    }
}

fn manifest(out_dir: &Path) -> String {
    format!(
        r#"
batch_id: hybrid_smoke
batch_version: 1
out_dir: {}
template:
  replacement_policy: LRURP
  prefetcher_type: [Tagged, Stride]
  l1_cache_sample_seed: 1
  l2_cache_sample_seed: 4
  l3_cache_sample_seed: 4
  big_core_width: 10
  big_core_rob_size: 40
  big_core_num_int_regs: 50
  big_core_num_fp_regs: 50
  small_core_width: 2
  small_core_rob_size: 30
  small_core_num_int_regs: 40
  small_core_num_fp_regs: 40
  big_core_num: [0, 1, 2]
  small_core_num: 1
  matsize: 256
simulator:
  program: gem5.opt
  args: ["--outdir={{outdir}}", "executor.py", "--param_file={{param_file}}", "--target_index={{index}}"]
workload: workload/matmul/mm-ijk-gem5
role_split: big_core_num
"#,
        out_dir.display()
    )
}

#[test]
fn test_batch_end_to_end() {
    let temp = tempdir().unwrap();
    let spec = BatchSpec::from_yaml_str(&manifest(temp.path())).unwrap();
    let outcome = run_batch(&spec, &mut StandInSimulator, false).unwrap();
    assert_eq!(outcome.total, 6);
    assert_eq!(outcome.completed, 6);

    let batch_dir = temp.path().join("hybrid_smoke");
    let rows = read_results(batch_dir.join(RESULTS_FILE_NAME)).unwrap();
    assert_eq!(
        rows.iter().map(|(i, _)| *i).collect::<Vec<_>>(),
        (0..6).collect::<Vec<_>>()
    );

    // index 0: Tagged, big_core_num = 0 -> only little cores
    let (_, r0) = &rows[0];
    assert_eq!(r0.get("simSeconds"), Some(256.0));
    assert_eq!(r0.get("avg_big_l1d_missrate"), Some(0.0));
    assert_eq!(r0.get("avg_little_l1d_missrate"), Some(0.75));

    // index 2: Tagged, big_core_num = 2 -> both roles populated
    let (_, r2) = &rows[2];
    assert_eq!(r2.get("avg_big_l1d_missrate"), Some(0.25));
    assert_eq!(r2.get("avg_little_l1d_missrate"), Some(0.75));

    let fingerprint = fs::read_to_string(batch_dir.join(FINGERPRINT_FILE_NAME)).unwrap();
    assert!(fingerprint.ends_with("  experiment_metaparams.csv\n"));
    assert!(batch_dir.join("raw").join("5").join("stats.txt").exists());
}

#[test]
fn test_missing_report_is_a_run_failure() {
    struct Silent;
    impl SimulationLauncher for Silent {
        fn launch(&mut self, _request: &RunRequest<'_>) -> Result<(), BatchError> {
            Ok(())
        }
    }

    let temp = tempdir().unwrap();
    let spec = BatchSpec::from_yaml_str(&manifest(temp.path())).unwrap();
    assert!(matches!(
        run_batch(&spec, &mut Silent, false),
        Err(BatchError::RunFailed { index: 0, .. })
    ));
}

#[test]
fn test_manifest_file_not_found() {
    let temp = tempdir().unwrap();
    assert!(matches!(
        BatchSpec::from_yaml_file(temp.path().join("missing.yaml")),
        Err(BatchError::ManifestIo { .. })
    ));
}
