// tests/hybrid_resolve_tests.rs
//
// Executor contract: param file + target index -> hybrid experiment JSON.

use sweeplab::sweep::{expand, read_configuration_file, write_configuration_file};
use sweeplab::{ConfigurationTemplate, HybridExperiment, SweepError};
use tempfile::tempdir;

fn template() -> ConfigurationTemplate {
    let yaml = r#"
replacement_policy: [LRURP, SecondChanceRP]
prefetcher_type: ISB
l1_cache_sample_seed: [1, 2]
l2_cache_sample_seed: 2
l3_cache_sample_seed: 1
big_core_width: 8
big_core_rob_size: 128
big_core_num_int_regs: 128
big_core_num_fp_regs: 96
small_core_width: 2
small_core_rob_size: 32
small_core_num_int_regs: 48
small_core_num_fp_regs: 48
big_core_num: 2
small_core_num: 2
matsize: 128
"#;
    ConfigurationTemplate::from_yaml_str("hybrid", yaml).unwrap()
}

#[test]
fn test_resolve_through_param_file() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("experiment_metaparams.csv");
    write_configuration_file(&path, &expand(&template()).unwrap()).unwrap();

    // index 3: SecondChanceRP, l1 seed 2
    let config = read_configuration_file(&path, 3).unwrap();
    let experiment = HybridExperiment::from_configuration(&config).unwrap();
    assert_eq!(experiment.experiment_index, 3);
    assert_eq!(experiment.caches.big_core_caches.l1i.size, "4kB");
    assert_eq!(experiment.caches.little_core_caches.l1d.size, "2kB");
    assert_eq!(experiment.caches.l3.size, "64kB");
    assert_eq!(experiment.processor.big_core.rob_size, 128);
    assert_eq!(experiment.processor.little_core.core_type_id, 1);
    assert_eq!(experiment.role_policy().threshold, 2);

    let json = serde_json::to_value(&experiment).unwrap();
    assert_eq!(
        json["caches"]["big_core_caches"]["l2"]["replacement_policy"],
        "SecondChanceRP"
    );
    assert_eq!(json["caches"]["l3"]["prefetcher"]["kind"], "ISB");
    assert_eq!(json["caches"]["l3"]["prefetcher"]["degree"], 4);
}

#[test]
fn test_process_list_big_cores_first() {
    let config = expand(&template()).unwrap().remove(0);
    let experiment = HybridExperiment::from_configuration(&config).unwrap();
    let procs = experiment.workload_processes("mm");
    assert_eq!(procs.len(), 4);
    assert_eq!(
        procs.iter().map(|p| p.pid).collect::<Vec<_>>(),
        vec![1000, 1001, 1002, 1003]
    );
    assert!(procs.iter().all(|p| p.cmd == vec!["mm", "128"]));
}

#[test]
fn test_missing_field_is_configuration_error() {
    let partial = ConfigurationTemplate::new("partial")
        .fixed("replacement_policy", "LRURP")
        .fixed("prefetcher_type", "Tagged");
    let config = expand(&partial).unwrap().remove(0);
    assert!(matches!(
        HybridExperiment::from_configuration(&config),
        Err(SweepError::Configuration { .. })
    ));
}
