// src/hybrid.rs
//
// Hybrid big/little CPU experiment description derived from one concrete
// configuration.
//
// The sweep template carries compact "sample seeds" instead of cache sizes;
// this module turns them into per-level cache parameters, per-core-type
// pipeline parameters and the per-core workload processes. The result is
// serialized to JSON for the external simulator script.
//
// Cache scaling per seed s1/s2/s3:
//   big    L1I/L1D  2*s1 kB, assoc 8,  degree 2*s1
//   big    L2      16*s2 kB, assoc 16, degree 4*s2
//   little L1I/L1D    s1 kB, assoc 4,  degree s1
//   little L2       8*s2 kB, assoc 8,  degree 2*s2
//   shared L3      64*s3 kB, assoc 32, degree 4*s3

use serde::{Deserialize, Serialize};

use crate::error::SweepError;
use crate::report::RolePolicy;
use crate::sweep::ConcreteConfiguration;

/// Core type id of big cores.
pub const BIG_CORE_TYPE_ID: u32 = 0;
/// Core type id of little cores.
pub const LITTLE_CORE_TYPE_ID: u32 = 1;
/// First pid assigned to workload processes.
pub const BASE_PID: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplacementPolicy {
    #[serde(rename = "LRURP")]
    Lru,
    #[serde(rename = "LFURP")]
    Lfu,
    #[serde(rename = "SecondChanceRP")]
    SecondChance,
}

impl ReplacementPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "LRURP" => Some(ReplacementPolicy::Lru),
            "LFURP" => Some(ReplacementPolicy::Lfu),
            "SecondChanceRP" => Some(ReplacementPolicy::SecondChance),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrefetcherType {
    Tagged,
    Stride,
    /// Signature path prefetcher; ignores the degree.
    Signature,
    /// Irregular stream buffer.
    #[serde(rename = "ISB")]
    Isb,
}

impl PrefetcherType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Tagged" => Some(PrefetcherType::Tagged),
            "Stride" => Some(PrefetcherType::Stride),
            "Signature" => Some(PrefetcherType::Signature),
            "ISB" => Some(PrefetcherType::Isb),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefetcherConfig {
    pub kind: PrefetcherType,
    /// `None` for prefetchers without a degree parameter.
    pub degree: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheLevelConfig {
    /// Size string in simulator notation, e.g. "64kB".
    pub size: String,
    pub assoc: u32,
    pub replacement_policy: ReplacementPolicy,
    pub prefetcher: PrefetcherConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreCacheConfig {
    pub l1d: CacheLevelConfig,
    pub l1i: CacheLevelConfig,
    pub l2: CacheLevelConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheHierarchyConfig {
    pub big_core_caches: CoreCacheConfig,
    pub big_core_type_id: u32,
    pub little_core_caches: CoreCacheConfig,
    pub little_core_type_id: u32,
    pub l3: CacheLevelConfig,
}

/// Out-of-order pipeline parameters for one core type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreConfig {
    pub width: u32,
    pub rob_size: u32,
    pub num_int_regs: u32,
    pub num_fp_regs: u32,
    pub core_type_id: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorConfig {
    pub big_core: CoreConfig,
    pub big_core_num: u32,
    pub little_core: CoreConfig,
    pub little_core_num: u32,
}

/// One workload process bound to one core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadProcess {
    pub core: u32,
    pub pid: u32,
    pub cmd: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HybridExperiment {
    pub experiment_index: usize,
    pub caches: CacheHierarchyConfig,
    pub processor: ProcessorConfig,
    pub mat_size: u32,
}

impl HybridExperiment {
    /// Derive the experiment from one row of the configuration table.
    pub fn from_configuration(config: &ConcreteConfiguration) -> Result<Self, SweepError> {
        let policy_name = config.get_text("replacement_policy")?;
        let replacement_policy = ReplacementPolicy::parse(policy_name).ok_or_else(|| {
            SweepError::config(
                "replacement_policy",
                format!("invalid replacement policy '{}'", policy_name),
            )
        })?;
        let prefetcher_name = config.get_text("prefetcher_type")?;
        let prefetcher = PrefetcherType::parse(prefetcher_name).ok_or_else(|| {
            SweepError::config(
                "prefetcher_type",
                format!("invalid prefetcher type '{}'", prefetcher_name),
            )
        })?;

        let s1 = positive(config, "l1_cache_sample_seed")?;
        let s2 = positive(config, "l2_cache_sample_seed")?;
        let s3 = positive(config, "l3_cache_sample_seed")?;

        let level = |kb: u32, assoc: u32, degree: u32| CacheLevelConfig {
            size: format!("{}kB", kb),
            assoc,
            replacement_policy,
            prefetcher: PrefetcherConfig {
                kind: prefetcher,
                degree: match prefetcher {
                    PrefetcherType::Signature => None,
                    _ => Some(degree),
                },
            },
        };

        let l1 = "l1_cache_sample_seed";
        let l2 = "l2_cache_sample_seed";
        let l3 = "l3_cache_sample_seed";
        let big_l1 = scaled(l1, s1, 2)?;
        let caches = CacheHierarchyConfig {
            big_core_caches: CoreCacheConfig {
                l1d: level(big_l1, 8, big_l1),
                l1i: level(big_l1, 8, big_l1),
                l2: level(scaled(l2, s2, 16)?, 16, scaled(l2, s2, 4)?),
            },
            big_core_type_id: BIG_CORE_TYPE_ID,
            little_core_caches: CoreCacheConfig {
                l1d: level(s1, 4, s1),
                l1i: level(s1, 4, s1),
                l2: level(scaled(l2, s2, 8)?, 8, scaled(l2, s2, 2)?),
            },
            little_core_type_id: LITTLE_CORE_TYPE_ID,
            l3: level(scaled(l3, s3, 64)?, 32, scaled(l3, s3, 4)?),
        };

        let core = |prefix: &str, core_type_id: u32| -> Result<CoreConfig, SweepError> {
            Ok(CoreConfig {
                width: positive(config, &format!("{}_width", prefix))?,
                rob_size: positive(config, &format!("{}_rob_size", prefix))?,
                num_int_regs: positive(config, &format!("{}_num_int_regs", prefix))?,
                num_fp_regs: positive(config, &format!("{}_num_fp_regs", prefix))?,
                core_type_id,
            })
        };

        let processor = ProcessorConfig {
            big_core: core("big_core", BIG_CORE_TYPE_ID)?,
            big_core_num: non_negative(config, "big_core_num")?,
            little_core: core("small_core", LITTLE_CORE_TYPE_ID)?,
            little_core_num: non_negative(config, "small_core_num")?,
        };
        let total = processor
            .big_core_num
            .checked_add(processor.little_core_num)
            .ok_or_else(|| SweepError::config("small_core_num", "core count overflows"))?;
        if total == 0 {
            return Err(SweepError::config(
                "big_core_num",
                "experiment needs at least one core",
            ));
        }
        if total > 10 {
            // Stats keys carry a single-digit cluster id.
            return Err(SweepError::config(
                "big_core_num",
                "more than 10 cores cannot be told apart in stats keys",
            ));
        }

        Ok(Self {
            experiment_index: config.experiment_index(),
            caches,
            processor,
            mat_size: positive(config, "matsize")?,
        })
    }

    pub fn total_cores(&self) -> u32 {
        self.processor
            .big_core_num
            .saturating_add(self.processor.little_core_num)
    }

    /// Big cores occupy the lowest cluster ids.
    pub fn role_policy(&self) -> RolePolicy {
        RolePolicy::new(self.processor.big_core_num)
    }

    /// Executor payload: the experiment plus its role policy and, when a
    /// workload is given, the per-core process list.
    pub fn to_json(&self, workload: Option<&str>) -> Result<serde_json::Value, serde_json::Error> {
        let mut json = serde_json::to_value(self)?;
        json["role_policy"] = serde_json::to_value(self.role_policy())?;
        if let Some(workload) = workload {
            json["processes"] = serde_json::to_value(self.workload_processes(workload))?;
        }
        Ok(json)
    }

    /// One process per core, big cores first, each running
    /// `<workload> <mat_size>`.
    pub fn workload_processes(&self, workload: &str) -> Vec<WorkloadProcess> {
        (0..self.total_cores())
            .map(|core| WorkloadProcess {
                core,
                pid: BASE_PID + core,
                cmd: vec![workload.to_string(), self.mat_size.to_string()],
            })
            .collect()
    }
}

/// `seed * factor`, or a configuration error on overflow.
fn scaled(name: &str, seed: u32, factor: u32) -> Result<u32, SweepError> {
    seed.checked_mul(factor)
        .ok_or_else(|| SweepError::config(name, format!("{} * {} overflows", seed, factor)))
}

fn non_negative(config: &ConcreteConfiguration, name: &str) -> Result<u32, SweepError> {
    let v = config.get_int(name)?;
    u32::try_from(v).map_err(|_| SweepError::config(name, format!("{} is out of range", v)))
}

fn positive(config: &ConcreteConfiguration, name: &str) -> Result<u32, SweepError> {
    let v = non_negative(config, name)?;
    if v == 0 {
        return Err(SweepError::config(name, "must be > 0"));
    }
    Ok(v)
}
