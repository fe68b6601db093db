//! Workload matrix expansion
//!
//! Pure functions from declared benchmark axes to ordered invocation lists.
//! Ordering is fixed by axis declaration order (blocksize outer, then
//! workload, then thread count, then flag set) so identical configuration
//! always produces identically ordered results. That determinism is what
//! makes result files diffable across runs and test fixtures reproducible.
//!
//! Expansion is a full Cartesian product; an empty axis yields an empty
//! product, which is a documented edge case, not an error.

use crate::config::{CpuAxes, StorageAxes};
use std::path::{Path, PathBuf};

/// One concrete storage benchmark invocation. Produced by expansion,
/// consumed once by the runner, immutable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadSpec {
    /// Device identifier, e.g. `nbd0`.
    pub device: String,
    /// Mounted path the benchmark runs against.
    pub mount_path: PathBuf,
    pub blocksize: String,
    /// sysbench fileio test mode, e.g. `seqwr`.
    pub workload: String,
    pub threads: u32,
    /// Extra sysbench flags, key-sorted within the set.
    pub flags: Vec<(String, String)>,
}

impl WorkloadSpec {
    /// Flags rendered for the results file: `key=value` pairs joined with
    /// a space, empty set as the empty string.
    pub fn flags_label(&self) -> String {
        self.flags
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Expand the storage axes for one mounted device.
pub fn expand_storage(axes: &StorageAxes, device: &str, mount_path: &Path) -> Vec<WorkloadSpec> {
    let mut specs = Vec::new();
    // Flag sets default to a single empty set so the other axes still
    // expand when no flags are declared.
    let flag_sets: Vec<Vec<(String, String)>> = if axes.flags.is_empty() {
        vec![Vec::new()]
    } else {
        axes.flags
            .iter()
            .map(|set| set.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .collect()
    };

    for blocksize in &axes.blocksizes {
        for workload in &axes.workloads {
            for &threads in &axes.threads {
                for flags in &flag_sets {
                    specs.push(WorkloadSpec {
                        device: device.to_string(),
                        mount_path: mount_path.to_path_buf(),
                        blocksize: blocksize.clone(),
                        workload: workload.clone(),
                        threads,
                        flags: flags.clone(),
                    });
                }
            }
        }
    }
    specs
}

/// One concrete sysbench cpu invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuInvocation {
    pub threads: u32,
    pub cpu_max_prime: u64,
}

/// Expand the CPU parameter sets: per set, `threads × cpu-max-prime` in
/// declaration order.
pub fn expand_cpu(axes: &CpuAxes) -> Vec<CpuInvocation> {
    let mut invocations = Vec::new();
    for set in &axes.parameters {
        for &threads in &set.threads {
            for &cpu_max_prime in &set.cpu_max_prime {
                invocations.push(CpuInvocation {
                    threads,
                    cpu_max_prime,
                });
            }
        }
    }
    invocations
}
