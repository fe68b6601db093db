//! Configuration validation
//!
//! Startup-fatal checks: a run never touches a device with a configuration
//! that cannot be executed. Empty axes are deliberately allowed; they
//! yield an empty matrix, not an error.

use super::*;
use anyhow::Result;

/// sysbench fileio test modes.
const FILEIO_WORKLOADS: &[&str] = &["seqwr", "seqrewr", "seqrd", "rndrd", "rndwr", "rndrw"];

/// Network workloads this driver knows how to run and parse.
const NETWORK_WORKLOADS: &[&str] = &["iperf", "ping"];

/// Validate the cluster inventory.
pub fn validate_resources(resources: &ResourcesConfig) -> Result<()> {
    if resources.nodes.is_empty() {
        anyhow::bail!("resources config declares no nodes");
    }
    let mut seen = std::collections::HashSet::new();
    for node in &resources.nodes {
        if node.node_name.is_empty() {
            anyhow::bail!("resources config contains a node with an empty node_name");
        }
        if !seen.insert(&node.node_name) {
            anyhow::bail!("duplicate node_name '{}' in resources config", node.node_name);
        }
        for disk in &node.disks {
            if disk.is_empty() {
                anyhow::bail!("node '{}' declares an empty disk entry", node.node_name);
            }
        }
    }
    Ok(())
}

/// Validate the benchmark axes.
pub fn validate_metrics(metrics: &MetricsConfig) -> Result<()> {
    if let Some(ref storage) = metrics.storage {
        validate_storage_axes(storage)?;
    }
    if let Some(ref cpu) = metrics.cpu {
        validate_cpu_axes(cpu)?;
    }
    if let Some(ref network) = metrics.network {
        validate_network_axes(network)?;
    }
    Ok(())
}

fn validate_storage_axes(storage: &StorageAxes) -> Result<()> {
    for workload in &storage.workloads {
        if !FILEIO_WORKLOADS.contains(&workload.as_str()) {
            anyhow::bail!(
                "unknown storage workload '{}', expected one of {:?}",
                workload,
                FILEIO_WORKLOADS
            );
        }
    }
    for blocksize in &storage.blocksizes {
        if blocksize.is_empty() {
            anyhow::bail!("storage blocksizes contains an empty entry");
        }
    }
    for &threads in &storage.threads {
        if threads == 0 {
            anyhow::bail!("storage threads must be positive, got 0");
        }
    }
    Ok(())
}

fn validate_cpu_axes(cpu: &CpuAxes) -> Result<()> {
    for (i, set) in cpu.parameters.iter().enumerate() {
        for &threads in &set.threads {
            if threads == 0 {
                anyhow::bail!("cpu parameter set {i}: threads must be positive, got 0");
            }
        }
        for &prime in &set.cpu_max_prime {
            if prime == 0 {
                anyhow::bail!("cpu parameter set {i}: cpu-max-prime must be positive, got 0");
            }
        }
    }
    Ok(())
}

fn validate_network_axes(network: &NetworkAxes) -> Result<()> {
    for workload in &network.workloads {
        if !NETWORK_WORKLOADS.contains(&workload.as_str()) {
            anyhow::bail!(
                "unknown network workload '{}', expected one of {:?}",
                workload,
                NETWORK_WORKLOADS
            );
        }
    }
    for &threads in &network.threads {
        if threads == 0 {
            anyhow::bail!("network threads must be positive, got 0");
        }
    }
    Ok(())
}
