//! Configuration module
//!
//! Two JSON inputs drive a run:
//!
//! - `resources.json`: cluster inventory, every node with its disks and
//!   network interfaces
//! - `metrics.json`: the benchmark axes per domain (storage, cpu, network)
//!
//! [`node_plan`] slices both down to the node this pod runs on: the node's
//! devices, its peers (all other nodes), and the axis declarations. Any
//! problem here is fatal at startup, before a single device is touched.

pub mod cli;
pub mod validator;

use crate::device::DeviceSpec;
use crate::Result;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Cluster inventory (`resources.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourcesConfig {
    pub nodes: Vec<NodeResources>,
}

/// One node's benchmarkable hardware.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeResources {
    pub node_name: String,
    /// Disk identifiers (`nbd0`) or device paths (`/dev/nbd0`).
    #[serde(default)]
    pub disks: Vec<String>,
    #[serde(default)]
    pub network_interfaces: Vec<String>,
}

/// Benchmark axis declarations (`metrics.json`). A missing domain means
/// that domain is skipped for the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub storage: Option<StorageAxes>,
    #[serde(default)]
    pub cpu: Option<CpuAxes>,
    #[serde(default)]
    pub network: Option<NetworkAxes>,
}

/// Storage matrix axes. The Cartesian product of all four is the set of
/// sysbench fileio invocations per device; any empty axis empties the
/// product (documented edge case, not an error).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageAxes {
    pub blocksizes: Vec<String>,
    pub workloads: Vec<String>,
    pub threads: Vec<u32>,
    /// Extra sysbench flag sets, e.g. `[{"file-extra-flags": "dsync"}]`.
    /// Each map is one point on the axis.
    #[serde(default)]
    pub flags: Vec<BTreeMap<String, String>>,
}

/// CPU axes: each parameter set expands to `threads × cpu-max-prime`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CpuAxes {
    pub parameters: Vec<CpuParameterSet>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CpuParameterSet {
    #[serde(default)]
    pub threads: Vec<u32>,
    #[serde(rename = "cpu-max-prime", default = "default_cpu_max_prime")]
    pub cpu_max_prime: Vec<u64>,
}

fn default_cpu_max_prime() -> Vec<u64> {
    vec![10000]
}

/// Network axes; peers come from the inventory, not from here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkAxes {
    #[serde(default)]
    pub threads: Vec<u32>,
    pub workloads: Vec<String>,
}

/// Load and parse `resources.json`.
pub fn load_resources(path: &Path) -> Result<ResourcesConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("malformed JSON in {}", path.display()))
}

/// Load and parse `metrics.json`.
pub fn load_metrics(path: &Path) -> Result<MetricsConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("malformed JSON in {}", path.display()))
}

/// Everything one node needs for its run: devices, network layout, and the
/// axes to expand.
#[derive(Debug, Clone)]
pub struct NodePlan {
    pub node_name: String,
    pub devices: Vec<DeviceSpec>,
    pub interfaces: Vec<String>,
    /// All other node names in the inventory, in declaration order.
    pub peers: Vec<String>,
    pub storage: Option<StorageAxes>,
    pub cpu: Option<CpuAxes>,
    pub network: Option<NetworkAxes>,
}

/// Derive the per-node plan. Fails when `node_name` is not in the
/// inventory, which is a configuration error, fatal at startup.
pub fn node_plan(
    metrics: &MetricsConfig,
    resources: &ResourcesConfig,
    node_name: &str,
) -> Result<NodePlan> {
    let node = resources
        .nodes
        .iter()
        .find(|n| n.node_name == node_name)
        .with_context(|| format!("node '{node_name}' not found in resources config"))?;

    let devices = node
        .disks
        .iter()
        .map(|disk| DeviceSpec::new(disk, node_name))
        .collect();
    let peers = resources
        .nodes
        .iter()
        .filter(|n| n.node_name != node_name)
        .map(|n| n.node_name.clone())
        .collect();

    Ok(NodePlan {
        node_name: node_name.to_string(),
        devices,
        interfaces: node.network_interfaces.clone(),
        peers,
        storage: metrics.storage.clone(),
        cpu: metrics.cpu.clone(),
        network: metrics.network.clone(),
    })
}
