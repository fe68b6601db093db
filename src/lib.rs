//! NodePulse - Node-level performance probing for Kubernetes clusters
//!
//! NodePulse runs storage, CPU, and network benchmarks on the node it is
//! scheduled on and appends structured metrics to a CSV file. It is designed
//! to run as a privileged pod with raw block devices handed to it through
//! configuration.
//!
//! # Architecture
//!
//! - **Host boundary** ([`host`]): every subprocess call and mount-namespace
//!   mutation goes through the `Host` trait, so everything above it can be
//!   tested against a scripted mock
//! - **Device lifecycle** ([`device`]): probe → provision (mkfs.ext4) →
//!   mount → release, idempotent in both directions
//! - **Workload matrix** ([`matrix`]): deterministic Cartesian expansion of
//!   the declared benchmark axes
//! - **Benchmark drivers** ([`bench`]): sysbench fileio per mounted device,
//!   sysbench cpu, iperf3/ping network probes
//! - **Results** ([`output`]): append-only CSV with explicit sentinels for
//!   unavailable metrics

pub mod bench;
pub mod config;
pub mod device;
pub mod error;
pub mod host;
pub mod matrix;
pub mod output;

// Re-export commonly used types
pub use config::{MetricsConfig, NodePlan, ResourcesConfig};
pub use error::BenchError;

/// Result type used throughout NodePulse
pub type Result<T> = anyhow::Result<T>;
