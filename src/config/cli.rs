//! CLI argument parsing using clap

use clap::Parser;
use std::path::PathBuf;

/// NodePulse - node-level performance probing for Kubernetes clusters
#[derive(Parser, Debug)]
#[command(name = "nodepulse")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the cluster inventory (resources.json)
    #[arg(long, value_name = "FILE")]
    pub resources: PathBuf,

    /// Path to the benchmark axis declarations (metrics.json)
    #[arg(long, value_name = "FILE", default_value = "metrics.json")]
    pub metrics: PathBuf,

    /// Results file, one CSV row per benchmark invocation
    #[arg(short = 'o', long, value_name = "FILE", default_value = "results.csv")]
    pub output: PathBuf,

    /// Name of the node this pod runs on (set by the DaemonSet downward API)
    #[arg(long, env = "NODE_NAME")]
    pub node_name: Option<String>,

    /// Root directory for per-device benchmark mount points
    #[arg(long, value_name = "DIR", default_value = "/mnt/benchmark")]
    pub benchmark_root: PathBuf,

    /// Wall-clock budget per benchmark invocation, in seconds
    #[arg(long, default_value = "600")]
    pub timeout_secs: u64,

    /// Pause between network tests, in seconds (avoids overloading links)
    #[arg(long, default_value = "5")]
    pub network_pause_secs: u64,

    /// Validate configuration and print the plan without running anything
    #[arg(long)]
    pub dry_run: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Node identity: explicit flag / NODE_NAME env, falling back to the
    /// machine hostname.
    pub fn resolve_node_name(&self) -> crate::Result<String> {
        if let Some(ref name) = self.node_name {
            if !name.is_empty() {
                return Ok(name.clone());
            }
        }
        let host =
            hostname::get().map_err(|e| anyhow::anyhow!("could not determine hostname: {e}"))?;
        Ok(host.to_string_lossy().into_owned())
    }
}
