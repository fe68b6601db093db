//! NodePulse CLI entry point

use anyhow::Result;
use nodepulse::bench::cpu::CpuBenchmark;
use nodepulse::bench::network::NetworkBenchmark;
use nodepulse::bench::storage::StorageBenchmark;
use nodepulse::bench::RunResults;
use nodepulse::config::{self, cli::Cli, validator, NodePlan};
use nodepulse::device::MountManager;
use nodepulse::host::SystemHost;
use nodepulse::output::CsvWriter;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Cli::parse_args();
    init_logging(cli.verbose);
    run(&cli)
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    // RUST_LOG wins over -v when set.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn run(cli: &Cli) -> Result<()> {
    // Configuration problems are the only fatal errors: once benchmarks
    // start, failures degrade records instead of aborting the run.
    let resources = config::load_resources(&cli.resources)?;
    validator::validate_resources(&resources)?;
    let metrics = config::load_metrics(&cli.metrics)?;
    validator::validate_metrics(&metrics)?;

    let node_name = cli.resolve_node_name()?;
    let plan = config::node_plan(&metrics, &resources, &node_name)?;
    info!(node = %plan.node_name, devices = plan.devices.len(),
          interfaces = plan.interfaces.len(), peers = plan.peers.len(),
          "configuration loaded");

    if cli.dry_run {
        print_plan(&plan);
        return Ok(());
    }

    let host = SystemHost::new();
    let timeout = Duration::from_secs(cli.timeout_secs);
    let mut results = RunResults::new();

    if let Some(ref storage) = plan.storage {
        let mounter = MountManager::new(&host, &cli.benchmark_root);
        let mut bench =
            StorageBenchmark::new(&host, mounter, storage, plan.node_name.as_str(), timeout);
        for (device, state) in bench.run(&plan.devices, &mut results) {
            info!(device = %device, state = %state, "storage device finished");
        }
    }

    if let Some(ref cpu) = plan.cpu {
        CpuBenchmark::new(&host, plan.node_name.as_str(), timeout).run(cpu, &mut results);
    }

    if let Some(ref network) = plan.network {
        let pause = Duration::from_secs(cli.network_pause_secs);
        NetworkBenchmark::new(&host, plan.node_name.as_str(), timeout, pause).run(
            network,
            &plan.interfaces,
            &plan.peers,
            &mut results,
        );
    }

    let mut writer = CsvWriter::create(&cli.output)?;
    writer.write_results(&results)?;
    info!(output = %cli.output.display(), rows = results.len(),
          degraded = results.degraded(), "run complete");
    Ok(())
}

fn print_plan(plan: &NodePlan) {
    println!("nodepulse v{} dry run", env!("CARGO_PKG_VERSION"));
    println!("node: {}", plan.node_name);
    println!(
        "devices: {}",
        plan.devices
            .iter()
            .map(|d| d.id.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("interfaces: {}", plan.interfaces.join(", "));
    println!("peers: {}", plan.peers.join(", "));
    if let Some(ref storage) = plan.storage {
        let per_device = plan
            .devices
            .first()
            .map(|d| {
                nodepulse::matrix::expand_storage(storage, &d.id, std::path::Path::new("/")).len()
            })
            .unwrap_or(0);
        println!("storage: {per_device} invocations per device");
    }
    if let Some(ref cpu) = plan.cpu {
        println!("cpu: {} invocations", nodepulse::matrix::expand_cpu(cpu).len());
    }
    if let Some(ref network) = plan.network {
        println!(
            "network: workloads [{}] against {} peer(s)",
            network.workloads.join(", "),
            plan.peers.len()
        );
    }
    println!("configuration validated");
}
