//! Network benchmark driver
//!
//! Measures per-interface bandwidth with `iperf3` and round-trip latency
//! with `ping`, against every configured peer node. Bandwidth runs expand
//! over the thread axis (`-P` parallel streams); latency runs are one
//! invocation per peer. A short pause separates consecutive invocations so
//! one measurement's tail traffic does not bleed into the next.

use super::{Domain, MetricRecord, RunResults};
use crate::config::NetworkAxes;
use crate::error::{error_marker, BenchError};
use crate::host::{CommandSpec, Execution, Host};
use crate::Result;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info, warn};

const IPERF_DURATION_SECS: u32 = 10;
const PING_COUNT: u32 = 10;

pub struct NetworkBenchmark<'a, H: Host> {
    host: &'a H,
    node: String,
    timeout: Duration,
    /// Settle time between consecutive invocations.
    pause: Duration,
}

impl<'a, H: Host> NetworkBenchmark<'a, H> {
    pub fn new(
        host: &'a H,
        node: impl Into<String>,
        timeout: Duration,
        pause: Duration,
    ) -> Self {
        Self {
            host,
            node: node.into(),
            timeout,
            pause,
        }
    }

    pub fn run(
        &self,
        axes: &NetworkAxes,
        interfaces: &[String],
        peers: &[String],
        results: &mut RunResults,
    ) {
        info!(interfaces = interfaces.len(), peers = peers.len(), "running network benchmarks");
        let mut first = true;
        for interface in interfaces {
            for peer in peers {
                for workload in &axes.workloads {
                    match workload.as_str() {
                        "iperf" => {
                            for &threads in &axes.threads {
                                self.settle(&mut first);
                                results.push(self.run_iperf(interface, peer, threads));
                            }
                        }
                        "ping" => {
                            self.settle(&mut first);
                            results.push(self.run_ping(interface, peer));
                        }
                        other => {
                            // The validator rejects unknown workloads up front.
                            warn!(workload = other, "skipping unknown network workload");
                        }
                    }
                }
            }
        }
    }

    fn settle(&self, first: &mut bool) {
        if *first {
            *first = false;
        } else if !self.pause.is_zero() {
            std::thread::sleep(self.pause);
        }
    }

    fn run_iperf(&self, interface: &str, peer: &str, threads: u32) -> MetricRecord {
        let mut record = self.record(interface, peer, "iperf");
        record.threads = Some(threads);
        let cmd = CommandSpec::new("iperf3")
            .args(["-c", peer])
            .args(["--bind-dev", interface])
            .arg("-P")
            .arg(threads.to_string())
            .arg("-t")
            .arg(IPERF_DURATION_SECS.to_string());
        debug!(interface, peer, threads, "running iperf3");
        match self.checked(&cmd).and_then(|raw| parse_iperf(&raw)) {
            Ok(metrics) => record.metrics = metrics,
            Err(e) => {
                warn!(interface, peer, error = %format!("{e:#}"), "iperf3 failed");
                record.error = Some(error_marker(&e));
            }
        }
        record
    }

    fn run_ping(&self, interface: &str, peer: &str) -> MetricRecord {
        let mut record = self.record(interface, peer, "ping");
        let cmd = CommandSpec::new("ping")
            .arg("-c")
            .arg(PING_COUNT.to_string())
            .args(["-I", interface])
            .arg(peer);
        debug!(interface, peer, "running ping");
        match self.checked(&cmd).and_then(|raw| parse_ping(&raw)) {
            Ok(metrics) => record.metrics = metrics,
            Err(e) => {
                warn!(interface, peer, error = %format!("{e:#}"), "ping failed");
                record.error = Some(error_marker(&e));
            }
        }
        record
    }

    fn record(&self, interface: &str, peer: &str, workload: &str) -> MetricRecord {
        let mut record = MetricRecord::new(&self.node, Domain::Network);
        record.interface = Some(interface.to_string());
        record.peer = Some(peer.to_string());
        record.workload = Some(workload.to_string());
        record
    }

    fn checked(&self, cmd: &CommandSpec) -> Result<String> {
        match self.host.run_with_timeout(cmd, self.timeout)? {
            Execution::TimedOut => Err(BenchError::Timeout {
                command: cmd.to_string(),
                timeout: self.timeout,
            }
            .into()),
            Execution::Completed(output) => {
                if output.success() {
                    Ok(output.stdout)
                } else {
                    Err(BenchError::Execution {
                        command: cmd.to_string(),
                        status: output.status.unwrap_or(-1),
                        stdout: output.stdout,
                        stderr: output.stderr,
                    }
                    .into())
                }
            }
        }
    }
}

/// Extract `bandwidth_mbits` from iperf3 text output. The last matching
/// rate line is the end-of-run receiver summary; with multiple streams
/// that is the `[SUM]` line.
fn parse_iperf(output: &str) -> Result<BTreeMap<String, f64>> {
    static RATE: OnceLock<Regex> = OnceLock::new();
    let rate = RATE.get_or_init(|| {
        Regex::new(r"([\d.]+)\s+([MG])bits/sec").expect("rate pattern is valid")
    });

    let last = rate.captures_iter(output).last().ok_or_else(|| BenchError::Parse {
        reason: "no bitrate found in iperf3 output".to_string(),
    })?;
    let value: f64 = last[1].parse().map_err(|_| BenchError::Parse {
        reason: format!("unreadable bitrate: {}", &last[1]),
    })?;
    let mbits = match &last[2] {
        "G" => value * 1000.0,
        _ => value,
    };

    let mut metrics = BTreeMap::new();
    metrics.insert("bandwidth_mbits".to_string(), mbits);
    Ok(metrics)
}

/// Extract round-trip statistics from ping output: the mean of all
/// per-packet times and their 95th percentile.
fn parse_ping(output: &str) -> Result<BTreeMap<String, f64>> {
    static TIME: OnceLock<Regex> = OnceLock::new();
    let time = TIME.get_or_init(|| {
        Regex::new(r"time=([\d.]+) ms").expect("time pattern is valid")
    });

    let mut samples: Vec<f64> = time
        .captures_iter(output)
        .filter_map(|c| c[1].parse().ok())
        .collect();
    if samples.is_empty() {
        return Err(BenchError::Parse {
            reason: "no round-trip times found in ping output".to_string(),
        }
        .into());
    }

    let avg = samples.iter().sum::<f64>() / samples.len() as f64;
    samples.sort_by(|a, b| a.partial_cmp(b).expect("rtt samples are finite"));
    let rank = ((samples.len() as f64) * 0.95).ceil() as usize;
    let p95 = samples[rank.saturating_sub(1)];

    let mut metrics = BTreeMap::new();
    metrics.insert("latency_avg_ms".to_string(), avg);
    metrics.insert("latency_ms_95th".to_string(), p95);
    Ok(metrics)
}
