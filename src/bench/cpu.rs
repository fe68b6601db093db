//! CPU benchmark driver
//!
//! Runs `sysbench cpu` once per expanded parameter combination. There is
//! no device lifecycle here: every invocation is independent, so failures
//! only ever degrade their own record. When sysbench exits non-zero its
//! output is still fed to the parser; any metrics it managed to print are
//! kept on the record next to the error marker.

use super::parser;
use super::sysbench::SysbenchRunner;
use super::{Domain, MetricRecord, RunResults};
use crate::config::CpuAxes;
use crate::error::{error_marker, BenchError};
use crate::host::Host;
use crate::matrix::{self, CpuInvocation};
use std::time::Duration;
use tracing::{info, warn};

pub struct CpuBenchmark<'a, H: Host> {
    host: &'a H,
    node: String,
    timeout: Duration,
}

impl<'a, H: Host> CpuBenchmark<'a, H> {
    pub fn new(host: &'a H, node: impl Into<String>, timeout: Duration) -> Self {
        Self {
            host,
            node: node.into(),
            timeout,
        }
    }

    pub fn run(&self, axes: &CpuAxes, results: &mut RunResults) {
        let invocations = matrix::expand_cpu(axes);
        info!(invocations = invocations.len(), "running cpu benchmarks");
        let runner = SysbenchRunner::new(self.host, self.timeout);
        for invocation in &invocations {
            results.push(self.run_invocation(&runner, invocation));
        }
    }

    fn run_invocation(
        &self,
        runner: &SysbenchRunner<'a, H>,
        invocation: &CpuInvocation,
    ) -> MetricRecord {
        let mut record = MetricRecord::new(&self.node, Domain::Cpu);
        record.workload = Some("cpu".to_string());
        record.threads = Some(invocation.threads);
        record.flags = Some(format!("cpu-max-prime={}", invocation.cpu_max_prime));

        match runner.run_cpu(invocation) {
            Ok(raw) => match parser::parse(&raw) {
                Ok(metrics) => record.metrics = metrics,
                Err(e) => record.error = Some(error_marker(&e)),
            },
            Err(e) => {
                warn!(threads = invocation.threads,
                      cpu_max_prime = invocation.cpu_max_prime,
                      error = %format!("{e:#}"), "cpu invocation failed");
                record.error = Some(error_marker(&e));
                // Salvage whatever the tool printed before failing.
                if let Some(BenchError::Execution { stdout, stderr, .. }) =
                    BenchError::from_anyhow(&e)
                {
                    if let Ok(metrics) = parser::parse(&format!("{stdout}\n{stderr}")) {
                        record.metrics = metrics;
                    }
                }
            }
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::mock::{MockHost, MockOutcome};

    const TIMEOUT: Duration = Duration::from_secs(60);

    const CPU_OUTPUT: &str = "
    CPU speed:
        events per second: 853267.75

    General statistics:
        total time:                          10.0002s
        total number of events:              8537887
    ";

    fn axes(json: &str) -> CpuAxes {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_one_record_per_combination() {
        let host = MockHost::new();
        host.set_default("sysbench", MockOutcome::success(CPU_OUTPUT));
        let axes = axes(
            r#"{"parameters": [{"threads": [1, 4], "cpu-max-prime": [10000, 100000]}]}"#,
        );
        let mut results = RunResults::new();
        CpuBenchmark::new(&host, "worker-1", TIMEOUT).run(&axes, &mut results);

        assert_eq!(results.len(), 4);
        let record = &results.records()[0];
        assert_eq!(record.workload.as_deref(), Some("cpu"));
        assert_eq!(record.threads, Some(1));
        assert_eq!(record.flags.as_deref(), Some("cpu-max-prime=10000"));
        assert_eq!(record.metrics["events_per_second"], 853267.75);
        assert!(record.error.is_none());
    }

    #[test]
    fn test_failed_invocation_degrades_only_itself() {
        let host = MockHost::new();
        host.enqueue("sysbench", MockOutcome::success(CPU_OUTPUT));
        host.enqueue("sysbench", MockOutcome::Timeout);
        host.enqueue("sysbench", MockOutcome::success(CPU_OUTPUT));
        let axes = axes(r#"{"parameters": [{"threads": [1, 2, 4]}]}"#);
        let mut results = RunResults::new();
        CpuBenchmark::new(&host, "worker-1", TIMEOUT).run(&axes, &mut results);

        assert_eq!(results.len(), 3);
        assert_eq!(results.degraded(), 1);
        assert_eq!(results.records()[1].error.as_deref(), Some("timeout"));
        assert!(results.records()[2].error.is_none());
    }

    #[test]
    fn test_nonzero_exit_salvages_printed_metrics() {
        let host = MockHost::new();
        let mut outcome = MockOutcome::failure(1, "thread creation failed");
        if let MockOutcome::Output(ref mut output) = outcome {
            output.stdout = CPU_OUTPUT.to_string();
        }
        host.enqueue("sysbench", outcome);
        let axes = axes(r#"{"parameters": [{"threads": [512]}]}"#);
        let mut results = RunResults::new();
        CpuBenchmark::new(&host, "worker-1", TIMEOUT).run(&axes, &mut results);

        let record = &results.records()[0];
        assert_eq!(record.error.as_deref(), Some("exit status 1"));
        assert_eq!(record.metrics["events_per_second"], 853267.75);
    }

    #[test]
    fn test_empty_parameters_runs_nothing() {
        let host = MockHost::new();
        let axes = axes(r#"{"parameters": []}"#);
        let mut results = RunResults::new();
        CpuBenchmark::new(&host, "worker-1", TIMEOUT).run(&axes, &mut results);
        assert!(results.is_empty());
        assert_eq!(host.count("sysbench"), 0);
    }
}
