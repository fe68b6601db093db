//! Storage benchmark orchestrator
//!
//! Drives one device at a time through its lifecycle:
//!
//! ```text
//! Pending → Provisioning → Mounted → Running → Collected → Cleaned
//!                └──────────── any non-terminal ────────────→ Errored
//! ```
//!
//! Two isolation guarantees hold everywhere:
//!
//! - invocation-level failures (timeout, non-zero exit, unparseable
//!   output) become degraded records and the matrix continues
//! - device-level failures (missing device, mount or provision failure)
//!   become an error-marker record for that device, cleanup still runs,
//!   and the remaining devices are processed normally
//!
//! `release` is invoked exactly once per device, on every path. Devices
//! are strictly sequential: concurrent benchmarking would contend for
//! I/O bandwidth and invalidate the per-device throughput numbers.

use super::parser;
use super::sysbench::SysbenchRunner;
use super::{Domain, MetricRecord, RunResults};
use crate::config::StorageAxes;
use crate::device::{DeviceSpec, Mounter};
use crate::error::error_marker;
use crate::host::Host;
use crate::matrix::{self, WorkloadSpec};
use crate::Result;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Lifecycle state of one device's benchmark run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceRunState {
    Pending,
    Provisioning,
    Mounted,
    Running,
    Collected,
    Cleaned,
    Errored,
}

impl fmt::Display for DeviceRunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceRunState::Pending => "pending",
            DeviceRunState::Provisioning => "provisioning",
            DeviceRunState::Mounted => "mounted",
            DeviceRunState::Running => "running",
            DeviceRunState::Collected => "collected",
            DeviceRunState::Cleaned => "cleaned",
            DeviceRunState::Errored => "errored",
        };
        write!(f, "{name}")
    }
}

pub struct StorageBenchmark<'a, H: Host, M: Mounter> {
    host: &'a H,
    mounter: M,
    axes: &'a StorageAxes,
    node: String,
    timeout: Duration,
}

impl<'a, H: Host, M: Mounter> StorageBenchmark<'a, H, M> {
    pub fn new(
        host: &'a H,
        mounter: M,
        axes: &'a StorageAxes,
        node: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            host,
            mounter,
            axes,
            node: node.into(),
            timeout,
        }
    }

    /// Process every device sequentially. Returns the terminal state per
    /// device; all metric rows land in `results`.
    pub fn run(
        &mut self,
        devices: &[DeviceSpec],
        results: &mut RunResults,
    ) -> Vec<(String, DeviceRunState)> {
        devices
            .iter()
            .map(|device| (device.id.clone(), self.run_device(device, results)))
            .collect()
    }

    /// One device, start to terminal state. `release` runs on every path.
    fn run_device(&mut self, device: &DeviceSpec, results: &mut RunResults) -> DeviceRunState {
        let mut state = DeviceRunState::Pending;
        let outcome = self.drive(device, results, &mut state);

        // Unconditional cleanup, also on the error path.
        self.mounter.release(device);

        match outcome {
            Ok(()) => {
                transition(&device.id, &mut state, DeviceRunState::Cleaned);
                state
            }
            Err(e) => {
                warn!(device = %device.id, error = %format!("{e:#}"),
                      "device benchmark failed");
                results.push(self.device_error_record(device, &e));
                transition(&device.id, &mut state, DeviceRunState::Errored);
                state
            }
        }
    }

    /// The happy path: Pending through Collected. Any error here sends the
    /// device to Errored in `run_device`.
    fn drive(
        &mut self,
        device: &DeviceSpec,
        results: &mut RunResults,
        state: &mut DeviceRunState,
    ) -> Result<()> {
        transition(&device.id, state, DeviceRunState::Provisioning);
        let mount_point = self.mounter.ensure_mounted(device)?;
        transition(&device.id, state, DeviceRunState::Mounted);

        let specs = matrix::expand_storage(self.axes, &device.id, &mount_point);
        if specs.is_empty() {
            debug!(device = %device.id, "workload matrix is empty, nothing to run");
        }

        transition(&device.id, state, DeviceRunState::Running);
        let runner = SysbenchRunner::new(self.host, self.timeout);
        for spec in &specs {
            results.push(self.run_workload(&runner, spec));
        }

        transition(&device.id, state, DeviceRunState::Collected);
        info!(device = %device.id, invocations = specs.len(), "matrix exhausted");
        Ok(())
    }

    /// One invocation → one record, degraded on failure. Never escalates.
    fn run_workload(&self, runner: &SysbenchRunner<'a, H>, spec: &WorkloadSpec) -> MetricRecord {
        let mut record = MetricRecord::new(&self.node, Domain::Storage);
        record.device = Some(spec.device.clone());
        record.workload = Some(spec.workload.clone());
        record.blocksize = Some(spec.blocksize.clone());
        record.threads = Some(spec.threads);
        let label = spec.flags_label();
        if !label.is_empty() {
            record.flags = Some(label);
        }

        match runner.run_fileio(spec).and_then(|raw| parser::parse(&raw)) {
            Ok(metrics) => record.metrics = metrics,
            Err(e) => {
                warn!(device = %spec.device, workload = %spec.workload,
                      blocksize = %spec.blocksize, threads = spec.threads,
                      error = %format!("{e:#}"), "workload failed");
                record.error = Some(error_marker(&e));
            }
        }
        record
    }

    fn device_error_record(&self, device: &DeviceSpec, err: &anyhow::Error) -> MetricRecord {
        let mut record = MetricRecord::new(&self.node, Domain::Storage);
        record.device = Some(device.id.clone());
        record.error = Some(error_marker(err));
        record
    }
}

fn transition(device: &str, state: &mut DeviceRunState, next: DeviceRunState) {
    debug!(device, from = %state, to = %next, "device state");
    *state = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BenchError;
    use crate::host::mock::{MockHost, MockOutcome};
    use std::collections::HashSet;
    use std::path::PathBuf;

    const TIMEOUT: Duration = Duration::from_secs(60);

    const FILEIO_OUTPUT: &str = "
    File operations:
        reads/s:                      0.00
        writes/s:                     29718.09
        fsyncs/s:                     1191.86

    Throughput:
        read, MiB/s:                  0.00
        written, MiB/s:               116.09

    General statistics:
        total time:                          10.0009s
        total number of events:              309103

    Latency (ms):
         min:                                    0.00
         avg:                                    0.26
         max:                                    8.15
         95th percentile:                        0.00
         sum:                                79932.20
    ";

    /// Call-counting mounter; the spec's cleanup properties are asserted
    /// against these counts.
    #[derive(Default)]
    struct MockMounter {
        ensure_calls: Vec<String>,
        release_calls: Vec<String>,
        fail_devices: HashSet<String>,
    }

    impl MockMounter {
        fn failing(devices: &[&str]) -> Self {
            Self {
                fail_devices: devices.iter().map(|s| s.to_string()).collect(),
                ..Self::default()
            }
        }

        fn releases_for(&self, device: &str) -> usize {
            self.release_calls.iter().filter(|d| *d == device).count()
        }
    }

    impl Mounter for MockMounter {
        fn ensure_mounted(&mut self, device: &DeviceSpec) -> crate::Result<PathBuf> {
            self.ensure_calls.push(device.id.clone());
            if self.fail_devices.contains(&device.id) {
                return Err(BenchError::Mount {
                    device: device.id.clone(),
                    reason: "injected failure".to_string(),
                }
                .into());
            }
            Ok(PathBuf::from("/mnt/benchmark").join(&device.id))
        }

        fn release(&mut self, device: &DeviceSpec) {
            self.release_calls.push(device.id.clone());
        }
    }

    fn axes(json: &str) -> StorageAxes {
        serde_json::from_str(json).unwrap()
    }

    fn single_axes() -> StorageAxes {
        axes(r#"{"blocksizes": ["4k"], "workloads": ["seqwr"], "threads": [4], "flags": [{}]}"#)
    }

    fn devices(ids: &[&str]) -> Vec<DeviceSpec> {
        ids.iter().map(|id| DeviceSpec::new(id, "worker-1")).collect()
    }

    #[test]
    fn test_single_combination_produces_one_record() {
        let host = MockHost::new();
        host.set_default("sysbench", MockOutcome::success(FILEIO_OUTPUT));
        let axes = single_axes();
        let mut bench =
            StorageBenchmark::new(&host, MockMounter::default(), &axes, "worker-1", TIMEOUT);
        let mut results = RunResults::new();
        let states = bench.run(&devices(&["nbd0"]), &mut results);

        assert_eq!(states, vec![("nbd0".to_string(), DeviceRunState::Cleaned)]);
        assert_eq!(results.len(), 1);
        let record = &results.records()[0];
        assert_eq!(record.device.as_deref(), Some("nbd0"));
        assert_eq!(record.blocksize.as_deref(), Some("4k"));
        assert_eq!(record.workload.as_deref(), Some("seqwr"));
        assert_eq!(record.threads, Some(4));
        assert!(record.error.is_none());
        assert_eq!(record.metrics["throughput_mb_s"], 116.09);
        assert_eq!(record.metrics["iops"], 29718.09);
    }

    #[test]
    fn test_release_called_once_per_device_on_success() {
        let host = MockHost::new();
        host.set_default("sysbench", MockOutcome::success(FILEIO_OUTPUT));
        let axes = single_axes();
        let mut bench =
            StorageBenchmark::new(&host, MockMounter::default(), &axes, "worker-1", TIMEOUT);
        let mut results = RunResults::new();
        bench.run(&devices(&["nbd0", "nbd1"]), &mut results);
        assert_eq!(bench.mounter.releases_for("nbd0"), 1);
        assert_eq!(bench.mounter.releases_for("nbd1"), 1);
    }

    #[test]
    fn test_mount_failure_is_isolated() {
        let host = MockHost::new();
        host.set_default("sysbench", MockOutcome::success(FILEIO_OUTPUT));
        let axes = single_axes();
        let mut bench = StorageBenchmark::new(
            &host,
            MockMounter::failing(&["nbd1"]),
            &axes,
            "worker-1",
            TIMEOUT,
        );
        let mut results = RunResults::new();
        let states = bench.run(&devices(&["nbd0", "nbd1", "nbd2"]), &mut results);

        assert_eq!(
            states,
            vec![
                ("nbd0".to_string(), DeviceRunState::Cleaned),
                ("nbd1".to_string(), DeviceRunState::Errored),
                ("nbd2".to_string(), DeviceRunState::Cleaned),
            ]
        );
        // nbd1: exactly one record, the error marker; no metric rows.
        let nbd1: Vec<_> = results
            .records()
            .iter()
            .filter(|r| r.device.as_deref() == Some("nbd1"))
            .collect();
        assert_eq!(nbd1.len(), 1);
        assert_eq!(nbd1[0].error.as_deref(), Some("mount failed: injected failure"));
        assert!(nbd1[0].metrics.is_empty());
        // The other devices produced normal rows.
        assert!(results
            .records()
            .iter()
            .any(|r| r.device.as_deref() == Some("nbd2") && r.error.is_none()));
        // Cleanup still ran for the failed device, exactly once each.
        for id in ["nbd0", "nbd1", "nbd2"] {
            assert_eq!(bench.mounter.releases_for(id), 1);
        }
    }

    #[test]
    fn test_one_timeout_in_four_invocation_matrix() {
        let host = MockHost::new();
        // 2 workloads x 2 thread counts = 4 invocations,
        // 3 sysbench phases each. The second invocation's run phase times out.
        for invocation in 0..4 {
            host.enqueue("sysbench", MockOutcome::success("")); // prepare
            if invocation == 1 {
                host.enqueue("sysbench", MockOutcome::Timeout); // run
            } else {
                host.enqueue("sysbench", MockOutcome::success(FILEIO_OUTPUT));
            }
            host.enqueue("sysbench", MockOutcome::success("")); // cleanup
        }
        let axes = axes(
            r#"{"blocksizes": ["4k"], "workloads": ["seqwr", "rndrd"],
                "threads": [4, 8], "flags": []}"#,
        );
        let mut bench =
            StorageBenchmark::new(&host, MockMounter::default(), &axes, "worker-1", TIMEOUT);
        let mut results = RunResults::new();
        let states = bench.run(&devices(&["nbd0"]), &mut results);

        assert_eq!(states[0].1, DeviceRunState::Cleaned);
        assert_eq!(results.len(), 4);
        let degraded: Vec<_> = results.records().iter().filter(|r| r.is_degraded()).collect();
        assert_eq!(degraded.len(), 1);
        assert_eq!(degraded[0].error.as_deref(), Some("timeout"));
        assert_eq!(results.records().iter().filter(|r| !r.is_degraded()).count(), 3);
        // Release once, after all four were attempted.
        assert_eq!(bench.mounter.releases_for("nbd0"), 1);
    }

    #[test]
    fn test_empty_axis_still_mounts_and_releases() {
        let host = MockHost::new();
        let axes = axes(
            r#"{"blocksizes": ["4k"], "workloads": ["seqwr"], "threads": [], "flags": []}"#,
        );
        let mut bench =
            StorageBenchmark::new(&host, MockMounter::default(), &axes, "worker-1", TIMEOUT);
        let mut results = RunResults::new();
        let states = bench.run(&devices(&["nbd0"]), &mut results);

        assert_eq!(states[0].1, DeviceRunState::Cleaned);
        assert!(results.is_empty());
        assert_eq!(bench.mounter.ensure_calls, vec!["nbd0"]);
        assert_eq!(bench.mounter.releases_for("nbd0"), 1);
        // No sysbench invocation at all.
        assert_eq!(host.count("sysbench"), 0);
    }

    #[test]
    fn test_unparseable_output_degrades_invocation_only() {
        let host = MockHost::new();
        host.set_default("sysbench", MockOutcome::success("not a sysbench report"));
        let axes = single_axes();
        let mut bench =
            StorageBenchmark::new(&host, MockMounter::default(), &axes, "worker-1", TIMEOUT);
        let mut results = RunResults::new();
        let states = bench.run(&devices(&["nbd0"]), &mut results);

        // The device still completes its lifecycle.
        assert_eq!(states[0].1, DeviceRunState::Cleaned);
        assert_eq!(results.len(), 1);
        assert_eq!(results.records()[0].error.as_deref(), Some("unparseable output"));
    }
}
