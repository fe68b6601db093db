//! sysbench invocation builder and runner
//!
//! Builds the exact sysbench command lines for fileio and cpu tests and
//! executes them through the host boundary under a wall-clock timeout.
//! fileio runs in three phases (`prepare`, `run`, `cleanup`), all executed
//! with the mounted benchmark directory as working directory, since
//! sysbench creates its test files in the current directory. `cleanup` is
//! best-effort: its failure is logged, not propagated, because the
//! measurement has already been captured.

use crate::error::BenchError;
use crate::host::{CommandSpec, Execution, Host};
use crate::matrix::{CpuInvocation, WorkloadSpec};
use crate::Result;
use std::time::Duration;
use tracing::{debug, warn};

pub struct SysbenchRunner<'a, H: Host> {
    host: &'a H,
    timeout: Duration,
}

impl<'a, H: Host> SysbenchRunner<'a, H> {
    pub fn new(host: &'a H, timeout: Duration) -> Self {
        Self { host, timeout }
    }

    /// Command line for one fileio phase of a workload.
    pub fn fileio_command(spec: &WorkloadSpec, phase: &str) -> CommandSpec {
        let mut cmd = CommandSpec::new("sysbench")
            .arg(format!("--file-block-size={}", spec.blocksize))
            .arg(format!("--file-test-mode={}", spec.workload))
            .arg(format!("--threads={}", spec.threads));
        for (key, value) in &spec.flags {
            cmd = cmd.arg(format!("--{key}={value}"));
        }
        cmd.args(["fileio", phase]).cwd(&spec.mount_path)
    }

    /// Command line for one cpu invocation.
    pub fn cpu_command(invocation: &CpuInvocation) -> CommandSpec {
        CommandSpec::new("sysbench")
            .arg("cpu")
            .arg(format!("--threads={}", invocation.threads))
            .arg(format!("--cpu-max-prime={}", invocation.cpu_max_prime))
            .arg("run")
    }

    /// Run the full fileio phase sequence for one workload and return the
    /// raw `run` output for parsing.
    pub fn run_fileio(&self, spec: &WorkloadSpec) -> Result<String> {
        debug!(device = %spec.device, workload = %spec.workload,
               blocksize = %spec.blocksize, threads = spec.threads, "running fileio workload");

        if let Err(e) = self.checked(&Self::fileio_command(spec, "prepare")) {
            // Test files may have been partially laid out; try to remove them.
            self.cleanup(spec);
            return Err(e);
        }

        let result = self.checked(&Self::fileio_command(spec, "run"));
        self.cleanup(spec);
        result
    }

    /// Run one cpu invocation and return the raw output. On non-zero exit
    /// the [`BenchError::Execution`] carries stdout and stderr so the
    /// caller can still attempt a best-effort parse.
    pub fn run_cpu(&self, invocation: &CpuInvocation) -> Result<String> {
        debug!(threads = invocation.threads, cpu_max_prime = invocation.cpu_max_prime,
               "running cpu benchmark");
        self.checked(&Self::cpu_command(invocation))
    }

    fn cleanup(&self, spec: &WorkloadSpec) {
        if let Err(e) = self.checked(&Self::fileio_command(spec, "cleanup")) {
            warn!(device = %spec.device, workload = %spec.workload,
                  error = %format!("{e:#}"), "fileio cleanup failed");
        }
    }

    /// Execute under the timeout and map the outcome to the taxonomy.
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::mock::{MockHost, MockOutcome};
    use std::path::PathBuf;

    const TIMEOUT: Duration = Duration::from_secs(60);

    fn spec() -> WorkloadSpec {
        WorkloadSpec {
            device: "nvme2n1".to_string(),
            mount_path: PathBuf::from("/mnt/benchmark/nvme2n1"),
            blocksize: "4k".to_string(),
            workload: "seqwr".to_string(),
            threads: 4,
            flags: vec![("file-extra-flags".to_string(), "dsync".to_string())],
        }
    }

    #[test]
    fn test_fileio_command_shape() {
        let cmd = SysbenchRunner::<MockHost>::fileio_command(&spec(), "prepare");
        assert_eq!(cmd.program, "sysbench");
        assert_eq!(
            cmd.args,
            vec![
                "--file-block-size=4k",
                "--file-test-mode=seqwr",
                "--threads=4",
                "--file-extra-flags=dsync",
                "fileio",
                "prepare",
            ]
        );
        assert_eq!(cmd.cwd, Some(PathBuf::from("/mnt/benchmark/nvme2n1")));
    }

    #[test]
    fn test_cpu_command_shape() {
        let cmd = SysbenchRunner::<MockHost>::cpu_command(&CpuInvocation {
            threads: 8,
            cpu_max_prime: 100000,
        });
        assert_eq!(
            cmd.args,
            vec!["cpu", "--threads=8", "--cpu-max-prime=100000", "run"]
        );
        assert_eq!(cmd.cwd, None);
    }

    #[test]
    fn test_run_fileio_executes_three_phases() {
        let host = MockHost::new();
        host.enqueue("sysbench", MockOutcome::success(""));
        host.enqueue("sysbench", MockOutcome::success("File operations:\n    reads/s: 1.00"));
        host.enqueue("sysbench", MockOutcome::success(""));
        let runner = SysbenchRunner::new(&host, TIMEOUT);
        let output = runner.run_fileio(&spec()).unwrap();
        assert!(output.contains("File operations"));

        let phases: Vec<String> = host
            .invocations()
            .iter()
            .map(|c| c.args.last().cloned().unwrap_or_default())
            .collect();
        assert_eq!(phases, vec!["prepare", "run", "cleanup"]);
    }

    #[test]
    fn test_timeout_maps_to_timeout_error() {
        let host = MockHost::new();
        host.enqueue("sysbench", MockOutcome::success("")); // prepare
        host.enqueue("sysbench", MockOutcome::Timeout); // run
        let runner = SysbenchRunner::new(&host, TIMEOUT);
        let err = runner.run_fileio(&spec()).unwrap_err();
        assert!(matches!(
            BenchError::from_anyhow(&err),
            Some(BenchError::Timeout { .. })
        ));
        // Cleanup still attempted after the timeout.
        assert_eq!(host.count("sysbench"), 3);
    }

    #[test]
    fn test_nonzero_exit_maps_to_execution_error() {
        let host = MockHost::new();
        host.enqueue("sysbench", MockOutcome::success("")); // prepare
        host.enqueue("sysbench", MockOutcome::failure(1, "FATAL: no such test mode")); // run
        let runner = SysbenchRunner::new(&host, TIMEOUT);
        let err = runner.run_fileio(&spec()).unwrap_err();
        match BenchError::from_anyhow(&err) {
            Some(BenchError::Execution { status, stderr, .. }) => {
                assert_eq!(*status, 1);
                assert!(stderr.contains("no such test mode"));
            }
            other => panic!("expected Execution error, got {other:?}"),
        }
    }

    #[test]
    fn test_prepare_failure_skips_run_but_cleans_up() {
        let host = MockHost::new();
        host.enqueue("sysbench", MockOutcome::failure(1, "prepare failed"));
        let runner = SysbenchRunner::new(&host, TIMEOUT);
        assert!(runner.run_fileio(&spec()).is_err());
        let phases: Vec<String> = host
            .invocations()
            .iter()
            .map(|c| c.args.last().cloned().unwrap_or_default())
            .collect();
        assert_eq!(phases, vec!["prepare", "cleanup"]);
    }

    #[test]
    fn test_cleanup_failure_does_not_mask_result() {
        let host = MockHost::new();
        host.enqueue("sysbench", MockOutcome::success("")); // prepare
        host.enqueue("sysbench", MockOutcome::success("File operations:")); // run
        host.enqueue("sysbench", MockOutcome::failure(1, "cleanup failed"));
        let runner = SysbenchRunner::new(&host, TIMEOUT);
        assert!(runner.run_fileio(&spec()).is_ok());
    }

    #[test]
    fn test_run_cpu_error_carries_stderr() {
        let host = MockHost::new();
        host.enqueue("sysbench", MockOutcome::failure(2, "CPU speed:\n    events per second: 1.00"));
        let runner = SysbenchRunner::new(&host, TIMEOUT);
        let err = runner
            .run_cpu(&CpuInvocation { threads: 1, cpu_max_prime: 10000 })
            .unwrap_err();
        match BenchError::from_anyhow(&err) {
            Some(BenchError::Execution { stderr, .. }) => {
                assert!(stderr.contains("events per second"));
            }
            other => panic!("expected Execution error, got {other:?}"),
        }
    }
}
