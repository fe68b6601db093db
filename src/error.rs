//! Benchmark error taxonomy
//!
//! Two severities exist and the distinction drives the whole error policy:
//!
//! - Device-level ([`BenchError::DeviceNotFound`], [`BenchError::Provision`],
//!   [`BenchError::Mount`]): fatal for that device only. The orchestrator
//!   performs best-effort cleanup and moves on to the next device.
//! - Invocation-level ([`BenchError::Timeout`], [`BenchError::Execution`],
//!   [`BenchError::Parse`]): recorded as a degraded metric row; the rest of
//!   the workload matrix still runs.
//!
//! Errors travel through `anyhow`; callers that need the severity downcast
//! with [`BenchError::from_anyhow`].

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors produced while driving external benchmark and filesystem tools.
#[derive(Debug, Error)]
pub enum BenchError {
    /// The configured device path does not exist on this node.
    #[error("block device not found: {path}")]
    DeviceNotFound { path: PathBuf },

    /// Filesystem creation failed or was refused.
    #[error("failed to provision filesystem on {device}: {reason}")]
    Provision {
        device: String,
        reason: String,
        /// Raw mkfs output, kept verbatim for diagnosis.
        output: String,
    },

    /// The device could not be brought into (or kept in) a mounted state.
    #[error("mount failure for {device}: {reason}")]
    Mount { device: String, reason: String },

    /// A single benchmark invocation exceeded its wall-clock budget.
    #[error("benchmark invocation timed out after {timeout:?}: {command}")]
    Timeout { command: String, timeout: Duration },

    /// A benchmark tool exited non-zero.
    #[error("benchmark tool exited with status {status}: {command}")]
    Execution {
        command: String,
        status: i32,
        stdout: String,
        stderr: String,
    },

    /// Tool output carried no recognizable report signature.
    #[error("unrecognized benchmark output: {reason}")]
    Parse { reason: String },
}

impl BenchError {
    /// Recover the taxonomy variant from an `anyhow` chain, if present.
    pub fn from_anyhow(err: &anyhow::Error) -> Option<&BenchError> {
        err.downcast_ref::<BenchError>()
    }

    /// Short marker used in the `error` column of the results file.
    pub fn marker(&self) -> String {
        match self {
            BenchError::DeviceNotFound { path } => format!("device not found: {}", path.display()),
            BenchError::Provision { reason, .. } => format!("provision failed: {reason}"),
            BenchError::Mount { reason, .. } => format!("mount failed: {reason}"),
            BenchError::Timeout { .. } => "timeout".to_string(),
            BenchError::Execution { status, .. } => format!("exit status {status}"),
            BenchError::Parse { .. } => "unparseable output".to_string(),
        }
    }
}

/// Marker for an arbitrary error chain: the taxonomy marker when the chain
/// bottoms out in a [`BenchError`], the full chain otherwise.
pub fn error_marker(err: &anyhow::Error) -> String {
    match BenchError::from_anyhow(err) {
        Some(bench) => bench.marker(),
        None => format!("{err:#}"),
    }
}
