//! Host boundary
//!
//! Everything NodePulse does to the machine it runs on (spawning external
//! tools, reading the mount table, creating and removing mount point
//! directories) goes through the [`Host`] trait. This is the only
//! non-deterministic, non-mockable surface in the crate, so it is kept as
//! thin as possible: the device prober, provisioner, mount manager, and
//! benchmark runners are all generic over `Host` and are tested against
//! [`mock::MockHost`].
//!
//! [`SystemHost`] is the real implementation. Subprocess timeouts are
//! enforced by polling `try_wait` against a deadline and killing the child
//! when it is exceeded.

pub mod mock;

use crate::Result;
use anyhow::Context;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tracing::debug;

/// One external tool invocation: program, arguments, optional working
/// directory. Built once, logged verbatim, executed through a [`Host`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Captured result of a completed subprocess.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Exit code; `None` when the process was terminated by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// stdout and stderr concatenated, for error reports that need both.
    pub fn combined(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Outcome of a bounded subprocess run.
#[derive(Debug)]
pub enum Execution {
    Completed(CommandOutput),
    /// The deadline passed; the child was killed and reaped.
    TimedOut,
}

/// Access to the machine NodePulse is benchmarking.
///
/// Implementations must be side-effect-faithful: a successful `run` of a
/// `mount` command really does change what `proc_mounts` reports next time.
pub trait Host {
    /// Does the path exist at all (any file type)?
    fn path_exists(&self, path: &Path) -> bool;

    /// Is the path a block special file? The path must exist.
    fn is_block_device(&self, path: &Path) -> Result<bool>;

    /// Current mount table in `/proc/mounts` format
    /// (`device mountpoint fstype options dump pass`).
    fn proc_mounts(&self) -> Result<String>;

    /// Create a directory and any missing parents.
    fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Remove a directory; fails if it is not empty.
    fn remove_dir(&self, path: &Path) -> Result<()>;

    /// Run a command to completion, capturing stdout/stderr.
    fn run(&self, cmd: &CommandSpec) -> Result<CommandOutput>;

    /// Run a command under a wall-clock budget. Exceeding it kills the
    /// process; the caller decides what a timeout means.
    fn run_with_timeout(&self, cmd: &CommandSpec, timeout: Duration) -> Result<Execution>;
}

/// Interval between `try_wait` polls while a bounded command runs.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// The real host: std::fs + std::process.
#[derive(Debug, Default)]
pub struct SystemHost;

impl SystemHost {
    pub fn new() -> Self {
        Self
    }

    fn command(cmd: &CommandSpec) -> Command {
        let mut command = Command::new(&cmd.program);
        command.args(&cmd.args);
        if let Some(ref dir) = cmd.cwd {
            command.current_dir(dir);
        }
        command
    }
}

impl Host for SystemHost {
    fn path_exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_block_device(&self, path: &Path) -> Result<bool> {
        use std::os::unix::fs::FileTypeExt;
        let metadata = std::fs::metadata(path)
            .with_context(|| format!("failed to stat {}", path.display()))?;
        Ok(metadata.file_type().is_block_device())
    }

    fn proc_mounts(&self) -> Result<String> {
        std::fs::read_to_string("/proc/mounts").context("failed to read /proc/mounts")
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        std::fs::create_dir_all(path)
            .with_context(|| format!("failed to create directory {}", path.display()))
    }

    fn remove_dir(&self, path: &Path) -> Result<()> {
        std::fs::remove_dir(path)
            .with_context(|| format!("failed to remove directory {}", path.display()))
    }

    fn run(&self, cmd: &CommandSpec) -> Result<CommandOutput> {
        debug!(command = %cmd, "running");
        let output = Self::command(cmd)
            .output()
            .with_context(|| format!("failed to execute {}", cmd.program))?;
        Ok(CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn run_with_timeout(&self, cmd: &CommandSpec, timeout: Duration) -> Result<Execution> {
        debug!(command = %cmd, ?timeout, "running with timeout");
        let mut child = Self::command(cmd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to execute {}", cmd.program))?;

        // Drain both pipes on background threads. A chatty child fills the
        // pipe buffer and blocks on write if nobody reads while we poll,
        // and would then be killed at the deadline despite running fine.
        let stdout = spawn_pipe_reader(child.stdout.take());
        let stderr = spawn_pipe_reader(child.stderr.take());

        let deadline = Instant::now() + timeout;
        loop {
            match child
                .try_wait()
                .with_context(|| format!("failed to poll {}", cmd.program))?
            {
                Some(status) => {
                    return Ok(Execution::Completed(CommandOutput {
                        status: status.code(),
                        stdout: join_pipe_reader(stdout),
                        stderr: join_pipe_reader(stderr),
                    }));
                }
                None => {
                    if Instant::now() >= deadline {
                        // Kill and reap; partial output is discarded. The
                        // readers finish at EOF once the child is gone.
                        let _ = child.kill();
                        let _ = child.wait();
                        let _ = join_pipe_reader(stdout);
                        let _ = join_pipe_reader(stderr);
                        return Ok(Execution::TimedOut);
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
            }
        }
    }
}

fn spawn_pipe_reader<R>(pipe: Option<R>) -> Option<std::thread::JoinHandle<String>>
where
    R: std::io::Read + Send + 'static,
{
    pipe.map(|mut pipe| {
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

fn join_pipe_reader(handle: Option<std::thread::JoinHandle<String>>) -> String {
    handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}
