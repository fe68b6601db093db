//! Mock host for testing
//!
//! A scripted implementation of the [`Host`] trait. Tests enqueue outcomes
//! per program name, and every invocation is recorded so call counts and
//! argument shapes can be asserted. The mock keeps its own mount table:
//! a successful `mount` invocation adds an entry, a successful `umount`
//! removes it, so code that re-verifies host state through `proc_mounts`
//! sees the same causality it would see on a real machine.
//!
//! # Example
//!
//! ```
//! use nodepulse::host::{CommandSpec, Host};
//! use nodepulse::host::mock::{MockHost, MockOutcome};
//! use std::path::Path;
//!
//! let host = MockHost::new();
//! host.add_block_device("/dev/nbd0");
//! host.enqueue("blkid", MockOutcome::success("ext4\n"));
//!
//! let out = host.run(&CommandSpec::new("blkid").arg("/dev/nbd0")).unwrap();
//! assert!(out.success());
//! assert_eq!(host.count("blkid"), 1);
//! assert!(host.is_block_device(Path::new("/dev/nbd0")).unwrap());
//! ```

use super::{CommandOutput, CommandSpec, Execution, Host};
use crate::Result;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

/// Scripted result of one mock invocation.
#[derive(Debug, Clone)]
pub enum MockOutcome {
    /// The process ran and produced this output.
    Output(CommandOutput),
    /// The process exceeded its budget (only meaningful for bounded runs).
    Timeout,
    /// The process could not be spawned at all.
    SpawnError(String),
}

impl MockOutcome {
    /// Exit 0 with the given stdout.
    pub fn success(stdout: &str) -> Self {
        MockOutcome::Output(CommandOutput {
            status: Some(0),
            stdout: stdout.to_string(),
            stderr: String::new(),
        })
    }

    /// Non-zero exit with the given stderr.
    pub fn failure(status: i32, stderr: &str) -> Self {
        MockOutcome::Output(CommandOutput {
            status: Some(status),
            stdout: String::new(),
            stderr: stderr.to_string(),
        })
    }
}

#[derive(Debug, Default)]
struct MockState {
    block_devices: HashSet<PathBuf>,
    other_paths: HashSet<PathBuf>,
    /// (device, mount point) pairs, in mount order.
    mounts: Vec<(PathBuf, PathBuf)>,
    queues: HashMap<String, VecDeque<MockOutcome>>,
    defaults: HashMap<String, MockOutcome>,
    invocations: Vec<CommandSpec>,
    dirs_created: Vec<PathBuf>,
    dirs_removed: Vec<PathBuf>,
    non_empty_dirs: HashSet<PathBuf>,
}

/// Scripted [`Host`] implementation. Cheap to construct per test.
#[derive(Debug, Default)]
pub struct MockHost {
    state: Mutex<MockState>,
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a path that exists and is a block special file.
    pub fn add_block_device(&self, path: impl Into<PathBuf>) {
        self.state.lock().unwrap().block_devices.insert(path.into());
    }

    /// Register a path that exists but is not a block device.
    pub fn add_regular_path(&self, path: impl Into<PathBuf>) {
        self.state.lock().unwrap().other_paths.insert(path.into());
    }

    /// Seed an entry in the mock mount table.
    pub fn set_mounted(&self, device: impl Into<PathBuf>, mount_point: impl Into<PathBuf>) {
        self.state
            .lock()
            .unwrap()
            .mounts
            .push((device.into(), mount_point.into()));
    }

    /// Mark a directory as non-empty so `remove_dir` refuses it.
    pub fn set_dir_non_empty(&self, path: impl Into<PathBuf>) {
        self.state.lock().unwrap().non_empty_dirs.insert(path.into());
    }

    /// Queue the next outcome for invocations of `program`.
    pub fn enqueue(&self, program: &str, outcome: MockOutcome) {
        self.state
            .lock()
            .unwrap()
            .queues
            .entry(program.to_string())
            .or_default()
            .push_back(outcome);
    }

    /// Sticky outcome used when the queue for `program` is empty.
    /// Without one, the fallback is a silent success.
    pub fn set_default(&self, program: &str, outcome: MockOutcome) {
        self.state
            .lock()
            .unwrap()
            .defaults
            .insert(program.to_string(), outcome);
    }

    /// All invocations recorded so far, in order.
    pub fn invocations(&self) -> Vec<CommandSpec> {
        self.state.lock().unwrap().invocations.clone()
    }

    /// How many times `program` was invoked.
    pub fn count(&self, program: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .invocations
            .iter()
            .filter(|c| c.program == program)
            .count()
    }

    /// Directories created through the mock, in order.
    pub fn dirs_created(&self) -> Vec<PathBuf> {
        self.state.lock().unwrap().dirs_created.clone()
    }

    /// Directories removed through the mock, in order.
    pub fn dirs_removed(&self) -> Vec<PathBuf> {
        self.state.lock().unwrap().dirs_removed.clone()
    }

    /// Is the device currently present in the mock mount table?
    pub fn is_mounted(&self, device: &Path) -> bool {
        self.state
            .lock()
            .unwrap()
            .mounts
            .iter()
            .any(|(dev, _)| dev == device)
    }

    fn next_outcome(state: &mut MockState, program: &str) -> MockOutcome {
        if let Some(queue) = state.queues.get_mut(program) {
            if let Some(outcome) = queue.pop_front() {
                return outcome;
            }
        }
        if let Some(outcome) = state.defaults.get(program) {
            return outcome.clone();
        }
        MockOutcome::success("")
    }

    /// Apply mount-table causality for successful mount/umount runs.
    fn apply_side_effects(state: &mut MockState, cmd: &CommandSpec, output: &CommandOutput) {
        if !output.success() {
            return;
        }
        match cmd.program.as_str() {
            "mount" => {
                // mount <device> <mount_point>
                if let [device, mount_point] = &cmd.args[..] {
                    state
                        .mounts
                        .push((PathBuf::from(device), PathBuf::from(mount_point)));
                }
            }
            "umount" => {
                // umount <mount_point-or-device>
                if let Some(target) = cmd.args.first() {
                    let target = PathBuf::from(target);
                    state
                        .mounts
                        .retain(|(dev, mp)| dev != &target && mp != &target);
                }
            }
            _ => {}
        }
    }

    fn dispatch(&self, cmd: &CommandSpec) -> Result<Execution> {
        let mut state = self.state.lock().unwrap();
        state.invocations.push(cmd.clone());
        match Self::next_outcome(&mut state, &cmd.program) {
            MockOutcome::Output(output) => {
                Self::apply_side_effects(&mut state, cmd, &output);
                Ok(Execution::Completed(output))
            }
            MockOutcome::Timeout => Ok(Execution::TimedOut),
            MockOutcome::SpawnError(msg) => anyhow::bail!("failed to execute {}: {msg}", cmd.program),
        }
    }
}

impl Host for MockHost {
    fn path_exists(&self, path: &Path) -> bool {
        let state = self.state.lock().unwrap();
        state.block_devices.contains(path) || state.other_paths.contains(path)
    }

    fn is_block_device(&self, path: &Path) -> Result<bool> {
        let state = self.state.lock().unwrap();
        if state.block_devices.contains(path) {
            Ok(true)
        } else if state.other_paths.contains(path) {
            Ok(false)
        } else {
            anyhow::bail!("failed to stat {}", path.display())
        }
    }

    fn proc_mounts(&self) -> Result<String> {
        let state = self.state.lock().unwrap();
        let mut table = String::new();
        for (device, mount_point) in &state.mounts {
            table.push_str(&format!(
                "{} {} ext4 rw,relatime 0 0\n",
                device.display(),
                mount_point.display()
            ));
        }
        Ok(table)
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.dirs_created.push(path.to_path_buf());
        state.other_paths.insert(path.to_path_buf());
        Ok(())
    }

    fn remove_dir(&self, path: &Path) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.non_empty_dirs.contains(path) {
            anyhow::bail!("failed to remove directory {}: not empty", path.display());
        }
        state.dirs_removed.push(path.to_path_buf());
        state.other_paths.remove(path);
        Ok(())
    }

    fn run(&self, cmd: &CommandSpec) -> Result<CommandOutput> {
        match self.dispatch(cmd)? {
            Execution::Completed(output) => Ok(output),
            Execution::TimedOut => anyhow::bail!(
                "mock timeout outcome reached through unbounded run: {}",
                cmd.program
            ),
        }
    }

    fn run_with_timeout(&self, cmd: &CommandSpec, _timeout: Duration) -> Result<Execution> {
        self.dispatch(cmd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_then_default_then_silent_success() {
        let host = MockHost::new();
        host.enqueue("blkid", MockOutcome::failure(2, ""));
        host.set_default("mkfs.ext4", MockOutcome::failure(1, "device busy"));

        let blkid = host.run(&CommandSpec::new("blkid")).unwrap();
        assert_eq!(blkid.status, Some(2));
        // Queue exhausted, no default for blkid: silent success.
        assert!(host.run(&CommandSpec::new("blkid")).unwrap().success());
        // Sticky default keeps answering.
        assert!(!host.run(&CommandSpec::new("mkfs.ext4")).unwrap().success());
        assert!(!host.run(&CommandSpec::new("mkfs.ext4")).unwrap().success());
    }

    #[test]
    fn test_mount_and_umount_update_mount_table() {
        let host = MockHost::new();
        host.run(&CommandSpec::new("mount").args(["/dev/nbd0", "/mnt/benchmark/nbd0"]))
            .unwrap();
        assert!(host.is_mounted(Path::new("/dev/nbd0")));
        assert!(host.proc_mounts().unwrap().contains("/mnt/benchmark/nbd0"));

        host.run(&CommandSpec::new("umount").arg("/mnt/benchmark/nbd0"))
            .unwrap();
        assert!(!host.is_mounted(Path::new("/dev/nbd0")));
    }

    #[test]
    fn test_failed_mount_leaves_table_unchanged() {
        let host = MockHost::new();
        host.enqueue("mount", MockOutcome::failure(32, "already mounted"));
        let out = host
            .run(&CommandSpec::new("mount").args(["/dev/nbd0", "/mnt/benchmark/nbd0"]))
            .unwrap();
        assert!(!out.success());
        assert!(!host.is_mounted(Path::new("/dev/nbd0")));
    }

    #[test]
    fn test_timeout_outcome_for_bounded_run() {
        let host = MockHost::new();
        host.enqueue("sysbench", MockOutcome::Timeout);
        let result = host
            .run_with_timeout(&CommandSpec::new("sysbench"), Duration::from_secs(1))
            .unwrap();
        assert!(matches!(result, Execution::TimedOut));
    }
}
