//! Mount manager
//!
//! Sole writer of mount state for the benchmark run. Mount points are
//! deterministic, `{benchmark_root}/{device_id}`, so re-runs are stable
//! and two devices can never collide. `ensure_mounted` is idempotent going
//! up, `release` is idempotent going down and never fails: cleanup problems
//! are warnings, because they must not mask the benchmark's own result or
//! abort cleanup of other devices.
//!
//! The manager never trusts its cached state: the host mount namespace is
//! shared with other privileged pods, so both directions re-verify against
//! the mount table first.

use super::{DeviceProber, DeviceSpec, DeviceState, MountState, Provisioner};
use crate::error::BenchError;
use crate::host::{CommandSpec, Host};
use crate::Result;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// The mount lifecycle seam the orchestrator drives. Kept as a trait so
/// orchestrator tests can count calls without a host behind them.
pub trait Mounter {
    /// Bring the device into a mounted state and return the mount point.
    /// Idempotent: an already-mounted device returns its existing mount
    /// point without invoking the provisioner or the mount tool again.
    fn ensure_mounted(&mut self, device: &DeviceSpec) -> Result<PathBuf>;

    /// Undo whatever `ensure_mounted` did for this device. Idempotent and
    /// infallible by contract; problems are logged as warnings. Safe to
    /// call even when `ensure_mounted` never succeeded.
    fn release(&mut self, device: &DeviceSpec);
}

pub struct MountManager<'a, H: Host> {
    host: &'a H,
    root: PathBuf,
    states: HashMap<String, MountState>,
}

impl<'a, H: Host> MountManager<'a, H> {
    pub fn new(host: &'a H, root: impl Into<PathBuf>) -> Self {
        Self {
            host,
            root: root.into(),
            states: HashMap::new(),
        }
    }

    /// Deterministic mount point for a device: `{root}/{device_id}`.
    pub fn mount_point_for(&self, device: &DeviceSpec) -> PathBuf {
        self.root.join(&device.id)
    }

    /// Mount bookkeeping for a device, if the manager holds any.
    pub fn state(&self, device: &DeviceSpec) -> Option<&MountState> {
        self.states.get(&device.id)
    }

    fn mount(&mut self, device: &DeviceSpec, fs_created: bool) -> Result<PathBuf> {
        let mount_point = self.mount_point_for(device);
        self.host.create_dir_all(&mount_point).map_err(|e| {
            BenchError::Mount {
                device: device.id.clone(),
                reason: format!("{e:#}"),
            }
        })?;

        let cmd = CommandSpec::new("mount")
            .arg(device.path.to_string_lossy())
            .arg(mount_point.to_string_lossy());
        let output = match self.host.run(&cmd) {
            Ok(output) => output,
            Err(e) => {
                self.reclaim_mount_point(device, &mount_point);
                return Err(e);
            }
        };
        if !output.success() {
            // Nothing got mounted, so no state entry exists for release to
            // find; reclaim the directory created above here.
            self.reclaim_mount_point(device, &mount_point);
            return Err(BenchError::Mount {
                device: device.id.clone(),
                reason: output.stderr.trim().to_string(),
            }
            .into());
        }

        info!(device = %device.id, mount_point = %mount_point.display(), "mounted");
        self.states.insert(
            device.id.clone(),
            MountState {
                device_path: device.path.clone(),
                mount_point: mount_point.clone(),
                mounted: true,
                mounted_by_us: true,
                fs_created,
            },
        );
        Ok(mount_point)
    }

    /// Best-effort removal of a mount point directory after a failed
    /// mount attempt.
    fn reclaim_mount_point(&self, device: &DeviceSpec, mount_point: &Path) {
        if let Err(e) = self.host.remove_dir(mount_point) {
            warn!(device = %device.id, error = %format!("{e:#}"),
                  "could not remove mount point directory after failed mount");
        }
    }

    /// Is the device present in the host mount table right now?
    fn verify_mounted(&self, device_path: &Path) -> bool {
        match self.host.proc_mounts() {
            Ok(table) => {
                let device_path = device_path.to_string_lossy();
                table
                    .lines()
                    .filter_map(|line| line.split_whitespace().next())
                    .any(|source| source == device_path)
            }
            Err(e) => {
                warn!(error = %format!("{e:#}"), "could not read mount table, assuming unmounted");
                false
            }
        }
    }
}

impl<'a, H: Host> Mounter for MountManager<'a, H> {
    fn ensure_mounted(&mut self, device: &DeviceSpec) -> Result<PathBuf> {
        // Always re-probe; the namespace may have changed under us.
        match DeviceProber::new(self.host).probe(device)? {
            DeviceState::Mounted(mount_point) => {
                debug!(device = %device.id, mount_point = %mount_point.display(),
                       "already mounted, reusing");
                let entry = self
                    .states
                    .entry(device.id.clone())
                    .or_insert_with(|| MountState {
                        device_path: device.path.clone(),
                        mount_point: mount_point.clone(),
                        mounted: true,
                        // Found mounted, not mounted by us: release must
                        // leave this mount alone.
                        mounted_by_us: false,
                        fs_created: false,
                    });
                entry.mounted = true;
                Ok(mount_point)
            }
            DeviceState::UnmountedHasFs => self.mount(device, false),
            DeviceState::UnmountedNoFs => {
                Provisioner::new(self.host).provision(device)?;
                self.mount(device, true)
            }
            DeviceState::NotABlockDevice => Err(BenchError::Mount {
                device: device.id.clone(),
                reason: format!("{} is not a block device", device.path.display()),
            }
            .into()),
        }
    }

    fn release(&mut self, device: &DeviceSpec) {
        let Some(state) = self.states.remove(&device.id) else {
            debug!(device = %device.id, "release: nothing mounted, no-op");
            return;
        };

        if state.mounted_by_us {
            if self.verify_mounted(&state.device_path) {
                let cmd = CommandSpec::new("umount").arg(state.mount_point.to_string_lossy());
                match self.host.run(&cmd) {
                    Ok(output) if output.success() => {
                        info!(device = %device.id, mount_point = %state.mount_point.display(),
                              "unmounted");
                    }
                    Ok(output) => {
                        warn!(device = %device.id, stderr = %output.stderr.trim(),
                              "umount failed, leaving mount in place");
                        return;
                    }
                    Err(e) => {
                        warn!(device = %device.id, error = %format!("{e:#}"),
                              "could not run umount");
                        return;
                    }
                }
            } else {
                debug!(device = %device.id, "already unmounted externally");
            }

            // Remove the mount point directory we created, if empty.
            if let Err(e) = self.host.remove_dir(&state.mount_point) {
                warn!(device = %device.id, error = %format!("{e:#}"),
                      "could not remove mount point directory");
            }
        } else {
            debug!(device = %device.id, "mount was not ours, leaving in place");
        }
    }
}

impl<'a, H: Host> Drop for MountManager<'a, H> {
    fn drop(&mut self) {
        // Scoped-release guard: anything still tracked here leaked past the
        // orchestrator's cleanup (early return, panic unwind). Best effort.
        let leaked: Vec<DeviceSpec> = self
            .states
            .values()
            .filter(|s| s.mounted_by_us)
            .map(|s| DeviceSpec {
                id: s
                    .mount_point
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                path: s.device_path.clone(),
                node: String::new(),
            })
            .collect();
        for device in leaked {
            warn!(device = %device.id, "releasing leaked mount");
            self.release(&device);
        }
    }
}
