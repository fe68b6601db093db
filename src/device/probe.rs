//! Device state prober
//!
//! Read-only inspection of a device path. Determination order:
//!
//! 1. existence, failing fast with [`BenchError::DeviceNotFound`]
//! 2. block-device check
//! 3. exact device→mountpoint match in the mount table
//! 4. filesystem-signature probe via `blkid`
//!
//! Other privileged pods can mutate the host mount namespace at any time,
//! so callers must re-probe rather than cache: every call here reflects the
//! host as it is now.

use super::{DeviceSpec, DeviceState};
use crate::error::BenchError;
use crate::host::{CommandSpec, Host};
use crate::Result;
use anyhow::Context;
use std::path::PathBuf;
use tracing::debug;

/// Read-only prober over a [`Host`]. No side effects.
pub struct DeviceProber<'a, H: Host> {
    host: &'a H,
}

impl<'a, H: Host> DeviceProber<'a, H> {
    pub fn new(host: &'a H) -> Self {
        Self { host }
    }

    /// Report the current state of `device`, straight from the host.
    pub fn probe(&self, device: &DeviceSpec) -> Result<DeviceState> {
        if !self.host.path_exists(&device.path) {
            return Err(BenchError::DeviceNotFound {
                path: device.path.clone(),
            }
            .into());
        }
        if !self
            .host
            .is_block_device(&device.path)
            .with_context(|| format!("probing {}", device.path.display()))?
        {
            return Ok(DeviceState::NotABlockDevice);
        }

        if let Some(mount_point) = self.find_mount_point(device)? {
            debug!(device = %device.id, mount_point = %mount_point.display(), "device is mounted");
            return Ok(DeviceState::Mounted(mount_point));
        }

        if self.has_filesystem_signature(device)? {
            Ok(DeviceState::UnmountedHasFs)
        } else {
            Ok(DeviceState::UnmountedNoFs)
        }
    }

    /// Exact device→mountpoint match in the host mount table.
    pub fn find_mount_point(&self, device: &DeviceSpec) -> Result<Option<PathBuf>> {
        let table = self.host.proc_mounts()?;
        let device_path = device.path.to_string_lossy();
        for line in table.lines() {
            let mut fields = line.split_whitespace();
            let (Some(source), Some(target)) = (fields.next(), fields.next()) else {
                continue;
            };
            if source == device_path {
                return Ok(Some(PathBuf::from(target)));
            }
        }
        Ok(None)
    }

    /// Does `blkid` recognize a filesystem on the device? Exit status 2
    /// means "nothing found", which is a valid answer, not a failure.
    fn has_filesystem_signature(&self, device: &DeviceSpec) -> Result<bool> {
        let cmd = CommandSpec::new("blkid")
            .args(["-o", "value", "-s", "TYPE"])
            .arg(device.path.to_string_lossy());
        let output = self
            .host
            .run(&cmd)
            .with_context(|| format!("probing filesystem signature on {}", device.path.display()))?;
        Ok(output.success() && !output.stdout.trim().is_empty())
    }
}
