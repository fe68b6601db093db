//! Filesystem provisioner
//!
//! Creates an ext4 filesystem on a device the prober reported as
//! `unmounted-no-fs`. The orchestrator enforces that precondition; this
//! component re-checks it anyway before touching the device: running mkfs
//! against a mounted or already-formatted device would destroy data.

use super::{DeviceProber, DeviceSpec, DeviceState};
use crate::error::BenchError;
use crate::host::{CommandSpec, Host};
use crate::Result;
use tracing::info;

pub struct Provisioner<'a, H: Host> {
    host: &'a H,
}

impl<'a, H: Host> Provisioner<'a, H> {
    pub fn new(host: &'a H) -> Self {
        Self { host }
    }

    /// Create an ext4 filesystem on `device`.
    ///
    /// Refuses with [`BenchError::Provision`] unless the device is currently
    /// `unmounted-no-fs`; carries the raw mkfs output on tool failure.
    pub fn provision(&self, device: &DeviceSpec) -> Result<()> {
        match DeviceProber::new(self.host).probe(device)? {
            DeviceState::UnmountedNoFs => {}
            state => {
                return Err(BenchError::Provision {
                    device: device.id.clone(),
                    reason: format!("refusing to create filesystem, device state is {state:?}"),
                    output: String::new(),
                }
                .into());
            }
        }

        info!(device = %device.id, "creating ext4 filesystem");
        let cmd = CommandSpec::new("mkfs.ext4")
            .arg("-q")
            .arg(device.path.to_string_lossy());
        let output = self.host.run(&cmd)?;
        if !output.success() {
            return Err(BenchError::Provision {
                device: device.id.clone(),
                reason: format!(
                    "mkfs.ext4 exited with status {}",
                    output.status.map_or_else(|| "signal".to_string(), |s| s.to_string())
                ),
                output: output.combined(),
            }
            .into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::mock::{MockHost, MockOutcome};

    fn nbd0() -> DeviceSpec {
        DeviceSpec::new("nbd0", "worker-1")
    }

    fn bare_device() -> MockHost {
        let host = MockHost::new();
        host.add_block_device("/dev/nbd0");
        host.enqueue("blkid", MockOutcome::failure(2, ""));
        host
    }

    #[test]
    fn test_provision_runs_mkfs() {
        let host = bare_device();
        Provisioner::new(&host).provision(&nbd0()).unwrap();
        assert_eq!(host.count("mkfs.ext4"), 1);
        let mkfs = host
            .invocations()
            .into_iter()
            .find(|c| c.program == "mkfs.ext4")
            .unwrap();
        assert_eq!(mkfs.args, vec!["-q", "/dev/nbd0"]);
    }

    #[test]
    fn test_refuses_device_with_filesystem() {
        let host = MockHost::new();
        host.add_block_device("/dev/nbd0");
        host.enqueue("blkid", MockOutcome::success("ext4\n"));
        let err = Provisioner::new(&host).provision(&nbd0()).unwrap_err();
        assert!(matches!(
            BenchError::from_anyhow(&err),
            Some(BenchError::Provision { .. })
        ));
        assert_eq!(host.count("mkfs.ext4"), 0);
    }

    #[test]
    fn test_refuses_mounted_device() {
        let host = MockHost::new();
        host.add_block_device("/dev/nbd0");
        host.set_mounted("/dev/nbd0", "/mnt/benchmark/nbd0");
        let err = Provisioner::new(&host).provision(&nbd0()).unwrap_err();
        assert!(matches!(
            BenchError::from_anyhow(&err),
            Some(BenchError::Provision { .. })
        ));
        assert_eq!(host.count("mkfs.ext4"), 0);
    }

    #[test]
    fn test_mkfs_failure_carries_tool_output() {
        let host = bare_device();
        host.enqueue(
            "mkfs.ext4",
            MockOutcome::failure(1, "mkfs.ext4: Device or resource busy"),
        );
        let err = Provisioner::new(&host).provision(&nbd0()).unwrap_err();
        match BenchError::from_anyhow(&err) {
            Some(BenchError::Provision { output, .. }) => {
                assert!(output.contains("Device or resource busy"));
            }
            other => panic!("expected Provision error, got {other:?}"),
        }
    }
}
