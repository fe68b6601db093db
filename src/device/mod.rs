//! Block device lifecycle
//!
//! The storage benchmark owns its devices for the duration of one run:
//! probe ([`probe`]) → provision a filesystem if none exists ([`provision`])
//! → mount ([`mount`]) → benchmark → release. Every step goes through the
//! [`crate::host::Host`] trait; nothing in this module assumes prior
//! in-process state reflects host reality.

pub mod mount;
pub mod probe;
pub mod provision;

pub use mount::{MountManager, Mounter};
pub use probe::DeviceProber;
pub use provision::Provisioner;

use std::path::{Path, PathBuf};

/// One block device named in configuration, resolved for this node.
/// Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSpec {
    /// Short identifier, e.g. `nbd0`. Mount point names derive from this.
    pub id: String,
    /// Resolved device path, e.g. `/dev/nbd0`.
    pub path: PathBuf,
    /// Node the device belongs to.
    pub node: String,
}

impl DeviceSpec {
    /// Build from a configured disk entry. Accepts either a short
    /// identifier (`nbd0`) or a full path (`/dev/nbd0`).
    pub fn new(disk: &str, node: &str) -> Self {
        let (id, path) = match disk.strip_prefix("/dev/") {
            Some(id) => (id.to_string(), PathBuf::from(disk)),
            None => (disk.to_string(), Path::new("/dev").join(disk)),
        };
        Self {
            id,
            path,
            node: node.to_string(),
        }
    }
}

/// What the prober found at a device path. A missing path is not a state,
/// it is [`crate::BenchError::DeviceNotFound`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceState {
    /// Block device with no recognizable filesystem signature.
    UnmountedNoFs,
    /// Block device carrying a filesystem, not currently mounted.
    UnmountedHasFs,
    /// Currently mounted at the contained mount point.
    Mounted(PathBuf),
    /// The path exists but is not a block special file.
    NotABlockDevice,
}

/// Mount bookkeeping for one device. Created when the orchestrator begins
/// processing the device, mutated only by the mount manager, removed after
/// release. `mounted` mirrors actual host state; the manager re-verifies
/// against the mount table before trusting it.
#[derive(Debug, Clone)]
pub struct MountState {
    pub device_path: PathBuf,
    pub mount_point: PathBuf,
    pub mounted: bool,
    /// True when this manager performed the mount (as opposed to finding
    /// the device already mounted). Release only unmounts what we mounted.
    pub mounted_by_us: bool,
    /// True when the provisioner created the filesystem during this run.
    pub fs_created: bool,
}
