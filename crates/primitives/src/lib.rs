//! Abstract interface over the cluster-management primitives the bootstrap
//! controller invokes, and the probes it uses to inspect local block devices.
//!
//! Every primitive reports only success or failure; the controller decides what
//! a failure means for the current event cycle.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod secret;

pub use secret::{CephKey, MonitorSecret};

use std::error::Error;
use std::fmt::{self, Debug, Display};
use std::path::{Path, PathBuf};

use async_trait::async_trait;

/// Each primitive the controller can invoke.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Primitive {
    /// Create the transient monitor keyring.
    CreateKeyring,

    /// One-time monitor filesystem creation.
    CreateMonitorFs,

    /// Start (or refresh) every local daemon.
    StartAllDaemons,

    /// Prepare a raw device as an object-storage disk.
    PrepareDisk,

    /// Ask the kernel to re-announce block devices.
    TriggerBlockRescan,

    /// Unmount a mount point.
    Unmount,

    /// Retrieve the object-storage bootstrap key.
    FetchOsdBootstrapKey,

    /// Retrieve the gateway key.
    FetchRadosgwKey,

    /// Ask the local monitor whether it is in quorum.
    QueryQuorum,

    /// Read a device's partition table or the mount table.
    InspectDisk,
}

impl Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CreateKeyring => "create-keyring",
            Self::CreateMonitorFs => "create-monitor-fs",
            Self::StartAllDaemons => "start-all-daemons",
            Self::PrepareDisk => "prepare-disk",
            Self::TriggerBlockRescan => "trigger-block-rescan",
            Self::Unmount => "unmount",
            Self::FetchOsdBootstrapKey => "fetch-osd-bootstrap-key",
            Self::FetchRadosgwKey => "fetch-radosgw-key",
            Self::QueryQuorum => "query-quorum",
            Self::InspectDisk => "inspect-disk",
        };

        f.write_str(name)
    }
}

/// The kind of primitive error.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PrimitiveErrorKind {
    /// The primitive ran and reported failure.
    Failed,

    /// The primitive did not finish within its deadline.
    TimedOut,

    /// The primitive could not be started at all.
    Unavailable,

    /// The primitive produced output that could not be understood.
    BadOutput,
}

impl Display for PrimitiveErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Marker trait for `PrimitiveInvoker` errors
pub trait PrimitiveError: Debug + Error + Send + Sync + 'static {
    /// The primitive that failed.
    fn primitive(&self) -> Primitive;

    /// Returns the kind of this error
    fn kind(&self) -> PrimitiveErrorKind;
}

/// Capability interface with one method per cluster or disk primitive.
#[async_trait]
pub trait PrimitiveInvoker
where
    Self: Send + Sync + Clone + 'static,
{
    /// The error type for this invoker.
    type Error: PrimitiveError;

    /// Write a keyring at `keyring` holding `secret` for the `mon.` entity.
    async fn create_keyring(&self, keyring: &Path, secret: &MonitorSecret)
    -> Result<(), Self::Error>;

    /// Create the monitor's on-disk filesystem for `node_name` using `keyring`.
    async fn create_monitor_fs(&self, node_name: &str, keyring: &Path) -> Result<(), Self::Error>;

    /// Start every local daemon; starting a running daemon is a no-op.
    async fn start_all_daemons(&self) -> Result<(), Self::Error>;

    /// Prepare the raw device as an object-storage disk.
    async fn prepare_disk(&self, device: &Path) -> Result<(), Self::Error>;

    /// Trigger a block-device rescan so new disks are picked up.
    async fn trigger_block_rescan(&self) -> Result<(), Self::Error>;

    /// Unmount `mount_point`.
    async fn unmount(&self, mount_point: &Path) -> Result<(), Self::Error>;

    /// Get (creating if needed) the object-storage bootstrap key.
    async fn fetch_osd_bootstrap_key(&self, node_name: &str) -> Result<CephKey, Self::Error>;

    /// Get (creating if needed) the gateway key.
    async fn fetch_radosgw_key(&self, node_name: &str) -> Result<CephKey, Self::Error>;

    /// Whether the local monitor currently reports itself in quorum.
    async fn is_quorum(&self, node_name: &str) -> Result<bool, Self::Error>;
}

/// Probes over local block devices.
///
/// A probe that cannot reach a conclusion returns an error rather than
/// guessing; callers must not prepare a device they could not inspect.
#[async_trait]
pub trait DiskInspector
where
    Self: Send + Sync + Clone + 'static,
{
    /// The error type for this inspector.
    type Error: PrimitiveError;

    /// Whether the device already carries a prepared object-storage partition.
    async fn is_prepared_disk(&self, device: &Path) -> Result<bool, Self::Error>;

    /// Whether the device's first partition appears in the mount table.
    async fn is_mounted(&self, device: &Path) -> Result<bool, Self::Error>;

    /// Whether the device path exists.
    async fn device_exists(&self, device: &Path) -> bool;
}

/// Path of a device's first partition.
///
/// Devices whose name ends in a digit (`/dev/nvme0n1`, `/dev/loop0`) use a
/// `p` separator.
#[must_use]
pub fn first_partition(device: &Path) -> PathBuf {
    let mut name = device.as_os_str().to_os_string();

    let ends_with_digit = device
        .to_string_lossy()
        .chars()
        .last()
        .is_some_and(|c| c.is_ascii_digit());
    if ends_with_digit {
        name.push("p");
    }
    name.push("1");

    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_partition() {
        assert_eq!(
            first_partition(Path::new("/dev/sdb")),
            PathBuf::from("/dev/sdb1")
        );
        assert_eq!(
            first_partition(Path::new("/dev/vdc")),
            PathBuf::from("/dev/vdc1")
        );
        assert_eq!(
            first_partition(Path::new("/dev/nvme0n1")),
            PathBuf::from("/dev/nvme0n1p1")
        );
    }

    #[test]
    fn test_primitive_display() {
        assert_eq!(Primitive::CreateMonitorFs.to_string(), "create-monitor-fs");
        assert_eq!(Primitive::TriggerBlockRescan.to_string(), "trigger-block-rescan");
        assert_eq!(Primitive::InspectDisk.to_string(), "inspect-disk");
    }
}
