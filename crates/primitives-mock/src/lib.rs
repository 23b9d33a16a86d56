//! Recording fakes for the primitive invoker and disk inspector, with fault
//! injection for tests.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::Error;

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use cephmon_primitives::{
    CephKey, DiskInspector, MonitorSecret, Primitive, PrimitiveErrorKind, PrimitiveInvoker,
    first_partition,
};
use parking_lot::Mutex;

/// A recorded primitive invocation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Invocation {
    /// `create_keyring` was called.
    CreateKeyring {
        /// Where the keyring was written.
        keyring: PathBuf,
    },

    /// `create_monitor_fs` was called.
    CreateMonitorFs {
        /// The local node identity.
        node_name: String,
        /// The keyring handed to the primitive.
        keyring: PathBuf,
        /// Whether the keyring file existed at the time of the call.
        keyring_present: bool,
    },

    /// `start_all_daemons` was called.
    StartAllDaemons,

    /// `prepare_disk` was called.
    PrepareDisk(PathBuf),

    /// `trigger_block_rescan` was called.
    TriggerBlockRescan,

    /// `unmount` was called.
    Unmount(PathBuf),

    /// `fetch_osd_bootstrap_key` was called.
    FetchOsdBootstrapKey,

    /// `fetch_radosgw_key` was called.
    FetchRadosgwKey,

    /// `is_quorum` was called.
    QueryQuorum,
}

/// How an injected fault behaves.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Fault {
    /// Return an error.
    Fail,

    /// Panic inside the primitive.
    Panic,
}

#[derive(Debug)]
struct State {
    failing_devices: BTreeSet<PathBuf>,
    faults: BTreeMap<Primitive, Fault>,
    invocations: Vec<Invocation>,
    osd_key: CephKey,
    quorum: bool,
    radosgw_key: CephKey,
}

/// Recording primitive invoker.
///
/// `create_keyring` really writes the secret to the requested path so tests can
/// observe that the transient keyring is cleaned up.
#[derive(Clone, Debug)]
pub struct MockPrimitives {
    state: Arc<Mutex<State>>,
}

impl Default for MockPrimitives {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPrimitives {
    /// Create a mock where every primitive succeeds and the monitor is in quorum.
    #[must_use]
    pub fn new() -> Self {
        let state = State {
            failing_devices: BTreeSet::new(),
            faults: BTreeMap::new(),
            invocations: Vec::new(),
            osd_key: CephKey::new("osd-bootstrap-key"),
            quorum: true,
            radosgw_key: CephKey::new("radosgw-key"),
        };

        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Inject a fault into every call of `primitive`.
    #[must_use]
    pub fn with_fault(self, primitive: Primitive, fault: Fault) -> Self {
        self.state.lock().faults.insert(primitive, fault);
        self
    }

    /// Make `prepare_disk` fail for one device only.
    #[must_use]
    pub fn with_failing_device(self, device: impl Into<PathBuf>) -> Self {
        self.state.lock().failing_devices.insert(device.into());
        self
    }

    /// Set what `is_quorum` reports.
    #[must_use]
    pub fn with_quorum(self, quorum: bool) -> Self {
        self.state.lock().quorum = quorum;
        self
    }

    /// Set the keys returned by the fetch primitives.
    #[must_use]
    pub fn with_keys(self, osd_key: &str, radosgw_key: &str) -> Self {
        {
            let mut state = self.state.lock();
            state.osd_key = CephKey::new(osd_key);
            state.radosgw_key = CephKey::new(radosgw_key);
        }
        self
    }

    /// Remove an injected fault.
    pub fn clear_fault(&self, primitive: Primitive) {
        self.state.lock().faults.remove(&primitive);
    }

    /// Every invocation so far, in order.
    #[must_use]
    pub fn invocations(&self) -> Vec<Invocation> {
        self.state.lock().invocations.clone()
    }

    /// How many times `create_monitor_fs` was invoked.
    #[must_use]
    pub fn mkfs_count(&self) -> usize {
        self.state
            .lock()
            .invocations
            .iter()
            .filter(|i| matches!(i, Invocation::CreateMonitorFs { .. }))
            .count()
    }

    /// Devices handed to `prepare_disk`, in order.
    #[must_use]
    pub fn prepared_devices(&self) -> Vec<PathBuf> {
        self.state
            .lock()
            .invocations
            .iter()
            .filter_map(|i| match i {
                Invocation::PrepareDisk(device) => Some(device.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, primitive: Primitive, invocation: Invocation) -> Result<(), Error> {
        let fault = {
            let mut state = self.state.lock();
            state.invocations.push(invocation);
            state.faults.get(&primitive).copied()
        };

        match fault {
            None => Ok(()),
            Some(Fault::Fail) => Err(Error {
                primitive,
                kind: PrimitiveErrorKind::Failed,
            }),
            Some(Fault::Panic) => panic!("injected panic in {primitive}"),
        }
    }
}

#[async_trait]
impl PrimitiveInvoker for MockPrimitives {
    type Error = Error;

    async fn create_keyring(&self, keyring: &Path, secret: &MonitorSecret) -> Result<(), Error> {
        self.record(
            Primitive::CreateKeyring,
            Invocation::CreateKeyring {
                keyring: keyring.to_path_buf(),
            },
        )?;

        std::fs::write(keyring, secret.expose()).map_err(|_| Error {
            primitive: Primitive::CreateKeyring,
            kind: PrimitiveErrorKind::Failed,
        })
    }

    async fn create_monitor_fs(&self, node_name: &str, keyring: &Path) -> Result<(), Error> {
        self.record(
            Primitive::CreateMonitorFs,
            Invocation::CreateMonitorFs {
                node_name: node_name.to_string(),
                keyring: keyring.to_path_buf(),
                keyring_present: keyring.exists(),
            },
        )
    }

    async fn start_all_daemons(&self) -> Result<(), Error> {
        self.record(Primitive::StartAllDaemons, Invocation::StartAllDaemons)
    }

    async fn prepare_disk(&self, device: &Path) -> Result<(), Error> {
        self.record(
            Primitive::PrepareDisk,
            Invocation::PrepareDisk(device.to_path_buf()),
        )?;

        if self.state.lock().failing_devices.contains(device) {
            return Err(Error {
                primitive: Primitive::PrepareDisk,
                kind: PrimitiveErrorKind::Failed,
            });
        }

        Ok(())
    }

    async fn trigger_block_rescan(&self) -> Result<(), Error> {
        self.record(Primitive::TriggerBlockRescan, Invocation::TriggerBlockRescan)
    }

    async fn unmount(&self, mount_point: &Path) -> Result<(), Error> {
        self.record(
            Primitive::Unmount,
            Invocation::Unmount(mount_point.to_path_buf()),
        )
    }

    async fn fetch_osd_bootstrap_key(&self, _node_name: &str) -> Result<CephKey, Error> {
        self.record(Primitive::FetchOsdBootstrapKey, Invocation::FetchOsdBootstrapKey)?;

        Ok(self.state.lock().osd_key.clone())
    }

    async fn fetch_radosgw_key(&self, _node_name: &str) -> Result<CephKey, Error> {
        self.record(Primitive::FetchRadosgwKey, Invocation::FetchRadosgwKey)?;

        Ok(self.state.lock().radosgw_key.clone())
    }

    async fn is_quorum(&self, _node_name: &str) -> Result<bool, Error> {
        self.record(Primitive::QueryQuorum, Invocation::QueryQuorum)?;

        Ok(self.state.lock().quorum)
    }
}

#[derive(Debug, Default)]
struct DiskState {
    existing: BTreeSet<PathBuf>,
    inspected: Vec<PathBuf>,
    mounted_partitions: BTreeSet<PathBuf>,
    prepared: BTreeSet<PathBuf>,
    uninspectable: BTreeSet<PathBuf>,
}

/// Disk inspector answering from fixed sets of devices.
#[derive(Clone, Debug, Default)]
pub struct MockDisks {
    state: Arc<Mutex<DiskState>>,
}

impl MockDisks {
    /// Create an inspector that knows about no devices.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A blank device that exists.
    #[must_use]
    pub fn with_device(self, device: impl Into<PathBuf>) -> Self {
        self.state.lock().existing.insert(device.into());
        self
    }

    /// A device that already carries a prepared object-storage partition.
    #[must_use]
    pub fn with_prepared(self, device: impl Into<PathBuf>) -> Self {
        let device = device.into();
        {
            let mut state = self.state.lock();
            state.existing.insert(device.clone());
            state.prepared.insert(device);
        }
        self
    }

    /// A device whose first partition is mounted.
    #[must_use]
    pub fn with_mounted(self, device: impl Into<PathBuf>) -> Self {
        let device = device.into();
        {
            let mut state = self.state.lock();
            state.mounted_partitions.insert(first_partition(&device));
            state.existing.insert(device);
        }
        self
    }

    /// A device that exists but whose probes fail.
    #[must_use]
    pub fn with_uninspectable(self, device: impl Into<PathBuf>) -> Self {
        let device = device.into();
        {
            let mut state = self.state.lock();
            state.existing.insert(device.clone());
            state.uninspectable.insert(device);
        }
        self
    }

    /// Remove a device, as if it were detached.
    pub fn detach(&self, device: &Path) {
        let mut state = self.state.lock();
        state.existing.remove(device);
        state.prepared.remove(device);
        state.mounted_partitions.remove(&first_partition(device));
        state.uninspectable.remove(device);
    }

    /// Devices passed to any probe, in order (with repeats).
    #[must_use]
    pub fn inspected(&self) -> Vec<PathBuf> {
        self.state.lock().inspected.clone()
    }
}

impl DiskState {
    fn probe(&mut self, device: &Path) -> Result<(), Error> {
        self.inspected.push(device.to_path_buf());

        if self.uninspectable.contains(device) {
            return Err(Error {
                primitive: Primitive::InspectDisk,
                kind: PrimitiveErrorKind::Unavailable,
            });
        }

        Ok(())
    }
}

#[async_trait]
impl DiskInspector for MockDisks {
    type Error = Error;

    async fn is_prepared_disk(&self, device: &Path) -> Result<bool, Error> {
        let mut state = self.state.lock();
        state.probe(device)?;
        Ok(state.prepared.contains(device))
    }

    async fn is_mounted(&self, device: &Path) -> Result<bool, Error> {
        let mut state = self.state.lock();
        state.probe(device)?;
        Ok(state.mounted_partitions.contains(&first_partition(device)))
    }

    async fn device_exists(&self, device: &Path) -> bool {
        let mut state = self.state.lock();
        state.inspected.push(device.to_path_buf());
        state.existing.contains(device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_invocations_in_order() {
        let primitives = MockPrimitives::new();

        primitives.start_all_daemons().await.unwrap();
        primitives.prepare_disk(Path::new("/dev/sdb")).await.unwrap();
        primitives.trigger_block_rescan().await.unwrap();

        assert_eq!(
            primitives.invocations(),
            vec![
                Invocation::StartAllDaemons,
                Invocation::PrepareDisk(PathBuf::from("/dev/sdb")),
                Invocation::TriggerBlockRescan,
            ]
        );
        assert_eq!(primitives.prepared_devices(), vec![PathBuf::from("/dev/sdb")]);
    }

    #[tokio::test]
    async fn test_injected_failure_is_recorded() {
        let primitives = MockPrimitives::new().with_fault(Primitive::CreateMonitorFs, Fault::Fail);

        let err = primitives
            .create_monitor_fs("node-a", Path::new("/nonexistent"))
            .await
            .unwrap_err();

        assert_eq!(err.primitive, Primitive::CreateMonitorFs);
        assert_eq!(primitives.mkfs_count(), 1);

        primitives.clear_fault(Primitive::CreateMonitorFs);
        primitives
            .create_monitor_fs("node-a", Path::new("/nonexistent"))
            .await
            .unwrap();
        assert_eq!(primitives.mkfs_count(), 2);
    }

    #[tokio::test]
    async fn test_failing_device_only() {
        let primitives = MockPrimitives::new().with_failing_device("/dev/sdc");

        assert!(primitives.prepare_disk(Path::new("/dev/sdb")).await.is_ok());
        assert!(primitives.prepare_disk(Path::new("/dev/sdc")).await.is_err());
    }

    #[tokio::test]
    async fn test_keyring_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let keyring = dir.path().join("node-a.mon.keyring");
        let primitives = MockPrimitives::new();

        primitives
            .create_keyring(&keyring, &MonitorSecret::new("s3cret"))
            .await
            .unwrap();
        primitives.create_monitor_fs("node-a", &keyring).await.unwrap();

        assert_eq!(std::fs::read_to_string(&keyring).unwrap(), "s3cret");
        assert!(matches!(
            primitives.invocations().last(),
            Some(Invocation::CreateMonitorFs {
                keyring_present: true,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_mock_disks() {
        let disks = MockDisks::new()
            .with_device("/dev/sdb")
            .with_prepared("/dev/sdc")
            .with_mounted("/dev/nvme0n1");

        assert!(disks.device_exists(Path::new("/dev/sdb")).await);
        assert!(!disks.is_prepared_disk(Path::new("/dev/sdb")).await.unwrap());
        assert!(disks.is_prepared_disk(Path::new("/dev/sdc")).await.unwrap());
        assert!(disks.is_mounted(Path::new("/dev/nvme0n1")).await.unwrap());
        assert!(!disks.device_exists(Path::new("/dev/sdz")).await);

        disks.detach(Path::new("/dev/sdb"));
        assert!(!disks.device_exists(Path::new("/dev/sdb")).await);
        assert_eq!(disks.inspected().len(), 6);
    }

    #[tokio::test]
    async fn test_uninspectable_disk() {
        let disks = MockDisks::new().with_uninspectable("/dev/sdb");

        assert!(disks.device_exists(Path::new("/dev/sdb")).await);
        assert_eq!(
            disks
                .is_prepared_disk(Path::new("/dev/sdb"))
                .await
                .unwrap_err()
                .primitive,
            Primitive::InspectDisk
        );
        assert!(disks.is_mounted(Path::new("/dev/sdb")).await.is_err());
    }
}
