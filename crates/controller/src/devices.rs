use std::path::{Path, PathBuf};

use cephmon_primitives::{DiskInspector, PrimitiveInvoker};
use tracing::{info, warn};

/// What happened to one candidate device during a provisioning pass.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeviceOutcome {
    /// Already carries a prepared object-storage partition.
    AlreadyPrepared,

    /// First partition is mounted.
    InUse,

    /// Device path does not exist.
    Absent,

    /// A probe could not tell whether the device is prepared or in use.
    Uninspectable,

    /// Handed to the preparation primitive.
    Prepared,

    /// The preparation primitive failed; retried on the next cycle.
    Failed,
}

/// Turns configured raw devices into object-storage disks, once per device.
///
/// Device state is re-inspected on every pass and never remembered.
#[derive(Clone, Debug)]
pub struct DeviceProvisioner<P, D>
where
    P: PrimitiveInvoker,
    D: DiskInspector,
{
    conflicting_mount: PathBuf,
    disks: D,
    primitives: P,
}

impl<P, D> DeviceProvisioner<P, D>
where
    P: PrimitiveInvoker,
    D: DiskInspector,
{
    /// Creates a new instance of `DeviceProvisioner`.
    pub fn new(primitives: P, disks: D, conflicting_mount: impl Into<PathBuf>) -> Self {
        Self {
            conflicting_mount: conflicting_mount.into(),
            disks,
            primitives,
        }
    }

    /// Prepares every usable device in order, then triggers a block rescan.
    ///
    /// A failure on one device never stops the others.
    pub async fn ensure_provisioned(&self, devices: &[PathBuf]) -> Vec<(PathBuf, DeviceOutcome)> {
        let mut outcomes = Vec::with_capacity(devices.len());

        for device in devices {
            let outcome = self.provision(device).await;
            outcomes.push((device.clone(), outcome));
        }

        if let Err(e) = self.primitives.trigger_block_rescan().await {
            warn!("block device rescan failed: {e}");
        }

        outcomes
    }

    async fn provision(&self, device: &Path) -> DeviceOutcome {
        // cloud images mount ephemeral storage here
        if let Err(e) = self.primitives.unmount(&self.conflicting_mount).await {
            info!(
                "could not unmount {}: {e}",
                self.conflicting_mount.display()
            );
        }

        match self.disks.is_prepared_disk(device).await {
            Ok(true) => {
                info!("{} already prepared, skipping", device.display());
                return DeviceOutcome::AlreadyPrepared;
            }
            Ok(false) => {}
            Err(e) => {
                warn!("could not inspect {}, skipping: {e}", device.display());
                return DeviceOutcome::Uninspectable;
            }
        }

        match self.disks.is_mounted(device).await {
            Ok(true) => {
                info!("{} in use, skipping", device.display());
                return DeviceOutcome::InUse;
            }
            Ok(false) => {}
            Err(e) => {
                warn!("could not inspect {}, skipping: {e}", device.display());
                return DeviceOutcome::Uninspectable;
            }
        }

        if !self.disks.device_exists(device).await {
            return DeviceOutcome::Absent;
        }

        match self.primitives.prepare_disk(device).await {
            Ok(()) => DeviceOutcome::Prepared,
            Err(e) => {
                warn!("failed to prepare {}: {e}", device.display());
                DeviceOutcome::Failed
            }
        }
    }
}
