//! Primitive invoker and disk inspector backed by the cluster's command-line
//! tools (`ceph-authtool`, `ceph-mon`, `ceph`, `ceph-disk-prepare`, `sgdisk`,
//! `udevadm`, `umount`, upstart's `start`).
//!
//! Every command runs under a deadline and is killed if it overruns, so a
//! hung tool surfaces as that primitive's failure instead of stalling the
//! whole event cycle.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_pub_crate)]

mod command;
mod error;
pub mod parse;

pub use error::{Error, Result};

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use cephmon_primitives::{
    CephKey, DiskInspector, MonitorSecret, Primitive, PrimitiveInvoker, first_partition,
};
use command::CommandRunner;
use tracing::{debug, info};

/// Capabilities granted to the object-storage bootstrap identity.
const OSD_BOOTSTRAP_CAPS: &[(&str, &[&str])] = &[(
    "mon",
    &[
        "allow command osd create ...",
        "allow command osd crush set ...",
        r"allow command auth add * osd allow\ * mon allow\ rwx",
        "allow command mon getmap",
    ],
)];

/// Capabilities granted to the gateway identity.
const RADOSGW_CAPS: &[(&str, &[&str])] = &[("mon", &["allow r"]), ("osd", &["allow rwx"])];

/// Options for configuring `HostPrimitives` and `HostDisks`.
#[derive(Clone, Debug)]
pub struct HostOptions {
    /// Directory holding the monitor admin sockets.
    pub admin_socket_dir: PathBuf,

    /// Root of the per-monitor data directories (`<root>/ceph-<name>`).
    pub mon_data_root: PathBuf,

    /// Mount table to consult.
    pub mounts_path: PathBuf,

    /// Deadline for each external command.
    pub timeout: Duration,
}

impl Default for HostOptions {
    fn default() -> Self {
        Self {
            admin_socket_dir: PathBuf::from("/var/run/ceph"),
            mon_data_root: PathBuf::from("/var/lib/ceph/mon"),
            mounts_path: PathBuf::from("/proc/mounts"),
            timeout: Duration::from_secs(300),
        }
    }
}

/// Primitive invoker that shells out to the cluster tools.
#[derive(Clone, Debug)]
pub struct HostPrimitives {
    options: HostOptions,
    runner: CommandRunner,
}

impl HostPrimitives {
    /// Creates a new instance of `HostPrimitives`.
    #[must_use]
    pub fn new(options: HostOptions) -> Self {
        let runner = CommandRunner::new(options.timeout);

        Self { options, runner }
    }

    fn mon_keyring(&self, node_name: &str) -> PathBuf {
        self.options
            .mon_data_root
            .join(format!("ceph-{node_name}"))
            .join("keyring")
    }

    fn admin_socket(&self, node_name: &str) -> PathBuf {
        self.options
            .admin_socket_dir
            .join(format!("ceph-mon.{node_name}.asok"))
    }

    async fn get_named_key(
        &self,
        primitive: Primitive,
        node_name: &str,
        entity: &str,
        caps: &[(&str, &[&str])],
    ) -> Result<CephKey> {
        let mut args = vec![
            "--name".to_string(),
            "mon.".to_string(),
            "--keyring".to_string(),
            self.mon_keyring(node_name).to_string_lossy().into_owned(),
            "auth".to_string(),
            "get-or-create".to_string(),
            format!("client.{entity}"),
        ];
        for (subsystem, subcaps) in caps {
            args.push((*subsystem).to_string());
            args.push(subcaps.join("; "));
        }

        let output = self.runner.run(primitive, "ceph", &args).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);

        parse::parse_key(&stdout)
            .map(CephKey::new)
            .ok_or_else(|| Error::BadOutput(primitive, format!("no key for client.{entity}")))
    }
}

#[async_trait]
impl PrimitiveInvoker for HostPrimitives {
    type Error = Error;

    async fn create_keyring(&self, keyring: &Path, secret: &MonitorSecret) -> Result<()> {
        let add_key = format!("--add-key={}", secret.expose());

        self.runner
            .run(
                Primitive::CreateKeyring,
                "ceph-authtool",
                [
                    keyring.as_os_str(),
                    OsStr::new("--create-keyring"),
                    OsStr::new("--name=mon."),
                    OsStr::new(&add_key),
                    OsStr::new("--cap"),
                    OsStr::new("mon"),
                    OsStr::new("allow *"),
                ],
            )
            .await?;

        Ok(())
    }

    async fn create_monitor_fs(&self, node_name: &str, keyring: &Path) -> Result<()> {
        self.runner
            .run(
                Primitive::CreateMonitorFs,
                "ceph-mon",
                [
                    OsStr::new("--mkfs"),
                    OsStr::new("-i"),
                    OsStr::new(node_name),
                    OsStr::new("--keyring"),
                    keyring.as_os_str(),
                ],
            )
            .await?;

        info!("created monitor filesystem for {node_name}");

        Ok(())
    }

    async fn start_all_daemons(&self) -> Result<()> {
        self.runner
            .run(Primitive::StartAllDaemons, "start", ["ceph-mon-all-starter"])
            .await?;

        Ok(())
    }

    async fn prepare_disk(&self, device: &Path) -> Result<()> {
        self.runner
            .run(Primitive::PrepareDisk, "ceph-disk-prepare", [device])
            .await?;

        info!("prepared {}", device.display());

        Ok(())
    }

    async fn trigger_block_rescan(&self) -> Result<()> {
        self.runner
            .run(
                Primitive::TriggerBlockRescan,
                "udevadm",
                ["trigger", "--subsystem-match=block", "--action=add"],
            )
            .await?;

        Ok(())
    }

    async fn unmount(&self, mount_point: &Path) -> Result<()> {
        self.runner
            .run(Primitive::Unmount, "umount", [mount_point])
            .await?;

        Ok(())
    }

    async fn fetch_osd_bootstrap_key(&self, node_name: &str) -> Result<CephKey> {
        self.get_named_key(
            Primitive::FetchOsdBootstrapKey,
            node_name,
            "bootstrap-osd",
            OSD_BOOTSTRAP_CAPS,
        )
        .await
    }

    async fn fetch_radosgw_key(&self, node_name: &str) -> Result<CephKey> {
        self.get_named_key(
            Primitive::FetchRadosgwKey,
            node_name,
            "radosgw.gateway",
            RADOSGW_CAPS,
        )
        .await
    }

    async fn is_quorum(&self, node_name: &str) -> Result<bool> {
        let socket = self.admin_socket(node_name);
        if !tokio::fs::try_exists(&socket).await.unwrap_or(false) {
            debug!("no admin socket at {}", socket.display());

            return Ok(false);
        }

        let output = self
            .runner
            .run(
                Primitive::QueryQuorum,
                "ceph",
                [OsStr::new("--admin-daemon"), socket.as_os_str(), OsStr::new("mon_status")],
            )
            .await?;

        parse::parse_in_quorum(&String::from_utf8_lossy(&output.stdout))
            .map_err(|e| Error::BadOutput(Primitive::QueryQuorum, e.to_string()))
    }
}

/// Disk inspector reading partition tables with `sgdisk` and the kernel mount table.
#[derive(Clone, Debug)]
pub struct HostDisks {
    mounts_path: PathBuf,
    runner: CommandRunner,
}

impl HostDisks {
    /// Creates a new instance of `HostDisks`.
    #[must_use]
    pub fn new(options: &HostOptions) -> Self {
        Self {
            mounts_path: options.mounts_path.clone(),
            runner: CommandRunner::new(options.timeout),
        }
    }
}

#[async_trait]
impl DiskInspector for HostDisks {
    type Error = Error;

    async fn is_prepared_disk(&self, device: &Path) -> Result<bool> {
        let output = self
            .runner
            .output(
                Primitive::InspectDisk,
                "sgdisk",
                [OsStr::new("-i"), OsStr::new("1"), device.as_os_str()],
            )
            .await?;

        // sgdisk fails on blank or absent devices; that simply means "not prepared"
        if !output.status.success() {
            debug!("sgdisk -i 1 {} exited with {}", device.display(), output.status);
            return Ok(false);
        }

        Ok(parse::is_osd_partition_info(&String::from_utf8_lossy(
            &output.stdout,
        )))
    }

    async fn is_mounted(&self, device: &Path) -> Result<bool> {
        let partition = first_partition(device);

        let table = tokio::fs::read_to_string(&self.mounts_path)
            .await
            .map_err(|e| Error::Io(Primitive::InspectDisk, e))?;

        Ok(parse::mount_table_contains(
            &table,
            &partition.to_string_lossy(),
        ))
    }

    async fn device_exists(&self, device: &Path) -> bool {
        tokio::fs::try_exists(device).await.unwrap_or(false)
    }
}
