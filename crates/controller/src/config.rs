use std::path::PathBuf;
use std::time::Duration;

use cephmon_primitives::MonitorSecret;
use cephmon_relation::RelationTransport;

use crate::error::ConfigError;

/// Operator configuration exactly as the transport reports it.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RawConfig {
    /// `fsid`
    pub fsid: String,

    /// `monitor-secret`
    pub monitor_secret: String,

    /// `monitor-count`
    pub monitor_count: String,

    /// `osd-devices`, whitespace separated
    pub osd_devices: String,
}

impl RawConfig {
    /// Reads every operator value the controller uses.
    ///
    /// # Errors
    ///
    /// Returns the transport's error if any value cannot be read.
    pub async fn read<T>(transport: &T) -> Result<Self, T::Error>
    where
        T: RelationTransport,
    {
        Ok(Self {
            fsid: transport.config_get("fsid").await?,
            monitor_secret: transport.config_get("monitor-secret").await?,
            monitor_count: transport.config_get("monitor-count").await?,
            osd_devices: transport.config_get("osd-devices").await?,
        })
    }
}

/// Validated snapshot of the operator configuration for one event cycle.
#[derive(Clone, Debug)]
pub struct ClusterConfig {
    /// Cluster identity.
    pub fsid: String,

    /// Seed secret for the monitor admin keyring.
    pub monitor_secret: MonitorSecret,

    /// Monitors required before bootstrap may proceed.
    pub monitor_count: usize,

    /// Candidate devices, in operator order.
    pub osd_devices: Vec<PathBuf>,
}

impl TryFrom<RawConfig> for ClusterConfig {
    type Error = ConfigError;

    fn try_from(raw: RawConfig) -> Result<Self, Self::Error> {
        let fsid = raw.fsid.trim().to_string();
        if fsid.is_empty() {
            return Err(ConfigError::MissingFsid);
        }

        let monitor_secret = MonitorSecret::new(raw.monitor_secret.trim());
        if monitor_secret.is_empty() {
            return Err(ConfigError::MissingMonitorSecret);
        }

        let monitor_count = match raw.monitor_count.trim().parse::<usize>() {
            Ok(count) if count > 0 => count,
            _ => return Err(ConfigError::InvalidMonitorCount(raw.monitor_count)),
        };

        let osd_devices = raw
            .osd_devices
            .split_whitespace()
            .map(PathBuf::from)
            .collect();

        Ok(Self {
            fsid,
            monitor_secret,
            monitor_count,
            osd_devices,
        })
    }
}

/// Filesystem layout and timing used by the controller.
#[derive(Clone, Debug)]
pub struct ControllerOptions {
    /// Where the daemon configuration is rendered.
    pub ceph_conf_path: PathBuf,

    /// Mount point unmounted before inspecting devices.
    pub conflicting_mount: PathBuf,

    /// Directory for the transient monitor keyring.
    pub keyring_dir: PathBuf,

    /// Root of the per-monitor data directories holding the bootstrap marker.
    pub mon_data_root: PathBuf,

    /// Interval between quorum polls after bootstrap.
    pub quorum_poll: Duration,

    /// How long to wait for the local monitor to join quorum after bootstrap.
    pub quorum_wait: Duration,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            ceph_conf_path: PathBuf::from("/etc/ceph/ceph.conf"),
            conflicting_mount: PathBuf::from("/mnt"),
            keyring_dir: PathBuf::from("/var/lib/ceph/tmp"),
            mon_data_root: PathBuf::from("/var/lib/ceph/mon"),
            quorum_poll: Duration::from_secs(3),
            quorum_wait: Duration::from_secs(300),
        }
    }
}
