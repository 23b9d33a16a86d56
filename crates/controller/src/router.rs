use std::fmt::{self, Display};
use std::str::FromStr;

use cephmon_primitives::{DiskInspector, PrimitiveInvoker};
use cephmon_relation::RelationTransport;
use thiserror::Error as ThisError;
use tracing::{info, warn};

use crate::bootstrap::BootstrapController;
use crate::ceph_conf;
use crate::config::{ClusterConfig, ControllerOptions, RawConfig};
use crate::credentials::{CredentialDistributor, Role};
use crate::devices::DeviceProvisioner;
use crate::error::Error;
use crate::members::{self, MemberDirectory};
use crate::quorum;

/// Lifecycle and relation events the controller reacts to.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum HookEvent {
    /// Operator configuration changed.
    ConfigChanged,

    /// A monitor peer joined.
    MonRelationJoined,

    /// A monitor peer left.
    MonRelationDeparted,

    /// An object-storage unit joined.
    OsdRelationJoined,

    /// A gateway unit joined.
    RadosgwRelationJoined,

    /// The unit (re)started.
    Start,

    /// The charm was upgraded.
    UpgradeCharm,
}

impl HookEvent {
    /// Hook name as delivered by the agent.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ConfigChanged => "config-changed",
            Self::MonRelationJoined => "mon-relation-joined",
            Self::MonRelationDeparted => "mon-relation-departed",
            Self::OsdRelationJoined => "osd-relation-joined",
            Self::RadosgwRelationJoined => "radosgw-relation-joined",
            Self::Start => "start",
            Self::UpgradeCharm => "upgrade-charm",
        }
    }
}

impl Display for HookEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned for hook names this controller does not handle.
#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
#[error("unhandled hook: {0}")]
pub struct UnknownHookError(pub String);

impl FromStr for HookEvent {
    type Err = UnknownHookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "config-changed" => Ok(Self::ConfigChanged),
            "mon-relation-joined" => Ok(Self::MonRelationJoined),
            "mon-relation-departed" => Ok(Self::MonRelationDeparted),
            "osd-relation-joined" => Ok(Self::OsdRelationJoined),
            "radosgw-relation-joined" => Ok(Self::RadosgwRelationJoined),
            "start" => Ok(Self::Start),
            "upgrade-charm" => Ok(Self::UpgradeCharm),
            other => Err(UnknownHookError(other.to_string())),
        }
    }
}

/// How an event cycle ended, when it ended cleanly.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CycleOutcome {
    /// Every step the event calls for ran.
    Completed,

    /// Too few monitors; nothing past rendering ran.
    Punted {
        /// Monitors known, including this node.
        members: usize,
        /// Monitors required.
        threshold: usize,
    },

    /// Configuration is incomplete; waiting for the operator to complete it.
    Deferred,
}

/// Maps each event to the controller operations it drives.
#[derive(Clone, Debug)]
pub struct EventRouter<T, P, D>
where
    T: RelationTransport,
    P: PrimitiveInvoker,
    D: DiskInspector,
{
    disks: D,
    options: ControllerOptions,
    primitives: P,
    transport: T,
}

impl<T, P, D> EventRouter<T, P, D>
where
    T: RelationTransport,
    P: PrimitiveInvoker,
    D: DiskInspector,
{
    /// Creates a new instance of `EventRouter`.
    pub const fn new(transport: T, primitives: P, disks: D, options: ControllerOptions) -> Self {
        Self {
            disks,
            options,
            primitives,
            transport,
        }
    }

    /// Runs one event cycle to completion.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration required by `config-changed` is
    /// missing, if monitor initialisation fails, or if relation state or the
    /// rendered configuration cannot be read or written.
    pub async fn dispatch(&self, event: HookEvent) -> Result<CycleOutcome, Error<T::Error, P::Error>> {
        info!("Begin {event} hook.");

        let outcome = match event {
            HookEvent::ConfigChanged => self.config_changed().await?,
            HookEvent::MonRelationJoined | HookEvent::MonRelationDeparted => {
                self.mon_relation_changed().await?
            }
            HookEvent::OsdRelationJoined => self.role_joined(Role::ObjectStorage).await?,
            HookEvent::RadosgwRelationJoined => self.role_joined(Role::Gateway).await?,
            HookEvent::Start => self.start().await,
            HookEvent::UpgradeCharm => self.upgrade_charm().await?,
        };

        info!("End {event} hook.");

        Ok(outcome)
    }

    async fn config_changed(&self) -> Result<CycleOutcome, Error<T::Error, P::Error>> {
        let raw = RawConfig::read(&self.transport)
            .await
            .map_err(Error::Transport)?;
        let fsid = raw.fsid.trim().to_string();

        let config = match ClusterConfig::try_from(raw) {
            Ok(config) => Some(config),
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                info!("{e} Deferring until monitor-count is set.");
                None
            }
        };
        let members = self.members().await?;

        info!("Monitor hosts are {:?}", members.endpoints());

        self.render(&fsid, &members).await?;

        match config {
            Some(config) => self.gated_cycle(&config, &members).await,
            None => Ok(CycleOutcome::Deferred),
        }
    }

    async fn mon_relation_changed(&self) -> Result<CycleOutcome, Error<T::Error, P::Error>> {
        let Some(config) = self.load_config_or_defer().await? else {
            return Ok(CycleOutcome::Deferred);
        };
        let members = self.members().await?;

        self.render(&config.fsid, &members).await?;
        self.gated_cycle(&config, &members).await
    }

    async fn role_joined(&self, role: Role) -> Result<CycleOutcome, Error<T::Error, P::Error>> {
        let Some(config) = self.load_config_or_defer().await? else {
            return Ok(CycleOutcome::Deferred);
        };
        let members = self.members().await?;
        let ready = quorum::is_ready(members.len(), config.monitor_count);
        let node_name = self.node_name().await?;

        CredentialDistributor::new(&self.transport, &self.primitives, &config.fsid, &node_name)
            .publish(role, ready)
            .await;

        if ready {
            Ok(CycleOutcome::Completed)
        } else {
            Ok(CycleOutcome::Punted {
                members: members.len(),
                threshold: config.monitor_count,
            })
        }
    }

    // redeployed onto a machine that already ran a monitor
    async fn start(&self) -> CycleOutcome {
        if let Err(e) = self.primitives.start_all_daemons().await {
            warn!("failed to start daemons: {e}");
        }
        if let Err(e) = self.primitives.trigger_block_rescan().await {
            warn!("block device rescan failed: {e}");
        }

        CycleOutcome::Completed
    }

    async fn upgrade_charm(&self) -> Result<CycleOutcome, Error<T::Error, P::Error>> {
        let Some(config) = self.load_config_or_defer().await? else {
            return Ok(CycleOutcome::Deferred);
        };
        let members = self.members().await?;

        self.render(&config.fsid, &members).await?;

        Ok(CycleOutcome::Completed)
    }

    async fn gated_cycle(
        &self,
        config: &ClusterConfig,
        members: &MemberDirectory,
    ) -> Result<CycleOutcome, Error<T::Error, P::Error>> {
        if !quorum::is_ready(members.len(), config.monitor_count) {
            info!("Not enough mons ({}), punting.", members.len());

            return Ok(CycleOutcome::Punted {
                members: members.len(),
                threshold: config.monitor_count,
            });
        }

        let node_name = self.node_name().await?;

        let bootstrap = BootstrapController::new(self.primitives.clone(), &self.options);
        bootstrap
            .ensure_bootstrapped(config, &node_name)
            .await
            .map_err(Error::Bootstrap)?;
        bootstrap.wait_for_quorum(&node_name).await;

        DeviceProvisioner::new(
            self.primitives.clone(),
            self.disks.clone(),
            self.options.conflicting_mount.clone(),
        )
        .ensure_provisioned(&config.osd_devices)
        .await;

        let distributor =
            CredentialDistributor::new(&self.transport, &self.primitives, &config.fsid, &node_name);
        distributor.publish(Role::ObjectStorage, true).await;
        distributor.publish(Role::Gateway, true).await;

        Ok(CycleOutcome::Completed)
    }

    async fn load_config(&self) -> Result<ClusterConfig, Error<T::Error, P::Error>> {
        let raw = RawConfig::read(&self.transport)
            .await
            .map_err(Error::Transport)?;

        Ok(ClusterConfig::try_from(raw)?)
    }

    async fn load_config_or_defer(
        &self,
    ) -> Result<Option<ClusterConfig>, Error<T::Error, P::Error>> {
        match self.load_config().await {
            Ok(config) => Ok(Some(config)),
            Err(Error::Config(e)) => {
                info!("{e} Deferring until config-changed.");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn members(&self) -> Result<MemberDirectory, Error<T::Error, P::Error>> {
        let local_address = self
            .transport
            .local_address()
            .await
            .map_err(Error::Transport)?;
        let events = members::peer_events(&self.transport)
            .await
            .map_err(Error::Transport)?;

        MemberDirectory::refresh(&self.transport, &local_address, events)
            .await
            .map_err(Error::Transport)
    }

    async fn node_name(&self) -> Result<String, Error<T::Error, P::Error>> {
        self.transport
            .local_unit_hostname()
            .await
            .map_err(Error::Transport)
    }

    async fn render(
        &self,
        fsid: &str,
        members: &MemberDirectory,
    ) -> Result<(), Error<T::Error, P::Error>> {
        ceph_conf::write(&self.options.ceph_conf_path, fsid, &members.endpoints())
        .await
        .map_err(|e| Error::Io("failed to write daemon configuration", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::path::PathBuf;
    use std::time::Duration;

    use cephmon_primitives::Primitive;
    use cephmon_primitives_mock::{Fault, MockDisks, MockPrimitives};
    use cephmon_relation::{RelationId, RoleChannel};
    use cephmon_relation_mock::MockTransport;
    use tempfile::TempDir;
    use tracing_test::traced_test;

    fn options(dir: &TempDir) -> ControllerOptions {
        ControllerOptions {
            ceph_conf_path: dir.path().join("ceph.conf"),
            keyring_dir: dir.path().join("tmp"),
            mon_data_root: dir.path().join("mon"),
            quorum_poll: Duration::from_millis(5),
            quorum_wait: Duration::from_millis(50),
            ..ControllerOptions::default()
        }
    }

    fn transport(monitor_count: &str) -> MockTransport {
        MockTransport::new("node-a", "10.0.0.3")
            .with_config("fsid", "abc")
            .with_config("monitor-secret", "s3cret")
            .with_config("monitor-count", monitor_count)
            .with_config("osd-devices", "/dev/sdb")
            .with_relation(RoleChannel::Mon, RelationId::new("mon:1"))
            .with_relation(RoleChannel::Osd, RelationId::new("osd:2"))
            .with_relation(RoleChannel::Radosgw, RelationId::new("radosgw:3"))
    }

    #[test]
    fn test_hook_names() {
        for event in [
            HookEvent::ConfigChanged,
            HookEvent::MonRelationJoined,
            HookEvent::MonRelationDeparted,
            HookEvent::OsdRelationJoined,
            HookEvent::RadosgwRelationJoined,
            HookEvent::Start,
            HookEvent::UpgradeCharm,
        ] {
            assert_eq!(event.as_str().parse::<HookEvent>(), Ok(event));
        }

        assert_eq!(
            "install".parse::<HookEvent>(),
            Err(UnknownHookError("install".to_string()))
        );
    }

    #[tokio::test]
    #[traced_test]
    async fn test_punts_when_quorum_insufficient() {
        let dir = tempfile::tempdir().unwrap();
        let transport = transport("3");
        transport.join_peer(&RelationId::new("mon:1"), "ceph/1", "10.0.0.1");
        let primitives = MockPrimitives::new();
        let router = EventRouter::new(transport.clone(), primitives.clone(), MockDisks::new(), options(&dir));

        let outcome = router.dispatch(HookEvent::MonRelationJoined).await.unwrap();

        assert_eq!(
            outcome,
            CycleOutcome::Punted {
                members: 2,
                threshold: 3
            }
        );
        assert!(logs_contain("punting"));
        assert!(primitives.invocations().is_empty());
        assert!(transport.published().is_empty());
        assert!(dir.path().join("ceph.conf").exists());
    }

    #[tokio::test]
    #[traced_test]
    async fn test_role_joined_defers_until_ready() {
        let dir = tempfile::tempdir().unwrap();
        let transport = transport("2");
        let primitives = MockPrimitives::new();
        let router = EventRouter::new(transport.clone(), primitives.clone(), MockDisks::new(), options(&dir));

        let outcome = router.dispatch(HookEvent::OsdRelationJoined).await.unwrap();

        assert_eq!(
            outcome,
            CycleOutcome::Punted {
                members: 1,
                threshold: 2
            }
        );
        assert!(logs_contain("deferring"));
        assert!(transport.published().is_empty());

        transport.join_peer(&RelationId::new("mon:1"), "ceph/1", "10.0.0.1");
        let outcome = router.dispatch(HookEvent::OsdRelationJoined).await.unwrap();

        assert_eq!(outcome, CycleOutcome::Completed);
        assert_eq!(transport.published().len(), 1);
        assert_eq!(transport.published()[0].0, RelationId::new("osd:2"));
    }

    #[tokio::test]
    async fn test_radosgw_joined_publishes_gateway_key_only() {
        let dir = tempfile::tempdir().unwrap();
        let transport = transport("1");
        let router = EventRouter::new(transport.clone(), MockPrimitives::new(), MockDisks::new(), options(&dir));

        router.dispatch(HookEvent::RadosgwRelationJoined).await.unwrap();

        let published = transport.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, RelationId::new("radosgw:3"));
        assert!(published[0].1.contains_key("radosgw_key"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_incomplete_config_deferred_outside_config_changed() {
        let dir = tempfile::tempdir().unwrap();
        let transport = transport("1").with_config("fsid", "");
        let primitives = MockPrimitives::new();
        let router = EventRouter::new(transport.clone(), primitives.clone(), MockDisks::new(), options(&dir));

        for event in [
            HookEvent::MonRelationJoined,
            HookEvent::OsdRelationJoined,
            HookEvent::UpgradeCharm,
        ] {
            assert_eq!(router.dispatch(event).await.unwrap(), CycleOutcome::Deferred);
        }

        assert!(logs_contain("Deferring until config-changed"));
        assert!(primitives.invocations().is_empty());
        assert!(!dir.path().join("ceph.conf").exists());
    }

    #[tokio::test]
    #[traced_test]
    async fn test_invalid_monitor_count_defers_at_config_changed() {
        for count in ["three", "0"] {
            let dir = tempfile::tempdir().unwrap();
            let transport = transport(count);
            let primitives = MockPrimitives::new();
            let disks = MockDisks::new().with_device("/dev/sdb");
            let router = EventRouter::new(
                transport.clone(),
                primitives.clone(),
                disks.clone(),
                options(&dir),
            );

            let outcome = router.dispatch(HookEvent::ConfigChanged).await.unwrap();

            assert_eq!(outcome, CycleOutcome::Deferred);
            assert!(primitives.invocations().is_empty());
            assert!(disks.inspected().is_empty());
            assert!(transport.published().is_empty());

            let rendered = std::fs::read_to_string(dir.path().join("ceph.conf")).unwrap();
            assert!(rendered.contains("mon host = 10.0.0.3:6789\n"));
            assert!(rendered.contains("fsid = abc\n"));
        }

        assert!(logs_contain("Deferring until monitor-count is set"));
    }

    #[tokio::test]
    async fn test_bootstrap_failure_fails_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let primitives = MockPrimitives::new().with_fault(Primitive::CreateMonitorFs, Fault::Fail);
        let router = EventRouter::new(transport("1"), primitives.clone(), MockDisks::new(), options(&dir));

        let err = router.dispatch(HookEvent::ConfigChanged).await.unwrap_err();

        assert!(!err.is_fatal());
        assert!(matches!(err, Error::Bootstrap(_)));
        assert!(primitives.prepared_devices().is_empty());
    }

    #[tokio::test]
    async fn test_start_is_best_effort() {
        let dir = tempfile::tempdir().unwrap();
        let primitives = MockPrimitives::new().with_fault(Primitive::StartAllDaemons, Fault::Fail);
        let router = EventRouter::new(transport("1"), primitives.clone(), MockDisks::new(), options(&dir));

        assert_eq!(router.dispatch(HookEvent::Start).await.unwrap(), CycleOutcome::Completed);
        assert_eq!(primitives.invocations().len(), 2);
    }

    #[tokio::test]
    async fn test_upgrade_charm_renders_config() {
        let dir = tempfile::tempdir().unwrap();
        let transport = transport("3");
        transport.join_peer(&RelationId::new("mon:1"), "ceph/1", "10.0.0.1");
        let primitives = MockPrimitives::new();
        let router = EventRouter::new(transport, primitives.clone(), MockDisks::new(), options(&dir));

        router.dispatch(HookEvent::UpgradeCharm).await.unwrap();

        let rendered = std::fs::read_to_string(dir.path().join("ceph.conf")).unwrap();
        assert!(rendered.contains("mon host = 10.0.0.1:6789 10.0.0.3:6789\n"));
        assert!(primitives.invocations().is_empty());
    }

    #[tokio::test]
    async fn test_ready_cycle_prepares_devices() {
        let dir = tempfile::tempdir().unwrap();
        let primitives = MockPrimitives::new();
        let disks = MockDisks::new().with_device("/dev/sdb");
        let router = EventRouter::new(transport("1"), primitives.clone(), disks, options(&dir));

        router.dispatch(HookEvent::MonRelationJoined).await.unwrap();

        assert_eq!(primitives.prepared_devices(), vec![PathBuf::from("/dev/sdb")]);
    }
}
