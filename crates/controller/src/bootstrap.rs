use std::fmt::{self, Display};
use std::path::{Path, PathBuf};
use std::time::Duration;

use cephmon_primitives::PrimitiveInvoker;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{ClusterConfig, ControllerOptions};
use crate::error::BootstrapError;

/// Lifecycle of the local monitor's one-time initialisation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BootstrapState {
    /// No marker; initialisation has not completed.
    Uninitialized,

    /// Initialisation is running in this cycle.
    Bootstrapping,

    /// Marker present. Terminal.
    Done,
}

impl Display for BootstrapState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => f.write_str("uninitialized"),
            Self::Bootstrapping => f.write_str("bootstrapping"),
            Self::Done => f.write_str("done"),
        }
    }
}

/// What `ensure_bootstrapped` did.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BootstrapOutcome {
    /// The marker was already present.
    AlreadyDone,

    /// Initialisation ran and completed in this cycle.
    Bootstrapped,
}

/// Admin keyring that only lives for one bootstrap attempt.
///
/// The file is removed when the guard is dropped, including during unwinding.
struct TransientKeyring {
    path: PathBuf,
}

impl TransientKeyring {
    const fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TransientKeyring {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("removed transient keyring {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                "failed to remove transient keyring {}: {e}",
                self.path.display()
            ),
        }
    }
}

/// Drives the at-most-once initialisation of the local monitor.
#[derive(Clone, Debug)]
pub struct BootstrapController<P>
where
    P: PrimitiveInvoker,
{
    keyring_dir: PathBuf,
    mon_data_root: PathBuf,
    primitives: P,
    quorum_poll: Duration,
    quorum_wait: Duration,
}

impl<P> BootstrapController<P>
where
    P: PrimitiveInvoker,
{
    /// Creates a new instance of `BootstrapController`.
    pub fn new(primitives: P, options: &ControllerOptions) -> Self {
        Self {
            keyring_dir: options.keyring_dir.clone(),
            mon_data_root: options.mon_data_root.clone(),
            primitives,
            quorum_poll: options.quorum_poll,
            quorum_wait: options.quorum_wait,
        }
    }

    /// Path of the marker recording that `node_name` has been initialised.
    #[must_use]
    pub fn marker_path(&self, node_name: &str) -> PathBuf {
        self.mon_data_root
            .join(format!("ceph-{node_name}"))
            .join("done")
    }

    /// Path the transient keyring is written to.
    #[must_use]
    pub fn keyring_path(&self, node_name: &str) -> PathBuf {
        self.keyring_dir.join(format!("{node_name}.mon.keyring"))
    }

    /// Whether the bootstrap marker exists.
    #[must_use]
    pub fn marker_exists(&self, node_name: &str) -> bool {
        self.marker_path(node_name).exists()
    }

    /// Persisted state for `node_name`.
    #[must_use]
    pub fn state(&self, node_name: &str) -> BootstrapState {
        if self.marker_exists(node_name) {
            BootstrapState::Done
        } else {
            BootstrapState::Uninitialized
        }
    }

    /// Initialises the local monitor unless the marker says it already was,
    /// then signals every local daemon to start.
    ///
    /// Starting the daemons is best-effort and never fails the call.
    ///
    /// # Errors
    ///
    /// Returns an error if a bootstrap primitive fails or the marker cannot be
    /// written. The marker is left absent so the next cycle retries.
    pub async fn ensure_bootstrapped(
        &self,
        config: &ClusterConfig,
        node_name: &str,
    ) -> Result<BootstrapOutcome, BootstrapError<P::Error>> {
        let outcome = match self.state(node_name) {
            BootstrapState::Done => {
                info!("mon already initialized");
                BootstrapOutcome::AlreadyDone
            }
            _ => {
                self.bootstrap(config, node_name).await?;
                BootstrapOutcome::Bootstrapped
            }
        };

        if let Err(e) = self.primitives.start_all_daemons().await {
            warn!("failed to start daemons: {e}");
        }

        Ok(outcome)
    }

    async fn bootstrap(
        &self,
        config: &ClusterConfig,
        node_name: &str,
    ) -> Result<(), BootstrapError<P::Error>> {
        info!(state = %BootstrapState::Bootstrapping, "initializing monitor {node_name}");

        tokio::fs::create_dir_all(&self.keyring_dir)
            .await
            .map_err(|e| BootstrapError::Io("failed to create keyring directory", e))?;

        let keyring = TransientKeyring::new(self.keyring_path(node_name));

        self.primitives
            .create_keyring(keyring.path(), &config.monitor_secret)
            .await
            .map_err(BootstrapError::Primitive)?;

        self.primitives
            .create_monitor_fs(node_name, keyring.path())
            .await
            .map_err(BootstrapError::Primitive)?;

        let marker = self.marker_path(node_name);
        if let Some(parent) = marker.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| BootstrapError::Io("failed to create monitor data directory", e))?;
        }
        tokio::fs::write(&marker, b"")
            .await
            .map_err(|e| BootstrapError::Io("failed to write bootstrap marker", e))?;

        info!(state = %BootstrapState::Done, "monitor {node_name} initialized");

        Ok(())
    }

    /// Polls the local monitor until it reports quorum or the wait runs out.
    ///
    /// A wait too long to represent as a deadline polls until quorum.
    pub async fn wait_for_quorum(&self, node_name: &str) -> bool {
        let deadline = Instant::now().checked_add(self.quorum_wait);

        loop {
            match self.primitives.is_quorum(node_name).await {
                Ok(true) => return true,
                Ok(false) => debug!("monitor {node_name} not in quorum yet"),
                Err(e) => debug!("quorum status unavailable: {e}"),
            }

            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                warn!(
                    "monitor {node_name} not in quorum after {:?}; continuing",
                    self.quorum_wait
                );
                return false;
            }

            tokio::time::sleep(self.quorum_poll).await;
        }
    }
}
