//! Coordinates the bootstrap of a monitor quorum and gates disk provisioning
//! and credential distribution on that quorum being reachable.
//!
//! Each event runs one cycle to completion: refresh the monitor membership,
//! decide readiness, initialise the local monitor at most once, prepare disks,
//! then publish credentials to dependent roles. Every stage is idempotent, so
//! redelivering an event is always safe and is the only retry mechanism.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod bootstrap;
pub mod ceph_conf;
mod config;
mod credentials;
mod devices;
mod error;
mod members;
mod quorum;
mod router;

pub use bootstrap::{BootstrapController, BootstrapOutcome, BootstrapState};
pub use config::{ClusterConfig, ControllerOptions, RawConfig};
pub use credentials::{CredentialDistributor, PublishOutcome, Role};
pub use devices::{DeviceOutcome, DeviceProvisioner};
pub use error::{BootstrapError, ConfigError, Error};
pub use members::{MON_PORT, MemberDirectory, MonitorPeer, PeerEvent, peer_events};
pub use quorum::is_ready;
pub use router::{CycleOutcome, EventRouter, HookEvent, UnknownHookError};
