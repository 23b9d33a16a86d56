//! Abstract interface for reading operator configuration and relation state
//! from the hook environment, and for publishing settings to related units.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod channel;

pub use channel::{ParseChannelError, RoleChannel};

use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{self, Debug, Display};
use std::net::IpAddr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Settings published to (or read from) one relation instance.
pub type RelationSettings = BTreeMap<String, String>;

/// Identifier of one relation instance, e.g. `osd:3`.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelationId(String);

impl RelationId {
    /// Wraps a raw relation identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stable identifier of a remote unit, e.g. `ceph/1`.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(String);

impl UnitId {
    /// Wraps a raw unit identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The kind of relation transport error.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RelationErrorKind {
    /// A host name could not be resolved to an address.
    Resolution,

    /// The requested relation or unit does not exist.
    NotFound,

    /// A hook tool or external service failed.
    External,

    /// Other/unknown error
    Other,
}

impl Display for RelationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Marker trait for `RelationTransport` errors
pub trait RelationError: Debug + Error + Send + Sync {
    /// Returns the kind of this error
    fn kind(&self) -> RelationErrorKind;
}

/// Resolves host names (or address literals) to IP addresses.
#[async_trait]
pub trait HostResolver
where
    Self: Send + Sync,
{
    /// The error type for this resolver.
    type Error: RelationError;

    /// Resolve a host name or address literal.
    async fn resolve_host(&self, host: &str) -> Result<IpAddr, Self::Error>;
}

/// Read/write access to operator configuration and relation state.
///
/// Implementations are only ever read into snapshots at the start of an event
/// cycle and written through [`RelationTransport::relation_set`]; nothing keeps
/// a live view between calls.
#[async_trait]
pub trait RelationTransport
where
    Self: HostResolver + Send + Sync + Clone + 'static,
{
    /// Get an operator configuration value. Unset values read as an empty string.
    async fn config_get(&self, key: &str) -> Result<String, <Self as HostResolver>::Error>;

    /// List the relation instances currently established on a channel.
    async fn relation_ids(
        &self,
        channel: RoleChannel,
    ) -> Result<Vec<RelationId>, <Self as HostResolver>::Error>;

    /// List the remote units currently joined to a relation instance.
    async fn relation_units(
        &self,
        relation_id: &RelationId,
    ) -> Result<Vec<UnitId>, <Self as HostResolver>::Error>;

    /// Read one setting a remote unit has published on a relation instance.
    async fn relation_get(
        &self,
        relation_id: &RelationId,
        unit: &UnitId,
        key: &str,
    ) -> Result<Option<String>, <Self as HostResolver>::Error>;

    /// Publish settings on one relation instance.
    async fn relation_set(
        &self,
        relation_id: &RelationId,
        settings: &RelationSettings,
    ) -> Result<(), <Self as HostResolver>::Error>;

    /// Stable name of the local unit's host.
    async fn local_unit_hostname(&self) -> Result<String, <Self as HostResolver>::Error>;

    /// The local unit's private address (unresolved).
    async fn local_address(&self) -> Result<String, <Self as HostResolver>::Error>;
}
