use std::fmt::{self, Display};

use cephmon_primitives::{CephKey, PrimitiveInvoker};
use cephmon_relation::{RelationSettings, RelationTransport, RoleChannel};
use tracing::{info, warn};

/// Dependent roles that receive cluster credentials.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Role {
    /// Object-storage daemons: `fsid` and the bootstrap key.
    ObjectStorage,

    /// Gateways: the gateway key.
    Gateway,
}

impl Role {
    /// The relation channel this role is served on.
    #[must_use]
    pub const fn channel(self) -> RoleChannel {
        match self {
            Self::ObjectStorage => RoleChannel::Osd,
            Self::Gateway => RoleChannel::Radosgw,
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ObjectStorage => f.write_str("object-storage"),
            Self::Gateway => f.write_str("gateway"),
        }
    }
}

/// Result of one publication attempt.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PublishOutcome {
    /// Quorum not ready; nothing was fetched or published.
    Deferred,

    /// The credential could not be fetched; nothing was published.
    Unavailable,

    /// Settings were written to this many relation instances.
    Published(usize),
}

/// Publishes role-scoped credentials to every relation instance of a role.
#[derive(Debug)]
pub struct CredentialDistributor<'a, T, P>
where
    T: RelationTransport,
    P: PrimitiveInvoker,
{
    fsid: &'a str,
    node_name: &'a str,
    primitives: &'a P,
    transport: &'a T,
}

impl<'a, T, P> CredentialDistributor<'a, T, P>
where
    T: RelationTransport,
    P: PrimitiveInvoker,
{
    /// Creates a new instance of `CredentialDistributor`.
    pub const fn new(
        transport: &'a T,
        primitives: &'a P,
        fsid: &'a str,
        node_name: &'a str,
    ) -> Self {
        Self {
            fsid,
            node_name,
            primitives,
            transport,
        }
    }

    /// Publishes `role`'s credentials on every joined instance of its channel.
    ///
    /// Nothing is fetched or published unless `ready`. Failures to fetch or
    /// publish are reported and never fail the cycle.
    pub async fn publish(&self, role: Role, ready: bool) -> PublishOutcome {
        if !ready {
            info!("mon cluster not in quorum - deferring {role} credentials");
            return PublishOutcome::Deferred;
        }

        let Some(settings) = self.settings(role).await else {
            return PublishOutcome::Unavailable;
        };

        let channel = role.channel();
        let relation_ids = match self.transport.relation_ids(channel).await {
            Ok(relation_ids) => relation_ids,
            Err(e) => {
                warn!("failed to list {channel} relations: {e}");
                return PublishOutcome::Published(0);
            }
        };

        let mut published = 0;
        for relation_id in relation_ids {
            match self.transport.relation_set(&relation_id, &settings).await {
                Ok(()) => published += 1,
                Err(e) => warn!("failed to publish {role} credentials on {relation_id}: {e}"),
            }
        }

        info!("published {role} credentials on {published} relation(s)");

        PublishOutcome::Published(published)
    }

    async fn settings(&self, role: Role) -> Option<RelationSettings> {
        let mut settings = RelationSettings::new();

        match role {
            Role::ObjectStorage => {
                let result = self.primitives.fetch_osd_bootstrap_key(self.node_name).await;
                let key = self.fetch(role, result)?;
                settings.insert("fsid".to_string(), self.fsid.to_string());
                settings.insert("osd_bootstrap_key".to_string(), key.expose().to_string());
            }
            Role::Gateway => {
                let result = self.primitives.fetch_radosgw_key(self.node_name).await;
                let key = self.fetch(role, result)?;
                settings.insert("radosgw_key".to_string(), key.expose().to_string());
            }
        }

        Some(settings)
    }

    fn fetch(&self, role: Role, result: Result<CephKey, P::Error>) -> Option<CephKey> {
        result
            .inspect_err(|e| warn!("failed to fetch {role} key for {}: {e}", self.node_name))
            .ok()
    }
}
