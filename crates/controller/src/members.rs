use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};

use cephmon_relation::{HostResolver, RelationTransport, RoleChannel, UnitId};
use tracing::{debug, warn};

/// Port every monitor listens on.
pub const MON_PORT: u16 = 6789;

/// Relation setting a peer publishes its address under.
const PRIVATE_ADDRESS: &str = "private-address";

/// One resolved monitor.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MonitorPeer {
    /// Unit the monitor belongs to; `None` for the local node.
    pub unit_id: Option<UnitId>,

    /// Resolved address.
    pub address: IpAddr,

    /// Monitor port.
    pub port: u16,
}

impl MonitorPeer {
    /// `address:port`, bracketing IPv6 addresses.
    #[must_use]
    pub fn endpoint(&self) -> String {
        SocketAddr::new(self.address, self.port).to_string()
    }
}

/// A membership change seen on the monitor relation.
///
/// Later events for the same unit supersede earlier ones.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PeerEvent {
    /// A peer joined (or re-announced itself) with an unresolved host name or address.
    Joined {
        /// The peer's unit.
        unit_id: UnitId,
        /// Host name or address literal as published by the peer.
        host: String,
    },

    /// A peer left.
    Departed {
        /// The peer's unit.
        unit_id: UnitId,
    },
}

/// Reads the current monitor peers off every `mon` relation instance.
///
/// Peers that have not published an address yet are left out.
///
/// # Errors
///
/// Returns the transport's error if the relation state cannot be read.
pub async fn peer_events<T>(transport: &T) -> Result<Vec<PeerEvent>, T::Error>
where
    T: RelationTransport,
{
    let mut events = Vec::new();

    for relation_id in transport.relation_ids(RoleChannel::Mon).await? {
        for unit_id in transport.relation_units(&relation_id).await? {
            match transport
                .relation_get(&relation_id, &unit_id, PRIVATE_ADDRESS)
                .await?
            {
                Some(host) if !host.trim().is_empty() => events.push(PeerEvent::Joined {
                    unit_id,
                    host: host.trim().to_string(),
                }),
                _ => debug!("{unit_id} on {relation_id} has not published an address yet"),
            }
        }
    }

    Ok(events)
}

/// Snapshot of the monitors this node currently knows about.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MemberDirectory {
    peers: Vec<MonitorPeer>,
}

impl MemberDirectory {
    /// Builds the snapshot from the local address and the peer events seen so far.
    ///
    /// Peers whose host cannot be resolved are left out and reported; the
    /// result is ordered by endpoint regardless of event order.
    ///
    /// # Errors
    ///
    /// Returns the resolver's error if the local address itself cannot be resolved.
    pub async fn refresh<R>(
        resolver: &R,
        local_address: &str,
        events: impl IntoIterator<Item = PeerEvent>,
    ) -> Result<Self, R::Error>
    where
        R: HostResolver,
    {
        let mut latest = BTreeMap::new();
        for event in events {
            match event {
                PeerEvent::Joined { unit_id, host } => {
                    latest.insert(unit_id, Some(host));
                }
                PeerEvent::Departed { unit_id } => {
                    latest.insert(unit_id, None);
                }
            }
        }

        let mut peers = vec![MonitorPeer {
            unit_id: None,
            address: resolver.resolve_host(local_address).await?,
            port: MON_PORT,
        }];

        for (unit_id, host) in latest {
            let Some(host) = host else { continue };

            match resolver.resolve_host(&host).await {
                Ok(address) => peers.push(MonitorPeer {
                    unit_id: Some(unit_id),
                    address,
                    port: MON_PORT,
                }),
                Err(e) => warn!("excluding {unit_id}: could not resolve {host}: {e}"),
            }
        }

        peers.sort_by_cached_key(MonitorPeer::endpoint);

        Ok(Self { peers })
    }

    /// Sorted `address:port` endpoints.
    #[must_use]
    pub fn endpoints(&self) -> Vec<String> {
        self.peers.iter().map(MonitorPeer::endpoint).collect()
    }

    /// Resolved monitors, including the local node.
    #[must_use]
    pub fn peers(&self) -> &[MonitorPeer] {
        &self.peers
    }

    /// Number of known monitors, including the local node.
    #[must_use]
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Whether no monitors are known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use cephmon_relation::RelationId;
    use cephmon_relation_mock::MockTransport;
    use proptest::prelude::*;

    fn joined(unit: &str, host: &str) -> PeerEvent {
        PeerEvent::Joined {
            unit_id: UnitId::new(unit),
            host: host.to_string(),
        }
    }

    fn departed(unit: &str) -> PeerEvent {
        PeerEvent::Departed {
            unit_id: UnitId::new(unit),
        }
    }

    fn block_on<F: std::future::Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(future)
    }

    #[tokio::test]
    async fn test_refresh_sorts_endpoints() {
        let resolver = MockTransport::new("node-a", "10.0.0.3");
        let events = vec![joined("ceph/2", "10.0.0.20"), joined("ceph/1", "10.0.0.1")];

        let directory = MemberDirectory::refresh(&resolver, "10.0.0.3", events)
            .await
            .unwrap();

        assert_eq!(
            directory.endpoints(),
            vec!["10.0.0.1:6789", "10.0.0.20:6789", "10.0.0.3:6789"]
        );
        assert_eq!(directory.len(), 3);
    }

    #[tokio::test]
    async fn test_refresh_resolves_host_names() {
        let resolver = MockTransport::new("node-a", "10.0.0.3")
            .with_host("node-b.maas", "10.0.0.4".parse().unwrap());

        let directory = MemberDirectory::refresh(&resolver, "10.0.0.3", vec![joined("ceph/1", "node-b.maas")])
            .await
            .unwrap();

        assert_eq!(directory.endpoints(), vec!["10.0.0.3:6789", "10.0.0.4:6789"]);
        assert_eq!(directory.peers()[1].unit_id, Some(UnitId::new("ceph/1")));
    }

    #[tokio::test]
    async fn test_refresh_excludes_unresolvable_peers() {
        let resolver = MockTransport::new("node-a", "10.0.0.3");
        let events = vec![joined("ceph/1", "10.0.0.1"), joined("ceph/2", "nowhere.invalid")];

        let directory = MemberDirectory::refresh(&resolver, "10.0.0.3", events)
            .await
            .unwrap();

        assert_eq!(directory.endpoints(), vec!["10.0.0.1:6789", "10.0.0.3:6789"]);
    }

    #[tokio::test]
    async fn test_refresh_fails_when_local_unresolvable() {
        let resolver = MockTransport::new("node-a", "node-a.invalid");

        assert!(
            MemberDirectory::refresh(&resolver, "node-a.invalid", Vec::new())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_later_events_supersede_earlier_ones() {
        let resolver = MockTransport::new("node-a", "10.0.0.3");
        let events = vec![
            joined("ceph/1", "10.0.0.1"),
            joined("ceph/2", "10.0.0.2"),
            departed("ceph/1"),
            joined("ceph/2", "10.0.0.9"),
        ];

        let directory = MemberDirectory::refresh(&resolver, "10.0.0.3", events)
            .await
            .unwrap();

        assert_eq!(directory.endpoints(), vec!["10.0.0.3:6789", "10.0.0.9:6789"]);
    }

    #[test]
    fn test_ipv6_endpoint() {
        let peer = MonitorPeer {
            unit_id: None,
            address: "fd00::1".parse().unwrap(),
            port: MON_PORT,
        };

        assert_eq!(peer.endpoint(), "[fd00::1]:6789");
    }

    #[tokio::test]
    async fn test_peer_events_from_relations() {
        let relation = RelationId::new("mon:1");
        let transport = MockTransport::new("node-a", "10.0.0.3")
            .with_relation(RoleChannel::Mon, relation.clone())
            .with_relation(RoleChannel::Osd, RelationId::new("osd:2"));
        transport.join_peer(&relation, "ceph/1", "10.0.0.1");
        transport.join_unit(&relation, UnitId::new("ceph/2"), Default::default());

        let events = peer_events(&transport).await.unwrap();

        assert_eq!(events, vec![joined("ceph/1", "10.0.0.1")]);
    }

    fn peers_and_permutation() -> impl Strategy<Value = (Vec<PeerEvent>, Vec<PeerEvent>)> {
        proptest::collection::btree_set(1u8..=254, 0..8).prop_flat_map(|octets| {
            let events: Vec<PeerEvent> = octets
                .into_iter()
                .map(|octet| joined(&format!("ceph/{octet}"), &format!("10.1.0.{octet}")))
                .collect();

            (Just(events.clone()), Just(events).prop_shuffle())
        })
    }

    proptest! {
        #[test]
        fn refresh_ignores_event_order((events, shuffled) in peers_and_permutation()) {
            let resolver = MockTransport::new("node-a", "10.0.0.3");
            let count = events.len();

            let ordered = block_on(MemberDirectory::refresh(&resolver, "10.0.0.3", events)).unwrap();
            let permuted = block_on(MemberDirectory::refresh(&resolver, "10.0.0.3", shuffled)).unwrap();

            prop_assert_eq!(ordered.endpoints(), permuted.endpoints());
            prop_assert_eq!(ordered.len(), count + 1);
        }
    }
}
