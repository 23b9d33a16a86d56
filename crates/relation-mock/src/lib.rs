//! Mock implementation of the relation transport for testing purposes.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod fixture;

pub use error::Error;
use fixture::Fixture;

use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use cephmon_relation::{
    HostResolver, RelationId, RelationSettings, RelationTransport, RoleChannel, UnitId,
};
use parking_lot::Mutex;

#[derive(Debug, Default)]
struct MockRelation {
    channel: Option<RoleChannel>,
    local: RelationSettings,
    units: BTreeMap<UnitId, RelationSettings>,
}

#[derive(Debug, Default)]
struct State {
    address: String,
    config: BTreeMap<String, String>,
    failing_sets: BTreeSet<RelationId>,
    hostname: String,
    hosts: BTreeMap<String, IpAddr>,
    published: Vec<(RelationId, RelationSettings)>,
    relations: BTreeMap<RelationId, MockRelation>,
}

/// Mock implementation of the relation transport.
///
/// Clones share state, so a test can keep a handle to inspect what was
/// published after handing the transport to the code under test.
#[derive(Clone, Debug, Default)]
pub struct MockTransport {
    state: Arc<Mutex<State>>,
}

impl MockTransport {
    /// Create a mock for a unit with the given host name and private address.
    #[must_use]
    pub fn new(hostname: impl Into<String>, address: impl Into<String>) -> Self {
        let state = State {
            address: address.into(),
            hostname: hostname.into(),
            ..State::default()
        };

        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Create a mock from a JSON fixture file describing config and relations.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or contains invalid JSON.
    pub fn from_fixture_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::FixtureFile(format!("failed to read fixture file: {e}")))?;

        let fixture: Fixture = serde_json::from_str(&content)
            .map_err(|e| Error::FixtureFile(format!("failed to parse fixture file: {e}")))?;

        let mut mock = Self::new(fixture.hostname, fixture.address);
        for (key, value) in fixture.config {
            mock = mock.with_config(key, value);
        }
        for (host, ip) in fixture.hosts {
            mock = mock.with_host(host, ip);
        }
        for relation in fixture.relations {
            let id = RelationId::new(relation.id);
            mock = mock.with_relation(relation.channel, id.clone());
            for (unit, settings) in relation.units {
                mock.join_unit(&id, UnitId::new(unit), settings);
            }
        }

        Ok(mock)
    }

    /// Set an operator configuration value.
    #[must_use]
    pub fn with_config(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.state.lock().config.insert(key.into(), value.into());
        self
    }

    /// Add a host name to the resolver table.
    #[must_use]
    pub fn with_host(self, host: impl Into<String>, ip: IpAddr) -> Self {
        self.state.lock().hosts.insert(host.into(), ip);
        self
    }

    /// Establish an (empty) relation instance on a channel.
    #[must_use]
    pub fn with_relation(self, channel: RoleChannel, id: RelationId) -> Self {
        self.state
            .lock()
            .relations
            .entry(id)
            .or_default()
            .channel = Some(channel);
        self
    }

    /// Make every `relation_set` on the given instance fail.
    #[must_use]
    pub fn with_failing_set(self, id: RelationId) -> Self {
        self.state.lock().failing_sets.insert(id);
        self
    }

    /// Join a remote unit with the given settings; replaces any earlier settings.
    pub fn join_unit(&self, id: &RelationId, unit: UnitId, settings: RelationSettings) {
        self.state
            .lock()
            .relations
            .entry(id.clone())
            .or_default()
            .units
            .insert(unit, settings);
    }

    /// Join a remote unit that only publishes its private address.
    pub fn join_peer(&self, id: &RelationId, unit: impl Into<String>, address: impl Into<String>) {
        let mut settings = RelationSettings::new();
        settings.insert("private-address".to_string(), address.into());
        self.join_unit(id, UnitId::new(unit), settings);
    }

    /// Remove a remote unit from a relation instance.
    pub fn depart_unit(&self, id: &RelationId, unit: &UnitId) {
        if let Some(relation) = self.state.lock().relations.get_mut(id) {
            relation.units.remove(unit);
        }
    }

    /// Every `relation_set` call made so far, in order.
    #[must_use]
    pub fn published(&self) -> Vec<(RelationId, RelationSettings)> {
        self.state.lock().published.clone()
    }

    /// The merged settings this unit has published on a relation instance.
    #[must_use]
    pub fn local_settings(&self, id: &RelationId) -> RelationSettings {
        self.state
            .lock()
            .relations
            .get(id)
            .map(|relation| relation.local.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl HostResolver for MockTransport {
    type Error = Error;

    async fn resolve_host(&self, host: &str) -> Result<IpAddr, Self::Error> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(ip);
        }

        self.state
            .lock()
            .hosts
            .get(host)
            .copied()
            .ok_or_else(|| Error::UnresolvableHost(host.to_string()))
    }
}

#[async_trait]
impl RelationTransport for MockTransport {
    async fn config_get(&self, key: &str) -> Result<String, Error> {
        Ok(self.state.lock().config.get(key).cloned().unwrap_or_default())
    }

    async fn relation_ids(&self, channel: RoleChannel) -> Result<Vec<RelationId>, Error> {
        Ok(self
            .state
            .lock()
            .relations
            .iter()
            .filter(|(_, relation)| relation.channel == Some(channel))
            .map(|(id, _)| id.clone())
            .collect())
    }

    async fn relation_units(&self, relation_id: &RelationId) -> Result<Vec<UnitId>, Error> {
        self.state
            .lock()
            .relations
            .get(relation_id)
            .map(|relation| relation.units.keys().cloned().collect())
            .ok_or_else(|| Error::RelationNotFound(relation_id.to_string()))
    }

    async fn relation_get(
        &self,
        relation_id: &RelationId,
        unit: &UnitId,
        key: &str,
    ) -> Result<Option<String>, Error> {
        let state = self.state.lock();
        let relation = state
            .relations
            .get(relation_id)
            .ok_or_else(|| Error::RelationNotFound(relation_id.to_string()))?;

        Ok(relation
            .units
            .get(unit)
            .and_then(|settings| settings.get(key))
            .cloned())
    }

    async fn relation_set(
        &self,
        relation_id: &RelationId,
        settings: &RelationSettings,
    ) -> Result<(), Error> {
        let mut state = self.state.lock();

        if state.failing_sets.contains(relation_id) {
            return Err(Error::Injected(format!("relation-set on {relation_id}")));
        }

        let relation = state
            .relations
            .get_mut(relation_id)
            .ok_or_else(|| Error::RelationNotFound(relation_id.to_string()))?;
        relation
            .local
            .extend(settings.iter().map(|(k, v)| (k.clone(), v.clone())));

        state.published.push((relation_id.clone(), settings.clone()));

        Ok(())
    }

    async fn local_unit_hostname(&self) -> Result<String, Error> {
        Ok(self.state.lock().hostname.clone())
    }

    async fn local_address(&self) -> Result<String, Error> {
        Ok(self.state.lock().address.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::net::Ipv4Addr;

    use super::*;

    #[tokio::test]
    async fn test_mock_relations() {
        let mon = RelationId::new("mon:1");
        let osd = RelationId::new("osd:2");
        let transport = MockTransport::new("node-a", "10.0.0.1")
            .with_config("fsid", "abc")
            .with_relation(RoleChannel::Mon, mon.clone())
            .with_relation(RoleChannel::Osd, osd.clone());

        transport.join_peer(&mon, "ceph/1", "node-b");

        assert_eq!(transport.config_get("fsid").await.unwrap(), "abc");
        assert_eq!(transport.config_get("missing").await.unwrap(), "");
        assert_eq!(
            transport.relation_ids(RoleChannel::Mon).await.unwrap(),
            vec![mon.clone()]
        );
        assert_eq!(
            transport.relation_units(&mon).await.unwrap(),
            vec![UnitId::new("ceph/1")]
        );
        assert_eq!(
            transport
                .relation_get(&mon, &UnitId::new("ceph/1"), "private-address")
                .await
                .unwrap(),
            Some("node-b".to_string())
        );

        transport.depart_unit(&mon, &UnitId::new("ceph/1"));
        assert!(transport.relation_units(&mon).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_relation_set_is_recorded_per_instance() {
        let first = RelationId::new("osd:1");
        let second = RelationId::new("osd:2");
        let transport = MockTransport::new("node-a", "10.0.0.1")
            .with_relation(RoleChannel::Osd, first.clone())
            .with_relation(RoleChannel::Osd, second.clone());

        let mut settings = RelationSettings::new();
        settings.insert("fsid".to_string(), "abc".to_string());
        transport.relation_set(&first, &settings).await.unwrap();

        assert_eq!(transport.local_settings(&first), settings);
        assert!(transport.local_settings(&second).is_empty());
        assert_eq!(transport.published(), vec![(first, settings)]);
    }

    #[tokio::test]
    async fn test_failing_set() {
        let id = RelationId::new("radosgw:4");
        let transport = MockTransport::new("node-a", "10.0.0.1")
            .with_relation(RoleChannel::Radosgw, id.clone())
            .with_failing_set(id.clone());

        let result = transport.relation_set(&id, &RelationSettings::new()).await;

        assert!(matches!(result, Err(Error::Injected(_))));
        assert!(transport.published().is_empty());
    }

    #[tokio::test]
    async fn test_resolve_host() {
        let transport = MockTransport::new("node-a", "10.0.0.1")
            .with_host("node-b", IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)));

        assert_eq!(
            transport.resolve_host("10.0.0.9").await.unwrap(),
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 9))
        );
        assert_eq!(
            transport.resolve_host("node-b").await.unwrap(),
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2))
        );
        assert!(matches!(
            transport.resolve_host("node-c").await,
            Err(Error::UnresolvableHost(_))
        ));
    }

    #[tokio::test]
    async fn test_from_fixture_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "hostname": "node-a",
                "address": "10.0.0.1",
                "config": {{ "fsid": "abc", "monitor-count": "2" }},
                "hosts": {{ "node-b": "10.0.0.2" }},
                "relations": [
                    {{
                        "id": "mon:1",
                        "channel": "mon",
                        "units": {{ "ceph/1": {{ "private-address": "node-b" }} }}
                    }}
                ]
            }}"#
        )
        .unwrap();

        let transport = MockTransport::from_fixture_file(file.path()).unwrap();

        assert_eq!(transport.local_unit_hostname().await.unwrap(), "node-a");
        assert_eq!(transport.config_get("monitor-count").await.unwrap(), "2");
        let ids = transport.relation_ids(RoleChannel::Mon).await.unwrap();
        assert_eq!(ids, vec![RelationId::new("mon:1")]);
        assert_eq!(
            transport.resolve_host("node-b").await.unwrap(),
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2))
        );
    }
}
