//! Relation transport backed by the Juju hook tools (`config-get`,
//! `relation-ids`, `relation-list`, `relation-get`, `relation-set`,
//! `unit-get`).
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::Error;

use std::net::IpAddr;

use async_trait::async_trait;
use cephmon_relation::{
    HostResolver, RelationId, RelationSettings, RelationTransport, RoleChannel, UnitId,
};
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, warn};

/// Severity levels accepted by `juju-log`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LogLevel {
    /// Informational.
    Info,

    /// Warning.
    Warning,

    /// Unrecoverable condition for this hook.
    Critical,
}

impl LogLevel {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
        }
    }
}

/// A client for the hook tools available while a hook is executing.
#[derive(Clone, Debug, Default)]
pub struct JujuTransport;

impl JujuTransport {
    /// Creates a new `JujuTransport`.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Mirrors a message into the model's debug log.
    ///
    /// Failures are logged locally and otherwise ignored.
    pub async fn juju_log(&self, level: LogLevel, message: &str) {
        let result = Command::new("juju-log")
            .args(["-l", level.as_str(), message])
            .status()
            .await;

        match result {
            Ok(status) if status.success() => {}
            Ok(status) => warn!("juju-log exited with {status}"),
            Err(e) => warn!("failed to run juju-log: {e}"),
        }
    }

    async fn run_json(tool: &'static str, args: &[&str]) -> Result<Value, Error> {
        debug!("running {tool} {args:?}");

        let output = Command::new(tool)
            .arg("--format=json")
            .args(args)
            .output()
            .await
            .map_err(|e| Error::Io(tool, e))?;

        if !output.status.success() {
            return Err(Error::NonZeroExit(tool, output.status));
        }

        let stdout = String::from_utf8(output.stdout)?;
        if stdout.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&stdout).map_err(|e| Error::Json(tool, e))
    }
}

/// Converts a hook tool scalar into the string form the controller expects.
///
/// Unset values (`null`) read as an empty string.
fn scalar_to_string(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    }
}

fn string_list(tool: &'static str, value: Value) -> Result<Vec<String>, Error> {
    if value.is_null() {
        return Ok(Vec::new());
    }

    serde_json::from_value(value).map_err(|e| Error::Json(tool, e))
}

fn pick_address(addrs: impl IntoIterator<Item = IpAddr>) -> Option<IpAddr> {
    let addrs: Vec<IpAddr> = addrs.into_iter().collect();

    addrs
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
}

#[async_trait]
impl HostResolver for JujuTransport {
    type Error = Error;

    async fn resolve_host(&self, host: &str) -> Result<IpAddr, Error> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(ip);
        }

        let addrs = tokio::net::lookup_host((host, 0))
            .await
            .map_err(|e| Error::Resolve(host.to_string(), e))?;

        pick_address(addrs.map(|addr| addr.ip())).ok_or_else(|| Error::NoAddress(host.to_string()))
    }
}

#[async_trait]
impl RelationTransport for JujuTransport {
    async fn config_get(&self, key: &str) -> Result<String, Error> {
        Self::run_json("config-get", &[key]).await.map(scalar_to_string)
    }

    async fn relation_ids(&self, channel: RoleChannel) -> Result<Vec<RelationId>, Error> {
        let value = Self::run_json("relation-ids", &[channel.as_str()]).await?;

        Ok(string_list("relation-ids", value)?
            .into_iter()
            .map(RelationId::new)
            .collect())
    }

    async fn relation_units(&self, relation_id: &RelationId) -> Result<Vec<UnitId>, Error> {
        let value = Self::run_json("relation-list", &["-r", relation_id.as_str()]).await?;

        Ok(string_list("relation-list", value)?
            .into_iter()
            .map(UnitId::new)
            .collect())
    }

    async fn relation_get(
        &self,
        relation_id: &RelationId,
        unit: &UnitId,
        key: &str,
    ) -> Result<Option<String>, Error> {
        let value =
            Self::run_json("relation-get", &["-r", relation_id.as_str(), key, unit.as_str()])
                .await?;

        Ok(Some(scalar_to_string(value)).filter(|s| !s.is_empty()))
    }

    async fn relation_set(
        &self,
        relation_id: &RelationId,
        settings: &RelationSettings,
    ) -> Result<(), Error> {
        let pairs: Vec<String> = settings.iter().map(|(k, v)| format!("{k}={v}")).collect();

        // settings carry secrets; only the keys are logged
        debug!(
            "running relation-set -r {relation_id} {:?}",
            settings.keys().collect::<Vec<_>>()
        );

        let status = Command::new("relation-set")
            .args(["-r", relation_id.as_str()])
            .args(&pairs)
            .status()
            .await
            .map_err(|e| Error::Io("relation-set", e))?;

        if !status.success() {
            return Err(Error::NonZeroExit("relation-set", status));
        }

        Ok(())
    }

    async fn local_unit_hostname(&self) -> Result<String, Error> {
        let hostname = nix::unistd::gethostname().map_err(Error::Hostname)?;

        Ok(hostname.to_string_lossy().into_owned())
    }

    async fn local_address(&self) -> Result<String, Error> {
        Self::run_json("unit-get", &["private-address"])
            .await
            .map(scalar_to_string)
    }
}

#[cfg(test)]
mod tests {
    use std::net::{Ipv4Addr, Ipv6Addr};

    use serde_json::json;

    use super::*;

    #[test]
    fn test_scalar_to_string() {
        assert_eq!(scalar_to_string(Value::Null), "");
        assert_eq!(scalar_to_string(json!("abc")), "abc");
        assert_eq!(scalar_to_string(json!(3)), "3");
        assert_eq!(scalar_to_string(json!(true)), "true");
    }

    #[test]
    fn test_string_list() {
        assert_eq!(
            string_list("relation-ids", json!(["osd:1", "osd:2"])).unwrap(),
            vec!["osd:1".to_string(), "osd:2".to_string()]
        );
        assert!(string_list("relation-ids", Value::Null).unwrap().is_empty());
        assert!(string_list("relation-ids", json!({"a": 1})).is_err());
    }

    #[test]
    fn test_pick_address_prefers_ipv4() {
        let v6 = IpAddr::V6(Ipv6Addr::LOCALHOST);
        let v4 = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));

        assert_eq!(pick_address([v6, v4]), Some(v4));
        assert_eq!(pick_address([v6]), Some(v6));
        assert_eq!(pick_address([]), None);
    }

    #[tokio::test]
    async fn test_resolve_address_literal() {
        let transport = JujuTransport::new();

        assert_eq!(
            transport.resolve_host("192.168.1.7").await.unwrap(),
            IpAddr::V4(Ipv4Addr::new(192, 168, 1, 7))
        );
    }
}
