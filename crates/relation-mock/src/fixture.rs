use std::collections::BTreeMap;
use std::net::IpAddr;

use cephmon_relation::RoleChannel;
use serde::Deserialize;

/// One relation instance in a fixture file
#[derive(Debug, Deserialize)]
pub struct FixtureRelation {
    pub id: String,
    pub channel: RoleChannel,
    #[serde(default)]
    pub units: BTreeMap<String, BTreeMap<String, String>>,
}

/// Hook environment described as JSON, for dry runs
#[derive(Debug, Deserialize)]
pub struct Fixture {
    pub hostname: String,
    pub address: String,
    #[serde(default)]
    pub config: BTreeMap<String, String>,
    #[serde(default)]
    pub hosts: BTreeMap<String, IpAddr>,
    #[serde(default)]
    pub relations: Vec<FixtureRelation>,
}
