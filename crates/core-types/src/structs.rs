use crate::enums::AuthMethod;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The physical clusters grouped under one logic cluster. Order carries no meaning.
pub type PhysicalClusters = BTreeSet<String>;

/// A single replica (host) inside a shard.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Replica {
    pub ip: String,
    #[serde(default)]
    pub hostname: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Shard {
    pub replicas: Vec<Replica>,
}

/// The full configuration document of one physical cluster.
///
/// This is what gets persisted as the cluster config blob. `password` and
/// `ssh_password` are plaintext while the value is in memory; the store only
/// ever writes their encoded form.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Unique cluster name, used as the record key.
    pub cluster: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub http_port: u16,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub shards: Vec<Shard>,
    #[serde(default)]
    pub is_replica: bool,
    #[serde(default)]
    pub zk_nodes: Vec<String>,
    #[serde(default)]
    pub zk_port: u16,
    #[serde(default)]
    pub ssh_user: String,
    #[serde(default)]
    pub ssh_password: String,
    #[serde(default)]
    pub ssh_port: u16,
    #[serde(default)]
    pub auth_method: AuthMethod,
    /// Logic cluster this physical cluster belongs to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logic_cluster: Option<String>,
    #[serde(default)]
    pub mode: String,
}

impl ClusterConfig {
    /// Creates a config with just a name; everything else defaulted.
    pub fn new(cluster: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
            ..Default::default()
        }
    }
}

/// One executed query, kept for the query console history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryHistory {
    /// Content hash of the query text; the record key.
    pub checksum: String,
    pub cluster: String,
    pub query_sql: String,
    /// Assigned by the store when the entry is written.
    pub create_time: DateTime<Utc>,
}

impl QueryHistory {
    /// Builds an entry to hand to the store. `create_time` is a placeholder
    /// that the store replaces on create and update.
    pub fn new(
        checksum: impl Into<String>,
        cluster: impl Into<String>,
        query_sql: impl Into<String>,
    ) -> Self {
        Self {
            checksum: checksum.into(),
            cluster: cluster.into(),
            query_sql: query_sql.into(),
            create_time: DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_blob_tolerates_missing_fields() {
        let conf: ClusterConfig =
            serde_json::from_str(r#"{"cluster":"prod","password":"x"}"#).unwrap();
        assert_eq!(conf.cluster, "prod");
        assert_eq!(conf.password, "x");
        assert_eq!(conf.auth_method, AuthMethod::Password);
        assert!(conf.logic_cluster.is_none());
    }
}
