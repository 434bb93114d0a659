//! Row representations of the three record types and the conversions between
//! them and the domain entities.

use crate::codec::PasswordCodec;
use crate::error::DbError;
use chrono::{DateTime, Utc};
use core_types::{
    ClusterConfig, PHYSICAL_DELIMITER, PhysicalClusters, QueryHistory, validate_name,
    validate_physical_clusters,
};
use sqlx::FromRow;

/// A row of `tbl_cluster`. `config` holds the JSON blob with encoded passwords.
#[derive(Debug, Clone, FromRow)]
pub struct ClusterRow {
    pub cluster_name: String,
    pub config: String,
}

impl ClusterRow {
    /// Encodes the secrets on a copy of `conf` and serializes it.
    pub fn encode(conf: &ClusterConfig, codec: &dyn PasswordCodec) -> Result<Self, DbError> {
        validate_name("cluster", &conf.cluster)?;
        let encoded = codec.encode(conf)?;
        Ok(Self {
            cluster_name: encoded.cluster.clone(),
            config: serde_json::to_string(&encoded)?,
        })
    }

    /// Deserializes the blob and decodes the secrets.
    pub fn decode(&self, codec: &dyn PasswordCodec) -> Result<ClusterConfig, DbError> {
        let stored: ClusterConfig = serde_json::from_str(&self.config)?;
        Ok(codec.decode(&stored)?)
    }
}

/// A row of `tbl_logic`.
#[derive(Debug, Clone, FromRow)]
pub struct LogicRow {
    pub logic_name: String,
    pub physic_clusters: String,
}

impl LogicRow {
    pub fn encode(logic: &str, physics: &PhysicalClusters) -> Result<Self, DbError> {
        validate_name("logic cluster", logic)?;
        validate_physical_clusters(physics)?;
        Ok(Self {
            logic_name: logic.to_string(),
            physic_clusters: join_physics(physics),
        })
    }

    pub fn physics(&self) -> PhysicalClusters {
        split_physics(&self.physic_clusters)
    }
}

/// A row of `tbl_query_history`. `create_time` is microseconds since the epoch.
#[derive(Debug, Clone, FromRow)]
pub struct HistoryRow {
    pub checksum: String,
    pub cluster: String,
    pub query_sql: String,
    pub create_time: i64,
}

impl HistoryRow {
    /// Builds the row to write, stamping it with `create_time` instead of the
    /// entry's own timestamp.
    pub fn stamped(entry: &QueryHistory, create_time: i64) -> Result<Self, DbError> {
        validate_name("checksum", &entry.checksum)?;
        Ok(Self {
            checksum: entry.checksum.clone(),
            cluster: entry.cluster.clone(),
            query_sql: entry.query_sql.clone(),
            create_time,
        })
    }
}

impl From<HistoryRow> for QueryHistory {
    fn from(row: HistoryRow) -> Self {
        QueryHistory {
            checksum: row.checksum,
            cluster: row.cluster,
            query_sql: row.query_sql,
            create_time: micros_to_datetime(row.create_time),
        }
    }
}

pub fn join_physics(physics: &PhysicalClusters) -> String {
    let mut joined = String::new();
    for (i, name) in physics.iter().enumerate() {
        if i > 0 {
            joined.push(PHYSICAL_DELIMITER);
        }
        joined.push_str(name);
    }
    joined
}

pub fn split_physics(joined: &str) -> PhysicalClusters {
    joined
        .split(PHYSICAL_DELIMITER)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn micros_to_datetime(micros: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(micros).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ObscuringCodec;

    fn physics(names: &[&str]) -> PhysicalClusters {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn cluster_blob_never_holds_plaintext() {
        let codec = ObscuringCodec::default();
        let mut conf = ClusterConfig::new("prod");
        conf.password = "secret".to_string();

        let row = ClusterRow::encode(&conf, &codec).unwrap();
        assert_eq!(row.cluster_name, "prod");
        assert!(!row.config.contains("secret"));
        assert_eq!(conf.password, "secret");
        assert_eq!(row.decode(&codec).unwrap(), conf);
    }

    #[test]
    fn unnamed_cluster_is_rejected() {
        let codec = ObscuringCodec::default();
        let err = ClusterRow::encode(&ClusterConfig::default(), &codec).unwrap_err();
        assert!(matches!(err, DbError::InvalidRecord(_)));
    }

    #[test]
    fn physics_join_is_order_independent() {
        let a = LogicRow::encode("lg1", &physics(&["p2", "p1"])).unwrap();
        let b = LogicRow::encode("lg1", &physics(&["p1", "p2"])).unwrap();
        assert_eq!(a.physic_clusters, "p1,p2");
        assert_eq!(a.physic_clusters, b.physic_clusters);
        assert_eq!(a.physics(), physics(&["p1", "p2"]));
    }

    #[test]
    fn split_skips_empty_segments() {
        assert_eq!(split_physics("p1,,p2,"), physics(&["p1", "p2"]));
        assert!(split_physics("").is_empty());
    }

    #[test]
    fn history_row_ignores_caller_timestamp() {
        let mut entry = QueryHistory::new("abc", "prod", "SELECT 1");
        entry.create_time = micros_to_datetime(42);
        let row = HistoryRow::stamped(&entry, 1_700_000_000_000_000).unwrap();
        let back = QueryHistory::from(row);
        assert_eq!(back.create_time.timestamp(), 1_700_000_000);
        assert_eq!(back.checksum, "abc");
    }
}
