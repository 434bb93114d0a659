use crate::codec::PasswordCodec;
use crate::connection::{connect, create_schema};
use crate::error::{DbError, TransactionStateError};
use crate::mapper::{ClusterRow, HistoryRow, LogicRow};
use async_trait::async_trait;
use chrono::Utc;
use configuration::StoreConfig;
use core_types::{ClusterConfig, PhysicalClusters, QueryHistory};
use sqlx::AnyConnection;
use sqlx::pool::PoolConnection;
use sqlx::{Any, AnyPool, Transaction};
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};

/// Maximum number of entries returned by [`Persistent::get_query_history_by_cluster`].
pub const QUERY_HISTORY_PAGE_LIMIT: i64 = 100;

/// The persistence contract for cluster configs, logic cluster mappings and
/// query history.
///
/// Every operation works in both transaction states. Inside a transaction its
/// effects are visible to later operations on the same handle but are not
/// durable until [`Persistent::commit`]. A failed operation does not roll the
/// transaction back; the caller decides.
#[async_trait]
pub trait Persistent: Send {
    async fn begin(&mut self) -> Result<(), DbError>;
    async fn commit(&mut self) -> Result<(), DbError>;
    async fn rollback(&mut self) -> Result<(), DbError>;
    fn in_transaction(&self) -> bool;

    /// Never fails: any lookup error counts as "does not exist".
    async fn cluster_exists(&mut self, cluster: &str) -> bool;
    async fn get_cluster_by_name(&mut self, cluster: &str) -> Result<ClusterConfig, DbError>;
    async fn get_all_clusters(&mut self) -> Result<HashMap<String, ClusterConfig>, DbError>;
    async fn create_cluster(&mut self, conf: &ClusterConfig) -> Result<(), DbError>;
    async fn update_cluster(&mut self, conf: &ClusterConfig) -> Result<(), DbError>;
    /// Deleting a cluster that does not exist is not an error.
    async fn delete_cluster(&mut self, cluster: &str) -> Result<(), DbError>;

    async fn logic_cluster_exists(&mut self, logic: &str) -> bool;
    async fn get_logic_cluster_by_name(&mut self, logic: &str)
    -> Result<PhysicalClusters, DbError>;
    async fn get_all_logic_clusters(&mut self)
    -> Result<HashMap<String, PhysicalClusters>, DbError>;
    async fn create_logic_cluster(
        &mut self,
        logic: &str,
        physics: &PhysicalClusters,
    ) -> Result<(), DbError>;
    async fn update_logic_cluster(
        &mut self,
        logic: &str,
        physics: &PhysicalClusters,
    ) -> Result<(), DbError>;
    async fn delete_logic_cluster(&mut self, logic: &str) -> Result<(), DbError>;

    async fn get_all_query_history(&mut self) -> Result<HashMap<String, QueryHistory>, DbError>;
    /// Newest first, at most [`QUERY_HISTORY_PAGE_LIMIT`] entries.
    async fn get_query_history_by_cluster(
        &mut self,
        cluster: &str,
    ) -> Result<Vec<QueryHistory>, DbError>;
    async fn get_query_history_by_checksum(
        &mut self,
        checksum: &str,
    ) -> Result<QueryHistory, DbError>;
    /// The stored `create_time` is assigned here; the entry's own value is ignored.
    async fn create_query_history(&mut self, entry: &QueryHistory) -> Result<(), DbError>;
    async fn update_query_history(&mut self, entry: &QueryHistory) -> Result<(), DbError>;
    async fn delete_query_history(&mut self, checksum: &str) -> Result<(), DbError>;
    /// Returns 0 when the backend fails.
    async fn get_query_history_count(&mut self) -> i64;
    async fn get_earliest_query(&mut self) -> Result<QueryHistory, DbError>;
}

/// Where data operations currently run.
enum Session {
    Detached {
        pool: AnyPool,
    },
    InTransaction {
        tx: Transaction<'static, Any>,
        parent: AnyPool,
    },
}

/// A connection borrowed for the duration of one operation.
enum Conn<'a> {
    Pooled(PoolConnection<Any>),
    Tx(&'a mut AnyConnection),
}

impl Deref for Conn<'_> {
    type Target = AnyConnection;

    fn deref(&self) -> &AnyConnection {
        match self {
            Conn::Pooled(conn) => &**conn,
            Conn::Tx(conn) => &**conn,
        }
    }
}

impl DerefMut for Conn<'_> {
    fn deref_mut(&mut self) -> &mut AnyConnection {
        match self {
            Conn::Pooled(conn) => &mut **conn,
            Conn::Tx(conn) => &mut **conn,
        }
    }
}

/// The relational implementation of [`Persistent`], usable with any driver
/// the connection URL selects.
///
/// One handle carries at most one transaction at a time; `begin`, `commit` and
/// `rollback` take `&mut self`, so sharing a handle across tasks needs
/// external synchronisation.
pub struct SqlPersistent {
    session: Session,
    codec: Box<dyn PasswordCodec>,
    /// Last `create_time` handed out, in microseconds.
    last_stamp: i64,
}

impl std::fmt::Debug for SqlPersistent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlPersistent")
            .field("in_transaction", &self.in_transaction())
            .finish_non_exhaustive()
    }
}

impl SqlPersistent {
    /// Wraps an existing pool. The schema is assumed to exist.
    pub fn new(pool: AnyPool, codec: impl PasswordCodec + 'static) -> Self {
        Self {
            session: Session::Detached { pool },
            codec: Box::new(codec),
            last_stamp: 0,
        }
    }

    /// Connects to the configured store and creates the schema if absent.
    pub async fn init(config: &StoreConfig, codec: impl PasswordCodec + 'static) -> Result<Self, DbError> {
        let pool = connect(config).await?;
        create_schema(&pool).await?;
        Ok(Self::new(pool, codec))
    }

    /// Closes the pool. An open transaction is rolled back.
    pub async fn close(self) {
        match self.session {
            Session::Detached { pool } => pool.close().await,
            Session::InTransaction { tx, parent } => {
                if let Err(e) = tx.rollback().await {
                    tracing::warn!(error = %e, "Rollback on close failed.");
                }
                parent.close().await;
            }
        }
    }

    async fn conn(&mut self) -> Result<Conn<'_>, DbError> {
        match &mut self.session {
            Session::Detached { pool } => Ok(Conn::Pooled(pool.acquire().await?)),
            Session::InTransaction { tx, .. } => Ok(Conn::Tx(&mut **tx)),
        }
    }

    /// Leaves the transaction state, handing back the transaction to finish.
    fn detach(&mut self) -> Result<Transaction<'static, Any>, DbError> {
        let parent = match &self.session {
            Session::InTransaction { parent, .. } => parent.clone(),
            Session::Detached { .. } => return Err(TransactionStateError::NotInTransaction.into()),
        };
        match std::mem::replace(&mut self.session, Session::Detached { pool: parent }) {
            Session::InTransaction { tx, .. } => Ok(tx),
            Session::Detached { .. } => Err(TransactionStateError::NotInTransaction.into()),
        }
    }

    /// Next creation stamp: wall clock, but always after the previous one.
    fn next_stamp(&mut self) -> i64 {
        let now = Utc::now().timestamp_micros();
        self.last_stamp = now.max(self.last_stamp + 1);
        self.last_stamp
    }
}

#[async_trait]
impl Persistent for SqlPersistent {
    async fn begin(&mut self) -> Result<(), DbError> {
        let pool = match &self.session {
            Session::Detached { pool } => pool.clone(),
            Session::InTransaction { .. } => {
                return Err(TransactionStateError::AlreadyInTransaction.into());
            }
        };
        let tx = pool.begin().await?;
        self.session = Session::InTransaction { tx, parent: pool };
        tracing::info!("Transaction started.");
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), DbError> {
        let tx = self.detach()?;
        tx.commit().await?;
        tracing::info!("Transaction committed.");
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DbError> {
        let tx = self.detach()?;
        tx.rollback().await?;
        tracing::info!("Transaction rolled back.");
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        matches!(self.session, Session::InTransaction { .. })
    }

    // --- Cluster configs ---

    async fn cluster_exists(&mut self, cluster: &str) -> bool {
        match self.get_cluster_by_name(cluster).await {
            Ok(_) => true,
            Err(DbError::NotFound) => false,
            Err(e) => {
                tracing::warn!(cluster, error = %e, "Cluster lookup failed; treating as absent.");
                false
            }
        }
    }

    async fn get_cluster_by_name(&mut self, cluster: &str) -> Result<ClusterConfig, DbError> {
        let mut conn = self.conn().await?;
        let row = sqlx::query_as::<_, ClusterRow>(
            "SELECT cluster_name, config FROM tbl_cluster WHERE cluster_name = $1",
        )
        .bind(cluster)
        .fetch_one(&mut *conn)
        .await?;
        drop(conn);
        row.decode(self.codec.as_ref())
    }

    async fn get_all_clusters(&mut self) -> Result<HashMap<String, ClusterConfig>, DbError> {
        let mut conn = self.conn().await?;
        let rows = sqlx::query_as::<_, ClusterRow>("SELECT cluster_name, config FROM tbl_cluster")
            .fetch_all(&mut *conn)
            .await
            .or_else(empty_on_no_rows)?;
        drop(conn);

        let mut clusters = HashMap::with_capacity(rows.len());
        for row in rows {
            let conf = row.decode(self.codec.as_ref())?;
            clusters.insert(row.cluster_name, conf);
        }
        Ok(clusters)
    }

    async fn create_cluster(&mut self, conf: &ClusterConfig) -> Result<(), DbError> {
        let row = ClusterRow::encode(conf, self.codec.as_ref())?;
        if self.cluster_exists(&conf.cluster).await {
            return Err(DbError::AlreadyExists);
        }
        let mut conn = self.conn().await?;
        sqlx::query("INSERT INTO tbl_cluster (cluster_name, config) VALUES ($1, $2)")
            .bind(&row.cluster_name)
            .bind(&row.config)
            .execute(&mut *conn)
            .await?;
        tracing::debug!(cluster = %row.cluster_name, "Cluster config created.");
        Ok(())
    }

    async fn update_cluster(&mut self, conf: &ClusterConfig) -> Result<(), DbError> {
        let row = ClusterRow::encode(conf, self.codec.as_ref())?;
        if !self.cluster_exists(&conf.cluster).await {
            return Err(DbError::NotFound);
        }
        let mut conn = self.conn().await?;
        sqlx::query("UPDATE tbl_cluster SET config = $1 WHERE cluster_name = $2")
            .bind(&row.config)
            .bind(&row.cluster_name)
            .execute(&mut *conn)
            .await?;
        tracing::debug!(cluster = %row.cluster_name, "Cluster config updated.");
        Ok(())
    }

    async fn delete_cluster(&mut self, cluster: &str) -> Result<(), DbError> {
        let mut conn = self.conn().await?;
        let result = sqlx::query("DELETE FROM tbl_cluster WHERE cluster_name = $1")
            .bind(cluster)
            .execute(&mut *conn)
            .await?;
        tracing::debug!(cluster, rows = result.rows_affected(), "Cluster config deleted.");
        Ok(())
    }

    // --- Logic clusters ---

    async fn logic_cluster_exists(&mut self, logic: &str) -> bool {
        match self.get_logic_cluster_by_name(logic).await {
            Ok(_) => true,
            Err(DbError::NotFound) => false,
            Err(e) => {
                tracing::warn!(logic, error = %e, "Logic cluster lookup failed; treating as absent.");
                false
            }
        }
    }

    async fn get_logic_cluster_by_name(
        &mut self,
        logic: &str,
    ) -> Result<PhysicalClusters, DbError> {
        let mut conn = self.conn().await?;
        let row = sqlx::query_as::<_, LogicRow>(
            "SELECT logic_name, physic_clusters FROM tbl_logic WHERE logic_name = $1",
        )
        .bind(logic)
        .fetch_one(&mut *conn)
        .await?;
        Ok(row.physics())
    }

    async fn get_all_logic_clusters(
        &mut self,
    ) -> Result<HashMap<String, PhysicalClusters>, DbError> {
        let mut conn = self.conn().await?;
        let rows =
            sqlx::query_as::<_, LogicRow>("SELECT logic_name, physic_clusters FROM tbl_logic")
                .fetch_all(&mut *conn)
                .await
                .or_else(empty_on_no_rows)?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let physics = row.physics();
                (row.logic_name, physics)
            })
            .collect())
    }

    async fn create_logic_cluster(
        &mut self,
        logic: &str,
        physics: &PhysicalClusters,
    ) -> Result<(), DbError> {
        let row = LogicRow::encode(logic, physics)?;
        if self.logic_cluster_exists(logic).await {
            return Err(DbError::AlreadyExists);
        }
        let mut conn = self.conn().await?;
        sqlx::query("INSERT INTO tbl_logic (logic_name, physic_clusters) VALUES ($1, $2)")
            .bind(&row.logic_name)
            .bind(&row.physic_clusters)
            .execute(&mut *conn)
            .await?;
        tracing::debug!(logic, physics = %row.physic_clusters, "Logic cluster created.");
        Ok(())
    }

    async fn update_logic_cluster(
        &mut self,
        logic: &str,
        physics: &PhysicalClusters,
    ) -> Result<(), DbError> {
        let row = LogicRow::encode(logic, physics)?;
        if !self.logic_cluster_exists(logic).await {
            return Err(DbError::NotFound);
        }
        let mut conn = self.conn().await?;
        sqlx::query("UPDATE tbl_logic SET physic_clusters = $1 WHERE logic_name = $2")
            .bind(&row.physic_clusters)
            .bind(&row.logic_name)
            .execute(&mut *conn)
            .await?;
        tracing::debug!(logic, physics = %row.physic_clusters, "Logic cluster updated.");
        Ok(())
    }

    async fn delete_logic_cluster(&mut self, logic: &str) -> Result<(), DbError> {
        let mut conn = self.conn().await?;
        let result = sqlx::query("DELETE FROM tbl_logic WHERE logic_name = $1")
            .bind(logic)
            .execute(&mut *conn)
            .await?;
        tracing::debug!(logic, rows = result.rows_affected(), "Logic cluster deleted.");
        Ok(())
    }

    // --- Query history ---

    async fn get_all_query_history(&mut self) -> Result<HashMap<String, QueryHistory>, DbError> {
        let mut conn = self.conn().await?;
        let rows = sqlx::query_as::<_, HistoryRow>(
            "SELECT checksum, cluster, query_sql, create_time FROM tbl_query_history",
        )
        .fetch_all(&mut *conn)
        .await
        .or_else(empty_on_no_rows)?;
        Ok(rows
            .into_iter()
            .map(|row| (row.checksum.clone(), QueryHistory::from(row)))
            .collect())
    }

    async fn get_query_history_by_cluster(
        &mut self,
        cluster: &str,
    ) -> Result<Vec<QueryHistory>, DbError> {
        let mut conn = self.conn().await?;
        let rows = sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT checksum, cluster, query_sql, create_time
            FROM tbl_query_history
            WHERE cluster = $1
            ORDER BY create_time DESC
            LIMIT $2
            "#,
        )
        .bind(cluster)
        .bind(QUERY_HISTORY_PAGE_LIMIT)
        .fetch_all(&mut *conn)
        .await
        .or_else(empty_on_no_rows)?;
        Ok(rows.into_iter().map(QueryHistory::from).collect())
    }

    async fn get_query_history_by_checksum(
        &mut self,
        checksum: &str,
    ) -> Result<QueryHistory, DbError> {
        let mut conn = self.conn().await?;
        let row = sqlx::query_as::<_, HistoryRow>(
            "SELECT checksum, cluster, query_sql, create_time FROM tbl_query_history WHERE checksum = $1",
        )
        .bind(checksum)
        .fetch_one(&mut *conn)
        .await?;
        Ok(row.into())
    }

    async fn create_query_history(&mut self, entry: &QueryHistory) -> Result<(), DbError> {
        let stamp = self.next_stamp();
        let row = HistoryRow::stamped(entry, stamp)?;
        let mut conn = self.conn().await?;
        sqlx::query(
            "INSERT INTO tbl_query_history (checksum, cluster, query_sql, create_time) VALUES ($1, $2, $3, $4)",
        )
        .bind(&row.checksum)
        .bind(&row.cluster)
        .bind(&row.query_sql)
        .bind(row.create_time)
        .execute(&mut *conn)
        .await?;
        tracing::debug!(checksum = %row.checksum, cluster = %row.cluster, "Query history recorded.");
        Ok(())
    }

    async fn update_query_history(&mut self, entry: &QueryHistory) -> Result<(), DbError> {
        let stamp = self.next_stamp();
        let row = HistoryRow::stamped(entry, stamp)?;
        let mut conn = self.conn().await?;
        let result = sqlx::query(
            "UPDATE tbl_query_history SET cluster = $1, query_sql = $2, create_time = $3 WHERE checksum = $4",
        )
        .bind(&row.cluster)
        .bind(&row.query_sql)
        .bind(row.create_time)
        .bind(&row.checksum)
        .execute(&mut *conn)
        .await?;
        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound.into());
        }
        tracing::debug!(checksum = %row.checksum, "Query history updated.");
        Ok(())
    }

    async fn delete_query_history(&mut self, checksum: &str) -> Result<(), DbError> {
        let mut conn = self.conn().await?;
        let result = sqlx::query("DELETE FROM tbl_query_history WHERE checksum = $1")
            .bind(checksum)
            .execute(&mut *conn)
            .await?;
        tracing::debug!(checksum, rows = result.rows_affected(), "Query history deleted.");
        Ok(())
    }

    async fn get_query_history_count(&mut self) -> i64 {
        let count = match self.conn().await {
            Ok(mut conn) => {
                sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM tbl_query_history")
                    .fetch_one(&mut *conn)
                    .await
                    .map_err(DbError::from)
            }
            Err(e) => Err(e),
        };
        count.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Counting query history failed; reporting 0.");
            0
        })
    }

    async fn get_earliest_query(&mut self) -> Result<QueryHistory, DbError> {
        let mut conn = self.conn().await?;
        let row = sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT checksum, cluster, query_sql, create_time
            FROM tbl_query_history
            ORDER BY create_time ASC
            LIMIT 1
            "#,
        )
        .fetch_one(&mut *conn)
        .await?;
        Ok(row.into())
    }
}

/// Bulk reads treat the driver's "no rows" signal as an empty result.
fn empty_on_no_rows<T>(err: sqlx::Error) -> Result<Vec<T>, DbError> {
    match err {
        sqlx::Error::RowNotFound => Ok(Vec::new()),
        other => Err(other.into()),
    }
}

