use crate::error::DbError;
use configuration::StoreConfig;
use sqlx::AnyPool;
use sqlx::any::AnyPoolOptions;
use std::time::Duration;

/// Statements that bring up the schema. Each is idempotent and portable
/// between the postgres and sqlite drivers.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS tbl_cluster (
        cluster_name VARCHAR(255) PRIMARY KEY,
        config TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tbl_logic (
        logic_name VARCHAR(255) PRIMARY KEY,
        physic_clusters TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tbl_query_history (
        checksum VARCHAR(255) PRIMARY KEY,
        cluster VARCHAR(255) NOT NULL,
        query_sql TEXT NOT NULL,
        create_time BIGINT NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_query_history_cluster
        ON tbl_query_history (cluster, create_time)
    "#,
];

/// Establishes a connection pool to the configured store.
///
/// The driver is picked from the URL scheme, so the same pool type serves
/// postgres and sqlite. Pool limits come from the normalized `StoreConfig`.
pub async fn connect(config: &StoreConfig) -> Result<AnyPool, DbError> {
    sqlx::any::install_default_drivers();

    let config = config.clone().normalize();
    config.validate()?;
    let url = config.connection_url()?;

    let pool = AnyPoolOptions::new()
        .max_connections(config.max_open_conns)
        .min_connections(config.max_idle_conns)
        .idle_timeout(config.idle_timeout())
        .max_lifetime(config.max_lifetime())
        .acquire_timeout(Duration::from_secs(5))
        .connect(&url)
        .await?;

    tracing::info!(target = %config.redacted_target(), "Connected to the persistence store.");
    Ok(pool)
}

/// Creates the three record tables if they are absent.
pub async fn create_schema(pool: &AnyPool) -> Result<(), DbError> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    tracing::info!("Persistence schema is in place.");
    Ok(())
}
