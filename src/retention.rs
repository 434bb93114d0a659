use database::{DbError, Persistent};

/// Deletes the oldest query history entries until at most `keep` remain.
///
/// Built from independent `count`, `earliest` and `delete` calls, so entries
/// written concurrently may leave the table slightly above `keep`. Returns the
/// number of entries removed.
pub async fn trim_history<P: Persistent + ?Sized>(
    store: &mut P,
    keep: i64,
) -> Result<u64, DbError> {
    let excess = store.get_query_history_count().await - keep;
    let mut removed = 0;
    for _ in 0..excess.max(0) {
        let earliest = match store.get_earliest_query().await {
            Ok(entry) => entry,
            Err(DbError::NotFound) => break,
            Err(e) => return Err(e),
        };
        store.delete_query_history(&earliest.checksum).await?;
        tracing::debug!(checksum = %earliest.checksum, "Evicted query history entry.");
        removed += 1;
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use configuration::StoreConfig;
    use core_types::QueryHistory;
    use database::{ObscuringCodec, SqlPersistent};

    #[tokio::test]
    async fn test_trim_keeps_newest_entries() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = StoreConfig::sqlite(dir.path().join("store.db"));
        let mut store = SqlPersistent::init(&config, ObscuringCodec::default())
            .await
            .unwrap();

        for i in 0..5 {
            let entry = QueryHistory::new(format!("q{i}"), "prod", "SELECT 1");
            store.create_query_history(&entry).await.unwrap();
        }

        assert_eq!(trim_history(&mut store, 2).await.unwrap(), 3);
        let mut left: Vec<_> = store.get_all_query_history().await.unwrap().into_keys().collect();
        left.sort();
        assert_eq!(left, vec!["q3".to_string(), "q4".to_string()]);

        assert_eq!(trim_history(&mut store, 10).await.unwrap(), 0);
    }
}
