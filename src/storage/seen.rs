use std::collections::HashSet;

use sqlx::QueryBuilder;

use super::schema::Database;
use super::types::DatabaseError;

impl Database {
    /// Record entry fingerprints as seen for a stored feed.
    ///
    /// Already-recorded fingerprints are ignored. Returns the number of new
    /// records.
    pub async fn mark_entries_seen(
        &self,
        feed_url: &str,
        fingerprints: &[String],
    ) -> Result<u64, DatabaseError> {
        if fingerprints.is_empty() {
            return Ok(0);
        }
        if self.get_feed(feed_url).await?.is_none() {
            return Err(DatabaseError::NotFound(feed_url.to_string()));
        }

        const BATCH_SIZE: usize = 100;
        let now = chrono::Utc::now().timestamp();
        let mut inserted = 0;
        let mut tx = self.pool.begin().await?;

        for chunk in fingerprints.chunks(BATCH_SIZE) {
            let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
                "INSERT OR IGNORE INTO seen_entries (feed_url, fingerprint, seen_at) ",
            );
            builder.push_values(chunk, |mut b, fingerprint| {
                b.push_bind(feed_url).push_bind(fingerprint).push_bind(now);
            });
            inserted += builder.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    }

    /// Fingerprints previously recorded for `feed_url`.
    pub async fn seen_fingerprints(&self, feed_url: &str) -> Result<HashSet<String>, DatabaseError> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT fingerprint FROM seen_entries WHERE feed_url = ?")
                .bind(feed_url)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(f,)| f).collect())
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{Database, DatabaseError, StoredFeed};

    const URL: &str = "https://example.com/rss";

    async fn db_with_feed() -> Database {
        let db = Database::open(":memory:").await.unwrap();
        db.insert_feed(&StoredFeed::new(URL)).await.unwrap();
        db
    }

    #[tokio::test]
    async fn test_mark_and_read_back() {
        let db = db_with_feed().await;
        let inserted = db
            .mark_entries_seen(URL, &["a".into(), "b".into()])
            .await
            .unwrap();
        assert_eq!(inserted, 2);

        let seen = db.seen_fingerprints(URL).await.unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen.contains("a"));
        assert!(seen.contains("b"));
    }

    #[tokio::test]
    async fn test_marking_twice_is_ignored() {
        let db = db_with_feed().await;
        db.mark_entries_seen(URL, &["a".into()]).await.unwrap();
        let inserted = db
            .mark_entries_seen(URL, &["a".into(), "c".into()])
            .await
            .unwrap();
        assert_eq!(inserted, 1);
        assert_eq!(db.seen_fingerprints(URL).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_feed_rejected() {
        let db = db_with_feed().await;
        let result = db
            .mark_entries_seen("https://other.example.com", &["a".into()])
            .await;
        assert!(matches!(result, Err(DatabaseError::NotFound(_))));
        assert_eq!(db.mark_entries_seen("https://other.example.com", &[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_feed_cascades() {
        let db = db_with_feed().await;
        db.mark_entries_seen(URL, &["a".into()]).await.unwrap();
        db.delete_feed(URL).await.unwrap();
        assert!(db.seen_fingerprints(URL).await.unwrap().is_empty());
    }
}
