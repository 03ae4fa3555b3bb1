use sqlx::QueryBuilder;

use super::schema::Database;
use super::types::{DatabaseError, StoredFeed};
use crate::feed::Feed;

impl Database {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// All stored feeds, favorites first, then in subscription order.
    pub async fn get_feeds(&self) -> Result<Vec<StoredFeed>, DatabaseError> {
        let feeds = sqlx::query_as::<_, StoredFeed>(
            r#"
                SELECT url, is_favorite, title, description, image_url
                FROM feeds
                ORDER BY is_favorite DESC, added_at, id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(feeds)
    }

    /// Look up one feed by URL.
    pub async fn get_feed(&self, url: &str) -> Result<Option<StoredFeed>, DatabaseError> {
        let feed = sqlx::query_as::<_, StoredFeed>(
            "SELECT url, is_favorite, title, description, image_url FROM feeds WHERE url = ?",
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;
        Ok(feed)
    }

    /// Subscribe to a feed.
    ///
    /// Returns `false` when the URL is already stored; the existing row is
    /// left as it is.
    pub async fn insert_feed(&self, feed: &StoredFeed) -> Result<bool, DatabaseError> {
        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query(
            r#"
                INSERT INTO feeds (url, title, description, image_url, is_favorite, added_at)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(url) DO NOTHING
            "#,
        )
        .bind(&feed.url)
        .bind(&feed.title)
        .bind(&feed.description)
        .bind(&feed.image_url)
        .bind(feed.is_favorite)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Upsert a batch of feeds in one transaction.
    ///
    /// Inserts in chunks of 100 rows. Existing rows get the new header and
    /// favorite flag but keep their `added_at`.
    pub async fn save_feeds(&self, feeds: &[StoredFeed]) -> Result<(), DatabaseError> {
        if feeds.is_empty() {
            return Ok(());
        }

        const BATCH_SIZE: usize = 100;
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        for chunk in feeds.chunks(BATCH_SIZE) {
            let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
                "INSERT INTO feeds (url, title, description, image_url, is_favorite, added_at) ",
            );

            builder.push_values(chunk, |mut b, feed| {
                b.push_bind(&feed.url)
                    .push_bind(&feed.title)
                    .push_bind(&feed.description)
                    .push_bind(&feed.image_url)
                    .push_bind(feed.is_favorite)
                    .push_bind(now);
            });

            builder.push(
                " ON CONFLICT(url) DO UPDATE SET title = excluded.title, \
                 description = excluded.description, image_url = excluded.image_url, \
                 is_favorite = excluded.is_favorite",
            );

            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        tracing::debug!(count = feeds.len(), "Saved feeds");
        Ok(())
    }

    /// Unsubscribe. Seen-entry records of the feed go with it.
    pub async fn delete_feed(&self, url: &str) -> Result<(), DatabaseError> {
        let result = sqlx::query("DELETE FROM feeds WHERE url = ?")
            .bind(url)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(url.to_string()));
        }
        Ok(())
    }

    pub async fn set_favorite(&self, url: &str, is_favorite: bool) -> Result<(), DatabaseError> {
        let result = sqlx::query("UPDATE feeds SET is_favorite = ? WHERE url = ?")
            .bind(is_favorite)
            .bind(url)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(url.to_string()));
        }
        Ok(())
    }

    /// Store the header of a freshly parsed feed.
    ///
    /// The stored favorite flag is never changed here.
    pub async fn update_feed_header(&self, feed: &Feed) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            "UPDATE feeds SET title = ?, description = ?, image_url = ? WHERE url = ?",
        )
        .bind(&feed.title)
        .bind(&feed.description)
        .bind(&feed.image_url)
        .bind(&feed.source_url)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(feed.source_url.clone()));
        }
        Ok(())
    }
}
