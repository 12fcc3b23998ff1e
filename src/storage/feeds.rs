use chrono::{DateTime, Utc};

use super::schema::Database;
use super::types::{to_millis, Feed, FeedDbRow, FeedListing, FeedListingRow, StoreError};

const FEED_COLUMNS: &str = "id, name, url, user_id, last_fetched_at, created_at, updated_at";

impl Database {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// Register a feed owned by `user_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::FeedExists`] if another feed already uses `url`.
    pub async fn create_feed(
        &self,
        name: &str,
        url: &str,
        user_id: i64,
    ) -> Result<Feed, StoreError> {
        let now = to_millis(Utc::now());
        let sql = format!(
            "INSERT INTO feeds (name, url, user_id, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?) RETURNING {}",
            FEED_COLUMNS
        );
        let row = sqlx::query_as::<_, FeedDbRow>(&sql)
            .bind(name)
            .bind(url)
            .bind(user_id)
            .bind(now)
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                if StoreError::is_unique_violation(&e) {
                    StoreError::FeedExists(url.to_string())
                } else {
                    StoreError::Database(e)
                }
            })?;

        Ok(row.into_feed())
    }

    /// All feeds with the name of the user who added them
    pub async fn list_feeds(&self) -> Result<Vec<FeedListing>, StoreError> {
        let rows = sqlx::query_as::<_, FeedListingRow>(
            r#"
            SELECT f.name, f.url, u.name AS user_name, f.last_fetched_at
            FROM feeds f
            JOIN users u ON u.id = f.user_id
            ORDER BY f.name, f.id
        "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(FeedListing::from).collect())
    }

    pub async fn get_feed_by_url(&self, url: &str) -> Result<Feed, StoreError> {
        let sql = format!("SELECT {} FROM feeds WHERE url = ?", FEED_COLUMNS);
        sqlx::query_as::<_, FeedDbRow>(&sql)
            .bind(url)
            .fetch_optional(&self.pool)
            .await?
            .map(FeedDbRow::into_feed)
            .ok_or(StoreError::NotFound)
    }

    // ========================================================================
    // Polling Operations
    // ========================================================================

    /// The feed whose `last_fetched_at` is oldest, never-fetched feeds first.
    ///
    /// Ties are broken by id so selection is deterministic.
    pub async fn next_overdue_feed(&self) -> Result<Option<Feed>, StoreError> {
        let sql = format!(
            "SELECT {} FROM feeds ORDER BY last_fetched_at ASC NULLS FIRST, id ASC LIMIT 1",
            FEED_COLUMNS
        );
        let row = sqlx::query_as::<_, FeedDbRow>(&sql)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(FeedDbRow::into_feed))
    }

    /// Record a fetch attempt. Unconditional: the caller marks before fetching.
    pub async fn mark_fetched(&self, feed_id: i64, at: DateTime<Utc>) -> Result<(), StoreError> {
        let at = to_millis(at);
        let result =
            sqlx::query("UPDATE feeds SET last_fetched_at = ?, updated_at = ? WHERE id = ?")
                .bind(at)
                .bind(at)
                .bind(feed_id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}
