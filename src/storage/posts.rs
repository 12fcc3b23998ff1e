use chrono::Utc;

use super::schema::Database;
use super::types::{to_millis, InsertOutcome, NewPost, Post, PostDbRow, StoreError};

impl Database {
    // ========================================================================
    // Post Operations
    // ========================================================================

    /// Insert a post, classifying a URL collision as [`InsertOutcome::DuplicateUrl`].
    ///
    /// The URL is unique across all feeds, so a post already stored under a
    /// different feed is still a duplicate.
    pub async fn insert_post(&self, post: &NewPost) -> Result<InsertOutcome, StoreError> {
        let now = to_millis(Utc::now());
        let result = sqlx::query(
            r#"
            INSERT INTO posts (feed_id, title, url, description, published_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
        )
        .bind(post.feed_id)
        .bind(&post.title)
        .bind(&post.url)
        .bind(&post.description)
        .bind(post.published_at.map(to_millis))
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(InsertOutcome::Created),
            Err(e) if StoreError::is_unique_violation(&e) => Ok(InsertOutcome::DuplicateUrl),
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    /// Posts of one feed in insertion order
    pub async fn get_posts_for_feed(&self, feed_id: i64) -> Result<Vec<Post>, StoreError> {
        let rows = sqlx::query_as::<_, PostDbRow>(
            r#"
            SELECT id, feed_id, title, url, description, published_at, created_at
            FROM posts
            WHERE feed_id = ?
            ORDER BY id
        "#,
        )
        .bind(feed_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(PostDbRow::into_post).collect())
    }

    pub async fn count_posts(&self) -> Result<i64, StoreError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM posts")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }
}
