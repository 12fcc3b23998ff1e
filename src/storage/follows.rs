use chrono::Utc;

use super::schema::Database;
use super::types::{to_millis, FeedFollow, FeedFollowDbRow, StoreError};

const FOLLOW_SELECT: &str = r#"
    SELECT ff.id, ff.user_id, ff.feed_id, f.name AS feed_name, f.url AS feed_url, ff.created_at
    FROM feed_follows ff
    JOIN feeds f ON f.id = ff.feed_id
"#;

impl Database {
    // ========================================================================
    // Follow Operations
    // ========================================================================

    /// Subscribe `user_id` to `feed_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::FollowExists`] if the user already follows the feed.
    pub async fn create_follow(
        &self,
        user_id: i64,
        feed_id: i64,
    ) -> Result<FeedFollow, StoreError> {
        let now = to_millis(Utc::now());
        let mut tx = self.pool.begin().await?;

        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO feed_follows (user_id, feed_id, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            RETURNING id
        "#,
        )
        .bind(user_id)
        .bind(feed_id)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if StoreError::is_unique_violation(&e) {
                StoreError::FollowExists
            } else {
                StoreError::Database(e)
            }
        })?;

        let sql = format!("{} WHERE ff.id = ?", FOLLOW_SELECT);
        let row = sqlx::query_as::<_, FeedFollowDbRow>(&sql)
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(row.into_follow())
    }

    /// Remove a subscription. `NotFound` when the user does not follow the feed.
    pub async fn delete_follow(&self, user_id: i64, feed_id: i64) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM feed_follows WHERE user_id = ? AND feed_id = ?")
            .bind(user_id)
            .bind(feed_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Feeds followed by `user_id`, oldest follow first
    pub async fn list_follows_for_user(
        &self,
        user_id: i64,
    ) -> Result<Vec<FeedFollow>, StoreError> {
        let sql = format!("{} WHERE ff.user_id = ? ORDER BY ff.id", FOLLOW_SELECT);
        let rows = sqlx::query_as::<_, FeedFollowDbRow>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(FeedFollowDbRow::into_follow).collect())
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{Database, Feed, StoreError};
    use pretty_assertions::assert_eq;

    async fn test_db() -> (Database, i64, Feed) {
        let db = Database::open(":memory:").await.unwrap();
        let user = db.create_user("alice").await.unwrap();
        let feed = db
            .create_feed("Blog", "https://example.com/rss", user.id)
            .await
            .unwrap();
        (db, user.id, feed)
    }

    #[tokio::test]
    async fn test_create_follow_returns_feed_details() {
        let (db, user_id, feed) = test_db().await;

        let follow = db.create_follow(user_id, feed.id).await.unwrap();
        assert_eq!(follow.user_id, user_id);
        assert_eq!(follow.feed_id, feed.id);
        assert_eq!(follow.feed_name, "Blog");
        assert_eq!(follow.feed_url, "https://example.com/rss");
    }

    #[tokio::test]
    async fn test_duplicate_follow_rejected() {
        let (db, user_id, feed) = test_db().await;
        db.create_follow(user_id, feed.id).await.unwrap();

        let err = db.create_follow(user_id, feed.id).await.unwrap_err();
        assert!(matches!(err, StoreError::FollowExists));
        assert_eq!(db.list_follows_for_user(user_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_same_feed_followed_by_two_users() {
        let (db, alice, feed) = test_db().await;
        let bob = db.create_user("bob").await.unwrap();

        db.create_follow(alice, feed.id).await.unwrap();
        db.create_follow(bob.id, feed.id).await.unwrap();

        assert_eq!(db.list_follows_for_user(bob.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_follows_only_for_user() {
        let (db, alice, blog) = test_db().await;
        let bob = db.create_user("bob").await.unwrap();
        let news = db
            .create_feed("News", "https://news.example.com/rss", bob.id)
            .await
            .unwrap();

        db.create_follow(alice, news.id).await.unwrap();
        db.create_follow(alice, blog.id).await.unwrap();
        db.create_follow(bob.id, news.id).await.unwrap();

        let names: Vec<String> = db
            .list_follows_for_user(alice)
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.feed_name)
            .collect();
        assert_eq!(names, vec!["News", "Blog"]);
    }

    #[tokio::test]
    async fn test_delete_follow() {
        let (db, user_id, feed) = test_db().await;
        db.create_follow(user_id, feed.id).await.unwrap();

        db.delete_follow(user_id, feed.id).await.unwrap();
        assert!(db.list_follows_for_user(user_id).await.unwrap().is_empty());

        let err = db.delete_follow(user_id, feed.id).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[tokio::test]
    async fn test_follows_removed_with_user() {
        let (db, alice, feed) = test_db().await;
        let bob = db.create_user("bob").await.unwrap();
        db.create_follow(bob.id, feed.id).await.unwrap();

        // Deleting the feed's creator cascades through feeds to follows
        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(alice)
            .execute(&db.pool)
            .await
            .unwrap();

        let (remaining,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM feed_follows")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(remaining, 0);
    }
}
