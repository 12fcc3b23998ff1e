use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::schema::Database;
use super::types::{Feed, InsertOutcome, NewPost, StoreError};

/// The storage contract the polling engine depends on.
///
/// Implementations classify their own failures into [`StoreError`] and
/// [`InsertOutcome`]; callers never look at backend error codes.
#[async_trait]
pub trait FeedStore: Send + Sync {
    /// The feed with the oldest `last_fetched_at`, never-fetched feeds first.
    /// `None` when there are no feeds.
    async fn next_overdue_feed(&self) -> Result<Option<Feed>, StoreError>;

    /// Set `last_fetched_at` unconditionally.
    async fn mark_fetched(&self, feed_id: i64, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Persist a post, reporting a URL collision as [`InsertOutcome::DuplicateUrl`].
    async fn insert_post(&self, post: &NewPost) -> Result<InsertOutcome, StoreError>;
}

#[async_trait]
impl FeedStore for Database {
    async fn next_overdue_feed(&self) -> Result<Option<Feed>, StoreError> {
        Database::next_overdue_feed(self).await
    }

    async fn mark_fetched(&self, feed_id: i64, at: DateTime<Utc>) -> Result<(), StoreError> {
        Database::mark_fetched(self, feed_id, at).await
    }

    async fn insert_post(&self, post: &NewPost) -> Result<InsertOutcome, StoreError> {
        Database::insert_post(self, post).await
    }
}

#[async_trait]
impl<S: FeedStore + ?Sized> FeedStore for Arc<S> {
    async fn next_overdue_feed(&self) -> Result<Option<Feed>, StoreError> {
        (**self).next_overdue_feed().await
    }

    async fn mark_fetched(&self, feed_id: i64, at: DateTime<Utc>) -> Result<(), StoreError> {
        (**self).mark_fetched(feed_id, at).await
    }

    async fn insert_post(&self, post: &NewPost) -> Result<InsertOutcome, StoreError> {
        (**self).insert_post(post).await
    }
}
