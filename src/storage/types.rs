use chrono::{DateTime, Utc};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Store errors, classified so callers never inspect SQLite error codes.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The referenced row does not exist
    #[error("Record not found")]
    NotFound,

    /// A user with this name is already registered
    #[error("User '{0}' already exists")]
    UserExists(String),

    /// A feed with this URL is already registered
    #[error("Feed '{0}' already exists")]
    FeedExists(String),

    /// The user already follows this feed
    #[error("Feed is already followed by this user")]
    FollowExists,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// True when a sqlx error is a UNIQUE constraint violation.
    pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
        match err {
            sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
            _ => false,
        }
    }
}

/// Result of attempting to persist a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new row was written
    Created,
    /// A post with the same URL already exists (any feed)
    DuplicateUrl,
}

// ============================================================================
// Row Types
// ============================================================================

/// Timestamps are stored as Unix milliseconds.
pub(crate) fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or(DateTime::UNIX_EPOCH)
}

/// Internal row type for feed queries, converted with `into_feed()`.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct FeedDbRow {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub user_id: i64,
    pub last_fetched_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl FeedDbRow {
    pub(crate) fn into_feed(self) -> Feed {
        Feed {
            id: self.id,
            name: self.name,
            url: self.url,
            user_id: self.user_id,
            last_fetched_at: self.last_fetched_at.map(from_millis),
            created_at: from_millis(self.created_at),
            updated_at: from_millis(self.updated_at),
        }
    }
}

/// Feed joined with the name of the user who added it (`feeds` command)
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct FeedListingRow {
    pub name: String,
    pub url: String,
    pub user_name: String,
    pub last_fetched_at: Option<i64>,
}

/// Follow joined with its feed's name and URL
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct FeedFollowDbRow {
    pub id: i64,
    pub user_id: i64,
    pub feed_id: i64,
    pub feed_name: String,
    pub feed_url: String,
    pub created_at: i64,
}

impl FeedFollowDbRow {
    pub(crate) fn into_follow(self) -> FeedFollow {
        FeedFollow {
            id: self.id,
            user_id: self.user_id,
            feed_id: self.feed_id,
            feed_name: self.feed_name,
            feed_url: self.feed_url,
            created_at: from_millis(self.created_at),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PostDbRow {
    pub id: i64,
    pub feed_id: i64,
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub published_at: Option<i64>,
    pub created_at: i64,
}

impl PostDbRow {
    pub(crate) fn into_post(self) -> Post {
        Post {
            id: self.id,
            feed_id: self.feed_id,
            title: self.title,
            url: self.url,
            description: self.description,
            published_at: self.published_at.map(from_millis),
            created_at: from_millis(self.created_at),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct UserDbRow {
    pub id: i64,
    pub name: String,
    pub created_at: i64,
}

impl UserDbRow {
    pub(crate) fn into_user(self) -> User {
        User {
            id: self.id,
            name: self.name,
            created_at: from_millis(self.created_at),
        }
    }
}

// ============================================================================
// Data Structures
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A subscribed feed.
///
/// `last_fetched_at` is `None` until the first fetch attempt and is set on
/// every attempt afterwards, successful or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feed {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub user_id: i64,
    pub last_fetched_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row shown by the `feeds` command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedListing {
    pub name: String,
    pub url: String,
    pub user_name: String,
    pub last_fetched_at: Option<DateTime<Utc>>,
}

impl From<FeedListingRow> for FeedListing {
    fn from(row: FeedListingRow) -> Self {
        Self {
            name: row.name,
            url: row.url,
            user_name: row.user_name,
            last_fetched_at: row.last_fetched_at.map(from_millis),
        }
    }
}

/// A user's subscription to a feed. Each (user, feed) pair appears once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedFollow {
    pub id: i64,
    pub user_id: i64,
    pub feed_id: i64,
    pub feed_name: String,
    pub feed_url: String,
    pub created_at: DateTime<Utc>,
}

/// A persisted post. URLs are unique across all feeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub id: i64,
    pub feed_id: i64,
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Candidate post built by the ingestor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPost {
    pub feed_id: i64,
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}
