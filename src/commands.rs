//! Command handlers behind the CLI subcommands.
//!
//! Every handler takes the [`Session`] it acts on and a writer for its
//! user-facing output, so the binary passes stdout and tests pass a buffer.

use std::future::Future;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::config::{Config, ConfigError};
use crate::feed::{FetchError, Fetcher};
use crate::scheduler::{Scheduler, SchedulerError};
use crate::storage::{Database, Feed, StoreError, User};
use crate::util::{validate_url, UrlValidationError};

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("User '{0}' is not registered. Run: gator register {0}")]
    UnknownUser(String),

    #[error("Log in first. Run: gator login <name>")]
    NotLoggedIn,

    #[error("Feed '{0}' is not registered. Run: gator addfeed <name> {0}")]
    UnknownFeed(String),

    #[error("Already following '{0}'")]
    AlreadyFollowing(String),

    #[error("Not following '{0}'")]
    NotFollowing(String),

    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("Invalid feed URL: {0}")]
    InvalidUrl(#[from] UrlValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to set up HTTP client: {0}")]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error("Failed to write output: {0}")]
    Output(#[from] std::io::Error),
}

/// State shared by every command: the loaded config, where it lives, and
/// the open database.
pub struct Session {
    pub config: Config,
    pub config_path: PathBuf,
    pub db: Database,
}

impl Session {
    pub fn new(config: Config, config_path: PathBuf, db: Database) -> Self {
        Self {
            config,
            config_path,
            db,
        }
    }

    fn set_current_user(&mut self, name: Option<String>) -> Result<(), CommandError> {
        self.config.current_user_name = name;
        self.config.save(&self.config_path)?;
        Ok(())
    }
}

/// The logged-in user, who must still exist in the database.
async fn current_user(session: &Session) -> Result<User, CommandError> {
    let name = session
        .config
        .current_user_name
        .as_deref()
        .ok_or(CommandError::NotLoggedIn)?;
    match session.db.get_user_by_name(name).await {
        Ok(user) => Ok(user),
        Err(StoreError::NotFound) => Err(CommandError::UnknownUser(name.to_string())),
        Err(e) => Err(e.into()),
    }
}

/// Looks a feed up by URL in the form `addfeed` stored it.
async fn feed_by_url(session: &Session, url: &str) -> Result<Feed, CommandError> {
    let url = validate_url(url)?;
    match session.db.get_feed_by_url(url.as_str()).await {
        Ok(feed) => Ok(feed),
        Err(StoreError::NotFound) => Err(CommandError::UnknownFeed(url.to_string())),
        Err(e) => Err(e.into()),
    }
}

/// User names are case-insensitive and stored lowercase.
fn normalize_name(name: &str) -> Result<String, CommandError> {
    let name = name.trim().to_lowercase();
    if name.is_empty() {
        return Err(CommandError::Empty("User name"));
    }
    Ok(name)
}

/// Creates a user and logs in as them.
pub async fn register(
    session: &mut Session,
    name: &str,
    out: &mut impl Write,
) -> Result<(), CommandError> {
    let name = normalize_name(name)?;
    let user = session.db.create_user(&name).await?;
    session.set_current_user(Some(user.name.clone()))?;

    tracing::info!(user_id = user.id, user = %user.name, "User registered");
    writeln!(out, "User '{}' was created successfully", user.name)?;
    Ok(())
}

/// Switches the current user to an existing one.
pub async fn login(
    session: &mut Session,
    name: &str,
    out: &mut impl Write,
) -> Result<(), CommandError> {
    let name = normalize_name(name)?;
    let user = match session.db.get_user_by_name(&name).await {
        Ok(user) => user,
        Err(StoreError::NotFound) => return Err(CommandError::UnknownUser(name)),
        Err(e) => return Err(e.into()),
    };
    session.set_current_user(Some(user.name.clone()))?;

    writeln!(out, "User '{}' has been set", user.name)?;
    Ok(())
}

/// Lists users, marking the current one.
pub async fn users(session: &Session, out: &mut impl Write) -> Result<(), CommandError> {
    let current = session.config.current_user_name.as_deref();

    for user in session.db.list_users().await? {
        if Some(user.name.as_str()) == current {
            writeln!(out, "* {} (current)", user.name)?;
        } else {
            writeln!(out, "* {}", user.name)?;
        }
    }
    Ok(())
}

/// Deletes all users, feeds, follows and posts and logs out.
pub async fn reset(session: &mut Session, out: &mut impl Write) -> Result<(), CommandError> {
    session.db.reset().await?;
    session.set_current_user(None)?;

    tracing::info!("Database reset");
    writeln!(out, "Database reset")?;
    Ok(())
}

/// Registers a feed owned by the current user, who then follows it.
///
/// The URL must be `http`/`https` and must not point at a loopback or
/// private address.
pub async fn addfeed(
    session: &Session,
    name: &str,
    url: &str,
    out: &mut impl Write,
) -> Result<(), CommandError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CommandError::Empty("Feed name"));
    }
    let url = validate_url(url)?;

    let user = current_user(session).await?;
    let feed = session.db.create_feed(name, url.as_str(), user.id).await?;
    session.db.create_follow(user.id, feed.id).await?;

    tracing::info!(feed_id = feed.id, url = %feed.url, user = %user.name, "Feed added");
    writeln!(out, "Feed '{}' was added successfully", feed.name)?;
    writeln!(out, "  url     : {}", feed.url)?;
    writeln!(out, "  creator : {}", user.name)?;
    Ok(())
}

/// Lists every feed with its creator.
pub async fn feeds(session: &Session, out: &mut impl Write) -> Result<(), CommandError> {
    for feed in session.db.list_feeds().await? {
        writeln!(out, "feed name    : {}", feed.name)?;
        writeln!(out, "feed url     : {}", feed.url)?;
        writeln!(out, "feed creator : {}", feed.user_name)?;
        match feed.last_fetched_at {
            Some(at) => writeln!(out, "last fetched : {}", at.to_rfc3339())?,
            None => writeln!(out, "last fetched : never")?,
        }
        writeln!(out)?;
    }
    Ok(())
}

/// Subscribes the current user to an already registered feed.
pub async fn follow(
    session: &Session,
    url: &str,
    out: &mut impl Write,
) -> Result<(), CommandError> {
    let user = current_user(session).await?;
    let feed = feed_by_url(session, url).await?;

    match session.db.create_follow(user.id, feed.id).await {
        Ok(_) => {}
        Err(StoreError::FollowExists) => return Err(CommandError::AlreadyFollowing(feed.url)),
        Err(e) => return Err(e.into()),
    }

    tracing::info!(feed_id = feed.id, user = %user.name, "Feed followed");
    writeln!(out, "User '{}' now follows '{}'", user.name, feed.name)?;
    Ok(())
}

/// Drops the current user's subscription to a feed.
pub async fn unfollow(
    session: &Session,
    url: &str,
    out: &mut impl Write,
) -> Result<(), CommandError> {
    let user = current_user(session).await?;
    let feed = feed_by_url(session, url).await?;

    match session.db.delete_follow(user.id, feed.id).await {
        Ok(()) => {}
        Err(StoreError::NotFound) => return Err(CommandError::NotFollowing(feed.url)),
        Err(e) => return Err(e.into()),
    }

    tracing::info!(feed_id = feed.id, user = %user.name, "Feed unfollowed");
    writeln!(out, "User '{}' no longer follows '{}'", user.name, feed.name)?;
    Ok(())
}

/// Lists the feeds the current user follows.
pub async fn following(session: &Session, out: &mut impl Write) -> Result<(), CommandError> {
    let user = current_user(session).await?;

    for follow in session.db.list_follows_for_user(user.id).await? {
        writeln!(out, "feed name : {}", follow.feed_name)?;
        writeln!(out, "feed url  : {}", follow.feed_url)?;
        writeln!(out)?;
    }
    Ok(())
}

/// Polls feeds every `interval` until `shutdown` resolves.
pub async fn agg<F>(
    session: &Session,
    interval: Duration,
    shutdown: F,
    out: &mut impl Write,
) -> Result<(), CommandError>
where
    F: Future,
{
    if interval.is_zero() {
        return Err(SchedulerError::ZeroInterval.into());
    }

    let fetcher = Fetcher::new(&session.config.fetch_settings())?;
    let scheduler = Scheduler::new(session.db.clone(), fetcher);

    writeln!(out, "Collecting feeds every {:?}", interval)?;
    out.flush()?;

    scheduler.run(interval, shutdown).await?;
    Ok(())
}

// ============================================================================
// Interval parsing
// ============================================================================

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IntervalError {
    #[error("empty duration")]
    Empty,
    #[error("invalid duration '{0}'")]
    Invalid(String),
    #[error("missing unit in duration '{0}' (use ns, us, ms, s, m or h)")]
    MissingUnit(String),
    #[error("unknown unit '{unit}' in duration '{input}'")]
    UnknownUnit { unit: String, input: String },
}

/// Parses a duration such as `500ms`, `30s`, `1m30s`, `1.5h` or `2h45m`.
///
/// Each component is a decimal number followed by one of `ns`, `us` (or
/// `µs`), `ms`, `s`, `m`, `h`. A bare `0` is accepted.
///
/// ```
/// use std::time::Duration;
/// use gator::commands::parse_interval;
///
/// assert_eq!(parse_interval("1m30s"), Ok(Duration::from_secs(90)));
/// assert_eq!(parse_interval("250ms"), Ok(Duration::from_millis(250)));
/// assert!(parse_interval("10").is_err());
/// ```
pub fn parse_interval(raw: &str) -> Result<Duration, IntervalError> {
    let input = raw.trim();
    if input.is_empty() {
        return Err(IntervalError::Empty);
    }
    if input == "0" {
        return Ok(Duration::ZERO);
    }

    let invalid = || IntervalError::Invalid(input.to_string());
    let mut total = 0f64;
    let mut rest = input;

    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, tail) = rest.split_at(number_len);
        if number.is_empty() || number == "." {
            return Err(invalid());
        }
        let value: f64 = number.parse().map_err(|_| invalid())?;

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, next) = tail.split_at(unit_len);

        let nanos_per_unit = match unit {
            "" => return Err(IntervalError::MissingUnit(input.to_string())),
            "ns" => 1.0,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            other => {
                return Err(IntervalError::UnknownUnit {
                    unit: other.to_string(),
                    input: input.to_string(),
                })
            }
        };

        total += value * nanos_per_unit;
        rest = next;
    }

    if !total.is_finite() || total > u64::MAX as f64 {
        return Err(invalid());
    }
    Ok(Duration::from_nanos(total.round() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    async fn session() -> (TempDir, Session) {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        let db = Database::open(":memory:").await.unwrap();
        (dir, Session::new(Config::default(), config_path, db))
    }

    fn text(out: Vec<u8>) -> String {
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn test_register_logs_in_and_persists() {
        let (_dir, mut session) = session().await;
        let mut out = Vec::new();

        register(&mut session, "Alice", &mut out).await.unwrap();

        assert_eq!(session.config.current_user_name.as_deref(), Some("alice"));
        let saved = Config::load(&session.config_path).unwrap();
        assert_eq!(saved.current_user_name.as_deref(), Some("alice"));
        assert_eq!(text(out), "User 'alice' was created successfully\n");
    }

    #[tokio::test]
    async fn test_register_twice_fails() {
        let (_dir, mut session) = session().await;
        register(&mut session, "alice", &mut Vec::new()).await.unwrap();

        let err = register(&mut session, "ALICE", &mut Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CommandError::Store(StoreError::UserExists(ref name)) if name == "alice"
        ));
    }

    #[tokio::test]
    async fn test_register_empty_name() {
        let (_dir, mut session) = session().await;
        let err = register(&mut session, "  ", &mut Vec::new()).await.unwrap_err();
        assert!(matches!(err, CommandError::Empty(_)));
    }

    #[tokio::test]
    async fn test_login_switches_user() {
        let (_dir, mut session) = session().await;
        register(&mut session, "alice", &mut Vec::new()).await.unwrap();
        register(&mut session, "bob", &mut Vec::new()).await.unwrap();

        login(&mut session, "Alice", &mut Vec::new()).await.unwrap();
        assert_eq!(session.config.current_user_name.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_login_unknown_user() {
        let (_dir, mut session) = session().await;
        let err = login(&mut session, "ghost", &mut Vec::new()).await.unwrap_err();
        assert!(matches!(err, CommandError::UnknownUser(ref name) if name == "ghost"));
        assert_eq!(session.config.current_user_name, None);
    }

    #[tokio::test]
    async fn test_users_marks_current() {
        let (_dir, mut session) = session().await;
        register(&mut session, "bob", &mut Vec::new()).await.unwrap();
        register(&mut session, "alice", &mut Vec::new()).await.unwrap();

        let mut out = Vec::new();
        users(&session, &mut out).await.unwrap();
        assert_eq!(text(out), "* alice (current)\n* bob\n");
    }

    #[tokio::test]
    async fn test_addfeed_requires_login() {
        let (_dir, mut session) = session().await;
        let err = addfeed(&session, "Blog", "https://example.com/rss", &mut Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::NotLoggedIn));
    }

    #[tokio::test]
    async fn test_addfeed_rejects_internal_url() {
        let (_dir, mut session) = session().await;
        register(&mut session, "alice", &mut Vec::new()).await.unwrap();

        let err = addfeed(&session, "Local", "http://127.0.0.1/rss", &mut Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CommandError::InvalidUrl(UrlValidationError::InternalHost(_))
        ));
    }

    #[tokio::test]
    async fn test_addfeed_and_list() {
        let (_dir, mut session) = session().await;
        register(&mut session, "alice", &mut Vec::new()).await.unwrap();

        let mut out = Vec::new();
        addfeed(&session, "Blog", "https://example.com/rss", &mut out)
            .await
            .unwrap();
        assert!(text(out).starts_with("Feed 'Blog' was added successfully\n"));

        let mut out = Vec::new();
        feeds(&session, &mut out).await.unwrap();
        assert_eq!(
            text(out),
            "feed name    : Blog\n\
             feed url     : https://example.com/rss\n\
             feed creator : alice\n\
             last fetched : never\n\n"
        );
    }

    #[tokio::test]
    async fn test_addfeed_duplicate_url() {
        let (_dir, mut session) = session().await;
        register(&mut session, "alice", &mut Vec::new()).await.unwrap();
        addfeed(&session, "Blog", "https://example.com/rss", &mut Vec::new())
            .await
            .unwrap();

        let err = addfeed(&session, "Again", "https://example.com/rss", &mut Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Store(StoreError::FeedExists(_))));
    }

    #[tokio::test]
    async fn test_addfeed_follows_new_feed() {
        let (_dir, mut session) = session().await;
        register(&mut session, "alice", &mut Vec::new()).await.unwrap();
        addfeed(&session, "Blog", "https://example.com/rss", &mut Vec::new())
            .await
            .unwrap();

        let mut out = Vec::new();
        following(&session, &mut out).await.unwrap();
        assert_eq!(
            text(out),
            "feed name : Blog\n\
             feed url  : https://example.com/rss\n\n"
        );
    }

    #[tokio::test]
    async fn test_follow_feed_added_by_other_user() {
        let (_dir, mut session) = session().await;
        register(&mut session, "alice", &mut Vec::new()).await.unwrap();
        addfeed(&session, "Blog", "https://example.com/rss", &mut Vec::new())
            .await
            .unwrap();
        register(&mut session, "bob", &mut Vec::new()).await.unwrap();

        let mut out = Vec::new();
        follow(&session, "https://example.com/rss", &mut out)
            .await
            .unwrap();
        assert_eq!(text(out), "User 'bob' now follows 'Blog'\n");

        let bob = session.db.get_user_by_name("bob").await.unwrap();
        let follows = session.db.list_follows_for_user(bob.id).await.unwrap();
        assert_eq!(follows.len(), 1);
        assert_eq!(follows[0].feed_name, "Blog");
    }

    #[tokio::test]
    async fn test_follow_twice_fails() {
        let (_dir, mut session) = session().await;
        register(&mut session, "alice", &mut Vec::new()).await.unwrap();
        addfeed(&session, "Blog", "https://example.com/rss", &mut Vec::new())
            .await
            .unwrap();

        let err = follow(&session, "https://example.com/rss", &mut Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CommandError::AlreadyFollowing(ref url) if url == "https://example.com/rss"
        ));
    }

    #[tokio::test]
    async fn test_follow_unknown_feed() {
        let (_dir, mut session) = session().await;
        register(&mut session, "alice", &mut Vec::new()).await.unwrap();

        let err = follow(&session, "https://nowhere.example/rss", &mut Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::UnknownFeed(_)));
        assert!(err.to_string().contains("gator addfeed"));
    }

    #[tokio::test]
    async fn test_follow_requires_login() {
        let (_dir, session) = session().await;
        let err = follow(&session, "https://example.com/rss", &mut Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::NotLoggedIn));

        let err = following(&session, &mut Vec::new()).await.unwrap_err();
        assert!(matches!(err, CommandError::NotLoggedIn));
    }

    #[tokio::test]
    async fn test_unfollow() {
        let (_dir, mut session) = session().await;
        register(&mut session, "alice", &mut Vec::new()).await.unwrap();
        addfeed(&session, "Blog", "https://example.com/rss", &mut Vec::new())
            .await
            .unwrap();

        let mut out = Vec::new();
        unfollow(&session, "https://example.com/rss", &mut out)
            .await
            .unwrap();
        assert_eq!(text(out), "User 'alice' no longer follows 'Blog'\n");

        let mut out = Vec::new();
        following(&session, &mut out).await.unwrap();
        assert_eq!(text(out), "");

        // The feed itself stays registered
        assert_eq!(session.db.list_feeds().await.unwrap().len(), 1);

        let err = unfollow(&session, "https://example.com/rss", &mut Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::NotFollowing(_)));
    }

    #[tokio::test]
    async fn test_reset_clears_everything() {
        let (_dir, mut session) = session().await;
        register(&mut session, "alice", &mut Vec::new()).await.unwrap();
        addfeed(&session, "Blog", "https://example.com/rss", &mut Vec::new())
            .await
            .unwrap();

        reset(&mut session, &mut Vec::new()).await.unwrap();

        assert_eq!(session.config.current_user_name, None);
        assert!(session.db.list_users().await.unwrap().is_empty());
        assert!(session.db.list_feeds().await.unwrap().is_empty());
        let saved = Config::load(&session.config_path).unwrap();
        assert_eq!(saved.current_user_name, None);
    }

    #[tokio::test]
    async fn test_agg_rejects_zero_interval() {
        let (_dir, session) = session().await;
        let err = agg(&session, Duration::ZERO, std::future::ready(()), &mut Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CommandError::Scheduler(SchedulerError::ZeroInterval)
        ));
    }

    #[tokio::test]
    async fn test_agg_stops_on_shutdown() {
        let (_dir, session) = session().await;
        let mut out = Vec::new();
        agg(&session, Duration::from_secs(30), std::future::ready(()), &mut out)
            .await
            .unwrap();
        assert_eq!(text(out), "Collecting feeds every 30s\n");
    }

    #[test]
    fn test_parse_interval_units() {
        assert_eq!(parse_interval("500ms"), Ok(Duration::from_millis(500)));
        assert_eq!(parse_interval("30s"), Ok(Duration::from_secs(30)));
        assert_eq!(parse_interval("2h"), Ok(Duration::from_secs(7200)));
        assert_eq!(parse_interval("10us"), Ok(Duration::from_micros(10)));
        assert_eq!(parse_interval("7ns"), Ok(Duration::from_nanos(7)));
    }

    #[test]
    fn test_parse_interval_compound_and_fractional() {
        assert_eq!(parse_interval("1m30s"), Ok(Duration::from_secs(90)));
        assert_eq!(parse_interval("2h45m"), Ok(Duration::from_secs(9900)));
        assert_eq!(parse_interval("1.5s"), Ok(Duration::from_millis(1500)));
        assert_eq!(parse_interval(" 1m "), Ok(Duration::from_secs(60)));
    }

    #[test]
    fn test_parse_interval_zero() {
        assert_eq!(parse_interval("0"), Ok(Duration::ZERO));
        assert_eq!(parse_interval("0s"), Ok(Duration::ZERO));
    }

    #[test]
    fn test_parse_interval_errors() {
        assert_eq!(parse_interval(""), Err(IntervalError::Empty));
        assert_eq!(
            parse_interval("10"),
            Err(IntervalError::MissingUnit("10".to_string()))
        );
        assert_eq!(
            parse_interval("5d"),
            Err(IntervalError::UnknownUnit {
                unit: "d".to_string(),
                input: "5d".to_string(),
            })
        );
        assert!(matches!(parse_interval("s"), Err(IntervalError::Invalid(_))));
        assert!(matches!(parse_interval("1..2s"), Err(IntervalError::Invalid(_))));
        assert!(matches!(parse_interval("-1s"), Err(IntervalError::Invalid(_))));
    }
}
