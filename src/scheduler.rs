//! The polling loop.
//!
//! Each tick picks the single most overdue feed, marks it attempted, then
//! fetches, parses and ingests it. Ticks never overlap: the loop awaits the
//! whole unit before waiting for the next interval.

use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::MissedTickBehavior;

use crate::feed::{ingest, parse_channel, FetchError, Fetcher, IngestReport, ParseError};
use crate::storage::{FeedStore, StoreError};

/// A failed unit of work. Logged by [`Scheduler::run`], never fatal to it.
#[derive(Debug, Error)]
pub enum PollError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("Parse failed: {0}")]
    Parse(#[from] ParseError),
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Polling interval must be greater than zero")]
    ZeroInterval,
}

/// Result of one tick.
#[derive(Debug)]
pub enum TickOutcome {
    /// There are no feeds
    Idle,
    /// The feed was fetched, parsed and ingested
    Polled { feed_id: i64, report: IngestReport },
    /// The feed was selected but could not be marked, fetched or parsed
    Failed { feed_id: i64, error: PollError },
}

pub struct Scheduler<S> {
    store: S,
    fetcher: Fetcher,
}

impl<S: FeedStore> Scheduler<S> {
    pub fn new(store: S, fetcher: Fetcher) -> Self {
        Self { store, fetcher }
    }

    /// Runs one tick per `interval`, the first immediately, until `shutdown`
    /// resolves.
    ///
    /// Shutdown is only observed between ticks, so an in-flight fetch is
    /// always finished and its posts stored before this returns. Ticks missed
    /// while a slow fetch was running are skipped rather than replayed.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::ZeroInterval`] if `interval` is zero. Per-tick
    /// failures are logged and never end the loop.
    pub async fn run<F>(&self, interval: Duration, shutdown: F) -> Result<(), SchedulerError>
    where
        F: Future,
    {
        if interval.is_zero() {
            return Err(SchedulerError::ZeroInterval);
        }

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        tracing::info!(interval = ?interval, "Scheduler started");

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested, stopping scheduler");
                    break;
                }

                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        tracing::warn!(error = %e, "Could not select a feed to poll");
                    }
                }
            }
        }

        Ok(())
    }

    /// One unit of work stamped with the current time.
    pub async fn tick(&self) -> Result<TickOutcome, PollError> {
        self.tick_at(Utc::now()).await
    }

    /// One unit of work, recording `now` as the feed's fetch time.
    ///
    /// The feed is marked before the network request so that a feed which
    /// keeps failing moves to the back of the queue instead of starving the
    /// rest.
    ///
    /// # Errors
    ///
    /// [`PollError::Store`] only when the overdue feed cannot be selected.
    /// Failures after selection come back as [`TickOutcome::Failed`].
    pub async fn tick_at(&self, now: DateTime<Utc>) -> Result<TickOutcome, PollError> {
        let Some(feed) = self.store.next_overdue_feed().await? else {
            tracing::debug!("No feeds to poll");
            return Ok(TickOutcome::Idle);
        };

        if let Err(e) = self.store.mark_fetched(feed.id, now).await {
            tracing::warn!(feed_id = feed.id, error = %e, "Failed to mark feed as fetched");
            return Ok(TickOutcome::Failed {
                feed_id: feed.id,
                error: e.into(),
            });
        }

        let channel = match self.fetch_and_parse(&feed.url).await {
            Ok(channel) => channel,
            Err(error) => {
                tracing::warn!(
                    feed_id = feed.id,
                    url = %feed.url,
                    error = %error,
                    "Failed to poll feed"
                );
                return Ok(TickOutcome::Failed {
                    feed_id: feed.id,
                    error,
                });
            }
        };

        tracing::debug!(
            feed_id = feed.id,
            title = %channel.title,
            link = %channel.link,
            items = channel.items.len(),
            "Feed parsed"
        );

        let report = ingest(&self.store, &feed, &channel.items).await;

        tracing::info!(
            feed_id = feed.id,
            feed = %feed.name,
            inserted = report.inserted,
            failed = report.failed,
            "Feed polled"
        );

        Ok(TickOutcome::Polled {
            feed_id: feed.id,
            report,
        })
    }

    async fn fetch_and_parse(&self, url: &str) -> Result<crate::feed::Channel, PollError> {
        let bytes = self.fetcher.fetch(url).await?;
        Ok(parse_channel(&bytes)?)
    }
}
