//! gator polls RSS feeds on a timer and stores new posts in SQLite.
//!
//! One feed is handled per tick: the [`scheduler`] picks the feed fetched
//! longest ago, marks it, downloads it with the [`feed`] fetcher, parses the
//! channel and hands the items to the ingestor, which writes them through the
//! [`storage::FeedStore`] contract.

pub mod commands;
pub mod config;
pub mod feed;
pub mod scheduler;
pub mod storage;
pub mod util;
