//! Feed retrieval and decoding.
//!
//! - `fetcher` - one bounded HTTP GET per call
//! - `parser` - RSS 2.0 shaped XML into a [`Channel`] with [`Item`]s
//! - `ingest` - stores parsed items as posts, stopping at the
//!   first already-known URL
//!
//! The [`crate::scheduler`] drives these three in order for one feed per tick.

mod fetcher;
mod ingest;
mod parser;

pub use fetcher::{
    FetchError, FetchSettings, Fetcher, DEFAULT_MAX_BODY_BYTES, DEFAULT_TIMEOUT,
    DEFAULT_USER_AGENT,
};
pub use ingest::{ingest, IngestReport};
pub use parser::{parse_channel, parse_pub_date, Channel, Item, ParseError, PUB_DATE_FORMAT};
