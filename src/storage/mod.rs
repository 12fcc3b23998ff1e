mod feeds;
mod follows;
mod posts;
mod schema;
mod store;
mod types;
mod users;

pub use schema::Database;
pub use store::FeedStore;
pub use types::{
    Feed, FeedFollow, FeedListing, InsertOutcome, NewPost, Post, StoreError, User,
};
