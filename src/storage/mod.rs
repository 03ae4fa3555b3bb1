//! SQLite persistence for subscriptions and per-entry seen state.
//!
//! Only feed headers and the favorite flag are stored; entries are always
//! re-fetched and re-parsed. Seen state is kept as entry fingerprints (see
//! [`crate::feed::Entry::fingerprint`]) and reapplied after each parse.

mod feeds;
mod schema;
mod seen;
mod types;

pub use schema::Database;
pub use types::{DatabaseError, StoredFeed};
