//! Streaming RSS 2.0 / Atom feed parser with a small subscription manager.
//!
//! The core is [`feed::FeedParser`], which turns a feed document into a
//! [`Feed`] of [`Entry`] values with cleaned, styled bodies. Around it sit an
//! HTTP fetcher, SQLite persistence of subscriptions and seen state, and a
//! TOML configuration layer used by the `rssfeed` binary.

pub mod config;
pub mod feed;
pub mod storage;
pub mod util;

pub use config::{Config, ConfigError};
pub use feed::{parse_feed, Entry, Feed, FeedParser, ParseError};
