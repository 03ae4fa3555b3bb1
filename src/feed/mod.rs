//! RSS 2.0 / Atom parsing and fetching.
//!
//! A document is read as a stream of XML events. The first element picks the
//! dialect; from then on every element is classified by its slash-joined
//! path (`rss/channel/item/title`, `feed/entry/link`, ...) and applied to a
//! [`Feed`] under construction. A finishing pass then trims text, resolves
//! image references, and cleans entry bodies into [`RichText`].
//!
//! # Architecture
//!
//! - [`model`] - `Feed` and `Entry`
//! - `path` / [`dialect`] - element paths and their classification
//! - `builder` - applies classified events to the feed under construction
//! - [`html`] - small HTML-subset cleaner for entry bodies
//! - [`cleanup`] - the finishing pass
//! - [`parser`] - parse sessions and the public entry points
//! - [`fetcher`] - HTTP download with retries, plus load/refresh helpers
//!
//! # Example
//!
//! ```
//! use rssfeed::feed::FeedParser;
//!
//! let xml = br#"<rss><channel><title>News</title>
//!     <item><title>Hello</title><description>&lt;b&gt;Hi&lt;/b&gt;</description></item>
//! </channel></rss>"#;
//!
//! let feed = FeedParser::new().parse("https://example.com/rss", xml).unwrap();
//! assert_eq!(feed.title.as_deref(), Some("News"));
//! assert_eq!(feed.entries()[0].description.as_deref(), Some("Hi"));
//! ```

mod builder;
pub mod cleanup;
pub mod dialect;
pub mod fetcher;
pub mod html;
pub mod model;
pub mod parser;
mod path;

pub use cleanup::post_process;
pub use dialect::{Dialect, ElementKind};
pub use fetcher::{
    build_client, fetch_bytes, load_feed, refresh_all, refresh_feed, FetchError, FetchOptions,
    RefreshOutcome,
};
pub use html::{clean_html, HtmlError, InlineFormat, RichText, StyledSpan, TextColor, TextStyle};
pub use model::{Entry, Feed};
pub use parser::{parse_feed, FeedParser, ParseError, ParseFailure};
