//! Helpers for the command-line surface.
//!
//! - **Feed URLs**: normalization and SSRF checks before anything is fetched
//! - **Terminal text**: sanitizing and width-aware truncation of feed text

mod display;
mod feed_url;

pub use display::{display_line, fit_width};
pub use feed_url::{validate_feed_url, UrlValidationError};
