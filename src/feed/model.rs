use std::collections::HashSet;

use serde::Serialize;
use sha2::{Digest, Sha256};

use super::html::RichText;

/// One parsed syndication source.
///
/// `title` and `entries` double as the success gate of a parse: a feed only
/// counts as parsed when the title element was seen and at least the entry
/// container was opened once. `None` means "never seen", which is distinct
/// from an empty string or an empty entry list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Feed {
    /// Subscription URL; stable across re-parses.
    pub source_url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub entries: Option<Vec<Entry>>,
    /// Owned by the caller. Parsing never reads or writes it.
    pub is_favorite: bool,
}

impl Feed {
    /// Creates an empty feed record carrying only its source URL.
    pub fn new(source_url: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            title: None,
            description: None,
            image_url: None,
            entries: None,
            is_favorite: false,
        }
    }

    pub fn entries(&self) -> &[Entry] {
        self.entries.as_deref().unwrap_or(&[])
    }

    /// True once a parse has produced both a title and an entry list.
    pub fn is_parsed(&self) -> bool {
        self.title.is_some() && self.entries.is_some()
    }

    /// Number of entries not yet marked as seen.
    pub fn unseen_count(&self) -> usize {
        self.entries().iter().filter(|e| !e.is_seen).count()
    }

    /// Marks every entry whose fingerprint is in `seen` as seen.
    ///
    /// Returns the number of entries that were marked.
    pub fn apply_seen(&mut self, seen: &HashSet<String>) -> usize {
        let mut marked = 0;
        for entry in self.entries.iter_mut().flatten() {
            if seen.contains(&entry.fingerprint()) {
                entry.is_seen = true;
                marked += 1;
            }
        }
        marked
    }

    /// Moves the parsed header and entries of `parsed` into `self`,
    /// leaving the URL and caller-owned metadata alone.
    pub(crate) fn replace_contents(&mut self, parsed: Feed) {
        self.title = parsed.title;
        self.description = parsed.description;
        self.image_url = parsed.image_url;
        self.entries = parsed.entries;
    }
}

/// One item/article within a feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Entry {
    pub title: Option<String>,
    pub link: Option<String>,
    /// Raw HTML while parsing; the cleaned plain text after post-processing.
    pub description: Option<String>,
    pub cleaned_body: Option<RichText>,
    /// Document order.
    pub categories: Vec<String>,
    /// Kept verbatim; never parsed into a date.
    pub publication_date: Option<String>,
    pub image_url: Option<String>,
    pub is_seen: bool,
}

impl Entry {
    /// Stable identity for an entry across re-parses of the same feed.
    ///
    /// Hashes link, title, and publication date so that consumers can carry
    /// per-entry state (such as `is_seen`) over a refresh.
    pub fn fingerprint(&self) -> String {
        let input = format!(
            "{}|{}|{}",
            self.link.as_deref().unwrap_or(""),
            self.title.as_deref().unwrap_or(""),
            self.publication_date.as_deref().unwrap_or("")
        );
        format!("{:x}", Sha256::digest(input.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(title: &str, link: &str) -> Entry {
        Entry {
            title: Some(title.to_string()),
            link: Some(link.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_new_feed_is_not_parsed() {
        let feed = Feed::new("https://example.com/rss");
        assert_eq!(feed.source_url, "https://example.com/rss");
        assert!(!feed.is_parsed());
        assert!(feed.entries().is_empty());
    }

    #[test]
    fn test_empty_entry_list_still_counts_as_parsed() {
        let mut feed = Feed::new("u");
        feed.title = Some("T".into());
        feed.entries = Some(Vec::new());
        assert!(feed.is_parsed());
    }

    #[test]
    fn test_fingerprint_is_stable_and_distinguishes_entries() {
        let a = entry("A", "https://example.com/a");
        let b = entry("B", "https://example.com/b");
        assert_eq!(a.fingerprint(), a.clone().fingerprint());
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }

    #[test]
    fn test_fingerprint_ignores_seen_state() {
        let a = entry("A", "https://example.com/a");
        let mut seen = a.clone();
        seen.is_seen = true;
        assert_eq!(a.fingerprint(), seen.fingerprint());
    }

    #[test]
    fn test_apply_seen_marks_matching_entries() {
        let mut feed = Feed::new("u");
        let a = entry("A", "https://example.com/a");
        let b = entry("B", "https://example.com/b");
        let seen: HashSet<String> = [a.fingerprint()].into_iter().collect();
        feed.entries = Some(vec![a, b]);

        assert_eq!(feed.apply_seen(&seen), 1);
        assert!(feed.entries()[0].is_seen);
        assert!(!feed.entries()[1].is_seen);
        assert_eq!(feed.unseen_count(), 1);
    }

    #[test]
    fn test_replace_contents_keeps_favorite_and_url() {
        let mut feed = Feed::new("https://example.com/rss");
        feed.is_favorite = true;
        feed.title = Some("Old".into());

        let mut parsed = Feed::new("https://example.com/rss");
        parsed.title = Some("New".into());
        parsed.entries = Some(vec![Entry::default()]);
        feed.replace_contents(parsed);

        assert!(feed.is_favorite);
        assert_eq!(feed.title.as_deref(), Some("New"));
        assert_eq!(feed.entries().len(), 1);
    }
}
