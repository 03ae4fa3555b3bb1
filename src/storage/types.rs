use thiserror::Error;

use crate::feed::Feed;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process has locked the database
    #[error("Another instance of rssfeed appears to be running. Please close it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// No stored feed has this URL
    #[error("No feed with URL {0}")]
    NotFound(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Classify a sqlx error, recognising SQLite lock conditions.
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5), SQLITE_LOCKED (6), SQLITE_CANTOPEN (14)
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
            || error_string.contains("unable to open database file")
        {
            return DatabaseError::InstanceLocked;
        }

        DatabaseError::Other(err)
    }
}

// ============================================================================
// Records
// ============================================================================

/// A subscription as persisted between runs.
///
/// Only the channel header survives; entries are always re-fetched.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct StoredFeed {
    pub url: String,
    pub is_favorite: bool,
    pub title: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
}

impl StoredFeed {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            is_favorite: false,
            title: None,
            description: None,
            image_url: None,
        }
    }
}

impl From<&Feed> for StoredFeed {
    fn from(feed: &Feed) -> Self {
        Self {
            url: feed.source_url.clone(),
            is_favorite: feed.is_favorite,
            title: feed.title.clone(),
            description: feed.description.clone(),
            image_url: feed.image_url.clone(),
        }
    }
}

impl From<StoredFeed> for Feed {
    fn from(stored: StoredFeed) -> Self {
        let mut feed = Feed::new(stored.url);
        feed.is_favorite = stored.is_favorite;
        feed.title = stored.title;
        feed.description = stored.description;
        feed.image_url = stored.image_url;
        feed
    }
}
