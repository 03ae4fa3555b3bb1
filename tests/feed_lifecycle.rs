//! Integration tests for the subscription lifecycle: subscribe, refresh,
//! mark seen, favorite, unsubscribe.
//!
//! Each test creates its own in-memory SQLite database and mock HTTP server,
//! and drives the library the way the command-line binary does.

use std::time::Duration;

use rssfeed::feed::{self, Feed, FeedParser, FetchOptions, ParseError};
use rssfeed::storage::{Database, DatabaseError, StoredFeed};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FIRST_ISSUE: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <title>Release Notes</title>
    <description>Product updates</description>
    <item><title>1.0 released</title><link>https://example.com/1.0</link></item>
    <item><title>0.9 beta</title><link>https://example.com/0.9</link></item>
</channel></rss>"#;

const SECOND_ISSUE: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <title>Release Notes (renamed)</title>
    <description>Product updates</description>
    <item><title>1.1 released</title><link>https://example.com/1.1</link></item>
    <item><title>1.0 released</title><link>https://example.com/1.0</link></item>
    <item><title>0.9 beta</title><link>https://example.com/0.9</link></item>
</channel></rss>"#;

async fn test_db() -> Database {
    Database::open(":memory:").await.unwrap()
}

fn options() -> FetchOptions {
    FetchOptions {
        timeout: Duration::from_secs(5),
        retry_backoff: Duration::from_millis(10),
        max_retries: 1,
        ..FetchOptions::default()
    }
}

async fn serve(server: &MockServer, route: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

/// Subscribe the way `rssfeed add` does: load, then store the header.
async fn subscribe(db: &Database, url: &str) -> Feed {
    let client = reqwest::Client::new();
    let feed = feed::load_feed(&client, &FeedParser::new(), url, &options())
        .await
        .unwrap();
    assert!(db.insert_feed(&StoredFeed::from(&feed)).await.unwrap());
    feed
}

// ============================================================================
// Subscribe
// ============================================================================

#[tokio::test]
async fn test_subscribe_stores_parsed_header() {
    let server = MockServer::start().await;
    serve(&server, "/notes.xml", FIRST_ISSUE).await;
    let url = format!("{}/notes.xml", server.uri());
    let db = test_db().await;

    subscribe(&db, &url).await;

    let feeds = db.get_feeds().await.unwrap();
    assert_eq!(feeds.len(), 1);
    assert_eq!(feeds[0].url, url);
    assert_eq!(feeds[0].title.as_deref(), Some("Release Notes"));
    assert_eq!(feeds[0].description.as_deref(), Some("Product updates"));
    assert!(!feeds[0].is_favorite);
}

#[tokio::test]
async fn test_subscribe_to_invalid_feed_stores_nothing() {
    let server = MockServer::start().await;
    serve(&server, "/page.html", "<html><body>not a feed</body></html>").await;
    let url = format!("{}/page.html", server.uri());
    let db = test_db().await;

    let result = feed::load_feed(&reqwest::Client::new(), &FeedParser::new(), &url, &options()).await;
    assert!(matches!(result, Err(ParseError::ParsingFailed(_))));
    assert!(db.get_feeds().await.unwrap().is_empty());
}

// ============================================================================
// Refresh and seen state
// ============================================================================

#[tokio::test]
async fn test_seen_state_survives_refresh() {
    let server = MockServer::start().await;
    Mock::given(path("/notes.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FIRST_ISSUE))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    serve(&server, "/notes.xml", SECOND_ISSUE).await;
    let url = format!("{}/notes.xml", server.uri());
    let db = test_db().await;

    // Read everything in the first issue
    let first = subscribe(&db, &url).await;
    let fingerprints: Vec<String> = first.entries().iter().map(|e| e.fingerprint()).collect();
    assert_eq!(db.mark_entries_seen(&url, &fingerprints).await.unwrap(), 2);

    // Refresh the stored subscriptions
    let mut feeds: Vec<Feed> = db
        .get_feeds()
        .await
        .unwrap()
        .into_iter()
        .map(Feed::from)
        .collect();
    let outcomes = feed::refresh_all(
        &reqwest::Client::new(),
        &FeedParser::new(),
        &mut feeds,
        &options(),
    )
    .await;
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].result.as_ref().ok(), Some(&3));

    let refreshed = &mut feeds[0];
    db.update_feed_header(refreshed).await.unwrap();
    let seen = db.seen_fingerprints(&url).await.unwrap();
    assert_eq!(refreshed.apply_seen(&seen), 2);
    assert_eq!(refreshed.unseen_count(), 1);
    assert_eq!(refreshed.entries()[0].title.as_deref(), Some("1.1 released"));
    assert!(!refreshed.entries()[0].is_seen);

    let stored = db.get_feed(&url).await.unwrap().unwrap();
    assert_eq!(stored.title.as_deref(), Some("Release Notes (renamed)"));
}

#[tokio::test]
async fn test_failed_refresh_keeps_stored_header() {
    let server = MockServer::start().await;
    Mock::given(path("/notes.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FIRST_ISSUE))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(path("/notes.xml"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let url = format!("{}/notes.xml", server.uri());
    let db = test_db().await;
    subscribe(&db, &url).await;

    let mut feed = Feed::from(db.get_feed(&url).await.unwrap().unwrap());
    let before = feed.clone();
    let result = feed::refresh_feed(
        &reqwest::Client::new(),
        &FeedParser::new(),
        &mut feed,
        &options(),
    )
    .await;

    assert!(matches!(result, Err(ParseError::NetworkError(_))));
    assert_eq!(feed, before);
    let stored = db.get_feed(&url).await.unwrap().unwrap();
    assert_eq!(stored.title.as_deref(), Some("Release Notes"));
}

// ============================================================================
// Favorite and unsubscribe
// ============================================================================

#[tokio::test]
async fn test_favorite_survives_header_update() {
    let server = MockServer::start().await;
    serve(&server, "/notes.xml", FIRST_ISSUE).await;
    let url = format!("{}/notes.xml", server.uri());
    let db = test_db().await;
    subscribe(&db, &url).await;

    db.set_favorite(&url, true).await.unwrap();

    let mut feed = Feed::from(db.get_feed(&url).await.unwrap().unwrap());
    assert!(feed.is_favorite);
    feed::refresh_feed(
        &reqwest::Client::new(),
        &FeedParser::new(),
        &mut feed,
        &options(),
    )
    .await
    .unwrap();
    assert!(feed.is_favorite);

    db.update_feed_header(&feed).await.unwrap();
    assert!(db.get_feed(&url).await.unwrap().unwrap().is_favorite);
}

#[tokio::test]
async fn test_unsubscribe_forgets_seen_state() {
    let server = MockServer::start().await;
    serve(&server, "/notes.xml", FIRST_ISSUE).await;
    let url = format!("{}/notes.xml", server.uri());
    let db = test_db().await;

    let feed = subscribe(&db, &url).await;
    let fingerprints: Vec<String> = feed.entries().iter().map(|e| e.fingerprint()).collect();
    db.mark_entries_seen(&url, &fingerprints).await.unwrap();

    db.delete_feed(&url).await.unwrap();
    assert!(db.get_feeds().await.unwrap().is_empty());
    assert!(db.seen_fingerprints(&url).await.unwrap().is_empty());

    // Subscribing again starts from a clean slate
    subscribe(&db, &url).await;
    assert!(db.seen_fingerprints(&url).await.unwrap().is_empty());
    assert!(matches!(
        db.delete_feed("https://unknown.example.com").await,
        Err(DatabaseError::NotFound(_))
    ));
}
