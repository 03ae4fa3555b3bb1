use std::borrow::Cow;
use std::panic::{self, AssertUnwindSafe};

use quick_xml::events::{BytesStart, Event};
use quick_xml::{Decoder, Reader};
use thiserror::Error;

use super::builder::{Attributes, FeedBuilder};
use super::cleanup::post_process;
use super::dialect::{classify, Dialect, ElementKind};
use super::fetcher::FetchError;
use super::html::{resolve_named_entity, TextStyle};
use super::model::Feed;
use super::path::PathStack;

/// Why a document was rejected. Attached to [`ParseError::ParsingFailed`]
/// for diagnostics; callers only need the error kind.
#[derive(Debug, Error)]
pub enum ParseFailure {
    /// The tokenizer reported malformed XML.
    #[error("malformed XML near byte {position}: {source}")]
    Xml {
        position: u64,
        #[source]
        source: quick_xml::Error,
    },

    /// The document ended while elements were still open.
    #[error("document ended with {0} unclosed element(s)")]
    UnclosedElements(usize),

    /// No feed title element was found.
    #[error("feed has no title")]
    MissingTitle,

    /// No item/entry element was found.
    #[error("feed has no entries")]
    MissingEntries,
}

/// Errors surfaced by a parse (or fetch-then-parse) call.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Malformed XML, or the document lacked a title or entries.
    #[error("Invalid RSS feed format")]
    ParsingFailed(#[source] ParseFailure),

    /// Byte acquisition failed; passed through untouched.
    #[error("Network error: {0}")]
    NetworkError(#[from] FetchError),

    /// Anything else, such as a panic inside the tokenizer.
    #[error("Unknown error: {0}")]
    UnknownError(String),
}

/// Parses feed documents into [`Feed`] values.
///
/// The parser itself holds only configuration; every call runs a fresh,
/// independent session, so one `FeedParser` can be shared freely between
/// threads and tasks.
#[derive(Debug, Clone, Default)]
pub struct FeedParser {
    body_style: TextStyle,
}

impl FeedParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `style` as the base style of every cleaned entry body.
    pub fn with_body_style(style: TextStyle) -> Self {
        Self { body_style: style }
    }

    pub fn body_style(&self) -> &TextStyle {
        &self.body_style
    }

    /// Parses a complete RSS 2.0 or Atom document.
    ///
    /// `source_url` only stamps the resulting feed; nothing is fetched.
    ///
    /// # Errors
    ///
    /// - [`ParseError::ParsingFailed`] for malformed XML, an unrecognized
    ///   root element, or a document without a title or entries
    /// - [`ParseError::UnknownError`] if the session panics
    pub fn parse(&self, source_url: &str, bytes: &[u8]) -> Result<Feed, ParseError> {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            ParseSession::new(source_url).run(bytes)
        }));

        let mut feed = match outcome {
            Ok(Ok(feed)) => feed,
            Ok(Err(failure)) => {
                tracing::warn!(url = %source_url, error = %failure, "Feed parsing unsuccessful");
                return Err(ParseError::ParsingFailed(failure));
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(url = %source_url, error = %message, "Feed parser panicked");
                return Err(ParseError::UnknownError(message));
            }
        };

        post_process(&mut feed, &self.body_style);
        tracing::debug!(
            url = %source_url,
            entries = feed.entries().len(),
            "Parsed feed"
        );
        Ok(feed)
    }

    /// Re-parses `feed` from `bytes`, replacing its title, description,
    /// image, and entries.
    ///
    /// The feed's URL and caller-owned metadata such as `is_favorite` are
    /// kept. On failure `feed` is left exactly as it was.
    pub fn parse_into(&self, feed: &mut Feed, bytes: &[u8]) -> Result<(), ParseError> {
        let parsed = self.parse(&feed.source_url, bytes)?;
        feed.replace_contents(parsed);
        Ok(())
    }
}

/// Parses `bytes` with the default body style.
pub fn parse_feed(source_url: &str, bytes: &[u8]) -> Result<Feed, ParseError> {
    FeedParser::new().parse(source_url, bytes)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "parser panicked".to_string()
    }
}

/// State of a single pass over one document.
struct ParseSession {
    path: PathStack,
    dialect: Option<Dialect>,
    root_seen: bool,
    /// Kind of the innermost open element, resolved when the path changes.
    current_kind: Option<ElementKind>,
    builder: FeedBuilder,
}

impl ParseSession {
    fn new(source_url: &str) -> Self {
        Self {
            path: PathStack::default(),
            dialect: None,
            root_seen: false,
            current_kind: None,
            builder: FeedBuilder::new(source_url),
        }
    }

    fn run(mut self, bytes: &[u8]) -> Result<Feed, ParseFailure> {
        let mut reader = Reader::from_reader(bytes);
        // Fragments are accumulated verbatim and trimmed after the pass.
        reader.config_mut().trim_text(false);

        let mut buf = Vec::new();
        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => self.open(&e, reader.decoder()),
                Ok(Event::Empty(e)) => {
                    self.open(&e, reader.decoder());
                    self.close();
                }
                Ok(Event::End(_)) => self.close(),
                Ok(Event::Text(e)) => {
                    if self.current_kind.is_some() {
                        let text = match e.unescape_with(resolve_named_entity) {
                            Ok(text) => text,
                            Err(err) => {
                                tracing::debug!(error = %err, "Keeping text with unresolved entities verbatim");
                                String::from_utf8_lossy(&e)
                            }
                        };
                        self.text(&text);
                    }
                }
                Ok(Event::CData(e)) => {
                    if self.current_kind.is_some() {
                        let text: Cow<'_, str> = String::from_utf8_lossy(&e);
                        self.text(&text);
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(ParseFailure::Xml {
                        position: reader.buffer_position() as u64,
                        source: e,
                    });
                }
                _ => {}
            }
            buf.clear();
        }

        if !self.path.is_empty() {
            return Err(ParseFailure::UnclosedElements(self.path.depth()));
        }

        let feed = self.builder.finish();
        if feed.title.is_none() {
            return Err(ParseFailure::MissingTitle);
        }
        if feed.entries.is_none() {
            return Err(ParseFailure::MissingEntries);
        }
        Ok(feed)
    }

    fn open(&mut self, element: &BytesStart<'_>, decoder: Decoder) {
        let name = String::from_utf8_lossy(element.name().as_ref()).into_owned();
        self.path.push(&name);

        if !self.root_seen {
            self.root_seen = true;
            self.dialect = Dialect::detect(&name);
            tracing::debug!(root = %name, dialect = ?self.dialect, "Detected feed dialect");
        }

        self.current_kind = classify(self.dialect, self.path.as_str());
        if let Some(kind) = self.current_kind {
            self.builder.start_element(kind, &read_attributes(element, decoder));
        }
    }

    fn close(&mut self) {
        self.path.pop();
        self.current_kind = classify(self.dialect, self.path.as_str());
    }

    fn text(&mut self, fragment: &str) {
        if let Some(kind) = self.current_kind {
            self.builder.text(kind, fragment);
        }
    }
}

fn read_attributes(element: &BytesStart<'_>, decoder: Decoder) -> Attributes {
    element
        .attributes()
        .filter_map(|attr| {
            let attr = match attr {
                Ok(attr) => attr,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping malformed feed attribute");
                    return None;
                }
            };
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            match attr.decode_and_unescape_value(decoder) {
                Ok(value) => Some((key, value.into_owned())),
                Err(e) => {
                    tracing::warn!(attribute = %key, error = %e, "Skipping undecodable feed attribute");
                    None
                }
            }
        })
        .collect()
}
