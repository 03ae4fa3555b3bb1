//! Applies classified element events to the feed under construction.
//!
//! The builder is a small state machine: it owns the [`Feed`] being built and
//! an explicit cursor onto the entry (and category slot) that item-scoped
//! events mutate. Text may arrive in any number of fragments; every field
//! accumulates, none is ever replaced by a later fragment.

use super::dialect::ElementKind;
use super::html::contains_img_tag;
use super::model::{Entry, Feed};

/// Where the current entry's `image_url` came from, lowest priority first.
///
/// A source only replaces a value set by a lower-ranked one; thumbnails
/// additionally replace each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum ImageOrigin {
    /// `<img>` markup inside `content:encoded` / Atom `content`.
    ContentMarkup,
    /// `<img>` markup inside the entry description.
    DescriptionMarkup,
    /// `enclosure` or `media:content` url attribute.
    Attachment,
    /// `media:thumbnail` url attribute.
    Thumbnail,
}

#[derive(Debug)]
struct EntryCursor {
    index: usize,
    category: Option<usize>,
    image: Option<ImageOrigin>,
    link_from_href: bool,
}

/// Decoded attributes of a start element.
#[derive(Debug, Default)]
pub(crate) struct Attributes(Vec<(String, String)>);

impl Attributes {
    pub(crate) fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Attributes(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

#[derive(Debug)]
pub(crate) struct FeedBuilder {
    feed: Feed,
    current: Option<EntryCursor>,
    /// Text seen so far in the open description element.
    description_text: String,
    /// Whether the open description element is being routed to `image_url`.
    description_is_markup: bool,
}

impl FeedBuilder {
    pub(crate) fn new(source_url: &str) -> Self {
        Self {
            feed: Feed::new(source_url),
            current: None,
            description_text: String::new(),
            description_is_markup: false,
        }
    }

    pub(crate) fn start_element(&mut self, kind: ElementKind, attributes: &Attributes) {
        match kind {
            ElementKind::ItemBoundary => {
                let entries = self.feed.entries.get_or_insert_with(Vec::new);
                entries.push(Entry::default());
                self.current = Some(EntryCursor {
                    index: entries.len() - 1,
                    category: None,
                    image: None,
                    link_from_href: false,
                });
            }
            ElementKind::ItemDescription => {
                self.description_text.clear();
                self.description_is_markup = false;
            }
            ElementKind::ItemCategory => {
                let seed = attributes.get("term").unwrap_or("").to_string();
                if let Some((entry, cursor)) = self.current_entry() {
                    entry.categories.push(seed);
                    cursor.category = Some(entry.categories.len() - 1);
                }
            }
            ElementKind::ItemThumbnail => {
                if let Some(url) = attributes.get("url") {
                    self.offer_image(ImageOrigin::Thumbnail, url);
                }
            }
            ElementKind::ItemEnclosure | ElementKind::ItemMediaContent => {
                if let Some(url) = attributes.get("url") {
                    self.offer_image(ImageOrigin::Attachment, url);
                }
            }
            ElementKind::ItemLinkHref => {
                let rel = attributes.get("rel").unwrap_or("alternate");
                if let (Some(href), "alternate") = (attributes.get("href"), rel) {
                    if let Some((entry, cursor)) = self.current_entry() {
                        if !cursor.link_from_href {
                            entry.link = Some(href.to_string());
                            cursor.link_from_href = true;
                        }
                    }
                }
            }
            _ => {}
        }
    }

    pub(crate) fn text(&mut self, kind: ElementKind, fragment: &str) {
        match kind {
            ElementKind::Title => append(&mut self.feed.title, fragment),
            ElementKind::ImageUrl => append(&mut self.feed.image_url, fragment),
            ElementKind::Description => append(&mut self.feed.description, fragment),
            ElementKind::ItemTitle => {
                if let Some((entry, _)) = self.current_entry() {
                    append(&mut entry.title, fragment);
                }
            }
            ElementKind::ItemPubDate => {
                if let Some((entry, _)) = self.current_entry() {
                    append(&mut entry.publication_date, fragment);
                }
            }
            ElementKind::ItemLink => {
                if let Some((entry, cursor)) = self.current_entry() {
                    if !cursor.link_from_href {
                        append(&mut entry.link, fragment);
                    }
                }
            }
            ElementKind::ItemDescription => self.description_fragment(fragment),
            ElementKind::ItemContentEncoded => {
                if contains_img_tag(fragment) {
                    if let Some((entry, cursor)) = self.current_entry() {
                        if cursor.image.is_none() {
                            entry.image_url = Some(fragment.to_string());
                            cursor.image = Some(ImageOrigin::ContentMarkup);
                        }
                    }
                }
            }
            ElementKind::ItemCategory => {
                if let Some((entry, cursor)) = self.current_entry() {
                    if let Some(slot) = cursor.category.and_then(|i| entry.categories.get_mut(i)) {
                        slot.push_str(fragment);
                    }
                }
            }
            ElementKind::ItemBoundary
            | ElementKind::ItemLinkHref
            | ElementKind::ItemThumbnail
            | ElementKind::ItemEnclosure
            | ElementKind::ItemMediaContent => {}
        }
    }

    pub(crate) fn finish(self) -> Feed {
        self.feed
    }

    fn current_entry(&mut self) -> Option<(&mut Entry, &mut EntryCursor)> {
        let cursor = self.current.as_mut()?;
        let entry = self.feed.entries.as_mut()?.get_mut(cursor.index)?;
        Some((entry, cursor))
    }

    /// Embedded `<img>` markup in a description is the RSS thumbnail
    /// convention: once the element's text contains an image tag, the rest
    /// of it goes to `image_url` rather than the description.
    fn description_fragment(&mut self, fragment: &str) {
        if self.current.is_none() {
            return;
        }
        let already_markup = self.description_is_markup;
        self.description_text.push_str(fragment);

        if !already_markup && !contains_img_tag(&self.description_text) {
            if let Some((entry, _)) = self.current_entry() {
                append(&mut entry.description, fragment);
            }
            return;
        }

        // Bytes of the tag that already went into the description
        let mut carried = 0;
        let markup = if already_markup {
            fragment.to_string()
        } else {
            self.description_is_markup = true;
            // The tag may have started in an earlier fragment; take it whole.
            let text = &self.description_text;
            let from = text.len().saturating_sub(fragment.len());
            let start = text[..from].rfind('<').filter(|_| !contains_img_tag(fragment));
            match start {
                Some(start) => {
                    carried = from - start;
                    text[start..].to_string()
                }
                None => fragment.to_string(),
            }
        };

        if let Some((entry, cursor)) = self.current_entry() {
            if carried > 0 {
                if let Some(description) = entry.description.as_mut() {
                    let keep = description.len().saturating_sub(carried);
                    if description.is_char_boundary(keep) {
                        description.truncate(keep);
                    }
                }
                if entry.description.as_deref() == Some("") {
                    entry.description = None;
                }
            }
            match cursor.image {
                None | Some(ImageOrigin::ContentMarkup) if !already_markup => {
                    entry.image_url = Some(markup);
                    cursor.image = Some(ImageOrigin::DescriptionMarkup);
                }
                Some(ImageOrigin::DescriptionMarkup) => append(&mut entry.image_url, &markup),
                _ => {}
            }
        }
    }

    fn offer_image(&mut self, origin: ImageOrigin, url: &str) {
        if let Some((entry, cursor)) = self.current_entry() {
            let allowed = match cursor.image {
                None => true,
                // Thumbnails overwrite each other; attachments are first-writer-wins.
                Some(current) if current == origin => origin == ImageOrigin::Thumbnail,
                Some(current) => current < origin,
            };
            if allowed {
                entry.image_url = Some(url.to_string());
                cursor.image = Some(origin);
            }
        }
    }
}

/// Treats `none` as empty for the first fragment.
fn append(field: &mut Option<String>, fragment: &str) {
    field.get_or_insert_with(String::new).push_str(fragment);
}
