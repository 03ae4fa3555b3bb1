//! Dialect detection and path classification.
//!
//! Both supported grammars are described by static tables mapping an exact
//! element path to an [`ElementKind`]. Paths missing from a table are
//! ignored, so unknown extension elements pass through harmlessly.

/// Document grammar, fixed by the root element name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Rss,
    Atom,
}

impl Dialect {
    /// Classifies a root element name. Returns `None` for anything other
    /// than `rss` or `feed`.
    pub fn detect(root: &str) -> Option<Self> {
        match root {
            "rss" => Some(Dialect::Rss),
            "feed" => Some(Dialect::Atom),
            _ => None,
        }
    }

    fn table(self) -> &'static [(&'static str, ElementKind)] {
        match self {
            Dialect::Rss => RSS_PATHS,
            Dialect::Atom => ATOM_PATHS,
        }
    }
}

/// Semantic role of an element, independent of dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Title,
    ImageUrl,
    Description,
    ItemBoundary,
    ItemTitle,
    ItemDescription,
    ItemLink,
    /// Atom `<link href>`; carries the link in an attribute.
    ItemLinkHref,
    ItemCategory,
    ItemPubDate,
    ItemThumbnail,
    ItemEnclosure,
    ItemMediaContent,
    ItemContentEncoded,
}

const RSS_PATHS: &[(&str, ElementKind)] = &[
    ("rss/channel/title", ElementKind::Title),
    ("rss/channel/image/url", ElementKind::ImageUrl),
    ("rss/channel/description", ElementKind::Description),
    ("rss/channel/item", ElementKind::ItemBoundary),
    ("rss/channel/item/title", ElementKind::ItemTitle),
    ("rss/channel/item/description", ElementKind::ItemDescription),
    ("rss/channel/item/link", ElementKind::ItemLink),
    ("rss/channel/item/category", ElementKind::ItemCategory),
    ("rss/channel/item/pubDate", ElementKind::ItemPubDate),
    ("rss/channel/item/media:thumbnail", ElementKind::ItemThumbnail),
    ("rss/channel/item/enclosure", ElementKind::ItemEnclosure),
    ("rss/channel/item/media:content", ElementKind::ItemMediaContent),
    ("rss/channel/item/content:encoded", ElementKind::ItemContentEncoded),
];

// `id` stays as the link source of last resort; `link href` overrides it.
const ATOM_PATHS: &[(&str, ElementKind)] = &[
    ("feed/title", ElementKind::Title),
    ("feed/icon", ElementKind::ImageUrl),
    ("feed/subtitle", ElementKind::Description),
    ("feed/entry", ElementKind::ItemBoundary),
    ("feed/entry/title", ElementKind::ItemTitle),
    ("feed/entry/summary", ElementKind::ItemDescription),
    ("feed/entry/id", ElementKind::ItemLink),
    ("feed/entry/link", ElementKind::ItemLinkHref),
    ("feed/entry/category", ElementKind::ItemCategory),
    ("feed/entry/published", ElementKind::ItemPubDate),
    ("feed/entry/media:thumbnail", ElementKind::ItemThumbnail),
    ("feed/entry/content", ElementKind::ItemContentEncoded),
];

/// Resolves the semantic kind of the element at `path`.
///
/// A session whose dialect could not be detected matches nothing.
pub fn classify(dialect: Option<Dialect>, path: &str) -> Option<ElementKind> {
    let table = dialect?.table();
    table
        .iter()
        .find(|(candidate, _)| *candidate == path)
        .map(|(_, kind)| *kind)
}
