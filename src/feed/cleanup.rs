//! Finishing pass over a successfully parsed feed.
//!
//! Trims text fields, resolves each entry's image reference to a bare URL,
//! and turns raw description HTML into [`RichText`]. Nothing here can fail:
//! broken sub-content degrades to plain text or to no image.

use super::html::{clean_html, contains_img_tag, extract_img_src, RichText, TextStyle};
use super::model::{Entry, Feed};

/// Runs the finishing pass. Safe to run more than once.
pub fn post_process(feed: &mut Feed, style: &TextStyle) {
    trim_field(&mut feed.title);
    trim_field(&mut feed.description);
    trim_field(&mut feed.image_url);

    for entry in feed.entries.iter_mut().flatten() {
        finish_entry(entry, style);
    }
}

fn finish_entry(entry: &mut Entry, style: &TextStyle) {
    trim_field(&mut entry.title);
    trim_field(&mut entry.description);
    trim_field(&mut entry.link);
    trim_field(&mut entry.publication_date);
    for category in &mut entry.categories {
        let trimmed = category.trim();
        if trimmed.len() != category.len() {
            *category = trimmed.to_string();
        }
    }

    entry.image_url = entry.image_url.take().and_then(|raw| normalize_image_url(&raw));

    // Already cleaned on an earlier pass; the description now holds plain text.
    if entry.cleaned_body.is_some() {
        return;
    }
    if let Some(raw) = entry.description.as_deref() {
        match clean_html(raw, style.clone()) {
            Ok(body) => {
                entry.description = Some(body.text.clone());
                entry.cleaned_body = Some(body);
            }
            Err(e) => {
                tracing::debug!(
                    title = entry.title.as_deref().unwrap_or(""),
                    error = %e,
                    "Entry body is not clean HTML, keeping plain text"
                );
                entry.cleaned_body = Some(RichText::plain(raw, style.clone()));
            }
        }
    }
}

/// Reduces a stored image reference to a bare URL.
///
/// Backslash escapes are stripped first. Values that are markup rather than
/// a URL yield the `src` of their first `<img>` tag, or `None` when there
/// is no usable one. A resolved value maps to itself.
pub(crate) fn normalize_image_url(raw: &str) -> Option<String> {
    let unescaped = raw.replace('\\', "");
    let candidate = unescaped.trim();
    if is_markup(candidate) {
        // Entity decoding can reintroduce backslashes or markup.
        let extracted = extract_img_src(candidate)
            .map(|src| src.replace('\\', "").trim().to_string())
            .filter(|src| !src.is_empty() && !is_markup(src));
        if extracted.is_none() {
            tracing::debug!(markup = %candidate, "Discarding image markup without a usable src");
        }
        return extracted;
    }
    (!candidate.is_empty()).then(|| candidate.to_string())
}

fn is_markup(value: &str) -> bool {
    value.starts_with('<') || contains_img_tag(value)
}

fn trim_field(field: &mut Option<String>) {
    if let Some(value) = field {
        let trimmed = value.trim();
        if trimmed.len() != value.len() {
            *value = trimmed.to_string();
        }
    }
}
