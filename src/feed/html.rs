//! Minimal HTML-subset cleaner for entry bodies.
//!
//! Feed descriptions routinely embed HTML. Rather than a full HTML engine,
//! this module understands a small allow-list of tags and turns them into a
//! [`RichText`] value: plain text plus inline formatting spans.
//!
//! Supported: paragraphs and other block containers (`p`, `div`, `ul`,
//! `ol`, `li`, `blockquote`, `h1`-`h6`), line breaks, emphasis (`b`,
//! `strong`, `i`, `em`, `u`), code (`code`, `pre`), and links (`a href`).
//! Any other tag is dropped while its text is kept, except `script` and
//! `style` whose content is discarded entirely.

use std::borrow::Cow;

use serde::Serialize;
use thiserror::Error;

/// Errors produced when a body is too broken to clean.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HtmlError {
    /// A `<` that opens a tag is never followed by a matching `>`.
    #[error("unterminated tag at byte {0}")]
    UnterminatedTag(usize),

    /// A `<!--` comment never closes.
    #[error("unterminated comment at byte {0}")]
    UnterminatedComment(usize),

    /// A closing inline tag has no matching open tag.
    #[error("closing </{0}> without matching open tag")]
    UnbalancedClose(String),
}

/// Named colour of the default text style.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct TextColor(pub String);

impl Default for TextColor {
    fn default() -> Self {
        TextColor("label".to_string())
    }
}

/// Base style applied to a whole cleaned body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextStyle {
    pub font_size: f32,
    pub color: TextColor,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font_size: 12.0,
            color: TextColor::default(),
        }
    }
}

/// Inline formatting carried by a span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InlineFormat {
    Bold,
    Italic,
    Underline,
    Code,
    Link { href: String },
}

/// Formatting over `text[start..end]` (byte offsets).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StyledSpan {
    pub start: usize,
    pub end: usize,
    pub format: InlineFormat,
}

/// Cleaned, renderable text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RichText {
    pub text: String,
    pub spans: Vec<StyledSpan>,
    pub style: TextStyle,
}

impl RichText {
    /// Unstyled text with only the base style applied.
    pub fn plain(text: impl Into<String>, style: TextStyle) -> Self {
        Self {
            text: text.into(),
            spans: Vec::new(),
            style,
        }
    }

    /// The text covered by `span`.
    pub fn span_text(&self, span: &StyledSpan) -> &str {
        self.text.get(span.start..span.end).unwrap_or("")
    }
}

/// Parses `input` as lightweight HTML.
///
/// # Errors
///
/// Returns [`HtmlError`] for unterminated tags or comments and for closing
/// inline tags that were never opened. Callers are expected to fall back to
/// plain text.
pub fn clean_html(input: &str, style: TextStyle) -> Result<RichText, HtmlError> {
    let mut out = TextBuilder::default();
    let mut pos = 0;

    while pos < input.len() {
        let rest = &input[pos..];
        let Some(lt) = rest.find('<') else {
            out.push_text(rest);
            break;
        };
        out.push_text(&rest[..lt]);
        pos += lt;
        let rest = &input[pos..];

        if rest.starts_with("<!--") {
            let end = rest[4..]
                .find("-->")
                .ok_or(HtmlError::UnterminatedComment(pos))?;
            pos += 4 + end + 3;
            continue;
        }

        // A bare `<` (as in "a < b") is text, not markup.
        let opens_tag = rest[1..]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || matches!(c, '/' | '!' | '?'));
        if !opens_tag {
            out.push_text("<");
            pos += 1;
            continue;
        }

        let close = find_tag_end(rest).ok_or(HtmlError::UnterminatedTag(pos))?;
        let tag = Tag::parse(&rest[1..close]);
        pos += close + 1;

        if !tag.closing && matches!(tag.name.as_str(), "script" | "style") {
            pos = skip_raw_text(input, pos, &tag.name);
            continue;
        }
        out.apply(tag)?;
    }

    Ok(out.finish(style))
}

/// True when `s` contains something that looks like an `<img` tag.
pub fn contains_img_tag(s: &str) -> bool {
    find_img_tag(s).is_some()
}

/// Extracts the first `src` attribute of an `<img>` tag in `markup`.
pub fn extract_img_src(markup: &str) -> Option<String> {
    let start = find_img_tag(markup)?;
    let rest = &markup[start..];
    let end = find_tag_end(rest).unwrap_or(rest.len());
    let tag = Tag::parse(&rest[1..end]);
    tag.attr("src")
        .as_deref()
        .map(str::trim)
        .filter(|src| !src.is_empty())
        .map(str::to_string)
}

fn find_img_tag(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut from = 0;
    while let Some(offset) = find_ignore_ascii_case(&bytes[from..], b"<img") {
        let at = from + offset;
        match bytes.get(at + 4) {
            None => return Some(at),
            Some(b) if b.is_ascii_whitespace() || *b == b'/' || *b == b'>' => return Some(at),
            _ => from = at + 4,
        }
    }
    None
}

fn find_ignore_ascii_case(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle))
}

/// Index of the `>` closing the tag that starts at `s[0] == '<'`,
/// skipping over quoted attribute values.
fn find_tag_end(s: &str) -> Option<usize> {
    let mut quote = None;
    for (i, b) in s.bytes().enumerate().skip(1) {
        match (quote, b) {
            (Some(q), _) if b == q => quote = None,
            (Some(_), _) => {}
            (None, b'"' | b'\'') => quote = Some(b),
            (None, b'>') => return Some(i),
            (None, b'<') => return None,
            _ => {}
        }
    }
    None
}

/// Returns the position just past `</name ...>`, or the end of input.
fn skip_raw_text(input: &str, from: usize, name: &str) -> usize {
    let closing = format!("</{}", name);
    let Some(offset) = find_ignore_ascii_case(&input.as_bytes()[from..], closing.as_bytes()) else {
        return input.len();
    };
    let at = from + offset;
    match input[at..].find('>') {
        Some(gt) => at + gt + 1,
        None => input.len(),
    }
}

struct Tag<'a> {
    name: String,
    closing: bool,
    body: &'a str,
}

impl<'a> Tag<'a> {
    /// Parses the inside of `<...>` (without the angle brackets).
    fn parse(inner: &'a str) -> Self {
        let (closing, inner) = match inner.strip_prefix('/') {
            Some(rest) => (true, rest),
            None => (false, inner),
        };
        let name_end = inner
            .find(|c: char| c.is_ascii_whitespace() || c == '/')
            .unwrap_or(inner.len());
        Self {
            name: inner[..name_end].to_ascii_lowercase(),
            closing,
            body: &inner[name_end..],
        }
    }

    fn attr(&self, wanted: &str) -> Option<String> {
        let mut rest = self.body;
        loop {
            rest = rest.trim_start_matches(|c: char| c.is_ascii_whitespace() || c == '/');
            if rest.is_empty() {
                return None;
            }
            let name_end = rest
                .find(|c: char| c.is_ascii_whitespace() || c == '=' || c == '/')
                .unwrap_or(rest.len());
            let name = &rest[..name_end];
            rest = rest[name_end..].trim_start();

            let value = if let Some(after_eq) = rest.strip_prefix('=') {
                let after_eq = after_eq.trim_start();
                let (value, remaining) = split_attr_value(after_eq);
                rest = remaining;
                Some(value)
            } else {
                None
            };

            if name.eq_ignore_ascii_case(wanted) {
                return Some(decode_entities(value.unwrap_or("")).into_owned());
            }
        }
    }
}

fn split_attr_value(s: &str) -> (&str, &str) {
    match s.chars().next() {
        Some(q @ ('"' | '\'')) => match s[1..].find(q) {
            Some(end) => (&s[1..1 + end], &s[2 + end..]),
            None => (&s[1..], ""),
        },
        _ => {
            let end = s.find(|c: char| c.is_ascii_whitespace()).unwrap_or(s.len());
            (&s[..end], &s[end..])
        }
    }
}

/// Resolves the named HTML entities supported in feed text.
pub(crate) fn resolve_named_entity(name: &str) -> Option<&'static str> {
    let resolved = match name {
        "amp" => "&",
        "lt" => "<",
        "gt" => ">",
        "quot" => "\"",
        "apos" => "'",
        "nbsp" => "\u{a0}",
        "ndash" => "\u{2013}",
        "mdash" => "\u{2014}",
        "hellip" => "\u{2026}",
        "lsquo" => "\u{2018}",
        "rsquo" => "\u{2019}",
        "ldquo" => "\u{201c}",
        "rdquo" => "\u{201d}",
        "copy" => "\u{a9}",
        "reg" => "\u{ae}",
        "trade" => "\u{2122}",
        _ => return None,
    };
    Some(resolved)
}

/// Decodes named and numeric character references. Unknown references are
/// kept literally.
pub(crate) fn decode_entities(s: &str) -> Cow<'_, str> {
    if !s.contains('&') {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest[1..]
            .find(';')
            .filter(|&semi| semi > 0 && semi <= 10)
            .and_then(|semi| decode_reference(&rest[1..1 + semi]).map(|c| (c, semi)));
        match decoded {
            Some((text, semi)) => {
                out.push_str(&text);
                rest = &rest[semi + 2..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

fn decode_reference(reference: &str) -> Option<Cow<'static, str>> {
    if let Some(number) = reference.strip_prefix('#') {
        let code = match number.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => number.parse().ok()?,
        };
        return char::from_u32(code).map(|c| Cow::Owned(c.to_string()));
    }
    resolve_named_entity(reference).map(Cow::Borrowed)
}

struct OpenTag {
    name: String,
    format: Option<InlineFormat>,
    start: usize,
}

#[derive(Default)]
struct TextBuilder {
    text: String,
    spans: Vec<StyledSpan>,
    open: Vec<OpenTag>,
    /// Tags popped early because an enclosing tag closed first.
    implicitly_closed: Vec<String>,
    pending_space: bool,
    pre_depth: usize,
}

impl TextBuilder {
    fn push_text(&mut self, raw: &str) {
        if raw.is_empty() {
            return;
        }
        let decoded = decode_entities(raw);
        if self.pre_depth > 0 {
            self.flush_space();
            self.text.push_str(&decoded);
            return;
        }
        for c in decoded.chars() {
            if c.is_ascii_whitespace() {
                self.pending_space = true;
            } else {
                self.flush_space();
                self.text.push(c);
            }
        }
    }

    fn flush_space(&mut self) {
        if self.pending_space && !self.text.is_empty() && !self.text.ends_with('\n') {
            self.text.push(' ');
        }
        self.pending_space = false;
    }

    /// Ensures the text ends with at least `count` newlines.
    fn break_lines(&mut self, count: usize) {
        self.pending_space = false;
        if self.text.is_empty() {
            return;
        }
        let existing = self.text.len() - self.text.trim_end_matches('\n').len();
        for _ in existing..count {
            self.text.push('\n');
        }
    }

    fn apply(&mut self, tag: Tag<'_>) -> Result<(), HtmlError> {
        let name = tag.name.as_str();
        match name {
            "br" => {
                self.pending_space = false;
                if !self.text.is_empty() {
                    self.text.push('\n');
                }
            }
            "p" | "blockquote" => self.break_lines(2),
            "div" | "ul" | "ol" | "tr" => self.break_lines(1),
            "li" if !tag.closing => {
                self.break_lines(1);
                self.text.push_str("\u{2022} ");
            }
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                if tag.closing {
                    self.inline(&tag, None)?;
                    self.break_lines(2);
                } else {
                    self.break_lines(2);
                    self.inline(&tag, Some(InlineFormat::Bold))?;
                }
            }
            "b" | "strong" => self.inline(&tag, Some(InlineFormat::Bold))?,
            "i" | "em" => self.inline(&tag, Some(InlineFormat::Italic))?,
            "u" => self.inline(&tag, Some(InlineFormat::Underline))?,
            "code" => self.inline(&tag, Some(InlineFormat::Code))?,
            "pre" => {
                if tag.closing {
                    self.inline(&tag, None)?;
                    self.pre_depth = self.pre_depth.saturating_sub(1);
                    self.break_lines(1);
                } else {
                    self.break_lines(1);
                    self.pre_depth += 1;
                    self.inline(&tag, Some(InlineFormat::Code))?;
                }
            }
            "a" => {
                let format = tag
                    .attr("href")
                    .filter(|href| !href.trim().is_empty())
                    .map(|href| InlineFormat::Link {
                        href: href.trim().to_string(),
                    });
                self.inline(&tag, format)?;
            }
            _ => {}
        }
        Ok(())
    }

    fn inline(&mut self, tag: &Tag<'_>, format: Option<InlineFormat>) -> Result<(), HtmlError> {
        if !tag.closing {
            self.flush_space();
            self.open.push(OpenTag {
                name: tag.name.clone(),
                format,
                start: self.text.len(),
            });
            return Ok(());
        }

        let Some(index) = self.open.iter().rposition(|open| open.name == tag.name) else {
            // The late close of a misnested pair like `<b><i>x</b></i>`
            if let Some(at) = self.implicitly_closed.iter().rposition(|name| *name == tag.name) {
                self.implicitly_closed.remove(at);
                return Ok(());
            }
            return Err(HtmlError::UnbalancedClose(tag.name.clone()));
        };
        // Closing an outer tag implicitly closes anything opened inside it.
        while self.open.len() > index {
            if let Some(open) = self.open.pop() {
                if self.open.len() > index {
                    self.implicitly_closed.push(open.name.clone());
                }
                self.close_span(open);
            }
        }
        Ok(())
    }

    fn close_span(&mut self, open: OpenTag) {
        let end = self.text.len();
        if let Some(format) = open.format {
            if end > open.start {
                self.spans.push(StyledSpan {
                    start: open.start,
                    end,
                    format,
                });
            }
        }
    }

    fn finish(mut self, style: TextStyle) -> RichText {
        while let Some(open) = self.open.pop() {
            self.close_span(open);
        }

        let trimmed_len = self.text.trim_end().len();
        self.text.truncate(trimmed_len);
        let lead = self.text.len() - self.text.trim_start().len();
        self.text.drain(..lead);
        let len = self.text.len();
        let mut spans: Vec<StyledSpan> = self
            .spans
            .into_iter()
            .filter_map(|mut span| {
                span.start = span.start.saturating_sub(lead);
                span.end = span.end.saturating_sub(lead).min(len);
                (span.start < span.end).then_some(span)
            })
            .collect();
        spans.sort_by_key(|span| (span.start, std::cmp::Reverse(span.end)));

        RichText {
            text: self.text,
            spans,
            style,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn clean(input: &str) -> RichText {
        clean_html(input, TextStyle::default()).unwrap()
    }

    #[test]
    fn test_plain_text_passes_through() {
        let text = clean("Just some text");
        assert_eq!(text.text, "Just some text");
        assert!(text.spans.is_empty());
    }

    #[test]
    fn test_whitespace_is_collapsed() {
        assert_eq!(clean("  a \n\t b   c  ").text, "a b c");
    }

    #[test]
    fn test_paragraphs_and_breaks() {
        let text = clean("<p>First</p><p>Second<br/>line</p>");
        assert_eq!(text.text, "First\n\nSecond\nline");
    }

    #[test]
    fn test_emphasis_spans() {
        let text = clean("Hello <b>bold</b> and <em>soft</em> world");
        assert_eq!(text.text, "Hello bold and soft world");
        assert_eq!(text.spans.len(), 2);
        assert_eq!(text.span_text(&text.spans[0]), "bold");
        assert_eq!(text.spans[0].format, InlineFormat::Bold);
        assert_eq!(text.span_text(&text.spans[1]), "soft");
        assert_eq!(text.spans[1].format, InlineFormat::Italic);
    }

    #[test]
    fn test_link_span_keeps_href() {
        let text = clean(r#"Read <a href="https://example.com/post?a=1&amp;b=2">more</a>"#);
        assert_eq!(text.text, "Read more");
        assert_eq!(
            text.spans,
            vec![StyledSpan {
                start: 5,
                end: 9,
                format: InlineFormat::Link {
                    href: "https://example.com/post?a=1&b=2".to_string()
                },
            }]
        );
    }

    #[test]
    fn test_unknown_tags_keep_their_text() {
        let text = clean(r#"<span class="x">kept</span> <img src="a.jpg"/>text"#);
        assert_eq!(text.text, "kept text");
    }

    #[test]
    fn test_script_and_style_content_dropped() {
        let text = clean("a<script>alert('x')</script>b<style>p{}</style>c");
        assert_eq!(text.text, "abc");
    }

    #[test]
    fn test_comments_skipped() {
        assert_eq!(clean("a<!-- hidden -->b").text, "ab");
    }

    #[test]
    fn test_entities_decoded() {
        let text = clean("Fish &amp; chips &mdash; &#8220;tasty&#x201D; &bogus; end");
        assert_eq!(text.text, "Fish & chips \u{2014} \u{201c}tasty\u{201d} &bogus; end");
    }

    #[test]
    fn test_bare_less_than_is_text() {
        assert_eq!(clean("a < b").text, "a < b");
    }

    #[test]
    fn test_list_items() {
        let text = clean("<ul><li>one</li><li>two</li></ul>");
        assert_eq!(text.text, "\u{2022} one\n\u{2022} two");
    }

    #[test]
    fn test_heading_is_bold_block() {
        let text = clean("<h2>Title</h2>Body");
        assert_eq!(text.text, "Title\n\nBody");
        assert_eq!(
            text.spans,
            vec![StyledSpan {
                start: 0,
                end: 5,
                format: InlineFormat::Bold
            }]
        );
    }

    #[test]
    fn test_unclosed_inline_closed_at_end() {
        let text = clean("<b>bold to the end");
        assert_eq!(text.spans.len(), 1);
        assert_eq!(text.span_text(&text.spans[0]), "bold to the end");
    }

    #[test]
    fn test_unterminated_tag_is_error() {
        let result = clean_html("text <p class=\"x\" and more", TextStyle::default());
        assert_eq!(result, Err(HtmlError::UnterminatedTag(5)));
    }

    #[test]
    fn test_unbalanced_close_is_error() {
        let result = clean_html("text</b>", TextStyle::default());
        assert_eq!(result, Err(HtmlError::UnbalancedClose("b".to_string())));
    }

    #[test]
    fn test_misnested_inline_tags_are_tolerated() {
        let text = clean("<b><i>x</b></i> y");
        assert_eq!(text.text, "x y");
        assert_eq!(text.spans.len(), 2);
        assert!(text.spans.iter().all(|span| text.span_text(span) == "x"));
        assert!(text.spans.iter().any(|s| s.format == InlineFormat::Bold));
        assert!(text.spans.iter().any(|s| s.format == InlineFormat::Italic));
    }

    #[test]
    fn test_stray_close_after_misnesting_is_error() {
        let result = clean_html("<b><i>x</b></i></i>", TextStyle::default());
        assert_eq!(result, Err(HtmlError::UnbalancedClose("i".to_string())));
    }

    #[test]
    fn test_unterminated_comment_is_error() {
        assert!(matches!(
            clean_html("a <!-- never ends", TextStyle::default()),
            Err(HtmlError::UnterminatedComment(_))
        ));
    }

    #[test]
    fn test_style_is_applied() {
        let style = TextStyle {
            font_size: 16.0,
            color: TextColor("secondary".into()),
        };
        let text = clean_html("x", style.clone()).unwrap();
        assert_eq!(text.style, style);
    }

    #[test]
    fn test_contains_img_tag() {
        assert!(contains_img_tag(r#"<p><IMG src="a.png"></p>"#));
        assert!(contains_img_tag("<img/>"));
        assert!(!contains_img_tag("<imgur>"));
        assert!(!contains_img_tag("no images here"));
    }

    #[test]
    fn test_extract_img_src_variants() {
        assert_eq!(
            extract_img_src(r#"<img alt="x" src="https://e.com/a.jpg" />"#).as_deref(),
            Some("https://e.com/a.jpg")
        );
        assert_eq!(
            extract_img_src("<img src='b.png'>").as_deref(),
            Some("b.png")
        );
        assert_eq!(
            extract_img_src("text <img width=3 src=c.gif> more").as_deref(),
            Some("c.gif")
        );
        assert_eq!(extract_img_src("<img alt=\"no source\">"), None);
        assert_eq!(extract_img_src("https://e.com/plain.jpg"), None);
    }

    #[test]
    fn test_extract_img_src_decodes_entities() {
        assert_eq!(
            extract_img_src(r#"<img src="https://e.com/i?w=1&amp;h=2">"#).as_deref(),
            Some("https://e.com/i?w=1&h=2")
        );
    }
}
