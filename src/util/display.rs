use std::borrow::Cow;

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

const ELLIPSIS: char = '…';

/// Makes feed-supplied text safe to print on a single terminal line.
///
/// ANSI escape sequences (CSI and OSC) and other control characters are
/// removed; runs of whitespace, including newlines and tabs, become a single
/// space. Leading and trailing whitespace is dropped.
///
/// ```
/// use rssfeed::util::display_line;
///
/// assert_eq!(display_line("  Breaking:\n\x1b[31mred\x1b[0m news "), "Breaking: red news");
/// ```
pub fn display_line(s: &str) -> Cow<'_, str> {
    let clean = !s.chars().any(|c| c.is_control() || c == '\u{1b}')
        && !s.contains("  ")
        && s.trim().len() == s.len();
    if clean {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    let mut pending_space = false;

    while let Some(c) = chars.next() {
        match c {
            '\u{1b}' => match chars.peek() {
                Some('[') => {
                    chars.next();
                    // Parameters and intermediates run up to the final byte @..~
                    for c in chars.by_ref() {
                        if ('@'..='~').contains(&c) {
                            break;
                        }
                    }
                }
                Some(']') => {
                    chars.next();
                    // OSC ends at BEL or ST (ESC \)
                    while let Some(c) = chars.next() {
                        if c == '\u{7}' {
                            break;
                        }
                        if c == '\u{1b}' && chars.peek() == Some(&'\\') {
                            chars.next();
                            break;
                        }
                    }
                }
                _ => {}
            },
            c if c.is_whitespace() => pending_space = !out.is_empty(),
            c if c.is_control() => {}
            c => {
                if pending_space {
                    out.push(' ');
                    pending_space = false;
                }
                out.push(c);
            }
        }
    }

    Cow::Owned(out)
}

/// Truncates `s` to at most `max_width` terminal columns.
///
/// Width is measured with Unicode display widths, so CJK text and emoji count
/// as two columns. Truncated text ends in a single-column `…`; a cut never
/// splits a wide character.
///
/// ```
/// use rssfeed::util::fit_width;
///
/// assert_eq!(fit_width("Short", 10), "Short");
/// assert_eq!(fit_width("Hello World", 8), "Hello W…");
/// ```
pub fn fit_width(s: &str, max_width: usize) -> Cow<'_, str> {
    if UnicodeWidthStr::width(s) <= max_width {
        return Cow::Borrowed(s);
    }
    if max_width == 0 {
        return Cow::Borrowed("");
    }

    let budget = max_width - 1;
    let mut used = 0;
    let mut end = 0;
    for (idx, c) in s.char_indices() {
        let width = UnicodeWidthChar::width(c).unwrap_or(0);
        if used + width > budget {
            break;
        }
        used += width;
        end = idx + c.len_utf8();
    }

    let mut out = String::with_capacity(end + ELLIPSIS.len_utf8());
    out.push_str(s[..end].trim_end());
    out.push(ELLIPSIS);
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_plain_text_is_borrowed() {
        assert!(matches!(display_line("Hello world"), Cow::Borrowed(_)));
        assert!(matches!(fit_width("Hello", 5), Cow::Borrowed(_)));
    }

    #[test]
    fn test_whitespace_collapsed() {
        assert_eq!(display_line("\n\tOne\n\n  two\t"), "One two");
    }

    #[test]
    fn test_escape_sequences_removed() {
        assert_eq!(display_line("\x1b[1;31mbold red\x1b[0m"), "bold red");
        assert_eq!(display_line("\x1b]0;evil title\x07after"), "after");
        assert_eq!(display_line("\x1b]8;;http://x\x1b\\link"), "link");
        assert_eq!(display_line("a\x1bb"), "ab");
    }

    #[test]
    fn test_other_controls_removed() {
        assert_eq!(display_line("be\u{7}ll\u{0}"), "bell");
        assert_eq!(display_line("del\u{7f}ete"), "delete");
    }

    #[test]
    fn test_unterminated_sequence_drops_rest() {
        assert_eq!(display_line("ok\x1b]0;never ends"), "ok");
    }

    #[test]
    fn test_fit_ascii() {
        assert_eq!(fit_width("Hello World", 8), "Hello W…");
        assert_eq!(fit_width("Hello World", 7), "Hello…");
        assert_eq!(fit_width("Hello", 0), "");
        assert_eq!(fit_width("Hello", 1), "…");
    }

    #[test]
    fn test_fit_wide_chars() {
        // Each ideograph is two columns; the third would overflow the budget
        assert_eq!(fit_width("你好世界", 6), "你好…");
        assert_eq!(fit_width("你好世界", 8), "你好世界");
    }

    proptest! {
        #[test]
        fn prop_fit_width_never_exceeds(s in "[a-zA-Z 你好世界é]{0,40}", width in 0usize..30) {
            let fitted = fit_width(&s, width);
            prop_assert!(UnicodeWidthStr::width(fitted.as_ref()) <= width);
        }

        #[test]
        fn prop_display_line_has_no_controls(s in "[a-z \\n\\t\\x1b\\[\\]0-9;m\\x07]{0,40}") {
            let line = display_line(&s);
            prop_assert!(!line.chars().any(|c| c.is_control()));
            prop_assert_eq!(line.trim(), line.as_ref());
        }
    }
}
