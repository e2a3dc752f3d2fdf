//! HTML escaping for generated markup.
//!
//! Head/tail scaffolding is assembled from metadata that may come from request
//! state, so every attribute value and title passes through here.

use std::borrow::Cow;

/// Characters that require HTML escaping.
const ESCAPE_CHARS: [char; 5] = ['<', '>', '&', '"', '\''];

/// Get the HTML entity for a special character.
#[inline]
fn escape_char(c: char) -> Option<&'static str> {
    match c {
        '<' => Some("&lt;"),
        '>' => Some("&gt;"),
        '&' => Some("&amp;"),
        '"' => Some("&quot;"),
        '\'' => Some("&#39;"),
        _ => None,
    }
}

/// Escape HTML special characters in text content.
///
/// Uses `Cow` to avoid allocation when no escaping is needed.
///
/// # Example
/// ```ignore
/// assert_eq!(escape("<script>"), "&lt;script&gt;");
/// assert_eq!(escape("hello"), "hello"); // No allocation
/// ```
#[inline]
pub fn escape(s: &str) -> Cow<'_, str> {
    if !s.contains(ESCAPE_CHARS) {
        return Cow::Borrowed(s);
    }

    let mut result = String::with_capacity(s.len() + 8);
    for c in s.chars() {
        match escape_char(c) {
            Some(entity) => result.push_str(entity),
            None => result.push(c),
        }
    }
    Cow::Owned(result)
}

/// Escape an attribute value. Same character set as [`escape`].
#[inline]
pub fn escape_attr(s: &str) -> Cow<'_, str> {
    escape(s)
}

/// Neutralize a closing tag inside raw text (`<style>`, `<script>`), so
/// inlined content cannot terminate its element early.
pub fn guard_raw_text<'a>(s: &'a str, tag: &str) -> Cow<'a, str> {
    let needle = format!("</{tag}");
    if !s.to_ascii_lowercase().contains(&needle) {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len() + 4);
    let lower = s.to_ascii_lowercase();
    let mut last = 0;
    for (idx, _) in lower.match_indices(&needle) {
        out.push_str(&s[last..idx]);
        out.push_str("<\\/");
        last = idx + 2;
    }
    out.push_str(&s[last..]);
    Cow::Owned(out)
}
