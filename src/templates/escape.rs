//! HTML escaping for user-authored text.
//!
//! Text is escaped once, on write, and carried around as [`Sanitized`] so a
//! view can tell escaped text from raw text by type.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Escape the five HTML-significant characters.
pub fn sanitize(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Reverse [`sanitize`]. Only the five entities it produces are decoded; any
/// other `&...;` sequence is left alone.
pub fn unescape(input: &str) -> String {
    const ENTITIES: [(&str, char); 5] = [
        ("&amp;", '&'),
        ("&lt;", '<'),
        ("&gt;", '>'),
        ("&quot;", '"'),
        ("&#39;", '\''),
    ];

    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        match ENTITIES.iter().find(|(entity, _)| tail.starts_with(entity)) {
            Some((entity, c)) => {
                out.push(*c);
                rest = &tail[entity.len()..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Text that has been through [`sanitize`] and may be embedded in HTML as-is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sanitized(String);

impl Sanitized {
    pub fn new(raw: &str) -> Self {
        Sanitized(sanitize(raw))
    }

    pub fn as_html(&self) -> &str {
        &self.0
    }

    /// The original text, with entities decoded.
    pub fn to_plain(&self) -> String {
        unescape(&self.0)
    }

    /// Case-insensitive match of raw `needle` against the plain text, so
    /// entity markup never matches.
    pub fn contains_ignore_case(&self, needle: &str) -> bool {
        self.to_plain().to_lowercase().contains(&needle.to_lowercase())
    }

    /// At most `max_chars` characters of the plain text, re-escaped, so an
    /// entity is never cut in half.
    pub fn preview(&self, max_chars: usize) -> Sanitized {
        let plain = self.to_plain();
        if plain.chars().count() <= max_chars {
            return self.clone();
        }
        let cut: String = plain.chars().take(max_chars).collect();
        Sanitized(format!("{}...", sanitize(&cut)))
    }
}

impl fmt::Display for Sanitized {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
