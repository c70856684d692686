// src/sources/mod.rs
pub mod feed;
pub mod gmail;
pub mod linkedin;

use once_cell::sync::OnceCell;
use regex::Regex;
use std::time::Duration;

/// Client timeout for all HTTP-backed sources.
pub(crate) const HTTP_TIMEOUT: Duration = Duration::from_secs(20);

pub(crate) fn http_client() -> anyhow::Result<reqwest::Client> {
    use anyhow::Context;
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .context("building reqwest client")
}

/// Longest text kept from a single feed or notification field.
pub const MAX_TEXT_CHARS: usize = 5_000;

fn markup_re() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"(?is)<[^>]*>").expect("static regex"))
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("static regex"))
}

/// One line of plain text from an HTML fragment: entities decoded, tags
/// dropped (each counts as a word break), typographic quotes made ASCII,
/// whitespace collapsed, capped at [`MAX_TEXT_CHARS`].
pub fn plain_text(fragment: &str) -> String {
    let decoded = html_escape::decode_html_entities(fragment);
    let untagged = markup_re().replace_all(&decoded, " ");
    let ascii: String = untagged
        .chars()
        .map(|c| match c {
            '\u{201C}' | '\u{201D}' | '\u{00AB}' | '\u{00BB}' => '"',
            '\u{2018}' | '\u{2019}' => '\'',
            other => other,
        })
        .collect();
    whitespace_re()
        .replace_all(ascii.trim(), " ")
        .chars()
        .take(MAX_TEXT_CHARS)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markup_entities_and_quotes_become_plain_text() {
        let s = "  <p>Hello,&nbsp;&nbsp; <b>world</b></p> &ldquo;ok&rdquo; ";
        assert_eq!(plain_text(s), r#"Hello, world "ok""#);
        assert_eq!(plain_text("line<br/>break"), "line break");
        assert_eq!(plain_text(""), "");
    }

    #[test]
    fn long_text_is_capped() {
        let long = "x".repeat(MAX_TEXT_CHARS + 10);
        assert_eq!(plain_text(&long).chars().count(), MAX_TEXT_CHARS);
    }
}
