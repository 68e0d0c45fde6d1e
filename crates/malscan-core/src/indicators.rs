//! Indicator patterns and the default living-off-the-land keyword list.
//!
//! Patterns run over the ASCII-lower-cased input with Unicode disabled, so
//! they match arbitrary (non-UTF-8) bytes without failing.

use std::sync::LazyLock;

use regex::bytes::Regex;

use crate::error::Result;

/// Shell interpreters, encoding helpers and process/memory APIs commonly
/// abused by droppers and loaders.
pub const DEFAULT_SUSPICIOUS_KEYWORDS: &[&str] = &[
    "powershell",
    "cmd.exe",
    "wscript",
    "cscript",
    "rundll32",
    "reg add",
    "schtasks",
    "certutil",
    "bitsadmin",
    "invoke-expression",
    "base64",
    "frombase64string",
    "virtualalloc",
    "createremotethread",
    "loadlibrary",
];

/// `scheme://` up to whitespace, a quote or an angle bracket.
pub const URL_PATTERN: &str = r#"(?-u)https?://[^\s'"<>]+"#;

/// Dotted quad; octets are not range-checked.
pub const IPV4_PATTERN: &str = r"(?-u)\b(?:\d{1,3}\.){3}\d{1,3}\b";

pub const EMAIL_PATTERN: &str = r"(?-u)[a-zA-Z0-9_.+-]+@[a-zA-Z0-9-]+\.[a-zA-Z0-9.-]+";

static DEFAULT_PATTERNS: LazyLock<IndicatorPatterns> = LazyLock::new(|| IndicatorPatterns {
    url: Regex::new(URL_PATTERN).unwrap(),
    ipv4: Regex::new(IPV4_PATTERN).unwrap(),
    email: Regex::new(EMAIL_PATTERN).unwrap(),
});

/// Compiled indicator regexes.
#[derive(Debug, Clone)]
pub struct IndicatorPatterns {
    pub url: Regex,
    pub ipv4: Regex,
    pub email: Regex,
}

impl IndicatorPatterns {
    pub fn new(url: &str, ipv4: &str, email: &str) -> Result<Self> {
        Ok(Self {
            url: Regex::new(url)?,
            ipv4: Regex::new(ipv4)?,
            email: Regex::new(email)?,
        })
    }
}

impl Default for IndicatorPatterns {
    fn default() -> Self {
        DEFAULT_PATTERNS.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn found<'a>(re: &Regex, hay: &'a [u8]) -> Vec<&'a [u8]> {
        re.find_iter(hay).map(|m| m.as_bytes()).collect()
    }

    #[test]
    fn url_stops_at_quote_and_whitespace() {
        let p = IndicatorPatterns::default();
        let hits = found(&p.url, b"x=\"http://evil.example/a?b=1\" https://c2.test/x y");
        assert_eq!(hits, vec![&b"http://evil.example/a?b=1"[..], &b"https://c2.test/x"[..]]);
    }

    #[test]
    fn url_matches_through_non_utf8_bytes() {
        let p = IndicatorPatterns::default();
        let hits = found(&p.url, b"http://a.test/\xff\xfe ok");
        assert_eq!(hits, vec![&b"http://a.test/\xff\xfe"[..]]);
    }

    #[test]
    fn ipv4_requires_word_boundaries() {
        let p = IndicatorPatterns::default();
        assert_eq!(found(&p.ipv4, b"connect 10.0.0.1:443"), vec![&b"10.0.0.1"[..]]);
        assert!(found(&p.ipv4, b"version 1.2.3").is_empty());
    }

    #[test]
    fn email_is_found_in_binary_noise() {
        let p = IndicatorPatterns::default();
        let hits = found(&p.email, b"\x00\x01ops@mail.example.org\x00");
        assert_eq!(hits, vec![&b"ops@mail.example.org"[..]]);
    }

    #[test]
    fn invalid_pattern_is_reported() {
        assert!(IndicatorPatterns::new("(", IPV4_PATTERN, EMAIL_PATTERN).is_err());
    }
}
