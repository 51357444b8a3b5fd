//! Small pure helpers shared across the pipeline.
//!
//! URL building, the MediaWiki flavor of percent-encoding, HTML entity
//! decoding, Markdown defusing for downstream chat sinks, regex escaping
//! and IP/CIDR classification.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::net::IpAddr;

/// Characters left raw by MediaWiki's `wfUrlencode` on top of the RFC 3986
/// unreserved set.
const MEDIAWIKI_ENCODE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'!')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'*');

/// Builds the base URL of a wiki.
///
/// English wikis live at the bare subdomain; every other language gets a
/// path segment.
pub fn url(wiki: &str, language: &str, domain: &str) -> String {
    if language.is_empty() || language == "en" {
        format!("https://{wiki}.{domain}")
    } else {
        format!("https://{wiki}.{domain}/{language}")
    }
}

/// Percent-encodes a page title the way MediaWiki does in URLs: RFC 3986,
/// then spaces become underscores and `:` and `/` stay readable.
pub fn encode(s: &str) -> String {
    utf8_percent_encode(s, MEDIAWIKI_ENCODE)
        .to_string()
        .replace("%20", "_")
        .replace("%3A", ":")
        .replace("%2F", "/")
}

/// Inverse of [`encode`].
pub fn decode(s: &str) -> String {
    let prepared = s
        .replace('_', "%20")
        .replace(':', "%3A")
        .replace('/', "%2F");
    percent_decode_str(&prepared).decode_utf8_lossy().into_owned()
}

/// Backslash-escapes every regex metacharacter in `s`.
pub fn escape_regex(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(
            c,
            '-' | '/' | '\\' | '^' | '$' | '*' | '+' | '?' | '.' | '(' | ')' | '|' | '[' | ']'
                | '{' | '}'
        ) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Defuses user-controlled text for Markdown sinks.
///
/// Links and mentions get a zero-width space wedged in so chat clients do
/// not auto-link or ping, line breaks are stripped, and Markdown tokens are
/// backslash-escaped.
pub fn escape_markdown(s: &str) -> String {
    let mut out = s
        .replace("http://", "http:\u{200B}//")
        .replace("https://", "https:\u{200B}//")
        .replace("discord.gg", "discord\u{200B}.gg")
        .replace('@', "@\u{200B}")
        .replace(['\r', '\n'], "");
    out = out.replace('\\', "\\\\");
    for token in ['*', '_', '~', '|', '`', '>'] {
        out = out.replace(token, &format!("\\{token}"));
    }
    out
}

/// Decodes the handful of HTML entities MediaWiki emits in summaries and
/// thread metadata.
pub fn decode_html(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#039;", "'")
        .replace("&#10;", "\n")
        .replace("&amp;", "&")
}

/// Whether `s` is a bare IPv4 or IPv6 address.
pub fn is_ip(s: &str) -> bool {
    s.parse::<IpAddr>().is_ok()
}

/// Whether `s` is a blockable CIDR range.
///
/// MediaWiki refuses ranges wider than /16 (IPv4) or /19 (IPv6), so those
/// are the lower bounds here.
pub fn is_ip_range(s: &str) -> bool {
    let Some((addr, prefix)) = s.split_once('/') else {
        return false;
    };
    let Ok(prefix) = prefix.parse::<u8>() else {
        return false;
    };
    match addr.parse::<IpAddr>() {
        Ok(IpAddr::V4(_)) => (16..=32).contains(&prefix),
        Ok(IpAddr::V6(_)) => (19..=128).contains(&prefix),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_language_variants() {
        assert_eq!(url("c", "en", "fandom.com"), "https://c.fandom.com");
        assert_eq!(url("c", "", "fandom.com"), "https://c.fandom.com");
        assert_eq!(url("c", "fr", "fandom.com"), "https://c.fandom.com/fr");
        assert_eq!(url("dev", "de", "wikia.org"), "https://dev.wikia.org/de");
    }

    #[test]
    fn test_encode_mediawiki_flavor() {
        assert_eq!(encode("Main Page"), "Main_Page");
        assert_eq!(encode("User:Foo/Bar"), "User:Foo/Bar");
        assert_eq!(encode("C++ (language)"), "C%2B%2B_(language)");
        assert_eq!(encode("It's!"), "It's!");
        assert_eq!(encode("50%"), "50%25");
    }

    #[test]
    fn test_decode_roundtrip() {
        assert_eq!(decode("Main_Page"), "Main Page");
        assert_eq!(decode("User:Foo/Bar"), "User:Foo/Bar");
        assert_eq!(decode(&encode("Bac à sable")), "Bac à sable");
        assert_eq!(decode(&encode("A_B")), "A B");
    }

    #[test]
    fn test_escape_regex() {
        assert_eq!(escape_regex("a.b"), "a\\.b");
        assert_eq!(escape_regex("[$1]"), "\\[\\$1\\]");
        assert_eq!(escape_regex("a-b/c"), "a\\-b\\/c");
        assert_eq!(escape_regex("plain"), "plain");
    }

    #[test]
    fn test_escape_markdown() {
        assert_eq!(
            escape_markdown("see https://evil.example"),
            "see https:\u{200B}//evil.example"
        );
        assert_eq!(escape_markdown("hi @everyone"), "hi @\u{200B}everyone");
        assert_eq!(escape_markdown("a*b_c"), "a\\*b\\_c");
        assert_eq!(escape_markdown("line\r\nbreak"), "linebreak");
        assert_eq!(escape_markdown("back\\slash"), "back\\\\slash");
    }

    #[test]
    fn test_decode_html() {
        assert_eq!(decode_html("&lt;b&gt;"), "<b>");
        assert_eq!(decode_html("&quot;it&#039;s&quot;"), "\"it's\"");
        assert_eq!(decode_html("a&amp;lt;"), "a&lt;");
    }

    #[test]
    fn test_is_ip() {
        assert!(is_ip("192.0.2.1"));
        assert!(is_ip("2001:db8::1"));
        assert!(!is_ip("Alice"));
        assert!(!is_ip("192.0.2"));
    }

    #[test]
    fn test_is_ip_range_cidr_caps() {
        assert!(is_ip_range("192.0.2.0/24"));
        assert!(is_ip_range("10.0.0.0/16"));
        assert!(!is_ip_range("10.0.0.0/8"));
        assert!(is_ip_range("2001:db8::/19"));
        assert!(!is_ip_range("2001:db8::/18"));
        assert!(!is_ip_range("192.0.2.0"));
        assert!(!is_ip_range("not/an/ip"));
    }
}
