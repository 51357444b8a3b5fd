//! Line reassembly and the top-level feed grammars.
//!
//! IRC truncates messages around 450 bytes, so a single wiki event can
//! arrive as several physical lines. Reassembly is per channel:
//!
//! - **rc**: a canonical line starts with `\x0314`; anything else is an
//!   overflow tail of the buffered line. A buffered line is only complete
//!   once the next canonical line arrives. MediaWiki sometimes drops the
//!   space at the chunk boundary, so a failed parse of the plain join is
//!   retried with single spaces at the fragment seams.
//! - **discussions**: JSON objects; a line starting with `{` opens a
//!   buffer, a line ending with `}` closes it.
//! - **newusers**: always a single line.

use lazy_static::lazy_static;
use regex::Regex;

pub(crate) const DOMAINS: &str =
    r"fandom\.com|wikia\.com|wikia\.org|gamepedia\.com|gamepedia\.io|fandom-dev\.[a-z]+";

lazy_static! {
    /// Recent-changes edit line.
    pub static ref EDIT: Regex = Regex::new(
        "^\\x0314\\[\\[\\x0307(?P<page>.*?)\\x0314\\]\\]\\x034 (?P<flags>[NBM!]*)\\x0310 \
         \\x0302(?P<url>.+?)\\x03 \\x035\\*\\x03 \\x0303(?P<user>[^\\x03]*)\\x03 \\x035\\*\\x03 \
         \\(\\x02?(?P<diff>[+-]\\d+)\\x02?\\) \\x0310(?P<summary>[^\\x03]*)"
    )
    .unwrap();

    /// Recent-changes log line.
    pub static ref LOG: Regex = Regex::new(
        "^\\x0314\\[\\[\\x0307(?P<ns>[^:\\x03]+):Log/(?P<logtype>[^\\x03]*)\\x0314\\]\\]\\x034 \
         (?P<action>[^\\x03]*)\\x0310 \\x0302(?P<url>[^\\x03]*)\\x03 \\x035\\*\\x03 \
         \\x0303(?P<user>[^\\x03]*)\\x03 \\x035\\*\\x03\\s{1,2}\\x0310(?P<summary>.*)$"
    )
    .unwrap();

    /// New-user registration line.
    pub static ref NEWUSERS: Regex = Regex::new(
        r"^(?P<user>.+?) New user registration (?P<url>https?://\S+Special:Log/newusers)$"
    )
    .unwrap();

    /// `index.php` diff URL inside an edit line's colored URL span.
    static ref INDEX_URL: Regex = Regex::new(&format!(
        r"https?://(?P<wiki>[a-z0-9.-]+?)\.(?P<domain>{DOMAINS})/(?:(?P<lang>[a-z-]+)/)?index\.php\?(?P<query>\S+)"
    ))
    .unwrap();

    /// Wiki page URL (`/wiki/…` or the Discussions `/f/…` tree).
    static ref PAGE_URL: Regex = Regex::new(&format!(
        r"https?://(?P<wiki>[a-z0-9.-]+?)\.(?P<domain>{DOMAINS})/(?:(?P<lang>[a-z-]+)/)?(?:wiki|f)/"
    ))
    .unwrap();
}

/// `(wiki, domain, language)` parsed out of a URL. The language defaults to
/// `"en"` when the URL has no language path segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WikiRef {
    pub wiki: String,
    pub domain: String,
    pub language: String,
}

fn wiki_ref(caps: &regex::Captures<'_>) -> WikiRef {
    let language = caps
        .name("lang")
        .map(|m| m.as_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("en");
    WikiRef {
        wiki: caps["wiki"].to_string(),
        domain: caps["domain"].to_string(),
        language: language.to_string(),
    }
}

/// Extracts the wiki identity and raw query string from an edit line's URL
/// span. The span may concatenate a page URL and the `index.php` diff URL;
/// the diff URL wins when present.
pub fn parse_edit_url(span: &str) -> Option<(WikiRef, Option<String>)> {
    if let Some(caps) = INDEX_URL.captures(span) {
        return Some((wiki_ref(&caps), Some(caps["query"].to_string())));
    }
    PAGE_URL.captures(span).map(|caps| (wiki_ref(&caps), None))
}

/// Extracts the wiki identity from a page URL.
pub fn parse_page_url(url: &str) -> Option<WikiRef> {
    PAGE_URL.captures(url).map(|caps| wiki_ref(&caps))
}

/// A reassembled rc payload: the plain concatenation of its fragments, and
/// the space-joined variant to retry on a boundary parse failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RcPayload {
    pub joined: String,
    pub respaced: Option<String>,
}

/// Reassembles rc lines fragmented at the IRC chunk limit.
#[derive(Debug, Default)]
pub struct RcAssembler {
    fragments: Vec<String>,
}

impl RcAssembler {
    /// Feeds one physical line; returns the payload completed by it, if any.
    pub fn push(&mut self, line: &str) -> Option<RcPayload> {
        if line.starts_with("\u{3}14") {
            let complete = self.flush();
            self.fragments.push(line.to_string());
            complete
        } else if self.fragments.is_empty() {
            // A tail with no head: nothing it could complete.
            None
        } else {
            self.fragments.push(line.to_string());
            None
        }
    }

    /// Takes the buffered payload, if one is pending.
    pub fn flush(&mut self) -> Option<RcPayload> {
        if self.fragments.is_empty() {
            return None;
        }
        let fragments = std::mem::take(&mut self.fragments);
        let joined = fragments.concat();
        let respaced = (fragments.len() > 1).then(|| fragments.join(" "));
        Some(RcPayload { joined, respaced })
    }
}

/// Reassembles Discussions JSON payloads.
#[derive(Debug, Default)]
pub struct JsonAssembler {
    buffer: Option<String>,
}

impl JsonAssembler {
    /// Feeds one physical line; returns a complete JSON payload, if any.
    /// Lines outside an object are discarded.
    pub fn push(&mut self, line: &str) -> Option<String> {
        match &mut self.buffer {
            Some(buf) => {
                buf.push_str(line);
                if line.ends_with('}') {
                    return self.buffer.take();
                }
                None
            }
            None if line.starts_with('{') => {
                if line.len() > 1 && line.ends_with('}') {
                    return Some(line.to_string());
                }
                self.buffer = Some(line.to_string());
                None
            }
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EDIT_LINE: &str = "\u{3}14[[\u{3}07Main Page\u{3}14]]\u{3}4 \u{3}10 \
        \u{3}02https://c.fandom.com/wiki/Main_Page\u{3}02https://c.fandom.com/index.php?diff=12&oldid=10\u{3} \
        \u{3}5*\u{3} \u{3}03Alice\u{3} \u{3}5*\u{3} (\u{2}+5\u{2}) \u{3}10typo fix";

    #[test]
    fn test_edit_regex_captures() {
        let caps = EDIT.captures(EDIT_LINE).expect("edit line should match");
        assert_eq!(&caps["page"], "Main Page");
        assert_eq!(&caps["flags"], "");
        assert_eq!(&caps["user"], "Alice");
        assert_eq!(&caps["diff"], "+5");
        assert_eq!(&caps["summary"], "typo fix");
    }

    #[test]
    fn test_edit_url_prefers_index_php() {
        let caps = EDIT.captures(EDIT_LINE).unwrap();
        let (wiki, query) = parse_edit_url(&caps["url"]).unwrap();
        assert_eq!(wiki.wiki, "c");
        assert_eq!(wiki.domain, "fandom.com");
        assert_eq!(wiki.language, "en");
        assert_eq!(query.as_deref(), Some("diff=12&oldid=10"));
    }

    #[test]
    fn test_edit_url_page_only() {
        let (wiki, query) =
            parse_edit_url("https://dev.wikia.org/de/wiki/Some_Page").unwrap();
        assert_eq!(wiki.wiki, "dev");
        assert_eq!(wiki.domain, "wikia.org");
        assert_eq!(wiki.language, "de");
        assert!(query.is_none());
    }

    #[test]
    fn test_log_regex_captures() {
        let line = "\u{3}14[[\u{3}07Special:Log/block\u{3}14]]\u{3}4 block\u{3}10 \
            \u{3}02https://c.fandom.com/wiki/Special:Log/block\u{3} \u{3}5*\u{3} \
            \u{3}03Mod\u{3} \u{3}5*\u{3}  \u{3}10blocked [[User:Evildoer]] with an expiry time of infinite: vandalism";
        let caps = LOG.captures(line).expect("log line should match");
        assert_eq!(&caps["logtype"], "block");
        assert_eq!(&caps["action"], "block");
        assert_eq!(&caps["user"], "Mod");
        assert!(caps["summary"].starts_with("blocked"));
    }

    #[test]
    fn test_log_regex_empty_logtype() {
        let line = "\u{3}14[[\u{3}07Special:Log/\u{3}14]]\u{3}4 \u{3}10 \
            \u{3}02https://c.fandom.com/wiki/Special:Log/\u{3} \u{3}5*\u{3} \
            \u{3}03Someone\u{3} \u{3}5*\u{3} \u{3}10";
        let caps = LOG.captures(line).expect("empty logtype should match");
        assert_eq!(&caps["logtype"], "");
    }

    #[test]
    fn test_newusers_regex() {
        let caps = NEWUSERS
            .captures(
                "FreshUser New user registration \
                 https://c.fandom.com/wiki/Special:Log/newusers",
            )
            .expect("newusers line should match");
        assert_eq!(&caps["user"], "FreshUser");
        let wiki = parse_page_url(&caps["url"]).unwrap();
        assert_eq!(wiki.wiki, "c");
        assert_eq!(wiki.language, "en");
    }

    #[test]
    fn test_rc_assembler_defers_until_next_head() {
        let mut asm = RcAssembler::default();
        assert!(asm.push("\u{3}14first line").is_none());
        let complete = asm.push("\u{3}14second line").unwrap();
        assert_eq!(complete.joined, "\u{3}14first line");
        assert!(complete.respaced.is_none());
    }

    #[test]
    fn test_rc_assembler_joins_overflow() {
        let mut asm = RcAssembler::default();
        assert!(asm.push("\u{3}14head").is_none());
        assert!(asm.push("tail").is_none());
        let complete = asm.push("\u{3}14next").unwrap();
        assert_eq!(complete.joined, "\u{3}14headtail");
        assert_eq!(complete.respaced.as_deref(), Some("\u{3}14head tail"));
        // The pending line flushes on demand.
        let last = asm.flush().unwrap();
        assert_eq!(last.joined, "\u{3}14next");
    }

    #[test]
    fn test_rc_assembler_discards_headless_tail() {
        let mut asm = RcAssembler::default();
        assert!(asm.push("orphan tail").is_none());
        assert!(asm.flush().is_none());
    }

    #[test]
    fn test_json_assembler_single_line() {
        let mut asm = JsonAssembler::default();
        assert_eq!(asm.push(r#"{"a":1}"#).as_deref(), Some(r#"{"a":1}"#));
    }

    #[test]
    fn test_json_assembler_multi_line() {
        let mut asm = JsonAssembler::default();
        assert!(asm.push(r#"{"a":"#).is_none());
        assert_eq!(asm.push(r#"1}"#).as_deref(), Some(r#"{"a":1}"#));
    }

    #[test]
    fn test_json_assembler_discards_outside_buffer() {
        let mut asm = JsonAssembler::default();
        assert!(asm.push("noise").is_none());
        assert!(asm.push(r#"{"a":"#).is_none());
        assert_eq!(asm.push("2}").as_deref(), Some(r#"{"a":2}"#));
        assert!(asm.push("more noise").is_none());
    }
}
