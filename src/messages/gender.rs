//! `{{GENDER:}}` expansion.
//!
//! MediaWiki messages may branch on the grammatical gender of a parameter:
//! `{{GENDER:$2|blocked|blocked|blocked}}`. For matching purposes the branch
//! collapses into a regex alternation `(?:a|b|c)`. The alternation itself
//! must survive the later `escape_regex` pass untouched, so each construct is
//! first swapped for an opaque sentinel built from private-use code points
//! that no MediaWiki message contains, and reinstated after escaping.

use crate::util::escape_regex;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref GENDER: Regex =
        Regex::new(r"\{\{\s*GENDER\s*:([^|}]*)((?:\|[^|{}]*)*)\}\}").unwrap();
}

const SENTINEL_OPEN: char = '\u{E000}';
const SENTINEL_CLOSE: char = '\u{E001}';

/// A message template with its `{{GENDER:}}` constructs swapped for
/// sentinels, plus the alternations to reinstate.
pub struct Expansion {
    pub text: String,
    alternations: Vec<String>,
}

/// Replaces every `{{GENDER:…|a|b|c}}` with a sentinel and precomputes the
/// escaped alternation for each.
///
/// Duplicate branches collapse: when the third branch repeats the first or
/// the second, it is dropped.
pub fn extract(raw: &str) -> Expansion {
    let mut alternations = Vec::new();
    let text = GENDER
        .replace_all(raw, |caps: &regex::Captures<'_>| {
            let mut branches: Vec<&str> = caps[2].split('|').skip(1).collect();
            if branches.len() == 3 && (branches[2] == branches[0] || branches[2] == branches[1]) {
                branches.pop();
            }
            let escaped: Vec<String> = branches.iter().map(|b| escape_regex(b)).collect();
            let idx = alternations.len();
            alternations.push(format!("(?:{})", escaped.join("|")));
            format!("{SENTINEL_OPEN}{idx}{SENTINEL_CLOSE}")
        })
        .into_owned();
    Expansion { text, alternations }
}

impl Expansion {
    /// Puts the alternations back into an escaped regex source.
    pub fn reinstate(&self, source: &str) -> String {
        let mut out = source.to_string();
        for (idx, alt) in self.alternations.iter().enumerate() {
            out = out.replace(&format!("{SENTINEL_OPEN}{idx}{SENTINEL_CLOSE}"), alt);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_gender_is_identity() {
        let exp = extract("blocked [[$1]]");
        assert_eq!(exp.text, "blocked [[$1]]");
        assert_eq!(exp.reinstate(&exp.text), "blocked [[$1]]");
    }

    #[test]
    fn test_gender_becomes_alternation() {
        let exp = extract("{{GENDER:$2|zablokował|zablokowała}} [[$1]]");
        assert!(exp.text.starts_with(SENTINEL_OPEN));
        let out = exp.reinstate(&exp.text);
        assert_eq!(out, "(?:zablokował|zablokowała) [[$1]]");
    }

    #[test]
    fn test_duplicate_third_branch_dropped() {
        let exp = extract("{{GENDER:$2|a|b|a}}x");
        assert_eq!(exp.reinstate(&exp.text), "(?:a|b)x");
        let exp = extract("{{GENDER:$2|a|b|b}}x");
        assert_eq!(exp.reinstate(&exp.text), "(?:a|b)x");
        let exp = extract("{{GENDER:$2|a|b|c}}x");
        assert_eq!(exp.reinstate(&exp.text), "(?:a|b|c)x");
    }

    #[test]
    fn test_branches_are_regex_escaped() {
        let exp = extract("{{GENDER:$2|a.b|c+d}}");
        assert_eq!(exp.reinstate(&exp.text), "(?:a\\.b|c\\+d)");
    }

    #[test]
    fn test_sentinel_survives_escape_regex() {
        let exp = extract("{{GENDER:$2|was|were}} here");
        let escaped = escape_regex(&exp.text);
        assert_eq!(exp.reinstate(&escaped), "(?:was|were) here");
    }

    #[test]
    fn test_gender_parameter_is_not_a_placeholder() {
        // The $2 inside the construct vanishes with the construct; only the
        // outer $1 remains visible to the placeholder pass.
        let exp = extract("{{GENDER:$2|moved}} [[$1]]");
        assert!(!exp.text.contains("$2"));
        assert!(exp.text.contains("$1"));
    }
}
