//! Per-message transforms: raw MediaWiki template → regex source.
//!
//! Each recognized message name maps its `$N` placeholders to a capture
//! pattern chosen for that message. The transform pipeline is fixed:
//! `{{GENDER:}}` extraction, regex escaping, wikilink color wrapping,
//! placeholder substitution, alternation reinstatement, then anchoring with
//! the optional trailing reason group.

use super::gender;
use crate::util::escape_regex;
use lazy_static::lazy_static;
use regex::Regex;

/// Optional `: reason` tail appended to every transformed message.
pub const REASON_TAIL: &str = "(?:\\s?[:：]\\s?(.*))?";

/// One block of repeated ` ‎[feature=level] (expiry)` triples, captured
/// whole; the parser re-scans it with the overlap regex. At least one
/// triple is required: a summary without any is the ProtectSite shape,
/// which must fail the first pass so the rewrite can run.
const PROTECT_BLOB: &str =
    "((?: \\x{200E}\\[(?:edit|move|upload|create|comment|everything)=[^\\]]+\\] \\([^)]+\\))+)";

/// Target user captures: the feed prefixes the user with a localized
/// namespace, stripped by matching up to the first colon.
const PREFIXED_USER: &str = "[^:]+:([^\\x03]+)";
/// A page captured inside a wikilink.
const LINKED_PAGE: &str = "([^\\x03\\]]+)";

lazy_static! {
    static ref ESCAPED_PLACEHOLDER: Regex = Regex::new(r"\\\$(\d+)").unwrap();
}

/// The capture pattern substituted for `$n` in `name`.
///
/// Placeholders outside each message's canonical set fall back to a lazy
/// wildcard so unusual localizations still compile and renumber.
fn placeholder_pattern(name: &str, n: u32) -> &'static str {
    match (name, n) {
        ("blocklogentry" | "reblock-logentry", 1) => PREFIXED_USER,
        ("blocklogentry" | "reblock-logentry", 2) => "(.*)",
        ("blocklogentry" | "reblock-logentry", 3) => "(?:[(（]([^)）]*)[)）])?",
        // Lazy: the target ends the template, so a greedy class would
        // swallow the reason tail.
        ("unblocklogentry", 1) => "[^:]+:([^\\x03]+?)",
        ("protectedarticle" | "modifiedarticleprotection" | "unprotectedarticle", 1) => LINKED_PAGE,
        ("movedarticleprotection", 1 | 2) => LINKED_PAGE,
        ("rightslogentry", 1) => "([^\\x03]+?)",
        ("rightslogentry", 2 | 3) => "(.*?)",
        ("deletedarticle" | "undeletedarticle", 1) => LINKED_PAGE,
        ("logentry-delete-revision-legacy" | "logentry-delete-event-legacy", 3) => LINKED_PAGE,
        ("uploadedimage" | "overwroteimage", 1) => LINKED_PAGE,
        ("1movedto2" | "1movedto2_redir", 1 | 2) => LINKED_PAGE,
        ("patrol-log-line", 1) => "(\\d+)",
        ("patrol-log-line", 2) => LINKED_PAGE,
        ("chat-chatbanadd-log-entry" | "chat-chatbanchange-log-entry", 1) => "(.+?)",
        ("chat-chatbanremove-log-entry", 1) => "(.+?)",
        ("blog-avatar-removed-log", 1) => "(.+?)",
        ("autosumm-replace", 1) => "(.*)",
        _ => "(.*?)",
    }
}

/// Whether `name` has a transform at all. `autosumm-blank` and
/// `patrol-log-diff` are cached raw but never compiled: the former is a
/// literal containment check, the latter is folded into `patrol-log-line`
/// by the loader.
pub fn has_transform(name: &str) -> bool {
    !matches!(name, "autosumm-blank" | "patrol-log-diff")
}

/// Block-flag messages are matched as whole literals against a single
/// comma-separated flag, with no reason tail.
fn is_flag_literal(name: &str) -> bool {
    name.starts_with("block-log-flags-")
}

/// Transforms a raw message template into an anchored regex source.
///
/// Returns `None` for names without a transform.
pub fn transform(name: &str, raw: &str) -> Option<String> {
    if !has_transform(name) {
        return None;
    }

    let expansion = gender::extract(raw);
    let escaped = escape_regex(&expansion.text);

    if is_flag_literal(name) {
        return Some(format!("^{}$", expansion.reinstate(&escaped)));
    }

    let wrapped = wrap_wikilinks(&escaped);
    let substituted = ESCAPED_PLACEHOLDER.replace_all(&wrapped, |caps: &regex::Captures<'_>| {
        let n: u32 = caps[1].parse().unwrap_or(0);
        placeholder_pattern(name, n).to_string()
    });
    let mut source = expansion.reinstate(&substituted);

    if matches!(name, "protectedarticle" | "modifiedarticleprotection") {
        source.push_str(PROTECT_BLOB);
    }

    Some(format!("^{source}{REASON_TAIL}$"))
}

/// Wraps every escaped `[[ … ]]` with optional IRC color markers: the feed
/// colors embedded links `\x0302 … \x0310`.
fn wrap_wikilinks(escaped: &str) -> String {
    escaped
        .replace("\\[\\[", "(?:\\x0302)?\\[\\[")
        .replace("\\]\\]", "\\]\\](?:\\x0310)?")
}
