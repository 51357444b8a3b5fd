//! The recognized MediaWiki system messages and their transforms.
//!
//! - [`map`]: per-message `raw → regex source` transforms
//! - [`gender`]: `{{GENDER:}}` alternation expansion
//!
//! This module also owns the registry mapping `(log family, action)` to the
//! message name whose localization the summary was expanded from, and the
//! placeholder-order scan used for capture renumbering.

pub mod gender;
pub mod map;

use crate::model::LogFamily;
use lazy_static::lazy_static;
use regex::Regex;

/// Block flags recognized through their own `block-log-flags-*` messages.
pub const BLOCK_FLAGS: &[&str] = &[
    "angry-autoblock",
    "anononly",
    "hiddenname",
    "noautoblock",
    "noemail",
    "nousertalk",
    "nocreate",
];

/// Every message name fetched from `allmessages`, in pipe-join order.
pub fn all_names() -> Vec<String> {
    let mut names: Vec<String> = [
        "blocklogentry",
        "unblocklogentry",
        "reblock-logentry",
        "protectedarticle",
        "modifiedarticleprotection",
        "unprotectedarticle",
        "movedarticleprotection",
        "rightslogentry",
        "deletedarticle",
        "undeletedarticle",
        "logentry-delete-revision-legacy",
        "logentry-delete-event-legacy",
        "uploadedimage",
        "overwroteimage",
        "1movedto2",
        "1movedto2_redir",
        "patrol-log-line",
        "patrol-log-diff",
        "chat-chatbanadd-log-entry",
        "chat-chatbanchange-log-entry",
        "chat-chatbanremove-log-entry",
        "blog-avatar-removed-log",
        "autosumm-replace",
        "autosumm-blank",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    for flag in BLOCK_FLAGS {
        names.push(format!("block-log-flags-{flag}"));
    }
    names
}

/// The message name a `(family, action)` summary was expanded from.
///
/// `None` means the family is handled by a dedicated grammar
/// (abusefilter, wikifeatures, the `"0"` bucket) or the action is unknown.
pub fn message_for(family: LogFamily, action: &str) -> Option<&'static str> {
    match (family, action) {
        (LogFamily::Block, "block") => Some("blocklogentry"),
        (LogFamily::Block, "reblock") => Some("reblock-logentry"),
        (LogFamily::Block, "unblock") => Some("unblocklogentry"),
        (LogFamily::Delete, "delete") => Some("deletedarticle"),
        (LogFamily::Delete, "restore") => Some("undeletedarticle"),
        (LogFamily::Delete, "revision") => Some("logentry-delete-revision-legacy"),
        (LogFamily::Delete, "event") => Some("logentry-delete-event-legacy"),
        // `restore` is an alias of `move` in the feed.
        (LogFamily::Move, "move" | "restore") => Some("1movedto2"),
        (LogFamily::Move, "move_redir") => Some("1movedto2_redir"),
        (LogFamily::Patrol, "patrol") => Some("patrol-log-line"),
        (LogFamily::Protect, "protect") => Some("protectedarticle"),
        (LogFamily::Protect, "modify") => Some("modifiedarticleprotection"),
        (LogFamily::Protect, "unprotect") => Some("unprotectedarticle"),
        (LogFamily::Protect, "move_prot") => Some("movedarticleprotection"),
        (LogFamily::Rights, "rights") => Some("rightslogentry"),
        (LogFamily::Upload, "upload") => Some("uploadedimage"),
        (LogFamily::Upload, "overwrite") => Some("overwroteimage"),
        (LogFamily::ChatBan, "chatbanadd") => Some("chat-chatbanadd-log-entry"),
        (LogFamily::ChatBan, "chatbanchange") => Some("chat-chatbanchange-log-entry"),
        (LogFamily::ChatBan, "chatbanremove") => Some("chat-chatbanremove-log-entry"),
        (LogFamily::UserAvatar, "avatar_rem") => Some("blog-avatar-removed-log"),
        _ => None,
    }
}

lazy_static! {
    static ref PLACEHOLDER: Regex = Regex::new(r"(GENDER:)?\$(\d+)").unwrap();
}

/// The `$N` values of a template in textual order, skipping `GENDER:$N`
/// parameters.
///
/// Templates may reorder placeholders against the locale's reading order;
/// this sequence drives the renumbering of regex captures back onto stable
/// positions.
pub fn placeholder_order(template: &str) -> Vec<u32> {
    PLACEHOLDER
        .captures_iter(template)
        .filter(|caps| caps.get(1).is_none())
        .filter_map(|caps| caps[2].parse().ok())
        .filter(|n| *n >= 1)
        .collect()
}

/// Renumbers regex captures onto template placeholder positions.
///
/// `res[j+1]` (the j-th capture, textual order) lands at `ret[N-1]` where N
/// is the j-th placeholder. Captures beyond the placeholders (protection
/// blobs, reasons) fill the tail starting at the highest `N`.
pub fn renumber(template: &str, captures: &regex::Captures<'_>) -> Vec<Option<String>> {
    let order = placeholder_order(template);
    let max_n = order.iter().copied().max().unwrap_or(0) as usize;
    let total = captures.len() - 1;
    let extras = total.saturating_sub(order.len());

    let mut ret: Vec<Option<String>> = vec![None; max_n + extras];
    for (j, n) in order.iter().enumerate() {
        if let Some(m) = captures.get(j + 1) {
            ret[(*n as usize) - 1] = Some(m.as_str().to_string());
        }
    }
    for (offset, j) in (order.len()..total).enumerate() {
        ret[max_n + offset] = captures.get(j + 1).map(|m| m.as_str().to_string());
    }
    ret
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_names_include_flags() {
        let names = all_names();
        assert!(names.iter().any(|n| n == "blocklogentry"));
        assert!(names.iter().any(|n| n == "block-log-flags-nocreate"));
        assert_eq!(names.len(), 24 + BLOCK_FLAGS.len());
    }

    #[test]
    fn test_message_for_aliases() {
        assert_eq!(message_for(LogFamily::Move, "restore"), Some("1movedto2"));
        assert_eq!(message_for(LogFamily::Move, "move"), Some("1movedto2"));
        assert_eq!(message_for(LogFamily::Block, "zap"), None);
        assert_eq!(message_for(LogFamily::AbuseFilter, "hit"), None);
    }

    #[test]
    fn test_placeholder_order_skips_gender() {
        assert_eq!(placeholder_order("moved [[$1]] to [[$2]]"), vec![1, 2]);
        assert_eq!(
            placeholder_order("{{GENDER:$2|moved}} [[$2]] from [[$1]]"),
            vec![2, 1]
        );
        assert_eq!(placeholder_order("no placeholders"), Vec::<u32>::new());
    }

    #[test]
    fn test_renumber_reordered_template() {
        // A locale writing "target ← source" keeps stable output positions.
        let template = "[[$2]] ← [[$1]]";
        let re = Regex::new(r"^\[\[([^\]]+)\]\] ← \[\[([^\]]+)\]\]$").unwrap();
        let caps = re.captures("[[New]] ← [[Old]]").unwrap();
        let ret = renumber(template, &caps);
        assert_eq!(ret[0].as_deref(), Some("Old"));
        assert_eq!(ret[1].as_deref(), Some("New"));
    }

    #[test]
    fn test_renumber_trailing_captures() {
        let template = "deleted \"[[$1]]\"";
        let re = Regex::new(r#"^deleted "\[\[([^\]]+)\]\]"(?:\s?[:：]\s?(.*))?$"#).unwrap();
        let caps = re.captures("deleted \"[[Sandbox]]\": test").unwrap();
        let ret = renumber(template, &caps);
        assert_eq!(ret.len(), 2);
        assert_eq!(ret[0].as_deref(), Some("Sandbox"));
        assert_eq!(ret[1].as_deref(), Some("test"));
    }

    #[test]
    fn test_renumber_unmatched_optional_group() {
        let template = "blocked [[$1]] for $2 $3";
        let re =
            Regex::new(r"^blocked \[\[[^:]+:([^\]]+)\]\] for (.*) (?:\(([^)]*)\))?(?:: (.*))?$")
                .unwrap();
        let caps = re.captures("blocked [[User:X]] for 2 weeks (noemail)").unwrap();
        let ret = renumber(template, &caps);
        assert_eq!(ret[0].as_deref(), Some("X"));
        assert_eq!(ret[1].as_deref(), Some("2 weeks"));
        assert_eq!(ret[2].as_deref(), Some("noemail"));
        assert_eq!(ret[3], None);
    }
}
