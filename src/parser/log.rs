//! Log-summary extraction.
//!
//! A log line carries only a locale-expanded summary. Structured fields are
//! recovered by trying the compiled message regexes (per-wiki overrides
//! first, then every cached language), renumbering the captures against the
//! matching template, and handing the positional results to the family
//! extractor. The abusefilter and wikifeatures families sidestep i18n with
//! dedicated grammars.

use crate::error::ParseError;
use crate::loader::store::MessageCache;
use crate::messages::{self, BLOCK_FLAGS};
use crate::model::{LogDetails, LogFamily, ProtectionLevel};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref PROTECT_DETAIL: Regex = Regex::new(
        r" \x{200E}\[(edit|move|upload|create|comment|everything)=(\w+)\] \(([^\x{200E}]+)\)(?: \x{200E}|$|[:：])"
    )
    .unwrap();
    static ref PROTECT_SITE_TAIL: Regex =
        Regex::new(r"^\s?[:：]\s?(?P<duration>[^:：]+?)(?:\s?[:：]\s?(?P<reason>.*))?$").unwrap();
    static ref ABUSE_FILTER: Regex = Regex::new(
        r"Special:AbuseFilter/(\d+).*?Special:AbuseFilter/history/\d+/diff/prev/(\d+)"
    )
    .unwrap();
    static ref WIKI_FEATURES: Regex = Regex::new(
        r"^wikifeatures\s?[:：]\s?set extension option\s?[:：]\s?(\w+) = (true|false)$"
    )
    .unwrap();
}

/// Extracts the family-specific fields from a log summary.
///
/// `key` is the `language:wiki:domain` override-cache key of the wiki the
/// line came from.
pub fn parse_log(
    cache: &MessageCache,
    family: LogFamily,
    action: &str,
    summary: &str,
    key: &str,
) -> Result<LogDetails, ParseError> {
    match family {
        LogFamily::AbuseFilter => return abuse_filter(summary),
        LogFamily::WikiFeatures => return wiki_features(summary),
        LogFamily::Zero => return Ok(LogDetails::Pending),
        LogFamily::NewUsers => return Ok(LogDetails::Registration),
        _ => {}
    }

    let name = messages::message_for(family, action).ok_or_else(|| {
        ParseError::UnknownLogAction(family.as_str().to_string(), action.to_string())
    })?;

    let ret = match i18n_match(cache, name, key, summary) {
        Some(ret) => ret,
        None => {
            // ProtectSite writes a site-wide summary with no level blob;
            // rewrite it into the standard shape and retry once.
            if family == LogFamily::Protect && summary.contains(":Allpages") {
                let rewritten =
                    rewrite_protect_site(summary).ok_or(ParseError::LogSummary)?;
                i18n_match(cache, name, key, &rewritten).ok_or(ParseError::LogSummary)?
            } else {
                return Err(ParseError::LogSummary);
            }
        }
    };

    extract(cache, family, action, key, &ret)
}

/// First matching candidate wins; captures are renumbered against the
/// aligned template.
fn i18n_match(
    cache: &MessageCache,
    name: &str,
    key: &str,
    summary: &str,
) -> Option<Vec<Option<String>>> {
    for (template, regex) in cache.candidates(name, key) {
        if let Some(caps) = regex.captures(summary) {
            return Some(messages::renumber(template, &caps));
        }
    }
    None
}

fn req(ret: &[Option<String>], i: usize) -> Result<String, ParseError> {
    ret.get(i)
        .and_then(|v| v.clone())
        .ok_or(ParseError::LogSummary)
}

fn opt(ret: &[Option<String>], i: usize) -> Option<String> {
    ret.get(i).and_then(|v| v.clone())
}

fn extract(
    cache: &MessageCache,
    family: LogFamily,
    action: &str,
    key: &str,
    ret: &[Option<String>],
) -> Result<LogDetails, ParseError> {
    match family {
        LogFamily::Block => {
            let target = req(ret, 0)?;
            if action == "unblock" {
                Ok(LogDetails::Block {
                    target,
                    expiry: None,
                    flags: Vec::new(),
                    reason: opt(ret, 1),
                })
            } else {
                Ok(LogDetails::Block {
                    target,
                    expiry: opt(ret, 1),
                    flags: opt(ret, 2)
                        .map(|raw| block_flags(cache, key, &raw))
                        .unwrap_or_default(),
                    reason: opt(ret, 3),
                })
            }
        }
        LogFamily::Delete => {
            if action == "revision" || action == "event" {
                Ok(LogDetails::RevisionDelete {
                    target: req(ret, 2)?,
                    reason: opt(ret, 3),
                })
            } else {
                Ok(LogDetails::Delete {
                    page: req(ret, 0)?,
                    reason: opt(ret, 1),
                })
            }
        }
        LogFamily::Move => Ok(LogDetails::Move {
            page: req(ret, 0)?,
            target: req(ret, 1)?,
            reason: opt(ret, 2),
        }),
        LogFamily::Patrol => Ok(LogDetails::Patrol {
            revision: req(ret, 0)?
                .parse()
                .map_err(|_| ParseError::LogSummary)?,
            page: req(ret, 1)?,
        }),
        LogFamily::Protect => extract_protect(action, ret),
        LogFamily::Rights => extract_rights(ret),
        LogFamily::Upload => Ok(LogDetails::Upload {
            file: req(ret, 0)?,
            reason: opt(ret, 1),
        }),
        LogFamily::UserAvatar => Ok(LogDetails::Avatar {
            target: req(ret, 0)?,
        }),
        LogFamily::ChatBan => {
            let target = req(ret, 0)?;
            if action == "chatbanremove" {
                Ok(LogDetails::ChatBan {
                    target,
                    length: None,
                    expires: None,
                    reason: opt(ret, 1),
                })
            } else {
                Ok(LogDetails::ChatBan {
                    target,
                    length: opt(ret, 1),
                    expires: opt(ret, 2),
                    reason: opt(ret, 3),
                })
            }
        }
        LogFamily::AbuseFilter
        | LogFamily::WikiFeatures
        | LogFamily::Zero
        | LogFamily::NewUsers
        | LogFamily::Thread => Err(ParseError::UnknownLogAction(
            family.as_str().to_string(),
            action.to_string(),
        )),
    }
}

fn extract_protect(action: &str, ret: &[Option<String>]) -> Result<LogDetails, ParseError> {
    match action {
        "unprotect" => Ok(LogDetails::Protect {
            page: req(ret, 0)?,
            target: None,
            levels: Vec::new(),
            reason: opt(ret, 1),
        }),
        "move_prot" => Ok(LogDetails::Protect {
            page: req(ret, 0)?,
            target: Some(req(ret, 1)?),
            levels: Vec::new(),
            reason: opt(ret, 2),
        }),
        _ => Ok(LogDetails::Protect {
            page: req(ret, 0)?,
            target: None,
            levels: parse_levels(&opt(ret, 1).unwrap_or_default()),
            reason: opt(ret, 2),
        }),
    }
}

fn extract_rights(ret: &[Option<String>]) -> Result<LogDetails, ParseError> {
    let target = req(ret, 0)?;
    let old_raw = opt(ret, 1).unwrap_or_default();
    let new_raw = opt(ret, 2).unwrap_or_default();
    if old_raw.trim().is_empty() || new_raw.trim().is_empty() {
        return Err(ParseError::MissingGroups);
    }
    let split = |s: &str| -> Vec<String> {
        s.split(',')
            .map(|g| g.trim().to_string())
            .filter(|g| !g.is_empty())
            .collect()
    };
    Ok(LogDetails::Rights {
        target,
        old_groups: split(&old_raw),
        new_groups: split(&new_raw),
        reason: opt(ret, 3),
    })
}

/// Matches each comma-separated flag against the cached
/// `block-log-flags-*` localizations. Unrecognized flags map to
/// `"unknown"`.
fn block_flags(cache: &MessageCache, key: &str, raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .map(|piece| {
            BLOCK_FLAGS
                .iter()
                .find(|flag| {
                    let name = format!("block-log-flags-{flag}");
                    let matched = cache
                        .candidates(&name, key)
                        .any(|(_, regex)| regex.is_match(piece));
                    matched
                })
                .map(|flag| flag.to_string())
                .unwrap_or_else(|| "unknown".to_string())
        })
        .collect()
}

/// Scans a protection blob into its `[feature=level] (expiry)` triples.
///
/// The terminator eats the next triple's leading ` ‎` marker, so the scan
/// rewinds over it to re-overlap the boundary.
pub(crate) fn parse_levels(blob: &str) -> Vec<ProtectionLevel> {
    let mut out = Vec::new();
    let mut pos = 0;
    while let Some(caps) = PROTECT_DETAIL.captures_at(blob, pos) {
        out.push(ProtectionLevel {
            feature: caps[1].to_string(),
            level: caps[2].to_string(),
            expiry: caps[3].to_string(),
        });
        let whole = caps.get(0).expect("group 0 always present");
        if whole.as_str().ends_with(" \u{200E}") {
            pos = whole.end() - " \u{200E}".len();
        } else {
            break;
        }
    }
    out
}

/// Rewrites a ProtectSite site-wide summary into the standard
/// `‎[everything=restricted] (duration)` shape.
pub(crate) fn rewrite_protect_site(summary: &str) -> Option<String> {
    let idx = summary.find(":Allpages")?;
    let link_end = summary[idx..]
        .find("]]")
        .map(|i| idx + i + 2)
        .unwrap_or(idx + ":Allpages".len());
    let mut head_end = link_end;
    for token in ["\u{3}10", "\""] {
        if summary[head_end..].starts_with(token) {
            head_end += token.len();
        }
    }
    let caps = PROTECT_SITE_TAIL.captures(&summary[head_end..])?;
    let mut rewritten = format!(
        "{} \u{200E}[everything=restricted] ({})",
        &summary[..head_end],
        caps["duration"].trim()
    );
    if let Some(reason) = caps.name("reason") {
        rewritten.push_str(": ");
        rewritten.push_str(reason.as_str());
    }
    Some(rewritten)
}

fn abuse_filter(summary: &str) -> Result<LogDetails, ParseError> {
    let caps = ABUSE_FILTER
        .captures(summary)
        .ok_or(ParseError::AbuseFilter)?;
    Ok(LogDetails::AbuseFilter {
        filter: caps[1].parse().map_err(|_| ParseError::AbuseFilter)?,
        diff: caps[2].parse().map_err(|_| ParseError::AbuseFilter)?,
    })
}

fn wiki_features(summary: &str) -> Result<LogDetails, ParseError> {
    let caps = WIKI_FEATURES
        .captures(summary)
        .ok_or(ParseError::WikiFeatures)?;
    Ok(LogDetails::WikiFeatures {
        feature: caps[1].to_string(),
        value: &caps[2] == "true",
    })
}
