//! Bulk fetch of system messages across every Fandom language.
//!
//! The language list comes from `community.fandom.com`; each language's
//! messages are fetched with `allmessages&amlang=<code>`, at most
//! [`CONCURRENT_FETCHES`] requests in flight. A language that fails is
//! logged and skipped; the remaining languages still produce a usable
//! cache.

use super::store::MessageCache;
use crate::api::{AllMessagesResponse, ApiClient, LanguagesResponse, MessageEntry};
use crate::error::FetchError;
use crate::messages;
use futures_util::{stream, StreamExt};
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};

/// Fixed bound on concurrent outbound fetches.
pub const CONCURRENT_FETCHES: usize = 10;

/// Wiki all message-corpus fetches run against.
pub const COMMUNITY_CENTRAL: &str = "https://community.fandom.com";

pub async fn fetch_languages(api: &ApiClient) -> Result<Vec<String>, FetchError> {
    let response: LanguagesResponse = api
        .query(
            COMMUNITY_CENTRAL,
            &[("meta", "siteinfo"), ("siprop", "languages")],
        )
        .await?;
    let codes: Vec<String> = response
        .query
        .map(|q| q.languages.into_iter().map(|l| l.code).collect())
        .unwrap_or_default();
    info!(count = codes.len(), "Fetched language list");
    Ok(codes)
}

async fn fetch_language(
    api: &ApiClient,
    names: &str,
    language: &str,
) -> Result<Vec<MessageEntry>, FetchError> {
    let response: AllMessagesResponse = api
        .query(
            COMMUNITY_CENTRAL,
            &[
                ("meta", "allmessages"),
                ("amlang", language),
                ("ammessages", names),
                ("amprop", "default"),
            ],
        )
        .await?;
    Ok(response.query.map(|q| q.allmessages).unwrap_or_default())
}

/// Performs a full rebuild: every language, every recognized message.
pub async fn rebuild(api: &ApiClient) -> Result<MessageCache, FetchError> {
    let languages = fetch_languages(api).await?;
    let names = messages::all_names().join("|");

    let results: Vec<(String, Result<Vec<MessageEntry>, FetchError>)> =
        stream::iter(languages.into_iter())
            .map(|language| {
                let api = api.clone();
                let names = names.clone();
                async move {
                    let result = fetch_language(&api, &names, &language).await;
                    (language, result)
                }
            })
            .buffered(CONCURRENT_FETCHES)
            .collect()
            .await;

    let mut cache = MessageCache::default();
    let mut seen: HashMap<String, HashSet<String>> = HashMap::new();
    let mut fetched = 0usize;
    for (language, result) in results {
        match result {
            Ok(entries) => {
                merge_language(&mut cache, &mut seen, entries);
                fetched += 1;
            }
            Err(e) => {
                warn!(language = %language, error = %e, "Skipping language");
            }
        }
    }
    info!(languages = fetched, "Message corpus assembled");

    cache.compile();
    Ok(cache)
}

/// Folds one language's messages into the cache, de-duplicating per name
/// while preserving insertion order.
///
/// `patrol-log-diff` is never emitted on its own: its text substitutes the
/// `$1` of this language's `patrol-log-line`.
pub(crate) fn merge_language(
    cache: &mut MessageCache,
    seen: &mut HashMap<String, HashSet<String>>,
    entries: Vec<MessageEntry>,
) {
    let patrol_diff = entries
        .iter()
        .filter(|e| e.name == "patrol-log-diff")
        .find_map(|e| e.text().map(str::to_string));

    for entry in entries {
        if entry.name == "patrol-log-diff" {
            continue;
        }
        let Some(text) = entry.text() else { continue };
        let text = if entry.name == "patrol-log-line" {
            match &patrol_diff {
                Some(diff) => text.replace("$1", diff),
                None => text.to_string(),
            }
        } else {
            text.to_string()
        };

        let seen_for_name = seen.entry(entry.name.clone()).or_default();
        if seen_for_name.insert(text.clone()) {
            cache
                .messagecache
                .entry(entry.name.clone())
                .or_default()
                .push(text);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, value: &str) -> MessageEntry {
        serde_json::from_str(&format!(r#"{{"name":"{name}","*":"{value}"}}"#)).unwrap()
    }

    #[test]
    fn test_merge_deduplicates_preserving_order() {
        let mut cache = MessageCache::default();
        let mut seen = HashMap::new();
        merge_language(
            &mut cache,
            &mut seen,
            vec![entry("deletedarticle", "deleted [[$1]]")],
        );
        merge_language(
            &mut cache,
            &mut seen,
            vec![entry("deletedarticle", "a supprimé [[$1]]")],
        );
        // A later language repeating the English default adds nothing.
        merge_language(
            &mut cache,
            &mut seen,
            vec![entry("deletedarticle", "deleted [[$1]]")],
        );
        assert_eq!(
            cache.messagecache["deletedarticle"],
            vec!["deleted [[$1]]".to_string(), "a supprimé [[$1]]".to_string()]
        );
    }

    #[test]
    fn test_patrol_diff_substitution() {
        let mut cache = MessageCache::default();
        let mut seen = HashMap::new();
        merge_language(
            &mut cache,
            &mut seen,
            vec![
                entry("patrol-log-line", "marked revision $1 of [[$2]] patrolled"),
                entry("patrol-log-diff", "revision $1"),
            ],
        );
        assert!(!cache.messagecache.contains_key("patrol-log-diff"));
        assert_eq!(
            cache.messagecache["patrol-log-line"],
            vec!["marked revision revision $1 of [[$2]] patrolled".to_string()]
        );
    }

    #[test]
    fn test_merge_skips_missing_text() {
        let mut cache = MessageCache::default();
        let mut seen = HashMap::new();
        let missing: MessageEntry =
            serde_json::from_str(r#"{"name":"blocklogentry","missing":""}"#).unwrap();
        merge_language(&mut cache, &mut seen, vec![missing]);
        assert!(cache.messagecache.is_empty());
    }
}
