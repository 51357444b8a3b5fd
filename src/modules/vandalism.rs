//! Vandalism heuristics over edits.
//!
//! Flags page blanking (the `autosumm-blank` containment check), content
//! replacement (`autosumm-replace`), and large removals. Alerts are
//! debounced per user and wiki through a Redis bit with a 3-hour TTL.

use super::{Interest, Module, ModuleContext, Property};
use crate::cache::{self, EnrichmentCache};
use crate::loader::store::{custom_key, SharedCache};
use crate::model::{Body, Message};
use crate::util;
use async_trait::async_trait;
use tracing::warn;

/// Byte-delta floor below which a removal is suspicious.
const DEFAULT_THRESHOLD: i64 = -1000;

pub struct VandalismModule {
    messages: SharedCache,
    cache: EnrichmentCache,
    threshold: i64,
}

impl VandalismModule {
    pub fn new(config: &toml::Value, ctx: &ModuleContext) -> Self {
        Self {
            messages: ctx.messages.clone(),
            cache: ctx.cache.clone(),
            threshold: config
                .get("threshold")
                .and_then(|v| v.as_integer())
                .unwrap_or(DEFAULT_THRESHOLD),
        }
    }

}

/// Whether an edit trips any of the heuristics. Anonymous editors get half
/// the removal threshold.
fn is_suspicious(
    cache: &crate::loader::store::MessageCache,
    threshold: i64,
    message: &Message,
    summary: &str,
    diff: i64,
) -> bool {
    let threshold = if util::is_ip(&message.user) {
        threshold / 2
    } else {
        threshold
    };
    if diff <= threshold || cache.is_blank_summary(summary) {
        return true;
    }
    let key = custom_key(&message.language, &message.wiki, &message.domain.to_string());
    cache
        .candidates("autosumm-replace", &key)
        .any(|(_, regex)| regex.is_match(summary))
}

#[async_trait]
impl Module for VandalismModule {
    fn name(&self) -> &'static str {
        "vandalism"
    }

    fn interested(&self, message: &Message) -> Interest {
        let Body::Edit(edit) = &message.body else {
            return Interest::No;
        };
        let cache = self.messages.read();
        if is_suspicious(&cache, self.threshold, message, &edit.summary, edit.diff) {
            Interest::Enrich(vec![Property::PageTitle])
        } else {
            Interest::No
        }
    }

    async fn execute(&self, message: &Message) -> anyhow::Result<()> {
        let Body::Edit(edit) = &message.body else {
            return Ok(());
        };

        let key = cache::vandalism_key(
            &message.user,
            &message.language,
            &message.wiki,
            &message.domain.to_string(),
        );
        match self.cache.exists(&key).await {
            Ok(true) => return Ok(()),
            Ok(false) => {
                if let Err(e) = self.cache.setbit(&key).await {
                    warn!(error = %e, key = %key, "Debounce bit write failed");
                }
                if let Err(e) = self.cache.expire(&key, cache::VANDALISM_TTL).await {
                    warn!(error = %e, key = %key, "Debounce expiry failed");
                }
            }
            Err(e) => warn!(error = %e, key = %key, "Debounce check failed"),
        }

        let page = edit.title.as_deref().unwrap_or(&edit.page);
        warn!(
            target: "vandalism",
            wiki = %message.wiki,
            user = %message.user,
            page = %page,
            diff = edit.diff,
            "Suspicious edit: {}",
            util::escape_markdown(&edit.summary)
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::store::MessageCache;
    use crate::model::{Domain, Edit};
    use std::collections::HashMap;

    fn fixture() -> MessageCache {
        let mut cache = MessageCache::default();
        cache
            .messagecache
            .insert("autosumm-blank".into(), vec!["Blanked the page".into()]);
        cache.messagecache.insert(
            "autosumm-replace".into(),
            vec!["Replaced content with \"$1\"".into()],
        );
        cache.compile();
        cache
    }

    fn edit(diff: i64, summary: &str) -> Message {
        Message {
            wiki: "c".into(),
            domain: Domain::FandomCom,
            language: "en".into(),
            user: "Suspect".into(),
            raw: String::new(),
            body: Body::Edit(Edit {
                page: "Page".into(),
                flags: Vec::new(),
                params: HashMap::new(),
                diff,
                summary: summary.into(),
                title: None,
            }),
        }
    }

    #[test]
    fn test_large_removal_is_suspicious() {
        let cache = fixture();
        let msg = edit(-4000, "cleanup");
        assert!(is_suspicious(&cache, DEFAULT_THRESHOLD, &msg, "cleanup", -4000));
        assert!(!is_suspicious(&cache, DEFAULT_THRESHOLD, &msg, "cleanup", -10));
    }

    #[test]
    fn test_blank_and_replace_summaries() {
        let cache = fixture();
        let msg = edit(-10, "Blanked the page");
        assert!(is_suspicious(
            &cache,
            DEFAULT_THRESHOLD,
            &msg,
            "Blanked the page",
            -10
        ));
        assert!(is_suspicious(
            &cache,
            DEFAULT_THRESHOLD,
            &msg,
            "Replaced content with \"spam\"",
            -10
        ));
        assert!(!is_suspicious(
            &cache,
            DEFAULT_THRESHOLD,
            &msg,
            "fixed a typo",
            120
        ));
    }
}
