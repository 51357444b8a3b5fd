//! On-line fetch of per-wiki message overrides.
//!
//! When a log summary matches no cached regex, the wiki has probably
//! customized the message. [`RetryFetcher::trigger`] fetches that wiki's
//! `allmessages?amcustomized=modified` set and hands it to the loader,
//! which recompiles the slot; the next identical line then parses.
//!
//! Fetches are single-flighted per `language:wiki:domain`: while one is in
//! flight, further triggers for the same wiki collapse into it. An HTTP
//! failure is not retried here; the next parse failure re-enters naturally.

use crate::api::ApiClient;
use crate::error::FetchError;
use crate::loader::store::custom_key;
use crate::loader::Loader;
use crate::messages;
use crate::util;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct RetryFetcher {
    api: ApiClient,
    loader: Arc<Loader>,
    in_flight: DashMap<String, ()>,
    /// Test hook: route every wiki at a fixed endpoint.
    base_override: Option<String>,
}

impl RetryFetcher {
    pub fn new(api: ApiClient, loader: Arc<Loader>) -> Self {
        Self {
            api,
            loader,
            in_flight: DashMap::new(),
            base_override: None,
        }
    }

    #[cfg(test)]
    fn with_base(api: ApiClient, loader: Arc<Loader>, base: String) -> Self {
        Self {
            api,
            loader,
            in_flight: DashMap::new(),
            base_override: Some(base),
        }
    }

    /// Fires an override fetch for one wiki unless one is already running.
    pub fn trigger(self: &Arc<Self>, wiki: &str, language: &str, domain: &str) {
        let key = custom_key(language, wiki, domain);
        if self.in_flight.insert(key.clone(), ()).is_some() {
            debug!(key = %key, "Override fetch already in flight");
            return;
        }

        let this = Arc::clone(self);
        let (wiki, language, domain) = (wiki.to_string(), language.to_string(), domain.to_string());
        tokio::spawn(async move {
            match this.fetch_custom(&wiki, &language, &domain).await {
                Ok(overrides) if !overrides.is_empty() => {
                    crate::metrics::record_fetch("custom", "ok");
                    this.loader.update_custom(&wiki, &language, &domain, overrides);
                }
                Ok(_) => {
                    crate::metrics::record_fetch("custom", "empty");
                    debug!(key = %key, "Wiki has no customized messages");
                }
                Err(e) => {
                    crate::metrics::record_fetch("custom", e.subcode());
                    warn!(
                        code = "messagefetch",
                        subcode = e.subcode(),
                        key = %key,
                        error = %e,
                        "Override fetch failed"
                    );
                }
            }
            this.in_flight.remove(&key);
        });
    }

    /// Fetches the wiki's modified messages: `{name → customized text}`.
    pub async fn fetch_custom(
        &self,
        wiki: &str,
        language: &str,
        domain: &str,
    ) -> Result<HashMap<String, String>, FetchError> {
        let base = match &self.base_override {
            Some(base) => base.clone(),
            None => util::url(wiki, language, domain),
        };
        self.fetch_custom_at(&base).await
    }

    pub(crate) async fn fetch_custom_at(
        &self,
        base: &str,
    ) -> Result<HashMap<String, String>, FetchError> {
        let names = messages::all_names().join("|");
        let body = self
            .api
            .query_text(
                base,
                &[
                    ("meta", "allmessages"),
                    ("amcustomized", "modified"),
                    ("ammessages", &names),
                    ("amprop", "default"),
                ],
            )
            .await?;

        // A captive portal or error page serves HTML where JSON belongs.
        let value: serde_json::Value =
            serde_json::from_str(&body).map_err(|_| FetchError::Html)?;
        let entries = value
            .get("query")
            .and_then(|q| q.get("allmessages"))
            .and_then(|m| m.as_array())
            .ok_or(FetchError::Unusual)?;

        Ok(entries
            .iter()
            .filter(|entry| entry.get("default").is_some())
            .filter_map(|entry| {
                let name = entry.get("name")?.as_str()?;
                let text = entry.get("*")?.as_str()?;
                Some((name.to_string(), text.to_string()))
            })
            .collect())
    }
}
