//! Message fan-out.
//!
//! For every decoded message the dispatcher polls each module's
//! `interested` synchronously, unions any requested enrichment properties,
//! performs the enrichment fetches, and calls `execute` on the interested
//! modules. Messages that need no enrichment execute inline, preserving
//! per-channel arrival order; enriched messages run on a tracked background
//! task and may complete out of order.
//!
//! A `logparsefail` error message additionally triggers the override
//! fetcher for its wiki before fan-out.

use crate::api::ApiClient;
use crate::cache::{self, CachedThread, EnrichmentCache};
use crate::error::EnrichError;
use crate::fetcher::RetryFetcher;
use crate::metrics;
use crate::model::{Body, LogDetails, LogFamily, Message};
use crate::modules::{Interest, Module, Property};
use crate::util;
use dashmap::DashMap;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tokio_util::task::TaskTracker;
use tracing::{error, warn};

lazy_static! {
    static ref AC_METADATA: Regex =
        Regex::new(r#"<ac_metadata [^>]*title="([^"]+)"[^>]*>\s*</ac_metadata>$"#).unwrap();
}

pub struct Dispatcher {
    modules: Vec<Arc<dyn Module>>,
    cache: EnrichmentCache,
    api: ApiClient,
    fetcher: Arc<RetryFetcher>,
    tracker: TaskTracker,
    title_ttl: u64,
    /// Single-flight cells for thread-title fetches, keyed like the cache.
    thread_flights: DashMap<String, Arc<OnceCell<Option<CachedThread>>>>,
}

impl Dispatcher {
    pub fn new(
        modules: Vec<Arc<dyn Module>>,
        cache: EnrichmentCache,
        api: ApiClient,
        fetcher: Arc<RetryFetcher>,
        title_ttl: u64,
    ) -> Arc<Self> {
        Arc::new(Self {
            modules,
            cache,
            api,
            fetcher,
            tracker: TaskTracker::new(),
            title_ttl,
            thread_flights: DashMap::new(),
        })
    }

    /// In-flight enrichment tasks, drained on shutdown.
    pub fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    /// Releases every module's transports.
    pub async fn kill_modules(&self) {
        for module in &self.modules {
            module.kill().await;
        }
    }

    pub async fn dispatch(self: &Arc<Self>, msg: Message) {
        metrics::record_message(msg.body.kind());
        if let Body::Error(failure) = &msg.body {
            metrics::record_parse_error(&failure.code);
            if failure.code == "logparsefail" && !msg.wiki.is_empty() {
                self.fetcher
                    .trigger(&msg.wiki, &msg.language, &msg.domain.to_string());
            }
        }

        let mut interested = Vec::new();
        let mut props: HashSet<Property> = HashSet::new();
        for module in &self.modules {
            match module.interested(&msg) {
                Interest::No => {}
                Interest::Yes => interested.push(Arc::clone(module)),
                Interest::Enrich(requested) => {
                    props.extend(requested);
                    interested.push(Arc::clone(module));
                }
            }
        }
        if interested.is_empty() {
            return;
        }

        if props.is_empty() {
            run_modules(&interested, &msg).await;
            return;
        }

        let this = Arc::clone(self);
        self.tracker.spawn(async move {
            let mut msg = msg;
            match this.enrich(&mut msg, &props).await {
                Ok(()) => run_modules(&interested, &msg).await,
                Err(e) => {
                    metrics::record_fetch("enrich", e.error_code());
                    warn!(
                        code = e.error_code(),
                        error = %e,
                        wiki = %msg.wiki,
                        "Enrichment failed, dropping message"
                    );
                }
            }
        });
    }

    async fn enrich(
        &self,
        msg: &mut Message,
        props: &HashSet<Property>,
    ) -> Result<(), EnrichError> {
        // Thread-log resolution first: it reshapes the message the other
        // properties read.
        if props.contains(&Property::ThreadLog) {
            self.enrich_thread_log(msg).await?;
        }
        if props.contains(&Property::ThreadTitle) {
            self.enrich_thread_title(msg).await?;
        }
        if props.contains(&Property::PageTitle) {
            self.enrich_page_title(msg).await?;
        }
        Ok(())
    }

    /// Resolves an edit's canonical page title from its `diff`/`oldid`.
    async fn enrich_page_title(&self, msg: &mut Message) -> Result<(), EnrichError> {
        let base = msg.wiki_url();
        let wiki = msg.wiki.clone();
        let Body::Edit(edit) = &mut msg.body else {
            return Ok(());
        };
        let Some(revid) = edit
            .params
            .get("diff")
            .or_else(|| edit.params.get("oldid"))
            .copied()
        else {
            return Ok(());
        };

        let key = cache::title_key(&wiki, revid);
        match self.cache.get(&key).await {
            Ok(Some(title)) => {
                edit.title = Some(title);
                return Ok(());
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, key = %key, "Title cache read failed"),
        }

        let value: serde_json::Value = self
            .api
            .query(&base, &[("prop", "info"), ("revids", &revid.to_string())])
            .await
            .map_err(EnrichError::TitleQuery)?;
        let title = value["query"]["pages"]
            .as_object()
            .and_then(|pages| pages.values().next())
            .and_then(|page| page["title"].as_str())
            .ok_or(EnrichError::NoTitle)?
            .to_string();

        // Memoize under both revision ids so the follow-up diff line hits.
        for id in ["oldid", "diff"].iter().filter_map(|k| edit.params.get(*k)) {
            let key = cache::title_key(&wiki, *id);
            if let Err(e) = self.cache.set_with_ttl(&key, &title, self.title_ttl).await {
                warn!(error = %e, key = %key, "Title cache write failed");
            }
        }
        edit.title = Some(title);
        Ok(())
    }

    /// Resolves a `"0"`-bucket entry into a thread log event via the wiki's
    /// recent changes.
    async fn enrich_thread_log(&self, msg: &mut Message) -> Result<(), EnrichError> {
        let base = msg.wiki_url();
        let Body::Log(log) = &mut msg.body else {
            return Ok(());
        };
        if log.family != LogFamily::Zero {
            return Ok(());
        }

        let value: serde_json::Value = self
            .api
            .query(
                &base,
                &[
                    ("list", "recentchanges"),
                    ("rctype", "log"),
                    ("rcprop", "comment|ids|loginfo|title|user"),
                ],
            )
            .await
            .map_err(EnrichError::ThreadLogQuery)?;
        let entries = value["query"]["recentchanges"]
            .as_array()
            .cloned()
            .unwrap_or_default();
        let entry = entries
            .iter()
            .find(|e| e["logtype"].as_str() == Some("0"))
            .ok_or(EnrichError::ThreadLogNoFind)?;

        log.family = LogFamily::Thread;
        log.action = entry["logaction"].as_str().unwrap_or_default().to_string();
        if let Some(user) = entry["user"].as_str() {
            msg.user = user.to_string();
        }
        log.details = LogDetails::Thread {
            page: entry["title"].as_str().unwrap_or_default().to_string(),
            namespace: entry["ns"].as_i64().unwrap_or_default(),
            thread_id: entry["pageid"].as_i64().unwrap_or_default().to_string(),
            reason: entry["comment"]
                .as_str()
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            title: None,
        };
        Ok(())
    }

    /// Resolves a thread's display title from its parent page content,
    /// memoized per `(wiki, parent)` and single-flighted while fetching.
    async fn enrich_thread_title(&self, msg: &mut Message) -> Result<(), EnrichError> {
        let base = msg.wiki_url();
        let wiki = msg.wiki.clone();
        let Body::Log(log) = &mut msg.body else {
            return Ok(());
        };
        let LogDetails::Thread {
            page,
            thread_id,
            title,
            ..
        } = &mut log.details
        else {
            return Ok(());
        };

        let parent = parent_thread_page(page);
        let key = cache::thread_key(&wiki, &parent);
        match self.cache.get(&key).await {
            Ok(Some(json)) => {
                if let Ok(cached) = serde_json::from_str::<CachedThread>(&json) {
                    *title = Some(cached.title);
                    return Ok(());
                }
            }
            Ok(None) => {}
            Err(e) => {
                let err = EnrichError::CacheThreadTitle(e);
                warn!(code = err.error_code(), error = %err, "Thread cache read failed");
            }
        }

        let cell = self
            .thread_flights
            .entry(key.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();
        let api = self.api.clone();
        let store = self.cache.clone();
        let id = thread_id.clone();
        let fetch_key = key.clone();
        let fetch_parent = parent.clone();
        let fetched = cell
            .get_or_init(|| async move {
                match fetch_thread_title(&api, &base, &fetch_parent).await {
                    Ok(text) => {
                        let cached = CachedThread { id, title: text };
                        let json = serde_json::to_string(&cached).unwrap_or_default();
                        if let Err(e) = store
                            .set_with_ttl(&fetch_key, &json, cache::THREAD_TITLE_TTL)
                            .await
                        {
                            let err = EnrichError::CacheSetThreadCache(e);
                            warn!(
                                code = err.error_code(),
                                error = %err,
                                "Thread cache write failed"
                            );
                        }
                        Some(cached)
                    }
                    Err(e) => {
                        warn!(code = e.error_code(), error = %e, "Thread title fetch failed");
                        None
                    }
                }
            })
            .await
            .clone();
        self.thread_flights.remove(&key);

        let cached = fetched.ok_or(EnrichError::ThreadTitleParse)?;
        *title = Some(cached.title);
        Ok(())
    }
}

async fn run_modules(modules: &[Arc<dyn Module>], msg: &Message) {
    for module in modules {
        match module.execute(msg).await {
            Ok(()) => metrics::record_module_run(module.name(), "ok"),
            Err(e) => {
                metrics::record_module_run(module.name(), "error");
                error!(
                    r#type = "dispatch",
                    r#mod = module.name(),
                    error = %e,
                    "Module execution failed"
                );
            }
        }
    }
}

/// The thread's top-level comment page: everything up to the first nested
/// `/@comment-` segment.
fn parent_thread_page(page: &str) -> String {
    match page.match_indices("/@comment-").nth(1) {
        Some((idx, _)) => page[..idx].to_string(),
        None => page.to_string(),
    }
}

async fn fetch_thread_title(
    api: &ApiClient,
    base: &str,
    parent: &str,
) -> Result<String, EnrichError> {
    let value: serde_json::Value = api
        .query(
            base,
            &[
                ("titles", parent),
                ("prop", "revisions"),
                ("rvprop", "content"),
            ],
        )
        .await
        .map_err(EnrichError::ThreadInfoQuery)?;
    let content = value["query"]["pages"]
        .as_object()
        .and_then(|pages| pages.values().next())
        .and_then(|page| page["revisions"].as_array())
        .and_then(|revs| revs.first())
        .and_then(|rev| rev["*"].as_str())
        .ok_or(EnrichError::ThreadTitleParse)?;
    let caps = AC_METADATA
        .captures(content.trim_end())
        .ok_or(EnrichError::ThreadTitleParse)?;
    Ok(util::decode_html(&caps[1]))
}
