//! Subscriber modules.
//!
//! A module declares interest in each decoded message, optionally asking
//! for enrichment properties first, and relays the interesting ones to its
//! sink. Built-ins:
//!
//! - [`feed`]: structured-log sink for every decoded event
//! - [`vandalism`]: blanking/replacement/removal heuristics with a
//!   debounced alert
//! - [`newusers`]: new-user bits with expiry-driven follow-ups

pub mod feed;
pub mod newusers;
pub mod vandalism;

use crate::cache::EnrichmentCache;
use crate::loader::store::SharedCache;
use crate::model::Message;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Enrichment properties a module may request before `execute`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Property {
    /// Canonical page title for an edit's `diff`/`oldid`.
    PageTitle,
    /// Resolve a `"0"`-bucket log entry into a thread event.
    ThreadLog,
    /// Display title of a thread's parent page.
    ThreadTitle,
}

/// A module's answer to `interested`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interest {
    No,
    Yes,
    /// Execute after fetching these properties.
    Enrich(Vec<Property>),
}

/// Shared handles passed to modules at construction and setup.
#[derive(Clone)]
pub struct ModuleContext {
    pub messages: SharedCache,
    pub cache: EnrichmentCache,
}

#[async_trait]
pub trait Module: Send + Sync {
    fn name(&self) -> &'static str;

    /// Called once after the message cache is loaded.
    async fn setup(&self, _ctx: &ModuleContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Pure and synchronous; must not suspend or panic.
    fn interested(&self, message: &Message) -> Interest;

    /// May suspend; errors are caught and logged by the dispatcher.
    async fn execute(&self, message: &Message) -> anyhow::Result<()>;

    /// Release transports and flush caches on shutdown.
    async fn kill(&self) {}
}

/// Builds the configured modules. Unknown names are logged and skipped.
pub fn build(
    configs: &HashMap<String, toml::Value>,
    ctx: &ModuleContext,
) -> Vec<Arc<dyn Module>> {
    let mut names: Vec<&String> = configs.keys().collect();
    names.sort();

    let mut modules: Vec<Arc<dyn Module>> = Vec::new();
    for name in names {
        let config = &configs[name];
        match name.as_str() {
            "feed" => modules.push(Arc::new(feed::FeedModule::new(config))),
            "vandalism" => {
                modules.push(Arc::new(vandalism::VandalismModule::new(config, ctx)))
            }
            "newusers" => modules.push(Arc::new(newusers::NewUsersModule::new(config, ctx))),
            other => warn!(module = %other, "Unknown module in configuration"),
        }
    }
    modules
}
