//! New-user tracking.
//!
//! Each registration sets a `newusers:{user}:{wiki}:{lang}:{domain}` bit
//! with a 30-minute TTL; the Redis key-expiration event is the follow-up
//! trigger, giving the account time to fill in a profile before it is
//! looked at.

use super::{Interest, Module, ModuleContext};
use crate::cache::{self, EnrichmentCache};
use crate::model::{Body, Message};
use async_trait::async_trait;
use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub struct NewUsersModule {
    cache: EnrichmentCache,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl NewUsersModule {
    pub fn new(_config: &toml::Value, ctx: &ModuleContext) -> Self {
        Self {
            cache: ctx.cache.clone(),
            listener: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Module for NewUsersModule {
    fn name(&self) -> &'static str {
        "newusers"
    }

    async fn setup(&self, _ctx: &ModuleContext) -> anyhow::Result<()> {
        let expirations = self.cache.subscribe_expired().await?;
        let handle = tokio::spawn(async move {
            tokio::pin!(expirations);
            while let Some(key) = expirations.next().await {
                let Some(rest) = key.strip_prefix("newusers:") else {
                    continue;
                };
                // Key shape: user:wiki:lang:domain. Usernames cannot contain colons.
                let mut parts = rest.splitn(4, ':');
                let (user, wiki) = (parts.next().unwrap_or(""), parts.next().unwrap_or(""));
                info!(
                    target: "newusers",
                    user = %user,
                    wiki = %wiki,
                    "Follow-up due for new user"
                );
            }
        });
        *self.listener.lock() = Some(handle);
        Ok(())
    }

    fn interested(&self, message: &Message) -> Interest {
        if matches!(message.body, Body::NewUser) {
            Interest::Yes
        } else {
            Interest::No
        }
    }

    async fn execute(&self, message: &Message) -> anyhow::Result<()> {
        let key = cache::newusers_key(
            &message.user,
            &message.wiki,
            &message.language,
            &message.domain.to_string(),
        );
        if let Err(e) = self.cache.setbit(&key).await {
            warn!(error = %e, key = %key, "New-user bit write failed");
            return Ok(());
        }
        if let Err(e) = self.cache.expire(&key, cache::NEWUSERS_TTL).await {
            warn!(error = %e, key = %key, "New-user expiry failed");
        }
        Ok(())
    }

    async fn kill(&self) {
        if let Some(handle) = self.listener.lock().take() {
            handle.abort();
        }
    }
}
