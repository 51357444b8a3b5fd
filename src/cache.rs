//! Redis-backed enrichment cache.
//!
//! Shared key/value store with TTLs for page titles, thread metadata and
//! debounce bits, plus the key-expiration subscription the new-users module
//! relies on. Connection failures after startup are non-fatal: callers log
//! and the pipeline keeps flowing.
//!
//! Two connections are required: a multiplexed command connection and a
//! dedicated pub/sub connection for `__keyevent@0__:expired`.

use futures_util::{Stream, StreamExt};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};

/// Default Redis endpoint: a Unix domain socket.
pub const DEFAULT_REDIS_URL: &str = "redis+unix:///tmp/redis_kockalogger.sock";

/// Keyspace-notification channel for expired keys.
pub const EXPIRED_CHANNEL: &str = "__keyevent@0__:expired";

/// TTL for memoized thread metadata: 3 days.
pub const THREAD_TITLE_TTL: u64 = 3 * 24 * 3600;
/// TTL for vandalism-alert debounce bits: 3 hours.
pub const VANDALISM_TTL: u64 = 3 * 3600;
/// TTL for new-user bits; the expiry event is the follow-up trigger.
pub const NEWUSERS_TTL: u64 = 30 * 60;

pub fn title_key(wiki: &str, revid: i64) -> String {
    format!("{wiki}-{revid}")
}

pub fn thread_key(wiki: &str, parent: &str) -> String {
    format!("{wiki}-{parent}")
}

pub fn vandalism_key(user: &str, language: &str, wiki: &str, domain: &str) -> String {
    format!("vandalism:{user}:{language}:{wiki}:{domain}")
}

pub fn newusers_key(user: &str, wiki: &str, language: &str, domain: &str) -> String {
    format!("newusers:{user}:{wiki}:{language}:{domain}")
}

/// Memoized thread metadata under `{wiki}-{parent}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedThread {
    pub id: String,
    pub title: String,
}

#[derive(Clone)]
pub struct EnrichmentCache {
    conn: ConnectionManager,
    url: String,
}

impl EnrichmentCache {
    /// Connects the command connection. Failure here is fatal at startup
    /// (`no-redis`); afterwards the driver reconnects on its own.
    pub async fn connect(url: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self {
            conn,
            url: url.to_string(),
        })
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, redis::RedisError> {
        let mut conn = self.conn.clone();
        conn.get(key).await
    }

    #[allow(dead_code)]
    pub async fn set(&self, key: &str, value: &str) -> Result<(), redis::RedisError> {
        let mut conn = self.conn.clone();
        conn.set(key, value).await
    }

    /// `SET` with an expiry in seconds.
    pub async fn set_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: u64,
    ) -> Result<(), redis::RedisError> {
        let mut conn = self.conn.clone();
        conn.set_ex(key, value, ttl).await
    }

    /// Sets bit 0, the debounce marker shape.
    pub async fn setbit(&self, key: &str) -> Result<(), redis::RedisError> {
        let mut conn = self.conn.clone();
        conn.setbit(key, 0, true).await
    }

    pub async fn expire(&self, key: &str, ttl: u64) -> Result<(), redis::RedisError> {
        let mut conn = self.conn.clone();
        conn.expire(key, ttl as i64).await
    }

    pub async fn exists(&self, key: &str) -> Result<bool, redis::RedisError> {
        let mut conn = self.conn.clone();
        conn.exists(key).await
    }

    #[allow(dead_code)]
    pub async fn del(&self, key: &str) -> Result<(), redis::RedisError> {
        let mut conn = self.conn.clone();
        conn.del(key).await
    }

    /// Opens the second connection and subscribes to key expirations.
    ///
    /// Yields expired key names. Requires `notify-keyspace-events` to
    /// include `Ex` on the server.
    pub async fn subscribe_expired(
        &self,
    ) -> Result<impl Stream<Item = String>, redis::RedisError> {
        let client = redis::Client::open(self.url.as_str())?;
        let mut pubsub = client.get_async_pubsub().await?;
        pubsub.subscribe(EXPIRED_CHANNEL).await?;
        Ok(pubsub
            .into_on_message()
            .filter_map(|msg| async move { msg.get_payload::<String>().ok() }))
    }
}
