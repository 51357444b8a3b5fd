//! Configuration type definitions.

use super::defaults::{
    default_cache_dir, default_log_level, default_port, default_retries, default_title_ttl,
    default_true,
};
use crate::model::Channel;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub client: ClientConfig,
    #[serde(default)]
    pub log: LogConfig,
    /// Module name → module-specific table.
    #[serde(default)]
    pub modules: HashMap<String, toml::Value>,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(Path::new(path))?;
        Ok(toml::from_str(&content)?)
    }
}

/// IRC client configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// IRC server hostname.
    pub server: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub nick: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub realname: Option<String>,
    /// Reconnection attempts before giving up.
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// Feed channel names.
    pub channels: ChannelMap,
    /// Expected feed bot nick per channel; lines from anyone else are
    /// ignored.
    pub users: ChannelMap,
}

/// One value per feed channel.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelMap {
    pub rc: String,
    pub discussions: String,
    pub newusers: String,
}

impl ChannelMap {
    pub fn get(&self, channel: Channel) -> &str {
        match channel {
            Channel::Rc => &self.rc,
            Channel::Discussions => &self.discussions,
            Channel::NewUsers => &self.newusers,
        }
    }

    /// The channel a name belongs to, if any.
    pub fn channel_of(&self, name: &str) -> Option<Channel> {
        if name == self.rc {
            Some(Channel::Rc)
        } else if name == self.discussions {
            Some(Channel::Discussions)
        } else if name == self.newusers {
            Some(Channel::NewUsers)
        } else {
            None
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Directory for the log file when `file` is set.
    #[serde(default)]
    pub dir: Option<String>,
    /// Discord log relay settings, consumed by an external transport.
    #[serde(default)]
    #[allow(dead_code)]
    pub discord: Option<toml::Value>,
    #[serde(default = "default_true")]
    pub stdout: bool,
    #[serde(default)]
    pub file: bool,
    /// Debug mode: per-map cache files and verbose decoding logs.
    #[serde(default)]
    pub debug: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: None,
            discord: None,
            stdout: true,
            file: false,
            debug: false,
        }
    }
}

/// Message-cache persistence configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_dir")]
    pub dir: String,
    /// TTL in seconds for memoized page titles.
    #[serde(default = "default_title_ttl")]
    pub title_ttl: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            title_ttl: default_title_ttl(),
        }
    }
}

/// Prometheus endpoint configuration. Port 0 disables it.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct MetricsConfig {
    #[serde(default)]
    pub port: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r##"
        [client]
        server = "irc.example.org"
        nick = "KockaLogger"

        [client.channels]
        rc = "#rc"
        discussions = "#discussions"
        newusers = "#newusers"

        [client.users]
        rc = "rc-bot"
        discussions = "disc-bot"
        newusers = "nu-bot"
    "##;

    #[test]
    fn test_minimal_config_defaults() {
        let config: Config = toml::from_str(MINIMAL).unwrap();
        assert_eq!(config.client.port, 6667);
        assert_eq!(config.client.retries, 5);
        assert_eq!(config.log.level, "info");
        assert!(config.log.stdout);
        assert!(!config.log.debug);
        assert_eq!(config.cache.dir, "cache");
        assert_eq!(config.cache.title_ttl, 3600);
        assert_eq!(config.metrics.port, 0);
        assert!(config.modules.is_empty());
    }

    #[test]
    fn test_channel_map_lookup() {
        let config: Config = toml::from_str(MINIMAL).unwrap();
        assert_eq!(config.client.channels.get(Channel::Rc), "#rc");
        assert_eq!(
            config.client.channels.channel_of("#discussions"),
            Some(Channel::Discussions)
        );
        assert_eq!(config.client.channels.channel_of("#other"), None);
        assert_eq!(config.client.users.get(Channel::NewUsers), "nu-bot");
    }

    #[test]
    fn test_module_tables_pass_through() {
        let config: Config = toml::from_str(&format!(
            "{MINIMAL}\n[modules.vandalism]\nthreshold = -2000\n\n[modules.feed]\n"
        ))
        .unwrap();
        assert_eq!(config.modules.len(), 2);
        assert_eq!(
            config.modules["vandalism"]
                .get("threshold")
                .and_then(|v| v.as_integer()),
            Some(-2000)
        );
    }
}
