//! Configuration validation, run once at startup.

use super::types::Config;

/// Returns every problem found, not just the first.
pub fn validate(config: &Config) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();

    if config.client.server.is_empty() {
        errors.push("client.server must not be empty".to_string());
    }
    if config.client.nick.is_empty() {
        errors.push("client.nick must not be empty".to_string());
    }
    if config.client.retries == 0 {
        errors.push("client.retries must be at least 1".to_string());
    }

    for (name, value) in [
        ("rc", &config.client.channels.rc),
        ("discussions", &config.client.channels.discussions),
        ("newusers", &config.client.channels.newusers),
    ] {
        if value.is_empty() {
            errors.push(format!("client.channels.{name} must not be empty"));
        } else if !value.starts_with('#') {
            errors.push(format!("client.channels.{name} must start with '#'"));
        }
    }

    if config.cache.dir.is_empty() {
        errors.push("cache.dir must not be empty".to_string());
    }
    if config.log.file && config.log.dir.is_none() {
        errors.push("log.dir is required when log.file is set".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
