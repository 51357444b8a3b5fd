//! Default value functions for configuration.

pub fn default_true() -> bool {
    true
}

// =============================================================================
// Client Defaults
// =============================================================================

pub fn default_port() -> u16 {
    6667
}

pub fn default_retries() -> u32 {
    5
}

// =============================================================================
// Log Defaults
// =============================================================================

pub fn default_log_level() -> String {
    "info".to_string()
}

// =============================================================================
// Cache Defaults
// =============================================================================

pub fn default_cache_dir() -> String {
    "cache".to_string()
}

pub fn default_title_ttl() -> u64 {
    3600
}
