//! The message cache: raw templates, compiled regexes, per-wiki overrides.
//!
//! Four maps keyed by MediaWiki message name. `i18n[name]` is positionally
//! aligned with `messagecache[name]`: the i-th compiled regex was derived
//! from the i-th raw template, which is what allows capture renumbering
//! against that template's `$N` placeholders. Per-wiki overrides live in
//! `custom` (raw) and `i18n2` (compiled) under a `language:wiki:domain` key
//! and take precedence during matching.
//!
//! On disk everything is JSON with regexes stored as their source strings.

use crate::messages;
use aho_corasick::AhoCorasick;
use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

/// A compiled message regex together with the source it round-trips as.
#[derive(Debug, Clone)]
pub struct CompiledMessage {
    pub source: String,
    pub regex: Regex,
}

impl CompiledMessage {
    fn compile(source: String) -> Option<Self> {
        match Regex::new(&source) {
            Ok(regex) => Some(Self { source, regex }),
            Err(e) => {
                warn!(error = %e, source = %source, "Dropping uncompilable message regex");
                None
            }
        }
    }
}

/// Serialized form of the cache. Regexes are stored by source only; flags
/// are implied (none, Unicode by default).
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RawCache {
    pub messagecache: HashMap<String, Vec<String>>,
    pub i18n: HashMap<String, Vec<String>>,
    pub custom: HashMap<String, HashMap<String, String>>,
    pub i18n2: HashMap<String, HashMap<String, String>>,
}

/// In-memory message cache.
#[derive(Debug, Default)]
pub struct MessageCache {
    /// name → de-duplicated raw templates, one per language, insertion order.
    pub messagecache: HashMap<String, Vec<String>>,
    /// name → compiled regexes, positionally aligned with `messagecache`.
    pub i18n: HashMap<String, Vec<CompiledMessage>>,
    /// `language:wiki:domain` → name → raw override.
    pub custom: HashMap<String, HashMap<String, String>>,
    /// `language:wiki:domain` → name → compiled override.
    pub i18n2: HashMap<String, HashMap<String, CompiledMessage>>,
    /// Literal matcher over `messagecache["autosumm-blank"]`.
    blank: Option<AhoCorasick>,
}

/// The single-flight and cache key for one wiki's overrides.
pub fn custom_key(language: &str, wiki: &str, domain: &str) -> String {
    format!("{language}:{wiki}:{domain}")
}

impl MessageCache {
    /// Builds the compiled layers (`i18n`, `i18n2`, the blank matcher) from
    /// the raw ones. Call after any change to `messagecache` or `custom`.
    pub fn compile(&mut self) {
        self.i18n.clear();
        for (name, templates) in &self.messagecache {
            if !messages::map::has_transform(name) {
                continue;
            }
            let compiled: Vec<CompiledMessage> = templates
                .iter()
                .filter_map(|raw| {
                    messages::map::transform(name, raw).and_then(CompiledMessage::compile)
                })
                .collect();
            // Alignment invariant: a dropped regex would shift positions,
            // so a partial compile discards the whole name.
            if compiled.len() == templates.len() {
                self.i18n.insert(name.clone(), compiled);
            } else {
                warn!(name = %name, "Message excluded from i18n: compile count mismatch");
            }
        }

        self.i18n2.clear();
        for (key, overrides) in &self.custom {
            self.i18n2
                .insert(key.clone(), Self::compile_overrides(overrides));
        }

        self.rebuild_blank();
    }

    fn compile_overrides(overrides: &HashMap<String, String>) -> HashMap<String, CompiledMessage> {
        overrides
            .iter()
            .filter_map(|(name, raw)| {
                messages::map::transform(name, raw)
                    .and_then(CompiledMessage::compile)
                    .map(|c| (name.clone(), c))
            })
            .collect()
    }

    fn rebuild_blank(&mut self) {
        self.blank = self
            .messagecache
            .get("autosumm-blank")
            .filter(|entries| !entries.is_empty())
            .and_then(|entries| AhoCorasick::new(entries).ok());
    }

    /// Installs a freshly fetched override set for one wiki and recompiles
    /// only that slot.
    pub fn update_custom(
        &mut self,
        language: &str,
        wiki: &str,
        domain: &str,
        overrides: HashMap<String, String>,
    ) {
        let key = custom_key(language, wiki, domain);
        self.i18n2
            .insert(key.clone(), Self::compile_overrides(&overrides));
        self.custom.insert(key, overrides);
    }

    /// Candidate `(template, regex)` pairs for a message, overrides first.
    ///
    /// The template is the raw string the regex was derived from; its `$N`
    /// sequence drives renumbering.
    pub fn candidates<'a>(
        &'a self,
        name: &'a str,
        key: &str,
    ) -> impl Iterator<Item = (&'a str, &'a Regex)> + 'a {
        let over = self
            .i18n2
            .get(key)
            .and_then(|slot| slot.get(name))
            .and_then(|compiled| {
                self.custom
                    .get(key)
                    .and_then(|slot| slot.get(name))
                    .map(|raw| (raw.as_str(), &compiled.regex))
            });
        let base = self
            .i18n
            .get(name)
            .into_iter()
            .flatten()
            .enumerate()
            .filter_map(move |(i, compiled)| {
                self.messagecache
                    .get(name)
                    .and_then(|templates| templates.get(i))
                    .map(|raw| (raw.as_str(), &compiled.regex))
            });
        over.into_iter().chain(base)
    }

    /// Whether a summary contains any language's "blanked the page"
    /// autosummary. Literal containment, not a regex match.
    pub fn is_blank_summary(&self, summary: &str) -> bool {
        self.blank
            .as_ref()
            .map(|ac| ac.is_match(summary))
            .unwrap_or(false)
    }

    pub fn from_raw(raw: RawCache) -> Self {
        let mut cache = Self {
            messagecache: raw.messagecache,
            custom: raw.custom,
            ..Self::default()
        };
        cache.compile();
        cache
    }

    pub fn to_raw(&self) -> RawCache {
        RawCache {
            messagecache: self.messagecache.clone(),
            i18n: self
                .i18n
                .iter()
                .map(|(name, list)| {
                    (
                        name.clone(),
                        list.iter().map(|c| c.source.clone()).collect(),
                    )
                })
                .collect(),
            custom: self.custom.clone(),
            i18n2: self
                .i18n2
                .iter()
                .map(|(key, slot)| {
                    (
                        key.clone(),
                        slot.iter()
                            .map(|(name, c)| (name.clone(), c.source.clone()))
                            .collect(),
                    )
                })
                .collect(),
        }
    }
}

// ============================================================================
// Persistence
// ============================================================================

const SINGLE_FILE: &str = "_loader.json";
const DEBUG_FILES: [(&str, &str); 4] = [
    ("messagecache", "_loader_messagecache.json"),
    ("i18n", "_loader_i18n.json"),
    ("custom", "_loader_custom.json"),
    ("i18n2", "_loader_i18n2.json"),
];

/// Writes the cache under `dir`: one `_loader.json`, or the four per-map
/// files in debug mode.
pub fn save(cache: &MessageCache, dir: &Path, debug: bool) -> std::io::Result<()> {
    save_raw(&cache.to_raw(), dir, debug)
}

/// [`save`] over an already-serialized cache.
pub fn save_raw(raw: &RawCache, dir: &Path, debug: bool) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    if debug {
        let value = serde_json::to_value(&raw)?;
        for (map, file) in DEBUG_FILES {
            std::fs::write(dir.join(file), serde_json::to_string_pretty(&value[map])?)?;
        }
    } else {
        std::fs::write(dir.join(SINGLE_FILE), serde_json::to_string(&raw)?)?;
    }
    Ok(())
}

/// Loads the cache from `dir`. A missing or corrupt file yields `None` so
/// the caller falls back to a full rebuild.
pub fn load(dir: &Path, debug: bool) -> Option<MessageCache> {
    let raw = if debug {
        let mut value = serde_json::Map::new();
        for (map, file) in DEBUG_FILES {
            let text = std::fs::read_to_string(dir.join(file)).ok()?;
            value.insert(map.to_string(), serde_json::from_str(&text).ok()?);
        }
        serde_json::from_value(serde_json::Value::Object(value)).ok()?
    } else {
        let text = std::fs::read_to_string(dir.join(SINGLE_FILE)).ok()?;
        serde_json::from_str::<RawCache>(&text).ok()?
    };
    Some(MessageCache::from_raw(raw))
}

/// Shared read handle over the cache. Parse paths take short read locks;
/// the loader and the retry fetcher are the only writers.
#[derive(Clone, Default)]
pub struct SharedCache(Arc<RwLock<MessageCache>>);

impl SharedCache {
    pub fn new(cache: MessageCache) -> Self {
        Self(Arc::new(RwLock::new(cache)))
    }

    pub fn read(&self) -> parking_lot::RwLockReadGuard<'_, MessageCache> {
        self.0.read()
    }

    pub fn write(&self) -> parking_lot::RwLockWriteGuard<'_, MessageCache> {
        self.0.write()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_cache() -> MessageCache {
        let mut cache = MessageCache::default();
        cache.messagecache.insert(
            "deletedarticle".into(),
            vec![
                "deleted \"[[$1]]\"".into(),
                "a supprimé la page [[$1]]".into(),
            ],
        );
        cache
            .messagecache
            .insert("autosumm-blank".into(), vec!["Blanked the page".into()]);
        cache.compile();
        cache
    }

    #[test]
    fn test_compile_alignment() {
        let cache = sample_cache();
        assert_eq!(cache.i18n["deletedarticle"].len(), 2);
        assert_eq!(
            cache.messagecache["deletedarticle"].len(),
            cache.i18n["deletedarticle"].len()
        );
        // autosumm-blank has no transform, so no i18n entry.
        assert!(!cache.i18n.contains_key("autosumm-blank"));
    }

    #[test]
    fn test_candidates_override_first() {
        let mut cache = sample_cache();
        let mut overrides = HashMap::new();
        overrides.insert(
            "deletedarticle".to_string(),
            "zapped \"[[$1]]\"".to_string(),
        );
        cache.update_custom("en", "c", "fandom.com", overrides);

        let key = custom_key("en", "c", "fandom.com");
        let list: Vec<_> = cache.candidates("deletedarticle", &key).collect();
        assert_eq!(list.len(), 3);
        assert_eq!(list[0].0, "zapped \"[[$1]]\"");
        assert!(list[0].1.is_match("zapped \"[[Sandbox]]\""));

        // A different wiki sees only the base layer.
        let other: Vec<_> = cache
            .candidates("deletedarticle", &custom_key("en", "d", "fandom.com"))
            .collect();
        assert_eq!(other.len(), 2);
    }

    #[test]
    fn test_blank_containment() {
        let cache = sample_cache();
        assert!(cache.is_blank_summary("Blanked the page"));
        assert!(cache.is_blank_summary("x Blanked the page x"));
        assert!(!cache.is_blank_summary("Added content"));
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = sample_cache();
        let mut overrides = HashMap::new();
        overrides.insert("deletedarticle".to_string(), "nuked [[$1]]".to_string());
        cache.update_custom("fr", "w", "wikia.org", overrides);

        save(&cache, dir.path(), false).unwrap();
        let loaded = load(dir.path(), false).expect("cache should load");

        assert_eq!(loaded.messagecache, cache.messagecache);
        assert_eq!(loaded.custom, cache.custom);
        let sources = |c: &MessageCache| -> Vec<String> {
            c.i18n["deletedarticle"]
                .iter()
                .map(|m| m.source.clone())
                .collect()
        };
        assert_eq!(sources(&loaded), sources(&cache));
    }

    #[test]
    fn test_save_load_debug_files() {
        let dir = tempfile::tempdir().unwrap();
        let cache = sample_cache();
        save(&cache, dir.path(), true).unwrap();
        for (_, file) in DEBUG_FILES {
            assert!(dir.path().join(file).exists(), "{file} missing");
        }
        let loaded = load(dir.path(), true).expect("debug cache should load");
        assert_eq!(loaded.messagecache, cache.messagecache);
    }

    #[test]
    fn test_load_missing_dir_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(&dir.path().join("nope"), false).is_none());
    }
}
