//! Message-cache lifecycle: startup load or rebuild, and incremental
//! per-wiki override updates.

pub mod fetch;
pub mod store;

use crate::api::ApiClient;
use crate::error::FetchError;
use std::collections::HashMap;
use std::path::PathBuf;
use store::SharedCache;
use tracing::{info, warn};

pub struct Loader {
    api: ApiClient,
    dir: PathBuf,
    debug: bool,
    cache: SharedCache,
}

impl Loader {
    pub fn new(api: ApiClient, dir: PathBuf, debug: bool) -> Self {
        Self {
            api,
            dir,
            debug,
            cache: SharedCache::default(),
        }
    }

    /// The shared cache handle readers hold.
    pub fn cache(&self) -> SharedCache {
        self.cache.clone()
    }

    /// Startup entry: load the persisted cache, or rebuild it when the file
    /// is absent, corrupt, or a fetch was forced.
    pub async fn run(&self, force_fetch: bool) -> Result<(), FetchError> {
        if !force_fetch {
            if let Some(loaded) = store::load(&self.dir, self.debug) {
                info!(
                    names = loaded.messagecache.len(),
                    overrides = loaded.custom.len(),
                    "Message cache loaded from disk"
                );
                *self.cache.write() = loaded;
                return Ok(());
            }
            info!("No usable message cache on disk, rebuilding");
        }

        let rebuilt = fetch::rebuild(&self.api).await?;
        if let Err(e) = store::save(&rebuilt, &self.dir, self.debug) {
            warn!(error = %e, "Failed to persist message cache");
        }
        *self.cache.write() = rebuilt;
        Ok(())
    }

    /// Installs a freshly fetched override set for one wiki, recompiles
    /// only that slot, and persists.
    pub fn update_custom(
        &self,
        wiki: &str,
        language: &str,
        domain: &str,
        overrides: HashMap<String, String>,
    ) {
        info!(
            wiki = %wiki,
            language = %language,
            domain = %domain,
            messages = overrides.len(),
            "Installing custom message overrides"
        );
        let raw = {
            let mut guard = self.cache.write();
            guard.update_custom(language, wiki, domain, overrides);
            guard.to_raw()
        };
        // Persist outside the lock; readers never wait on disk.
        if let Err(e) = store::save_raw(&raw, &self.dir, self.debug) {
            warn!(error = %e, "Failed to persist message cache after override update");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use store::custom_key;

    #[test]
    fn test_update_custom_compiles_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let loader = Loader::new(ApiClient::new(), dir.path().to_path_buf(), false);
        {
            let mut guard = loader.cache.write();
            guard
                .messagecache
                .insert("deletedarticle".into(), vec!["deleted \"[[$1]]\"".into()]);
            guard.compile();
        }

        let mut overrides = HashMap::new();
        overrides.insert(
            "deletedarticle".to_string(),
            "vaporized \"[[$1]]\"".to_string(),
        );
        loader.update_custom("c", "en", "fandom.com", overrides);

        let key = custom_key("en", "c", "fandom.com");
        {
            let cache = loader.cache.read();
            let candidates: Vec<_> = cache.candidates("deletedarticle", &key).collect();
            assert_eq!(candidates.len(), 2);
            assert!(candidates[0].1.is_match("vaporized \"[[Sandbox]]\""));
        }

        // The override survives a reload from disk.
        let reloaded = store::load(dir.path(), false).unwrap();
        assert_eq!(
            reloaded.custom[&key]["deletedarticle"],
            "vaporized \"[[$1]]\""
        );
        assert!(reloaded.i18n2[&key].contains_key("deletedarticle"));
    }
}
