//! Localized text store.
//!
//! [`LocalizationStore`] keeps the full translation table of the active
//! language in memory and fronts it with a bounded, idle-limited hot cache
//! ([`RecencyCache`]). A hot-cache miss consults the table; a table miss
//! resolves to the sentinel `#Missing:<key>`.
//!
//! # Language switches
//!
//! [`switch_language`](LocalizationStore::switch_language) loads the new
//! table (and its patch, if any) first, then swaps it in and clears the
//! hot cache under one write lock. Translations from the old language are
//! never returned afterwards. A failed load leaves the previous language
//! active.
//!
//! # Cached misses
//!
//! The sentinel for a missing key is cached like any other translation.
//! If a later [`apply_patch`](LocalizationStore::apply_patch) adds that
//! key, lookups keep returning the sentinel until the entry goes idle or
//! the language is switched. Patches do not clear the hot cache.

mod source;
mod table;

pub use source::{DirectorySource, LANGUAGE_FILE_SUFFIX, LanguageSource, StaticSource};
pub use table::{LocalizationTable, parse_entries};

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info};

use crate::Result;
use crate::cache::{RecencyCache, SweeperHandle};
use crate::config::LocalizationConfig;
use crate::telemetry;

/// Prefix of the text returned for keys absent from the active table.
pub const MISSING_PREFIX: &str = "#Missing:";

/// The sentinel text for a missing `key`.
pub fn missing_text(key: &str) -> String {
    format!("{MISSING_PREFIX}{key}")
}

struct Active {
    language: String,
    table: LocalizationTable,
}

/// Translation lookups for the active language.
///
/// One store is meant to live for the whole process and be shared with
/// its consumers.
pub struct LocalizationStore {
    hot: Arc<RecencyCache<String, Arc<str>>>,
    active: RwLock<Active>,
}

impl LocalizationStore {
    /// Create a store with an empty table for the configured default language.
    pub fn new(config: &LocalizationConfig) -> Result<Self> {
        Ok(Self {
            hot: Arc::new(RecencyCache::new(&config.cache_config())?),
            active: RwLock::new(Active {
                language: config.default_language.clone(),
                table: LocalizationTable::new(),
            }),
        })
    }

    /// Make `language` active, loading its table and patch from `source`.
    pub fn switch_language(&self, language: &str, source: &dyn LanguageSource) -> Result<()> {
        let mut table = LocalizationTable::parse(&source.load_base(language)?);
        let patched = match source.load_patch(language)? {
            Some(patch) => table.merge_text(&patch),
            None => 0,
        };
        let entries = table.len();

        {
            let mut active = self.write();
            active.language = language.to_string();
            active.table = table;
            // Still under the write lock: no lookup can repopulate the hot
            // cache from the old table between the swap and the clear.
            self.hot.clear();
        }

        info!(language, entries, patched, "switched language");
        Ok(())
    }

    /// Translated text for `key`, or the `#Missing:<key>` sentinel.
    pub fn get(&self, key: &str) -> Arc<str> {
        match self.hot.get_or_add(key.to_string(), || self.resolve(key)) {
            Ok(text) => text,
            Err(err) => {
                // Only reachable when every hot entry is mid-construction.
                debug!(key, error = %err, "hot cache unavailable, reading table directly");
                self.resolve(key)
            }
        }
    }

    /// Merge `key=value` patch text into the active table.
    ///
    /// The hot cache is left alone; see the module docs on cached misses.
    /// Returns the number of entries applied.
    pub fn apply_patch(&self, text: &str) -> usize {
        let mut active = self.write();
        let applied = active.table.merge_text(text);
        info!(language = %active.language, applied, "applied language patch");
        applied
    }

    /// Ask `source` for a patch to the active language and merge it.
    ///
    /// Returns the number of entries applied (zero when no patch exists).
    pub fn check_patch(&self, source: &dyn LanguageSource) -> Result<usize> {
        let language = self.language();
        match source.load_patch(&language)? {
            Some(patch) => Ok(self.apply_patch(&patch)),
            None => Ok(0),
        }
    }

    /// The active language.
    pub fn language(&self) -> String {
        self.read().language.clone()
    }

    /// Number of translations in the active table.
    pub fn table_len(&self) -> usize {
        self.read().table.len()
    }

    /// Number of translations currently in the hot cache.
    pub fn cached_len(&self) -> usize {
        self.hot.len()
    }

    /// Drop hot-cache entries idle for at least the idle window.
    pub fn sweep_idle(&self) -> usize {
        self.hot.sweep_idle()
    }

    /// Start the periodic hot-cache sweep on the current tokio runtime.
    pub fn spawn_idle_sweeper(&self) -> Result<SweeperHandle> {
        self.hot.spawn_idle_sweeper()
    }

    fn resolve(&self, key: &str) -> Arc<str> {
        match self.read().table.get(key) {
            Some(text) => Arc::from(text),
            None => {
                metrics::counter!(telemetry::I18N_MISSING_TOTAL).increment(1);
                Arc::from(missing_text(key))
            }
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Active> {
        self.active.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Active> {
        self.active.write().unwrap_or_else(PoisonError::into_inner)
    }
}
