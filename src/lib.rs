//! Almanac - pooled game-data tables and localized text
//!
//! This crate provides the runtime side of generated, read-only game data:
//! a process-wide [`ConfigPool`] that constructs each data table lazily and
//! at most once, and a [`LocalizationStore`] that serves translated text for
//! the active language. Both sit on the same bounded, recency-aware
//! [`RecencyCache`], which evicts by capacity (least recently used first,
//! never a pinned entry) and by idle time.
//!
//! # Pool Example
//!
//! ```rust
//! use almanac::{ConfigPool, PoolConfig, PooledObject, Record, RecordTable};
//!
//! struct Skill {
//!     id: i32,
//!     name: &'static str,
//! }
//!
//! impl Record for Skill {
//!     type Id = i32;
//!     fn id(&self) -> i32 {
//!         self.id
//!     }
//! }
//!
//! #[derive(Default)]
//! struct SkillTable;
//!
//! impl PooledObject for SkillTable {
//!     type Data = RecordTable<Skill>;
//!
//!     fn construct(&self) -> almanac::Result<Self::Data> {
//!         Ok(RecordTable::new("skill", vec![Skill { id: 1, name: "slash" }]))
//!     }
//! }
//!
//! fn main() -> almanac::Result<()> {
//!     let pool = ConfigPool::new(&PoolConfig::default())?;
//!     let skills = pool.get::<SkillTable>()?;
//!     assert_eq!(skills.record(1)?.map(|s| s.name), Some("slash"));
//!     assert!(skills.record(2)?.is_none());
//!     Ok(())
//! }
//! ```
//!
//! # Localization Example
//!
//! ```rust
//! use almanac::{LocalizationConfig, LocalizationStore, StaticSource};
//!
//! fn main() -> almanac::Result<()> {
//!     let store = LocalizationStore::new(&LocalizationConfig::default())?;
//!     let source = StaticSource::new().language("en", "hello=Hello");
//!     store.switch_language("en", &source)?;
//!
//!     assert_eq!(&*store.get("hello"), "Hello");
//!     assert_eq!(&*store.get("bye"), "#Missing:bye");
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod i18n;
pub mod lazy;
pub mod pool;
pub mod table;
pub mod telemetry;

// Re-export main types at crate root
pub use cache::{CacheConfig, EvictionCause, EvictionListener, RecencyCache, SweeperHandle};
pub use config::{Config, LocalizationConfig, PoolConfig};
pub use error::{AlmanacError, Result};
pub use i18n::{
    DirectorySource, LanguageSource, LocalizationStore, LocalizationTable, MISSING_PREFIX,
    StaticSource,
};
pub use lazy::{InitState, LazyInit};
pub use pool::{ConfigPool, Lease, PoolKey, Pooled, PooledObject};
pub use table::{Record, RecordTable};
