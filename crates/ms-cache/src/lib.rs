//! MarkSeen Cache Library
//!
//! The cache lifecycle around the core membership filter: collaborator
//! traits for the host's bookmark store, key-value area and settings, the
//! persisted-record store adapter, and the cache manager that owns the
//! in-memory structures and answers membership queries.
//!
//! # Modules
//!
//! - `source`: bookmark tree model, change events, source/settings traits
//! - `store`: key-value trait, in-memory store, cache store adapter
//! - `manager`: the cache manager state machine and debounce coordination
//! - `error`: the error taxonomy at the manager boundary

pub mod error;
pub mod manager;
pub mod source;
pub mod store;

// Re-export commonly used types
pub use error::CacheError;
pub use manager::{CacheConfig, CacheManager};
pub use source::{
    collect_urls, BookmarkEvent, BookmarkNode, BookmarkSource, SettingsError, SettingsSource,
    SourceError, StaticBookmarks, StaticSettings,
};
pub use store::{CacheStoreAdapter, KeyValueStore, LoadedCache, MemoryStore, StoreError};
