//! localcache-proxy - caching proxy for file stores
//!
//! Wraps a remote [`store::Store`] with a local on-disk cache. Reads are
//! answered from the cache when possible, writes go through to the remote and
//! are mirrored locally via atomic temp-file commits, and entries are evicted
//! by how long ago they were last used.

pub mod cache;
pub mod config;
pub mod janitor;
pub mod store;

pub use cache::{CacheProxy, CachedStore, EvictionReport};
pub use config::ProxyConfig;
pub use store::{LocalStore, Store, StoreError, StoreOptions};
