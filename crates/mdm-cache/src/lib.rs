//! # mdm-cache
//!
//! A small synchronous cache used to memoize permission decisions.
//!
//! ## Features
//!
//! - **Bounded**: LRU eviction once `max_entries` is reached
//! - **TTL support**: entries expire after the configured time-to-live
//! - **Explicit invalidation**: single keys, predicates, or the whole cache
//! - **Thread-safe**: one mutex around the entry map, shareable behind `Arc`
//!
//! ## Quick Start
//!
//! ```rust
//! use mdm_cache::{Cache, CacheConfig};
//!
//! let cache: Cache<String, u32> = Cache::new(CacheConfig::default()).unwrap();
//! cache.insert("answer".to_string(), 42);
//! assert_eq!(cache.get(&"answer".to_string()), Some(42));
//!
//! let computed = cache.get_or_insert_with("other".to_string(), || 7);
//! assert_eq!(computed, 7);
//! ```

use thiserror::Error;

pub mod config;
pub mod memory;

pub use config::*;
pub use memory::*;

/// Cache operation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CacheError {
    #[error("Cache configuration error: {0}")]
    Configuration(String),
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub invalidations: u64,
    pub total_keys: u64,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        if self.hits + self.misses == 0 {
            0.0
        } else {
            self.hits as f64 / (self.hits + self.misses) as f64
        }
    }
}
