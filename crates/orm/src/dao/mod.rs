//! Generic DAO - the CRUD and query surface for one bean type
//!
//! A [`Dao`] is a stateless, copyable handle: the bean type it maps, the
//! registry used to resolve nested key components, and the mapping settings.
//! It holds no per-call state and is shared freely across transactions.
//!
//! - `key_resolution`: key derivation and reconstruction across tables
//! - `crud_operations`: read, create, update, create-or-update, delete
//! - `query_methods`: predicate scans with windowing, counts
//! - `navigation`: foreign-key and association traversal

pub mod crud_operations;
pub mod key_resolution;
pub mod navigation;
pub mod query_methods;

use std::fmt;
use std::marker::PhantomData;

use crate::config::MappingConfig;
use crate::model::core_trait::Bean;
use crate::registry::{global_registry, DaoRegistry};

pub use key_resolution::ResolutionPath;
pub use query_methods::ReadAllOptions;

/// Data access object for bean type `B`
pub struct Dao<B: Bean> {
    registry: &'static DaoRegistry,
    config: MappingConfig,
    _bean: PhantomData<fn() -> B>,
}

impl<B: Bean> Clone for Dao<B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<B: Bean> Copy for Dao<B> {}

impl<B: Bean> fmt::Debug for Dao<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dao")
            .field("bean_type", &B::BEAN_TYPE)
            .field("table", &B::table_path())
            .field("config", &self.config)
            .finish()
    }
}

impl<B: Bean> Default for Dao<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Bean> Dao<B> {
    /// DAO backed by the global registry and default settings
    pub fn new() -> Self {
        Self::with_registry(global_registry())
    }

    pub fn with_registry(registry: &'static DaoRegistry) -> Self {
        Self {
            registry,
            config: MappingConfig::default(),
            _bean: PhantomData,
        }
    }

    pub fn with_config(mut self, config: MappingConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &MappingConfig {
        &self.config
    }

    pub fn registry(&self) -> &'static DaoRegistry {
        self.registry
    }

    pub fn table_path(&self) -> &'static str {
        B::table_path()
    }

    /// DAO for another bean type sharing this one's registry and settings
    pub fn sibling<T: Bean>(&self) -> Dao<T> {
        Dao::<T>::with_registry(self.registry).with_config(self.config)
    }
}
