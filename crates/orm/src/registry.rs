//! DAO Registry - typed lookup of key resolvers by bean type
//!
//! A bean whose key references another table names that table's bean type
//! only by its tag. Key derivation and reconstruction look the target's
//! resolver up here at the point of need, so beans never import every table
//! they key into. Registration happens once at start-up, either through
//! [`DaoRegistry::register`] or the [`register_beans!`] macro.

use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use tracing::{debug, warn};

use crate::backends::{DatasetView, Record};
use crate::config::MappingConfig;
use crate::dao::key_resolution::{self, ResolutionPath};
use crate::dao::Dao;
use crate::error::{MappingResult, TechnicalError};
use crate::model::core_trait::Bean;
use crate::model::primary_key::Key;

/// Type-erased key operations for one bean type
pub trait KeyResolver: Send + Sync {
    fn bean_type(&self) -> &'static str;

    fn table_path(&self) -> &'static str;

    /// Derive the key of `bean`, which must be of this resolver's type
    fn derive_key_dyn(
        &self,
        registry: &'static DaoRegistry,
        bean: &dyn Any,
        path: &mut ResolutionPath,
    ) -> MappingResult<Option<Key>>;

    /// Rebuild a bean from `key`, reading nested targets from `dataset`
    /// when they exist there
    fn reconstruct_dyn(
        &self,
        registry: &'static DaoRegistry,
        dataset: Option<&dyn DatasetView>,
        key: &Key,
        path: &mut ResolutionPath,
    ) -> MappingResult<Box<dyn Any + Send>>;

    /// Read a full bean from a record of this resolver's table
    fn read_dyn(
        &self,
        registry: &'static DaoRegistry,
        config: MappingConfig,
        record: &Record,
    ) -> MappingResult<Box<dyn Any + Send>>;
}

struct TypedResolver<B>(PhantomData<fn() -> B>);

impl<B: Bean> KeyResolver for TypedResolver<B> {
    fn bean_type(&self) -> &'static str {
        B::BEAN_TYPE
    }

    fn table_path(&self) -> &'static str {
        B::table_path()
    }

    fn derive_key_dyn(
        &self,
        registry: &'static DaoRegistry,
        bean: &dyn Any,
        path: &mut ResolutionPath,
    ) -> MappingResult<Option<Key>> {
        let bean = bean
            .downcast_ref::<B>()
            .ok_or_else(|| TechnicalError::BeanTypeMismatch {
                expected: B::BEAN_TYPE.to_string(),
                found: "a bean of another type".to_string(),
            })?;
        key_resolution::derive_within(registry, bean, path)
    }

    fn reconstruct_dyn(
        &self,
        registry: &'static DaoRegistry,
        dataset: Option<&dyn DatasetView>,
        key: &Key,
        path: &mut ResolutionPath,
    ) -> MappingResult<Box<dyn Any + Send>> {
        let bean: B = key_resolution::reconstruct_within(registry, dataset, key, path)?;
        Ok(Box::new(bean))
    }

    fn read_dyn(
        &self,
        registry: &'static DaoRegistry,
        config: MappingConfig,
        record: &Record,
    ) -> MappingResult<Box<dyn Any + Send>> {
        let bean: B = Dao::<B>::with_registry(registry)
            .with_config(config)
            .read_unfiltered(record)?;
        Ok(Box::new(bean))
    }
}

/// Mapping from bean type tag to its key resolver
#[derive(Default)]
pub struct DaoRegistry {
    resolvers: DashMap<&'static str, Arc<dyn KeyResolver>>,
}

impl std::fmt::Debug for DaoRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<&'static str> = self.resolvers.iter().map(|e| *e.key()).collect();
        types.sort_unstable();
        f.debug_struct("DaoRegistry").field("bean_types", &types).finish()
    }
}

impl DaoRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `B`. Registering the same type again is a no-op.
    pub fn register<B: Bean>(&self) {
        if self.resolvers.contains_key(B::BEAN_TYPE) {
            return;
        }
        self.resolvers
            .insert(B::BEAN_TYPE, Arc::new(TypedResolver::<B>(PhantomData)));
        debug!(bean_type = B::BEAN_TYPE, table = B::table_path(), "Bean registered");
    }

    pub fn is_registered(&self, bean_type: &str) -> bool {
        self.resolvers.contains_key(bean_type)
    }

    /// Resolver for `bean_type`, or [`TechnicalError::MissingDao`]
    pub fn resolve(&self, bean_type: &str) -> MappingResult<Arc<dyn KeyResolver>> {
        match self.resolvers.get(bean_type) {
            Some(entry) => Ok(Arc::clone(entry.value())),
            None => {
                warn!(bean_type, "No DAO registered for bean type");
                Err(TechnicalError::MissingDao {
                    bean_type: bean_type.to_string(),
                }
                .into())
            }
        }
    }

    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }
}

static GLOBAL_REGISTRY: Lazy<DaoRegistry> = Lazy::new(DaoRegistry::new);

/// Process-wide registry used by [`Dao::new`]
pub fn global_registry() -> &'static DaoRegistry {
    &GLOBAL_REGISTRY
}

/// Register bean types with the global registry, or with the given one
///
/// ```ignore
/// register_beans!(Country, Region, City);
/// register_beans!(in &REGISTRY; Country, Region);
/// ```
#[macro_export]
macro_rules! register_beans {
    (in $registry:expr; $($bean:ty),+ $(,)?) => {{
        let registry: &$crate::registry::DaoRegistry = $registry;
        $( registry.register::<$bean>(); )+
    }};
    ($($bean:ty),+ $(,)?) => {{
        $( $crate::registry::global_registry().register::<$bean>(); )+
    }};
}
