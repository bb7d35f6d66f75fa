//! # mdm-orm: record-mapping data access layer
//!
//! Turns typed in-memory beans into operations against a hierarchical
//! record store (repository, dataset, table, record) and back:
//!
//! - **Keys**: composite, possibly nested primary keys with a reversible
//!   encoding ([`Key`])
//! - **Beans**: typed projections with explicit binding state and
//!   field-inheritance flags ([`Bean`], [`BeanState`])
//! - **DAO**: key derivation across foreign-key-linked tables,
//!   permission-filtered reads, re-reading mutations, windowed scans and
//!   link navigation ([`Dao`])
//! - **Service façade**: single and batch operations over a transaction
//!   ([`BeanService`])
//!
//! The record store itself lives behind the traits in [`backends`];
//! [`backends::memory`] is a complete in-process implementation.
//!
//! Nested key components are resolved through a [`DaoRegistry`]. Register
//! every bean type once at start-up:
//!
//! ```ignore
//! mdm_orm::register_beans!(Country, Region, City);
//! ```

pub mod backends;
pub mod config;
pub mod dao;
pub mod error;
pub mod model;
pub mod registry;
pub mod security;
pub mod service;
pub mod transaction;

// Re-export core traits and types
pub use backends::{
    DatasetView, EditContext, EditContextRef, FieldSource, FieldValue, OrderDirection, Record,
    RecordCursor, RecordRef, Repository, ScanRequest, SortCriterion, TransactionContext,
};
pub use config::{ConfigError, MappingConfig};
pub use dao::{Dao, ReadAllOptions};
pub use error::*;
pub use model::*;
pub use registry::{global_registry, DaoRegistry, KeyResolver};
pub use security::{
    AccessRight, AllowAll, CachedPermissionOracle, PermissionCache, PermissionOracle,
    RecordVisibility, UserPermissions,
};
pub use service::{BeanService, FailureKind, Operation, ServiceError, ServiceResult};
pub use transaction::{with_transaction, TransactionConfig};
