//! Error types for the mapping layer
//!
//! Record-store collaborators raise [`StoreError`]. Everything the DAO layer
//! returns is a [`MappingError`], split into technical failures (the store or
//! the mapping machinery broke) and functional failures (the caller asked for
//! something that cannot be done and can correct it).

use thiserror::Error;

use crate::model::primary_key::KeyError;

/// Result type alias for record-store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type alias for DAO operations
pub type MappingResult<T> = Result<T, MappingError>;

/// Errors raised by the record store and its transactions
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("Constraint violation on '{table}': {message}")]
    ConstraintViolation { table: String, message: String },

    #[error("Duplicate key '{key}' in table '{table}'")]
    DuplicateKey { table: String, key: String },

    #[error("Record '{key}' not found in table '{table}'")]
    NotFound { table: String, key: String },

    #[error("Permission denied on '{table}': {message}")]
    PermissionDenied { table: String, message: String },

    #[error("Unknown dataset '{0}'")]
    UnknownDataset(String),

    #[error("Unknown table '{0}'")]
    UnknownTable(String),

    #[error("Invalid predicate '{predicate}': {message}")]
    InvalidPredicate { predicate: String, message: String },

    #[error("Cursor or transaction has already been closed")]
    Closed,

    #[error("Store operation failed: {0}")]
    OperationFailed(String),
}

/// Failures of the store or of the mapping machinery itself
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TechnicalError {
    #[error("Record store error: {0}")]
    Store(#[from] StoreError),

    #[error("Key error: {0}")]
    Key(#[from] KeyError),

    #[error("No DAO registered for bean type '{bean_type}'")]
    MissingDao { bean_type: String },

    #[error("Cyclic key graph: {path}")]
    CyclicKey { path: String },

    #[error("Key resolution depth {depth} exceeds the limit of {limit}")]
    KeyDepthExceeded { depth: usize, limit: usize },

    #[error("Bean type mismatch: expected '{expected}', found '{found}'")]
    BeanTypeMismatch { expected: String, found: String },

    #[error("Marshalling error on '{field}': {message}")]
    Marshalling { field: String, message: String },
}

/// Business-rule violations the caller can correct
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FunctionalError {
    #[error("Bean of table '{table}' is not bound to any record or edit context")]
    NotBound { table: String },

    #[error("Primary key mismatch: expected '{expected}', bean identifies '{actual}'")]
    PrimaryKeyMismatch { expected: String, actual: String },

    #[error("Link '{path}' resolved to {count} records, expected at most one")]
    AmbiguousLink { path: String, count: usize },

    #[error("No record found in table '{table}' for key '{key}'")]
    NotFound { table: String, key: String },
}

/// Top-level error returned by every DAO operation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MappingError {
    #[error(transparent)]
    Technical(#[from] TechnicalError),

    #[error(transparent)]
    Functional(#[from] FunctionalError),
}

impl MappingError {
    pub fn is_technical(&self) -> bool {
        matches!(self, MappingError::Technical(_))
    }

    pub fn is_functional(&self) -> bool {
        matches!(self, MappingError::Functional(_))
    }

    pub(crate) fn not_bound(table: &str) -> Self {
        FunctionalError::NotBound {
            table: table.to_string(),
        }
        .into()
    }
}

impl From<StoreError> for MappingError {
    fn from(err: StoreError) -> Self {
        MappingError::Technical(TechnicalError::Store(err))
    }
}

impl From<KeyError> for MappingError {
    fn from(err: KeyError) -> Self {
        MappingError::Technical(TechnicalError::Key(err))
    }
}
