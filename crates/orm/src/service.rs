//! Transactional service façade
//!
//! Each call is one caller-visible unit of work over one transaction.
//! `create_all`, `update_all` and `delete_all` share a single transaction
//! across the list, so a failing item rolls back every earlier one.
//! `create_or_update_all` instead runs each item in its own transaction and
//! keeps going after a failure: the existence check of a later item must see
//! the committed outcome of the earlier ones. Callers get one result per item.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::backends::{Repository, TransactionContext};
use crate::dao::{Dao, ReadAllOptions};
use crate::error::{FunctionalError, MappingError, MappingResult};
use crate::model::core_trait::Bean;
use crate::model::primary_key::Key;
use crate::security::PermissionOracle;
use crate::transaction::{with_transaction, TransactionConfig};

/// Result type alias for façade calls
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Façade operation that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    Create,
    Read,
    Update,
    CreateOrUpdate,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Create => "create",
            Operation::Read => "read",
            Operation::Update => "update",
            Operation::CreateOrUpdate => "create-or-update",
            Operation::Delete => "delete",
        };
        write!(f, "{}", name)
    }
}

/// Whether a failure is the caller's to correct
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    Technical,
    Functional,
}

/// Uniform failure of a façade call
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{operation} on '{table}' failed: {source}")]
pub struct ServiceError {
    pub kind: FailureKind,
    pub operation: Operation,
    pub table: String,
    /// Position of the failing item in a batch call
    pub item: Option<usize>,
    pub source: MappingError,
}

impl ServiceError {
    pub fn new(operation: Operation, table: &str, item: Option<usize>, source: MappingError) -> Self {
        let kind = if source.is_functional() {
            FailureKind::Functional
        } else {
            FailureKind::Technical
        };
        Self {
            kind,
            operation,
            table: table.to_string(),
            item,
            source,
        }
    }

    pub fn is_functional(&self) -> bool {
        self.kind == FailureKind::Functional
    }
}

/// Single and batch CRUD for bean type `B` against one dataset
pub struct BeanService<B: Bean> {
    repository: Arc<dyn Repository>,
    dataset: String,
    transaction: TransactionConfig,
    permissions: Option<Arc<dyn PermissionOracle>>,
    dao: Dao<B>,
}

impl<B: Bean> BeanService<B> {
    pub fn new(repository: Arc<dyn Repository>, dataset: impl Into<String>) -> Self {
        Self {
            repository,
            dataset: dataset.into(),
            transaction: TransactionConfig::default(),
            permissions: None,
            dao: Dao::new(),
        }
    }

    pub fn with_dao(mut self, dao: Dao<B>) -> Self {
        self.dao = dao;
        self
    }

    /// Session toggles applied to every transaction this service opens
    pub fn with_transaction_config(mut self, config: TransactionConfig) -> Self {
        self.transaction = config;
        self
    }

    pub fn with_permissions(mut self, permissions: Arc<dyn PermissionOracle>) -> Self {
        self.permissions = Some(permissions);
        self
    }

    pub fn dao(&self) -> &Dao<B> {
        &self.dao
    }

    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    pub fn create(&self, bean: &B) -> ServiceResult<B> {
        self.run(Operation::Create, |tx| self.dao.create(tx, bean, self.permissions()))
    }

    pub fn create_all(&self, beans: &[B]) -> ServiceResult<Vec<B>> {
        self.run_batch(Operation::Create, beans, |dao, tx, bean, permissions| {
            dao.create(tx, bean, permissions)
        })
    }

    /// Read the record with formatted key `key_text`
    pub fn read(&self, key_text: &str) -> ServiceResult<Option<B>> {
        self.run(Operation::Read, |tx| {
            self.dao.read_by_key(tx.dataset(), key_text, self.permissions())
        })
    }

    pub fn read_all(&self, options: &ReadAllOptions) -> ServiceResult<Vec<B>> {
        self.run(Operation::Read, |tx| {
            self.dao.read_all(tx.dataset(), options, self.permissions())
        })
    }

    pub fn count(&self, predicate: Option<&str>) -> ServiceResult<usize> {
        self.run(Operation::Read, |tx| self.dao.count(tx.dataset(), predicate))
    }

    pub fn update(&self, bean: &B) -> ServiceResult<B> {
        self.run(Operation::Update, |tx| self.dao.update(tx, bean, self.permissions()))
    }

    /// Update the record stored under `key_text`. The bean's own key must
    /// identify that same record.
    pub fn update_with_key(&self, key_text: &str, bean: &B) -> ServiceResult<B> {
        self.run(Operation::Update, |tx| {
            let key = Key::parse(key_text)?;
            let record = tx.dataset().lookup(B::table_path(), &key)?.ok_or_else(|| {
                FunctionalError::NotFound {
                    table: B::table_path().to_string(),
                    key: key.to_string(),
                }
            })?;

            let derived = self.dao.derive_key(bean)?;
            if derived.as_ref() != Some(&key) {
                return Err(FunctionalError::PrimaryKeyMismatch {
                    expected: key.to_string(),
                    actual: derived.map_or_else(|| "<undefined>".to_string(), |k| k.to_string()),
                }
                .into());
            }

            let mut target = bean.clone();
            target.state_mut().bind_to_record(record.reference().clone());
            self.dao.update(tx, &target, self.permissions())
        })
    }

    pub fn update_all(&self, beans: &[B]) -> ServiceResult<Vec<B>> {
        self.run_batch(Operation::Update, beans, |dao, tx, bean, permissions| {
            dao.update(tx, bean, permissions)
        })
    }

    pub fn create_or_update(&self, bean: &B) -> ServiceResult<B> {
        self.run(Operation::CreateOrUpdate, |tx| {
            self.dao.create_or_update(tx, bean, self.permissions())
        })
    }

    /// One independent transaction per item. Not atomic across the list.
    pub fn create_or_update_all(&self, beans: &[B]) -> Vec<ServiceResult<B>> {
        let results: Vec<ServiceResult<B>> = beans
            .iter()
            .enumerate()
            .map(|(index, bean)| {
                self.create_or_update(bean).map_err(|mut err| {
                    err.item = Some(index);
                    err
                })
            })
            .collect();

        let failed = results.iter().filter(|r| r.is_err()).count();
        if failed > 0 {
            warn!(table = B::table_path(), failed, total = beans.len(), "Some items failed to persist");
        }
        results
    }

    pub fn delete(&self, bean: &B) -> ServiceResult<bool> {
        self.run(Operation::Delete, |tx| self.dao.delete(tx, bean))
    }

    pub fn delete_all(&self, beans: &[B]) -> ServiceResult<Vec<bool>> {
        self.run_batch(Operation::Delete, beans, |dao, tx, bean, _| dao.delete(tx, bean))
    }

    fn permissions(&self) -> Option<&dyn PermissionOracle> {
        self.permissions.as_deref()
    }

    fn run<R, F>(&self, operation: Operation, f: F) -> ServiceResult<R>
    where
        F: FnOnce(&mut dyn TransactionContext) -> MappingResult<R>,
    {
        with_transaction(self.repository.as_ref(), &self.dataset, &self.transaction, f)
            .map_err(|source| ServiceError::new(operation, B::table_path(), None, source))
    }

    fn run_batch<R, F>(&self, operation: Operation, beans: &[B], step: F) -> ServiceResult<Vec<R>>
    where
        F: Fn(&Dao<B>, &mut dyn TransactionContext, &B, Option<&dyn PermissionOracle>) -> MappingResult<R>,
    {
        let mut failed_at = None;
        let result = with_transaction(self.repository.as_ref(), &self.dataset, &self.transaction, |tx| {
            let mut outputs = Vec::with_capacity(beans.len());
            for (index, bean) in beans.iter().enumerate() {
                match step(&self.dao, tx, bean, self.permissions()) {
                    Ok(output) => outputs.push(output),
                    Err(err) => {
                        failed_at = Some(index);
                        return Err(err);
                    }
                }
            }
            Ok(outputs)
        });

        match result {
            Ok(outputs) => {
                info!(table = B::table_path(), %operation, count = outputs.len(), "Batch committed");
                Ok(outputs)
            }
            Err(source) => Err(ServiceError::new(operation, B::table_path(), failed_at, source)),
        }
    }
}
