//! Transaction Management
//!
//! Session-scoped toggles a caller sets before handing work to a
//! transaction, and a scoped helper that commits on success and rolls back
//! on any error.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::backends::{Repository, TransactionContext};
use crate::error::MappingResult;

/// Session toggles applied to one transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionConfig {
    /// Run table triggers while materializing changes
    pub triggers_enabled: bool,
    /// Record every change in the store's history
    pub history_enabled: bool,
    /// Skip the store's own privilege checks
    pub bypass_privileges: bool,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            triggers_enabled: true,
            history_enabled: false,
            bypass_privileges: false,
        }
    }
}

impl TransactionConfig {
    pub fn with_triggers(mut self, enabled: bool) -> Self {
        self.triggers_enabled = enabled;
        self
    }

    pub fn with_history(mut self, enabled: bool) -> Self {
        self.history_enabled = enabled;
        self
    }

    pub fn with_privilege_bypass(mut self, enabled: bool) -> Self {
        self.bypass_privileges = enabled;
        self
    }
}

/// Execute a closure within a transaction scope with automatic commit/rollback
///
/// - If the closure succeeds, the transaction is committed
/// - If the closure fails, the transaction is rolled back and the closure's
///   error is returned
pub fn with_transaction<R, F>(
    repository: &dyn Repository,
    dataset: &str,
    config: &TransactionConfig,
    f: F,
) -> MappingResult<R>
where
    F: FnOnce(&mut dyn TransactionContext) -> MappingResult<R>,
{
    debug!(dataset, ?config, "Beginning transaction");
    let mut tx = repository.begin(dataset, config)?;

    match f(tx.as_mut()) {
        Ok(result) => {
            tx.commit()?;
            debug!(dataset, "Transaction committed");
            Ok(result)
        }
        Err(e) => {
            warn!(dataset, error = %e, "Rolling back transaction");
            if let Err(rollback_error) = tx.rollback() {
                warn!(dataset, error = %rollback_error, "Rollback failed");
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::{MemoryRepository, TableSchema};
    use crate::backends::EditContext;
    use crate::error::{FunctionalError, MappingError};

    fn repository() -> MemoryRepository {
        let repository = MemoryRepository::new();
        repository.create_dataset("master").unwrap();
        repository
            .define_table("master", TableSchema::new("/root/Currency", ["./code"]))
            .unwrap();
        repository
    }

    fn stage(tx: &mut dyn TransactionContext, code: &str) -> MappingResult<()> {
        let mut ctx: EditContext = tx.new_edit_context_for_create("/root/Currency")?;
        ctx.set("./code", code);
        tx.materialize_create(ctx)?;
        Ok(())
    }

    #[test]
    fn test_transaction_config_default() {
        let config = TransactionConfig::default();
        assert!(config.triggers_enabled);
        assert!(!config.history_enabled);
        assert!(!config.bypass_privileges);

        let config = config.with_history(true).with_privilege_bypass(true).with_triggers(false);
        assert!(config.history_enabled);
        assert!(config.bypass_privileges);
        assert!(!config.triggers_enabled);
    }

    #[test]
    fn test_commit_on_success() {
        let repository = repository();

        with_transaction(&repository, "master", &TransactionConfig::default(), |tx| {
            stage(tx, "EUR")
        })
        .unwrap();

        assert_eq!(repository.record_count("master", "/root/Currency").unwrap(), 1);
    }

    #[test]
    fn test_rollback_on_error() {
        let repository = repository();

        let result: MappingResult<()> =
            with_transaction(&repository, "master", &TransactionConfig::default(), |tx| {
                stage(tx, "EUR")?;
                Err(FunctionalError::NotFound {
                    table: "/root/Currency".to_string(),
                    key: "USD".to_string(),
                }
                .into())
            });

        assert!(matches!(result, Err(MappingError::Functional(_))));
        assert_eq!(repository.record_count("master", "/root/Currency").unwrap(), 0);
    }

    #[test]
    fn test_unknown_dataset_is_technical() {
        let repository = repository();
        let result = with_transaction(&repository, "missing", &TransactionConfig::default(), |_| Ok(()));
        assert!(matches!(result, Err(MappingError::Technical(_))));
    }
}
