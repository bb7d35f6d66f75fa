//! In-memory record store
//!
//! A complete implementation of the store contracts, used by the test suite
//! and by embedders that need a scratch store. Transactions work on a copy
//! of the dataset taken at `begin` and remember every record they touch.
//! Commit replays only those records onto the currently committed dataset,
//! so overlapping transactions keep each other's writes. A record touched by
//! both keeps the version of the later commit.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::backends::core::{
    DatasetView, EditContext, FieldSource, FieldValue, Record, RecordCursor, RecordRef,
    Repository, ScanRequest, TransactionContext,
};
use crate::backends::predicate::Predicate;
use crate::backends::OrderDirection;
use crate::error::{StoreError, StoreResult};
use crate::model::primary_key::Key;
use crate::transaction::TransactionConfig;

/// Table-level trigger run on staged values before they persist
pub type Trigger = Arc<dyn Fn(&mut BTreeMap<String, FieldValue>) + Send + Sync>;

/// Declaration of one table
#[derive(Clone)]
pub struct TableSchema {
    path: String,
    primary_key: Vec<String>,
    defaults: BTreeMap<String, FieldValue>,
    required: Vec<String>,
    foreign_keys: Vec<(String, String)>,
    protected: bool,
    trigger: Option<Trigger>,
}

impl fmt::Debug for TableSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableSchema")
            .field("path", &self.path)
            .field("primary_key", &self.primary_key)
            .field("defaults", &self.defaults)
            .field("required", &self.required)
            .field("foreign_keys", &self.foreign_keys)
            .field("protected", &self.protected)
            .field("has_trigger", &self.trigger.is_some())
            .finish()
    }
}

impl TableSchema {
    pub fn new<I, S>(path: impl Into<String>, primary_key: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            path: path.into(),
            primary_key: primary_key.into_iter().map(Into::into).collect(),
            defaults: BTreeMap::new(),
            required: Vec::new(),
            foreign_keys: Vec::new(),
            protected: false,
            trigger: None,
        }
    }

    /// Value stored at create time when the field was left unset
    pub fn with_default(mut self, path: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.defaults.insert(path.into(), value.into());
        self
    }

    /// Field that must hold a non-null value or inherit one
    pub fn with_required(mut self, path: impl Into<String>) -> Self {
        self.required.push(path.into());
        self
    }

    /// Field holding the formatted key of a record in `target_table`
    pub fn with_foreign_key(mut self, path: impl Into<String>, target_table: impl Into<String>) -> Self {
        self.foreign_keys.push((path.into(), target_table.into()));
        self
    }

    /// Writes are rejected unless the session bypasses privileges
    pub fn protected(mut self) -> Self {
        self.protected = true;
        self
    }

    pub fn with_trigger<F>(mut self, trigger: F) -> Self
    where
        F: Fn(&mut BTreeMap<String, FieldValue>) + Send + Sync + 'static,
    {
        self.trigger = Some(Arc::new(trigger));
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn primary_key(&self) -> &[String] {
        &self.primary_key
    }

    fn key_for(&self, values: &BTreeMap<String, FieldValue>) -> StoreResult<Key> {
        let components = self
            .primary_key
            .iter()
            .map(|path| {
                values
                    .get(path)
                    .and_then(FieldValue::key_component)
                    .ok_or_else(|| StoreError::ConstraintViolation {
                        table: self.path.clone(),
                        message: format!("primary key field '{}' has no value", path),
                    })
            })
            .collect::<StoreResult<Vec<String>>>()?;

        Key::new(components).map_err(|e| StoreError::ConstraintViolation {
            table: self.path.clone(),
            message: e.to_string(),
        })
    }

    fn check_required(
        &self,
        values: &BTreeMap<String, FieldValue>,
        inherited: &BTreeSet<String>,
    ) -> StoreResult<()> {
        for path in &self.required {
            let present = values.get(path).map_or(false, |v| !v.is_null());
            if !present && !inherited.contains(path) {
                return Err(StoreError::ConstraintViolation {
                    table: self.path.clone(),
                    message: format!("field '{}' is required", path),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct StoredRecord {
    values: BTreeMap<String, FieldValue>,
    inherited: BTreeSet<String>,
}

#[derive(Debug, Clone)]
struct TableData {
    schema: Arc<TableSchema>,
    records: BTreeMap<Key, StoredRecord>,
}

impl TableData {
    fn record(&self, key: &Key) -> Option<Record> {
        self.records.get(key).map(|stored| {
            Record::new(
                RecordRef::new(self.schema.path.clone(), key.clone()),
                stored.values.clone(),
                stored.inherited.clone(),
            )
        })
    }
}

/// Snapshot of one dataset
#[derive(Debug, Clone, Default)]
pub struct MemoryDataset {
    name: String,
    tables: HashMap<String, TableData>,
}

impl MemoryDataset {
    fn table(&self, path: &str) -> StoreResult<&TableData> {
        self.tables
            .get(path)
            .ok_or_else(|| StoreError::UnknownTable(path.to_string()))
    }

    fn table_mut(&mut self, path: &str) -> StoreResult<&mut TableData> {
        self.tables
            .get_mut(path)
            .ok_or_else(|| StoreError::UnknownTable(path.to_string()))
    }

    /// Records holding a foreign key to `target`
    fn referencing(&self, target: &RecordRef) -> Vec<RecordRef> {
        let formatted = target.key.to_string();
        let mut found = Vec::new();

        for table in self.tables.values() {
            for (field, target_table) in &table.schema.foreign_keys {
                if target_table != &target.table {
                    continue;
                }
                for (key, stored) in &table.records {
                    let points_at_target = match stored.values.get(field) {
                        Some(FieldValue::Text(value)) => value == &formatted,
                        Some(FieldValue::List(items)) => items
                            .iter()
                            .any(|item| item.as_text() == Some(formatted.as_str())),
                        _ => false,
                    };
                    if points_at_target {
                        found.push(RecordRef::new(table.schema.path.clone(), key.clone()));
                    }
                }
            }
        }

        found
    }
}

/// Cursor over a materialized scan result
#[derive(Debug)]
pub struct MemoryCursor {
    records: std::vec::IntoIter<Record>,
    closed: bool,
}

impl RecordCursor for MemoryCursor {
    fn next_record(&mut self) -> StoreResult<Option<Record>> {
        if self.closed {
            return Err(StoreError::Closed);
        }
        Ok(self.records.next())
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

impl DatasetView for MemoryDataset {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookup(&self, table: &str, key: &Key) -> StoreResult<Option<Record>> {
        Ok(self.table(table)?.record(key))
    }

    fn scan<'a>(&'a self, table: &str, request: &ScanRequest) -> StoreResult<Box<dyn RecordCursor + 'a>> {
        let data = self.table(table)?;
        let predicate = request.predicate.as_deref().map(Predicate::parse).transpose()?;

        let mut records: Vec<Record> = data
            .records
            .iter()
            .filter(|(_, stored)| predicate.as_ref().map_or(true, |p| p.matches(&stored.values)))
            .filter_map(|(key, _)| data.record(key))
            .collect();

        if !request.sort.is_empty() {
            records.sort_by(|a, b| {
                for criterion in &request.sort {
                    let left = a.get(&criterion.path).unwrap_or(&FieldValue::Null);
                    let right = b.get(&criterion.path).unwrap_or(&FieldValue::Null);
                    let ordering = left.compare(right).unwrap_or(std::cmp::Ordering::Equal);
                    let ordering = match criterion.direction {
                        OrderDirection::Asc => ordering,
                        OrderDirection::Desc => ordering.reverse(),
                    };
                    if ordering != std::cmp::Ordering::Equal {
                        return ordering;
                    }
                }
                std::cmp::Ordering::Equal
            });
        }

        debug!(dataset = %self.name, table, matched = records.len(), "Scan opened");
        Ok(Box::new(MemoryCursor {
            records: records.into_iter(),
            closed: false,
        }))
    }
}

/// Kind of change recorded in the history log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HistoryOperation {
    Create,
    Modify,
    Delete,
}

/// One committed change
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub dataset: String,
    pub record: RecordRef,
    pub operation: HistoryOperation,
    pub at: DateTime<Utc>,
}

/// In-memory repository of datasets
#[derive(Debug, Default)]
pub struct MemoryRepository {
    datasets: RwLock<HashMap<String, MemoryDataset>>,
    history: Mutex<Vec<HistoryEntry>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_dataset(&self, name: &str) -> StoreResult<()> {
        let mut datasets = self.datasets.write();
        if datasets.contains_key(name) {
            return Err(StoreError::OperationFailed(format!(
                "dataset '{}' already exists",
                name
            )));
        }
        datasets.insert(
            name.to_string(),
            MemoryDataset {
                name: name.to_string(),
                tables: HashMap::new(),
            },
        );
        info!(dataset = name, "Dataset created");
        Ok(())
    }

    pub fn define_table(&self, dataset: &str, schema: TableSchema) -> StoreResult<()> {
        let mut datasets = self.datasets.write();
        let data = datasets
            .get_mut(dataset)
            .ok_or_else(|| StoreError::UnknownDataset(dataset.to_string()))?;

        debug!(dataset, table = %schema.path, "Table defined");
        data.tables.insert(
            schema.path.clone(),
            TableData {
                schema: Arc::new(schema),
                records: BTreeMap::new(),
            },
        );
        Ok(())
    }

    /// Seed a record outside of any caller transaction
    pub fn insert<I, S>(&self, dataset: &str, table: &str, values: I) -> StoreResult<Record>
    where
        I: IntoIterator<Item = (S, FieldValue)>,
        S: Into<String>,
    {
        let config = TransactionConfig::default().with_privilege_bypass(true);
        let mut tx = self.begin(dataset, &config)?;
        let mut context = tx.new_edit_context_for_create(table)?;
        for (path, value) in values {
            context.set(path, value);
        }
        let record = tx.materialize_create(context)?;
        tx.commit()?;
        Ok(record)
    }

    pub fn record_count(&self, dataset: &str, table: &str) -> StoreResult<usize> {
        let datasets = self.datasets.read();
        let data = datasets
            .get(dataset)
            .ok_or_else(|| StoreError::UnknownDataset(dataset.to_string()))?;
        Ok(data.table(table)?.records.len())
    }

    /// Committed changes made with history enabled, oldest first
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.history.lock().clone()
    }

    fn snapshot(&self, dataset: &str) -> StoreResult<MemoryDataset> {
        self.datasets
            .read()
            .get(dataset)
            .cloned()
            .ok_or_else(|| StoreError::UnknownDataset(dataset.to_string()))
    }
}

impl Repository for MemoryRepository {
    fn begin<'a>(
        &'a self,
        dataset: &str,
        config: &TransactionConfig,
    ) -> StoreResult<Box<dyn TransactionContext + 'a>> {
        let working = self.snapshot(dataset)?;
        debug!(dataset, ?config, "Memory transaction started");
        Ok(Box::new(MemoryTransaction {
            repository: self,
            working,
            config: *config,
            pending_history: Vec::new(),
            touched: BTreeMap::new(),
            finished: false,
        }))
    }

    fn dataset<'a>(&'a self, name: &str) -> StoreResult<Box<dyn DatasetView + 'a>> {
        Ok(Box::new(self.snapshot(name)?))
    }
}

/// Transaction over a private copy of one dataset
pub struct MemoryTransaction<'a> {
    repository: &'a MemoryRepository,
    working: MemoryDataset,
    config: TransactionConfig,
    pending_history: Vec<HistoryEntry>,
    /// Records written by this transaction, per table
    touched: BTreeMap<String, BTreeSet<Key>>,
    finished: bool,
}

impl<'a> MemoryTransaction<'a> {
    fn writable_table(&mut self, table: &str) -> StoreResult<&mut TableData> {
        let bypass = self.config.bypass_privileges;
        let data = self.working.table_mut(table)?;
        if data.schema.protected && !bypass {
            return Err(StoreError::PermissionDenied {
                table: table.to_string(),
                message: "table is protected".to_string(),
            });
        }
        Ok(data)
    }

    fn touch(&mut self, table: &str, key: &Key) {
        self.touched
            .entry(table.to_string())
            .or_default()
            .insert(key.clone());
    }

    fn record_history(&mut self, record: RecordRef, operation: HistoryOperation) {
        if self.config.history_enabled {
            self.pending_history.push(HistoryEntry {
                dataset: self.working.name.clone(),
                record,
                operation,
                at: Utc::now(),
            });
        }
    }
}

impl<'a> TransactionContext for MemoryTransaction<'a> {
    fn dataset(&self) -> &dyn DatasetView {
        &self.working
    }

    fn config(&self) -> &TransactionConfig {
        &self.config
    }

    fn new_edit_context_for_create(&mut self, table: &str) -> StoreResult<EditContext> {
        self.working.table(table)?;
        Ok(EditContext::for_create(table))
    }

    fn edit_context_for(&mut self, record: &Record) -> StoreResult<EditContext> {
        let current = self
            .working
            .lookup(&record.reference().table, record.key())?
            .ok_or_else(|| StoreError::NotFound {
                table: record.reference().table.clone(),
                key: record.key().to_string(),
            })?;
        Ok(EditContext::for_record(&current))
    }

    fn materialize_create(&mut self, context: EditContext) -> StoreResult<Record> {
        if context.record_ref().is_some() {
            return Err(StoreError::OperationFailed(
                "edit context targets an existing record".to_string(),
            ));
        }
        let triggers_enabled = self.config.triggers_enabled;
        let (reference, mut values, inherited) = context.into_parts();

        let record = {
            let data = self.writable_table(&reference.table)?;
            let schema = Arc::clone(&data.schema);

            for (path, value) in &schema.defaults {
                if !values.contains_key(path) && !inherited.contains(path) {
                    values.insert(path.clone(), value.clone());
                }
            }
            if triggers_enabled {
                if let Some(trigger) = &schema.trigger {
                    trigger(&mut values);
                }
            }
            schema.check_required(&values, &inherited)?;

            let key = schema.key_for(&values)?;
            if data.records.contains_key(&key) {
                return Err(StoreError::DuplicateKey {
                    table: schema.path.clone(),
                    key: key.to_string(),
                });
            }
            data.records.insert(key.clone(), StoredRecord { values, inherited });
            data.record(&key).ok_or_else(|| StoreError::NotFound {
                table: schema.path.clone(),
                key: key.to_string(),
            })?
        };

        self.touch(&reference.table, record.key());
        self.record_history(record.reference().clone(), HistoryOperation::Create);
        Ok(record)
    }

    fn materialize_modify(&mut self, record: &Record, context: EditContext) -> StoreResult<Record> {
        let triggers_enabled = self.config.triggers_enabled;
        let (_, mut values, inherited) = context.into_parts();
        let old_key = record.key().clone();

        let updated = {
            let data = self.writable_table(&record.reference().table)?;
            let schema = Arc::clone(&data.schema);

            if !data.records.contains_key(&old_key) {
                return Err(StoreError::NotFound {
                    table: schema.path.clone(),
                    key: old_key.to_string(),
                });
            }
            if triggers_enabled {
                if let Some(trigger) = &schema.trigger {
                    trigger(&mut values);
                }
            }
            schema.check_required(&values, &inherited)?;

            let new_key = schema.key_for(&values)?;
            if new_key != old_key && data.records.contains_key(&new_key) {
                return Err(StoreError::DuplicateKey {
                    table: schema.path.clone(),
                    key: new_key.to_string(),
                });
            }
            data.records.remove(&old_key);
            data.records.insert(new_key.clone(), StoredRecord { values, inherited });
            data.record(&new_key).ok_or_else(|| StoreError::NotFound {
                table: schema.path.clone(),
                key: new_key.to_string(),
            })?
        };

        let table = &record.reference().table;
        self.touch(table, &old_key);
        self.touch(table, updated.key());
        self.record_history(updated.reference().clone(), HistoryOperation::Modify);
        Ok(updated)
    }

    fn materialize_delete(&mut self, record: &RecordRef, cascade: bool) -> StoreResult<()> {
        let data = self.writable_table(&record.table)?;
        if !data.records.contains_key(&record.key) {
            return Err(StoreError::NotFound {
                table: record.table.clone(),
                key: record.key.to_string(),
            });
        }

        let referencing = self.working.referencing(record);
        if !referencing.is_empty() && !cascade {
            return Err(StoreError::ConstraintViolation {
                table: record.table.clone(),
                message: format!(
                    "record '{}' is referenced by {} record(s)",
                    record.key,
                    referencing.len()
                ),
            });
        }

        let mut pending = vec![record.clone()];
        let mut visited = HashSet::new();
        while let Some(target) = pending.pop() {
            if !visited.insert(target.clone()) {
                continue;
            }
            if cascade {
                pending.extend(self.working.referencing(&target));
            }
            let data = self.writable_table(&target.table)?;
            if data.records.remove(&target.key).is_some() {
                self.touch(&target.table, &target.key);
                self.record_history(target, HistoryOperation::Delete);
            }
        }
        Ok(())
    }

    fn commit(mut self: Box<Self>) -> StoreResult<()> {
        self.finished = true;
        let name = self.working.name.clone();
        if self.touched.is_empty() {
            debug!(dataset = %name, "Read-only memory transaction closed");
            return Ok(());
        }
        let touched = std::mem::take(&mut self.touched);
        let pending = std::mem::take(&mut self.pending_history);

        let mut datasets = self.repository.datasets.write();
        let current = datasets
            .get_mut(&name)
            .ok_or_else(|| StoreError::UnknownDataset(name.clone()))?;
        let mut written = 0usize;
        for (table, keys) in touched {
            let source = self.working.table(&table)?;
            let target = current.table_mut(&table)?;
            for key in keys {
                match source.records.get(&key) {
                    Some(stored) => {
                        target.records.insert(key, stored.clone());
                    }
                    None => {
                        target.records.remove(&key);
                    }
                }
                written += 1;
            }
        }
        self.repository.history.lock().extend(pending);
        debug!(dataset = %name, records = written, "Memory transaction committed");
        Ok(())
    }

    fn rollback(mut self: Box<Self>) -> StoreResult<()> {
        self.finished = true;
        debug!(dataset = %self.working.name, "Memory transaction rolled back");
        Ok(())
    }
}

impl<'a> Drop for MemoryTransaction<'a> {
    fn drop(&mut self) {
        if !self.finished {
            warn!(
                dataset = %self.working.name,
                "Transaction dropped without explicit commit or rollback - pending changes are discarded"
            );
        }
    }
}
