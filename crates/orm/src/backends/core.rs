//! Core Record Store Traits
//!
//! This module defines the contract the mapping layer needs from a
//! hierarchical record store: field values, record and edit-context
//! snapshots, cursors over table scans, and transaction contexts. The store
//! itself (versioning, branching, schema introspection, predicate
//! evaluation) lives behind these traits.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::StoreResult;
use crate::model::primary_key::Key;
use crate::transaction::TransactionConfig;

/// Value of a single record field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Decimal(f64),
    Text(String),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    List(Vec<FieldValue>),
}

impl FieldValue {
    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<f64> {
        match self {
            FieldValue::Decimal(d) => Some(*d),
            FieldValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            FieldValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[FieldValue]> {
        match self {
            FieldValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// Render a scalar as a primary-key component. Null and lists have no
    /// key form.
    pub fn key_component(&self) -> Option<String> {
        match self {
            FieldValue::Null | FieldValue::List(_) => None,
            FieldValue::Bool(b) => Some(b.to_string()),
            FieldValue::Int(i) => Some(i.to_string()),
            FieldValue::Decimal(d) => Some(d.to_string()),
            FieldValue::Text(s) => Some(s.clone()),
            FieldValue::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            FieldValue::DateTime(dt) => Some(dt.to_rfc3339()),
        }
    }

    /// Ordering used by sorted scans and predicate comparisons. Values of
    /// unrelated kinds are incomparable; null sorts before everything.
    pub fn compare(&self, other: &FieldValue) -> Option<Ordering> {
        match (self, other) {
            (FieldValue::Null, FieldValue::Null) => Some(Ordering::Equal),
            (FieldValue::Null, _) => Some(Ordering::Less),
            (_, FieldValue::Null) => Some(Ordering::Greater),
            (FieldValue::Bool(a), FieldValue::Bool(b)) => Some(a.cmp(b)),
            (FieldValue::Int(a), FieldValue::Int(b)) => Some(a.cmp(b)),
            (FieldValue::Int(_) | FieldValue::Decimal(_), FieldValue::Int(_) | FieldValue::Decimal(_)) => {
                self.as_decimal()?.partial_cmp(&other.as_decimal()?)
            }
            (FieldValue::Text(a), FieldValue::Text(b)) => Some(a.cmp(b)),
            (FieldValue::Date(a), FieldValue::Date(b)) => Some(a.cmp(b)),
            (FieldValue::DateTime(a), FieldValue::DateTime(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Convert to JSON value
    pub fn to_json(&self) -> JsonValue {
        match self {
            FieldValue::Null => JsonValue::Null,
            FieldValue::Bool(b) => JsonValue::Bool(*b),
            FieldValue::Int(i) => JsonValue::Number(serde_json::Number::from(*i)),
            FieldValue::Decimal(d) => serde_json::Number::from_f64(*d)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            FieldValue::Text(s) => JsonValue::String(s.clone()),
            FieldValue::Date(d) => JsonValue::String(d.to_string()),
            FieldValue::DateTime(dt) => JsonValue::String(dt.to_rfc3339()),
            FieldValue::List(items) => JsonValue::Array(items.iter().map(|v| v.to_json()).collect()),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => write!(f, "null"),
            FieldValue::List(items) => {
                let rendered: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", rendered.join(", "))
            }
            other => write!(f, "{}", other.key_component().unwrap_or_default()),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Int(value as i64)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Decimal(value)
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(value: NaiveDate) -> Self {
        FieldValue::Date(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        FieldValue::DateTime(value)
    }
}

impl From<Vec<FieldValue>> for FieldValue {
    fn from(value: Vec<FieldValue>) -> Self {
        FieldValue::List(value)
    }
}

impl<T> From<Option<T>> for FieldValue
where
    T: Into<FieldValue>,
{
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => FieldValue::Null,
        }
    }
}

/// Handle to a persisted record: its table and its key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordRef {
    pub table: String,
    pub key: Key,
}

impl RecordRef {
    pub fn new(table: impl Into<String>, key: Key) -> Self {
        Self {
            table: table.into(),
            key,
        }
    }
}

impl fmt::Display for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.table, self.key)
    }
}

/// Handle to an in-progress edit. `target` is `None` for a new occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EditContextRef {
    pub id: Uuid,
    pub table: String,
    pub target: Option<RecordRef>,
}

/// Read access shared by records and edit contexts
pub trait FieldSource {
    /// Table path the fields belong to
    fn table(&self) -> &str;

    /// Persisted record behind the source, if any
    fn record_ref(&self) -> Option<&RecordRef>;

    /// Value at `path`; `None` when the field is absent
    fn get(&self, path: &str) -> Option<&FieldValue>;

    /// Whether the field at `path` inherits its value from an ancestor
    fn is_inherited(&self, path: &str) -> bool;

    /// All inherited field paths
    fn inherited_paths(&self) -> Vec<String>;
}

/// Snapshot of a persisted record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    reference: RecordRef,
    values: BTreeMap<String, FieldValue>,
    inherited: BTreeSet<String>,
}

impl Record {
    pub fn new(
        reference: RecordRef,
        values: BTreeMap<String, FieldValue>,
        inherited: BTreeSet<String>,
    ) -> Self {
        Self {
            reference,
            values,
            inherited,
        }
    }

    pub fn reference(&self) -> &RecordRef {
        &self.reference
    }

    pub fn key(&self) -> &Key {
        &self.reference.key
    }

    pub fn values(&self) -> &BTreeMap<String, FieldValue> {
        &self.values
    }

    /// Convert record to a JSON object keyed by field path
    pub fn to_json(&self) -> JsonValue {
        let fields = self
            .values
            .iter()
            .map(|(path, value)| (path.clone(), value.to_json()))
            .collect();
        JsonValue::Object(fields)
    }
}

impl FieldSource for Record {
    fn table(&self) -> &str {
        &self.reference.table
    }

    fn record_ref(&self) -> Option<&RecordRef> {
        Some(&self.reference)
    }

    fn get(&self, path: &str) -> Option<&FieldValue> {
        self.values.get(path)
    }

    fn is_inherited(&self, path: &str) -> bool {
        self.inherited.contains(path)
    }

    fn inherited_paths(&self) -> Vec<String> {
        self.inherited.iter().cloned().collect()
    }
}

/// Mutable staging area for one occurrence before the transaction
/// materializes it.
#[derive(Debug, Clone, PartialEq)]
pub struct EditContext {
    reference: EditContextRef,
    values: BTreeMap<String, FieldValue>,
    inherited: BTreeSet<String>,
}

impl EditContext {
    /// Empty context for a new occurrence of `table`
    pub fn for_create(table: impl Into<String>) -> Self {
        Self {
            reference: EditContextRef {
                id: Uuid::new_v4(),
                table: table.into(),
                target: None,
            },
            values: BTreeMap::new(),
            inherited: BTreeSet::new(),
        }
    }

    /// Context pre-filled with the current state of `record`
    pub fn for_record(record: &Record) -> Self {
        Self {
            reference: EditContextRef {
                id: Uuid::new_v4(),
                table: record.reference.table.clone(),
                target: Some(record.reference.clone()),
            },
            values: record.values.clone(),
            inherited: record.inherited.clone(),
        }
    }

    pub fn reference(&self) -> &EditContextRef {
        &self.reference
    }

    /// Stage a concrete value, clearing any inherit marker
    pub fn set(&mut self, path: impl Into<String>, value: impl Into<FieldValue>) {
        let path = path.into();
        self.inherited.remove(&path);
        self.values.insert(path, value.into());
    }

    /// Stage the inherit sentinel in place of a value
    pub fn set_inherited(&mut self, path: impl Into<String>) {
        let path = path.into();
        self.values.remove(&path);
        self.inherited.insert(path);
    }

    pub fn values(&self) -> &BTreeMap<String, FieldValue> {
        &self.values
    }

    pub fn into_parts(self) -> (EditContextRef, BTreeMap<String, FieldValue>, BTreeSet<String>) {
        (self.reference, self.values, self.inherited)
    }
}

impl FieldSource for EditContext {
    fn table(&self) -> &str {
        &self.reference.table
    }

    fn record_ref(&self) -> Option<&RecordRef> {
        self.reference.target.as_ref()
    }

    fn get(&self, path: &str) -> Option<&FieldValue> {
        self.values.get(path)
    }

    fn is_inherited(&self, path: &str) -> bool {
        self.inherited.contains(path)
    }

    fn inherited_paths(&self) -> Vec<String> {
        self.inherited.iter().cloned().collect()
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderDirection {
    Asc,
    Desc,
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderDirection::Asc => write!(f, "ascending"),
            OrderDirection::Desc => write!(f, "descending"),
        }
    }
}

/// Sort criterion on one field path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortCriterion {
    pub path: String,
    pub direction: OrderDirection,
}

/// Table scan request.
///
/// Predicates use the store's expression language. The mapping layer only
/// ever composes `path = 'literal'` conditions joined by `and`, quoting
/// literals with [`quote_literal`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanRequest {
    pub predicate: Option<String>,
    pub sort: Vec<SortCriterion>,
}

/// Quote a text literal for use in a predicate
pub fn quote_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// Cursor over the records of a table scan. Must be closed explicitly.
pub trait RecordCursor {
    /// Next record, or `None` when exhausted
    fn next_record(&mut self) -> StoreResult<Option<Record>>;

    /// Release the underlying result resource
    fn close(&mut self);
}

/// Read access to one dataset
pub trait DatasetView {
    /// Dataset name
    fn name(&self) -> &str;

    /// Find a record of `table` by primary key
    fn lookup(&self, table: &str, key: &Key) -> StoreResult<Option<Record>>;

    /// Open a cursor over `table`, filtered and sorted per `request`
    fn scan<'a>(&'a self, table: &str, request: &ScanRequest) -> StoreResult<Box<dyn RecordCursor + 'a>>;
}

/// One logical unit of mutation against a dataset.
///
/// Not reentrant: exactly one caller drives a transaction context at a time.
pub trait TransactionContext {
    /// Dataset as seen from inside the transaction, pending writes included
    fn dataset(&self) -> &dyn DatasetView;

    /// Session toggles this transaction was opened with
    fn config(&self) -> &TransactionConfig;

    /// Fresh edit context for a new occurrence of `table`
    fn new_edit_context_for_create(&mut self, table: &str) -> StoreResult<EditContext>;

    /// Edit context pre-filled from an existing record
    fn edit_context_for(&mut self, record: &Record) -> StoreResult<EditContext>;

    /// Persist a new occurrence and return the stored record
    fn materialize_create(&mut self, context: EditContext) -> StoreResult<Record>;

    /// Apply `context` to `record` and return the stored record
    fn materialize_modify(&mut self, record: &Record, context: EditContext) -> StoreResult<Record>;

    /// Delete a record, optionally cascading to records that reference it
    fn materialize_delete(&mut self, record: &RecordRef, cascade: bool) -> StoreResult<()>;

    /// Make every pending change durable
    fn commit(self: Box<Self>) -> StoreResult<()>;

    /// Discard every pending change
    fn rollback(self: Box<Self>) -> StoreResult<()>;
}

/// Entry point to the record store
pub trait Repository: Send + Sync {
    /// Open a transaction on `dataset`
    fn begin<'a>(
        &'a self,
        dataset: &str,
        config: &TransactionConfig,
    ) -> StoreResult<Box<dyn TransactionContext + 'a>>;

    /// Read-only view of the committed state of `dataset`
    fn dataset<'a>(&'a self, name: &str) -> StoreResult<Box<dyn DatasetView + 'a>>;
}
