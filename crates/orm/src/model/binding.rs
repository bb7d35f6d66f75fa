//! Bean binding state
//!
//! Tracks whether an in-memory bean reflects store state and which of its
//! fields inherit their value from an ancestor dataset. Nothing here touches
//! the store; the DAO persists the inheritance flags at write time.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::backends::{EditContextRef, RecordRef};

/// What a bean is bound to. Exactly one variant at a time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Binding {
    #[default]
    Unbound,
    Record(RecordRef),
    EditContext(EditContextRef),
}

/// Binding and field-inheritance state carried by every bean
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeanState {
    binding: Binding,
    inherited: BTreeSet<String>,
}

impl BeanState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn binding(&self) -> &Binding {
        &self.binding
    }

    /// Bind to a persisted record, replacing any previous binding
    pub fn bind_to_record(&mut self, record: RecordRef) {
        self.binding = Binding::Record(record);
    }

    /// Bind to an in-progress edit, replacing any previous binding
    pub fn bind_to_edit_context(&mut self, context: EditContextRef) {
        self.binding = Binding::EditContext(context);
    }

    pub fn unbind(&mut self) {
        self.binding = Binding::Unbound;
    }

    pub fn is_bound(&self) -> bool {
        !matches!(self.binding, Binding::Unbound)
    }

    pub fn bound_record(&self) -> Option<&RecordRef> {
        match &self.binding {
            Binding::Record(record) => Some(record),
            _ => None,
        }
    }

    pub fn bound_edit_context(&self) -> Option<&EditContextRef> {
        match &self.binding {
            Binding::EditContext(context) => Some(context),
            _ => None,
        }
    }

    /// Mark `path` as inheriting. Returns whether the state changed.
    pub fn inherit(&mut self, path: &str) -> bool {
        self.inherited.insert(path.to_string())
    }

    /// Mark `path` as locally overridden. Returns whether the state changed.
    pub fn overwrite(&mut self, path: &str) -> bool {
        self.inherited.remove(path)
    }

    pub fn does_inherit(&self, path: &str) -> bool {
        self.inherited.contains(path)
    }

    pub fn inherited_paths(&self) -> impl Iterator<Item = &str> {
        self.inherited.iter().map(String::as_str)
    }
}
