//! Bean Model - typed projections of records
//!
//! - `primary_key`: the [`Key`] value type and its reversible encoding
//! - `binding`: binding state and field-inheritance flags
//! - `core_trait`: the [`Bean`] trait and key-shape declarations
//! - `fields`: readers and writers handed to marshalling callbacks

pub mod binding;
pub mod core_trait;
pub mod fields;
pub mod primary_key;

// Re-export main types and traits for convenience
pub use binding::{BeanState, Binding};
pub use core_trait::{Bean, ComponentKind, KeyComponent, KeyPart, KeyValue};
pub use fields::{FieldReader, FieldWriter};
pub use primary_key::{Key, KeyError, KEY_SEPARATOR};
