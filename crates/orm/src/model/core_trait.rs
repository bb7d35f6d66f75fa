//! Core Bean Trait - typed projection of a record's fields
//!
//! A bean declares its table, the ordered shape of its primary key, and the
//! field-marshalling callbacks the DAO drives. Key components are either
//! scalars or references to another bean type, which makes the key
//! recursively composite.

use std::any::Any;
use std::fmt::Debug;
use std::str::FromStr;

use crate::backends::FieldValue;
use crate::dao::Dao;
use crate::error::{MappingResult, TechnicalError};
use crate::model::binding::BeanState;
use crate::model::fields::{FieldReader, FieldWriter};
use crate::model::primary_key::KeyError;

/// Kind of one primary-key component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
    Scalar,
    /// The component is the key of a record of another bean type
    Reference { bean_type: &'static str },
}

/// One declared primary-key component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyComponent {
    pub field: &'static str,
    pub kind: ComponentKind,
}

impl KeyComponent {
    pub const fn scalar(field: &'static str) -> Self {
        Self {
            field,
            kind: ComponentKind::Scalar,
        }
    }

    pub const fn reference(field: &'static str, bean_type: &'static str) -> Self {
        Self {
            field,
            kind: ComponentKind::Reference { bean_type },
        }
    }
}

/// Current value of one key component on a bean instance. `None` means the
/// component is absent and the key is undefined.
#[derive(Debug)]
pub enum KeyPart<'a> {
    Scalar(Option<FieldValue>),
    Reference(Option<&'a dyn Any>),
}

impl<'a> KeyPart<'a> {
    pub fn scalar<V: Into<FieldValue>>(value: Option<V>) -> Self {
        KeyPart::Scalar(value.map(Into::into))
    }

    pub fn reference<T: Bean>(bean: Option<&'a T>) -> Self {
        KeyPart::Reference(bean.map(|b| b as &dyn Any))
    }
}

/// Value handed back to a bean while rebuilding it from a key
pub enum KeyValue {
    Scalar(String),
    Reference(Box<dyn Any + Send>),
}

impl std::fmt::Debug for KeyValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyValue::Scalar(text) => f.debug_tuple("Scalar").field(text).finish(),
            KeyValue::Reference(_) => f.debug_tuple("Reference").finish(),
        }
    }
}

impl KeyValue {
    /// Convert scalar component text to the field's type
    pub fn parse_scalar<T>(self, field: &str) -> MappingResult<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self {
            KeyValue::Scalar(text) => text.parse::<T>().map_err(|e| {
                KeyError::InvalidComponent {
                    field: field.to_string(),
                    value: text.clone(),
                    reason: e.to_string(),
                }
                .into()
            }),
            KeyValue::Reference(_) => Err(TechnicalError::Marshalling {
                field: field.to_string(),
                message: "expected a scalar key component".to_string(),
            }
            .into()),
        }
    }

    /// Take the nested bean out of a reference component
    pub fn into_bean<T: Bean>(self, field: &str) -> MappingResult<T> {
        match self {
            KeyValue::Reference(boxed) => boxed.downcast::<T>().map(|b| *b).map_err(|_| {
                TechnicalError::BeanTypeMismatch {
                    expected: T::BEAN_TYPE.to_string(),
                    found: format!("unknown bean for '{}'", field),
                }
                .into()
            }),
            KeyValue::Scalar(_) => Err(TechnicalError::Marshalling {
                field: field.to_string(),
                message: "expected a reference key component".to_string(),
            }
            .into()),
        }
    }
}

/// Typed in-memory projection of a record
pub trait Bean: Any + Clone + Default + Debug + Send + Sync {
    /// Registry tag for this bean type
    const BEAN_TYPE: &'static str;

    /// Path of the table this bean maps
    fn table_path() -> &'static str;

    /// Primary-key components in declaration order
    fn key_shape() -> &'static [KeyComponent];

    /// Current key component values, positionally matching `key_shape`
    fn key_parts(&self) -> Vec<KeyPart<'_>>;

    /// Assign key component `index` while rebuilding from a key
    fn set_key_part(&mut self, index: usize, value: KeyValue) -> MappingResult<()>;

    fn state(&self) -> &BeanState;

    fn state_mut(&mut self) -> &mut BeanState;

    /// Populate fields from a record or edit context. Hidden fields read as
    /// absent and must be left at their default.
    fn unmarshal(&mut self, reader: &FieldReader<'_>) -> MappingResult<()>;

    /// Write fields into an edit context
    fn marshal(&self, writer: &mut FieldWriter<'_>) -> MappingResult<()>;

    fn is_bound(&self) -> bool {
        self.state().is_bound()
    }

    fn inherit(&mut self, path: &str) -> bool {
        self.state_mut().inherit(path)
    }

    fn overwrite(&mut self, path: &str) -> bool {
        self.state_mut().overwrite(path)
    }

    fn does_inherit(&self, path: &str) -> bool {
        self.state().does_inherit(path)
    }

    /// DAO for this bean type backed by the global registry
    fn dao() -> Dao<Self> {
        Dao::new()
    }
}
