//! Field marshalling helpers
//!
//! [`FieldReader`] gives bean unmarshalling callbacks permission-filtered
//! access to a record or edit context. [`FieldWriter`] stages values into an
//! edit context, writing the inherit marker for fields the bean flags as
//! inheriting.

use chrono::{DateTime, NaiveDate, Utc};
use tracing::debug;

use crate::backends::{EditContext, FieldSource, FieldValue};
use crate::config::MappingConfig;
use crate::dao::Dao;
use crate::error::MappingResult;
use crate::model::binding::BeanState;
use crate::model::core_trait::Bean;
use crate::model::primary_key::Key;
use crate::registry::DaoRegistry;
use crate::security::{AccessRight, PermissionOracle};

/// Read access handed to [`Bean::unmarshal`]
pub struct FieldReader<'a> {
    source: &'a dyn FieldSource,
    permissions: Option<&'a dyn PermissionOracle>,
    registry: &'static DaoRegistry,
    config: MappingConfig,
}

impl<'a> FieldReader<'a> {
    pub fn new(
        source: &'a dyn FieldSource,
        permissions: Option<&'a dyn PermissionOracle>,
        registry: &'static DaoRegistry,
        config: MappingConfig,
    ) -> Self {
        Self {
            source,
            permissions,
            registry,
            config,
        }
    }

    pub fn source(&self) -> &dyn FieldSource {
        self.source
    }

    /// False when the permission oracle hides the field
    pub fn is_visible(&self, path: &str) -> bool {
        self.permissions
            .map_or(true, |p| p.field_access(path, self.source) != AccessRight::Hidden)
    }

    /// Visible, non-null value at `path`
    pub fn value(&self, path: &str) -> Option<&FieldValue> {
        if !self.is_visible(path) {
            return None;
        }
        self.source.get(path).filter(|v| !v.is_null())
    }

    pub fn text(&self, path: &str) -> Option<String> {
        self.value(path).and_then(FieldValue::as_text).map(str::to_string)
    }

    pub fn int(&self, path: &str) -> Option<i64> {
        self.value(path).and_then(FieldValue::as_int)
    }

    pub fn decimal(&self, path: &str) -> Option<f64> {
        self.value(path).and_then(FieldValue::as_decimal)
    }

    pub fn bool(&self, path: &str) -> Option<bool> {
        self.value(path).and_then(FieldValue::as_bool)
    }

    pub fn date(&self, path: &str) -> Option<NaiveDate> {
        self.value(path).and_then(FieldValue::as_date)
    }

    pub fn datetime(&self, path: &str) -> Option<DateTime<Utc>> {
        match self.value(path) {
            Some(FieldValue::DateTime(dt)) => Some(*dt),
            _ => None,
        }
    }

    pub fn list(&self, path: &str) -> Option<Vec<FieldValue>> {
        self.value(path).and_then(FieldValue::as_list).map(<[FieldValue]>::to_vec)
    }

    pub fn is_inherited(&self, path: &str) -> bool {
        self.is_visible(path) && self.source.is_inherited(path)
    }

    /// Key-only bean rebuilt from the foreign key stored at `path`
    pub fn reference<T: Bean>(&self, path: &str) -> MappingResult<Option<T>> {
        let Some(text) = self.text(path) else {
            return Ok(None);
        };
        let key = Key::parse(&text)?;
        let bean = Dao::<T>::with_registry(self.registry)
            .with_config(self.config)
            .from_primary_key(&key)?;
        Ok(Some(bean))
    }
}

/// Write access handed to [`Bean::marshal`]
pub struct FieldWriter<'a> {
    context: &'a mut EditContext,
    state: &'a BeanState,
    registry: &'static DaoRegistry,
    config: MappingConfig,
}

impl<'a> FieldWriter<'a> {
    pub fn new(
        context: &'a mut EditContext,
        state: &'a BeanState,
        registry: &'static DaoRegistry,
        config: MappingConfig,
    ) -> Self {
        Self {
            context,
            state,
            registry,
            config,
        }
    }

    /// Stage `value`, or the inherit marker when the bean inherits `path`
    pub fn write(&mut self, path: &str, value: impl Into<FieldValue>) {
        if self.state.does_inherit(path) {
            self.context.set_inherited(path);
        } else {
            self.context.set(path, value);
        }
    }

    /// Stage the formatted key of `target`, or null when it is absent.
    /// A target whose key is undefined stages nothing, leaving any value
    /// already held by the edit context in place.
    pub fn write_reference<T: Bean>(&mut self, path: &str, target: Option<&T>) -> MappingResult<()> {
        let Some(bean) = target else {
            self.write(path, FieldValue::Null);
            return Ok(());
        };
        let key = Dao::<T>::with_registry(self.registry)
            .with_config(self.config)
            .derive_key(bean)?;
        match key {
            Some(key) => self.write(path, key.to_string()),
            None => debug!(
                path,
                target = T::BEAN_TYPE,
                "Reference target has an undefined key, field left unchanged"
            ),
        }
        Ok(())
    }

    /// Stage the formatted keys of `targets` as a list
    pub fn write_references<T: Bean>(&mut self, path: &str, targets: &[T]) -> MappingResult<()> {
        let dao = Dao::<T>::with_registry(self.registry).with_config(self.config);
        let mut keys = Vec::with_capacity(targets.len());
        for target in targets {
            if let Some(key) = dao.derive_key(target)? {
                keys.push(FieldValue::Text(key.to_string()));
            }
        }
        self.write(path, keys);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{Record, RecordRef};
    use crate::model::core_trait::{KeyComponent, KeyPart, KeyValue};
    use crate::registry::global_registry;
    use crate::security::RecordVisibility;
    use std::collections::{BTreeMap, BTreeSet};

    #[derive(Debug, Clone, Default)]
    struct Capital {
        state: BeanState,
        name: Option<String>,
    }

    impl Bean for Capital {
        const BEAN_TYPE: &'static str = "fields_test::Capital";

        fn table_path() -> &'static str {
            "/root/Capital"
        }

        fn key_shape() -> &'static [KeyComponent] {
            const SHAPE: &[KeyComponent] = &[KeyComponent::scalar("./name")];
            SHAPE
        }

        fn key_parts(&self) -> Vec<KeyPart<'_>> {
            vec![KeyPart::scalar(self.name.clone())]
        }

        fn set_key_part(&mut self, _index: usize, value: KeyValue) -> MappingResult<()> {
            self.name = Some(value.parse_scalar("./name")?);
            Ok(())
        }

        fn state(&self) -> &BeanState {
            &self.state
        }

        fn state_mut(&mut self) -> &mut BeanState {
            &mut self.state
        }

        fn unmarshal(&mut self, reader: &FieldReader<'_>) -> MappingResult<()> {
            self.name = reader.text("./name");
            Ok(())
        }

        fn marshal(&self, writer: &mut FieldWriter<'_>) -> MappingResult<()> {
            writer.write("./name", self.name.clone());
            Ok(())
        }
    }

    struct HideField(&'static str);

    impl PermissionOracle for HideField {
        fn record_visibility(&self, _record: &dyn FieldSource) -> RecordVisibility {
            RecordVisibility::Visible
        }

        fn field_access(&self, path: &str, _record: &dyn FieldSource) -> AccessRight {
            if path == self.0 {
                AccessRight::Hidden
            } else {
                AccessRight::ReadWrite
            }
        }
    }

    fn record() -> Record {
        let mut values = BTreeMap::new();
        values.insert("./code".to_string(), FieldValue::from("FR"));
        values.insert("./population".to_string(), FieldValue::Int(68));
        values.insert("./motto".to_string(), FieldValue::Null);
        let mut inherited = BTreeSet::new();
        inherited.insert("./currency".to_string());
        Record::new(RecordRef::new("/root/Country", Key::single("FR")), values, inherited)
    }

    #[test]
    fn test_reader_hides_fields() {
        let record = record();
        let oracle = HideField("./population");
        let reader = FieldReader::new(
            &record,
            Some(&oracle as &dyn PermissionOracle),
            global_registry(),
            MappingConfig::default(),
        );

        assert_eq!(reader.text("./code"), Some("FR".to_string()));
        assert_eq!(reader.int("./population"), None);
        assert!(!reader.is_visible("./population"));
        assert!(reader.is_inherited("./currency"));
    }

    #[test]
    fn test_reader_treats_null_as_absent() {
        let record = record();
        let reader = FieldReader::new(&record, None, global_registry(), MappingConfig::default());

        assert_eq!(reader.value("./motto"), None);
        assert_eq!(reader.int("./population"), Some(68));
    }

    #[test]
    fn test_writer_stages_inherit_marker() {
        let mut context = EditContext::for_create("/root/Country");
        let mut state = BeanState::new();
        state.inherit("./currency");

        let mut writer = FieldWriter::new(&mut context, &state, global_registry(), MappingConfig::default());
        writer.write("./currency", "EUR");
        writer.write("./code", "FR");

        assert!(context.is_inherited("./currency"));
        assert!(context.get("./currency").is_none());
        assert_eq!(context.get("./code"), Some(&FieldValue::from("FR")));
    }

    #[test]
    fn test_reference_with_undefined_key_keeps_stored_link() {
        let mut values = BTreeMap::new();
        values.insert("./code".to_string(), FieldValue::from("FR"));
        values.insert("./capital".to_string(), FieldValue::from("Paris"));
        let stored = Record::new(
            RecordRef::new("/root/Country", Key::single("FR")),
            values,
            BTreeSet::new(),
        );
        let mut context = EditContext::for_record(&stored);
        let state = BeanState::new();

        let mut writer = FieldWriter::new(&mut context, &state, global_registry(), MappingConfig::default());
        writer
            .write_reference("./capital", Some(&Capital::default()))
            .unwrap();
        assert_eq!(context.get("./capital"), Some(&FieldValue::from("Paris")));

        let lyon = Capital {
            name: Some("Lyon".to_string()),
            ..Default::default()
        };
        let mut writer = FieldWriter::new(&mut context, &state, global_registry(), MappingConfig::default());
        writer.write_reference("./capital", Some(&lyon)).unwrap();
        assert_eq!(context.get("./capital"), Some(&FieldValue::from("Lyon")));

        let mut writer = FieldWriter::new(&mut context, &state, global_registry(), MappingConfig::default());
        writer.write_reference::<Capital>("./capital", None).unwrap();
        assert_eq!(context.get("./capital"), Some(&FieldValue::Null));
    }
}
