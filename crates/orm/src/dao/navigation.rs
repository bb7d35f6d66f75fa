//! Navigation across foreign-key and association links
//!
//! A foreign-key field stores the formatted key of the target record; a
//! multi-valued link stores a list of them. Associations run the other way:
//! records of another table whose foreign-key field holds this bean's key.

use tracing::debug;

use crate::backends::{quote_literal, DatasetView, FieldSource, FieldValue, Record};
use crate::dao::query_methods::ReadAllOptions;
use crate::dao::Dao;
use crate::error::{FunctionalError, MappingError, MappingResult};
use crate::model::core_trait::Bean;
use crate::model::primary_key::Key;
use crate::security::PermissionOracle;

impl<B: Bean> Dao<B> {
    /// Target of the single foreign key stored at `path`. A dangling key
    /// yields a key-only bean.
    pub fn follow_foreign_key<T: Bean>(
        &self,
        dataset: &dyn DatasetView,
        bean: &B,
        path: &str,
        permissions: Option<&dyn PermissionOracle>,
    ) -> MappingResult<Option<T>> {
        let record = self.require_record(dataset, bean)?;
        let Some(key_text) = record.get(path).and_then(FieldValue::as_text) else {
            return Ok(None);
        };
        self.load_linked::<T>(dataset, key_text, permissions)
    }

    /// Targets of the multi-valued link stored at `path`, in list order
    pub fn read_all_linked<T: Bean>(
        &self,
        dataset: &dyn DatasetView,
        bean: &B,
        path: &str,
        permissions: Option<&dyn PermissionOracle>,
    ) -> MappingResult<Vec<T>> {
        let record = self.require_record(dataset, bean)?;
        let keys: Vec<&str> = match record.get(path) {
            Some(FieldValue::List(items)) => items.iter().filter_map(FieldValue::as_text).collect(),
            Some(FieldValue::Text(single)) => vec![single.as_str()],
            _ => Vec::new(),
        };

        let mut linked = Vec::with_capacity(keys.len());
        for key_text in keys {
            if let Some(target) = self.load_linked::<T>(dataset, key_text, permissions)? {
                linked.push(target);
            }
        }
        Ok(linked)
    }

    /// Records of `T` whose foreign key at `path` references `bean`
    pub fn read_all_associated<T: Bean>(
        &self,
        dataset: &dyn DatasetView,
        bean: &B,
        path: &str,
        permissions: Option<&dyn PermissionOracle>,
    ) -> MappingResult<Vec<T>> {
        let record = self.require_record(dataset, bean)?;
        let predicate = format!("{} = {}", path, quote_literal(&record.key().to_string()));
        debug!(from = B::table_path(), to = T::table_path(), predicate = %predicate, "Reading associations");

        let options = ReadAllOptions::new().filter(predicate);
        self.sibling::<T>().read_all(dataset, &options, permissions)
    }

    /// At most one associated record; more than one is a functional error
    pub fn read_unique_associated<T: Bean>(
        &self,
        dataset: &dyn DatasetView,
        bean: &B,
        path: &str,
        permissions: Option<&dyn PermissionOracle>,
    ) -> MappingResult<Option<T>> {
        let mut associated = self.read_all_associated::<T>(dataset, bean, path, permissions)?;
        if associated.len() > 1 {
            return Err(FunctionalError::AmbiguousLink {
                path: format!("{}{}", T::table_path(), path.trim_start_matches('.')),
                count: associated.len(),
            }
            .into());
        }
        Ok(associated.pop())
    }

    fn require_record(&self, dataset: &dyn DatasetView, bean: &B) -> MappingResult<Record> {
        self.resolve_record(dataset, bean)?
            .ok_or_else(|| MappingError::not_bound(B::table_path()))
    }

    fn load_linked<T: Bean>(
        &self,
        dataset: &dyn DatasetView,
        key_text: &str,
        permissions: Option<&dyn PermissionOracle>,
    ) -> MappingResult<Option<T>> {
        let key = Key::parse(key_text)?;
        let target = self.sibling::<T>();
        match dataset.lookup(T::table_path(), &key)? {
            Some(record) => target.read(&record, permissions),
            None => {
                debug!(table = T::table_path(), key = %key, "Dangling link, rebuilding from key");
                target.get_instance_from_primary_key(dataset, key_text).map(Some)
            }
        }
    }
}
