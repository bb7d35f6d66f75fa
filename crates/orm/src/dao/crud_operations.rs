//! CRUD Operations - read, create, update, create-or-update, delete
//!
//! Every mutation hands the marshalled edit context to the transaction,
//! then re-reads the stored record, so the returned bean reflects what the
//! store actually persisted (defaults, triggers, normalization).

use tracing::{debug, info, warn};

use crate::backends::{DatasetView, EditContext, FieldSource, Record, TransactionContext};
use crate::dao::Dao;
use crate::error::{MappingError, MappingResult};
use crate::model::core_trait::Bean;
use crate::model::fields::{FieldReader, FieldWriter};
use crate::model::primary_key::Key;
use crate::security::{PermissionOracle, RecordVisibility};

impl<B: Bean> Dao<B> {
    /// Project `record` into a fresh bound bean. `None` when the oracle
    /// hides the whole record; hidden fields keep their default.
    pub fn read(
        &self,
        record: &Record,
        permissions: Option<&dyn PermissionOracle>,
    ) -> MappingResult<Option<B>> {
        if !self.is_visible(record, permissions) {
            debug!(table = B::table_path(), key = %record.key(), "Record hidden from caller");
            return Ok(None);
        }
        let mut bean = self.unmarshal(record, permissions)?;
        bean.state_mut().bind_to_record(record.reference().clone());
        Ok(Some(bean))
    }

    /// [`Dao::read`] over an optional record handle
    pub fn read_optional(
        &self,
        record: Option<&Record>,
        permissions: Option<&dyn PermissionOracle>,
    ) -> MappingResult<Option<B>> {
        match record {
            Some(record) => self.read(record, permissions),
            None => Ok(None),
        }
    }

    /// Project an in-progress edit into a bean bound to that edit
    pub fn read_edit_context(
        &self,
        context: &EditContext,
        permissions: Option<&dyn PermissionOracle>,
    ) -> MappingResult<Option<B>> {
        if !self.is_visible(context, permissions) {
            return Ok(None);
        }
        let mut bean = self.unmarshal(context, permissions)?;
        bean.state_mut().bind_to_edit_context(context.reference().clone());
        Ok(Some(bean))
    }

    /// Look the formatted key up in this DAO's table and read the record
    pub fn read_by_key(
        &self,
        dataset: &dyn DatasetView,
        key_text: &str,
        permissions: Option<&dyn PermissionOracle>,
    ) -> MappingResult<Option<B>> {
        let key = Key::parse(key_text)?;
        let record = dataset.lookup(B::table_path(), &key)?;
        self.read_optional(record.as_ref(), permissions)
    }

    pub(crate) fn read_unfiltered(&self, record: &Record) -> MappingResult<B> {
        let mut bean = self.unmarshal(record, None)?;
        bean.state_mut().bind_to_record(record.reference().clone());
        Ok(bean)
    }

    /// Record the bean identifies in `dataset`: its record binding, then
    /// the target of its edit-context binding, then its derived key. A
    /// binding whose record no longer exists falls through to the next step.
    pub fn resolve_record(&self, dataset: &dyn DatasetView, bean: &B) -> MappingResult<Option<Record>> {
        let state = bean.state();

        if let Some(reference) = state.bound_record() {
            if let Some(record) = dataset.lookup(&reference.table, &reference.key)? {
                return Ok(Some(record));
            }
            warn!(record = %reference, "Bound record no longer exists");
        }

        if let Some(target) = state.bound_edit_context().and_then(|ctx| ctx.target.as_ref()) {
            if let Some(record) = dataset.lookup(&target.table, &target.key)? {
                return Ok(Some(record));
            }
        }

        match self.derive_key(bean)? {
            Some(key) => Ok(dataset.lookup(B::table_path(), &key)?),
            None => Ok(None),
        }
    }

    /// Persist `bean` as a new record and return it as stored
    pub fn create(
        &self,
        tx: &mut dyn TransactionContext,
        bean: &B,
        permissions: Option<&dyn PermissionOracle>,
    ) -> MappingResult<B> {
        debug!(table = B::table_path(), "Creating record");
        let mut context = tx.new_edit_context_for_create(B::table_path())?;
        self.marshal(bean, &mut context)?;

        let stored = tx.materialize_create(context)?;
        info!(table = B::table_path(), key = %stored.key(), "Record created");
        self.reread(&stored, permissions)
    }

    /// Apply `bean` to the record it resolves to and return it as stored
    pub fn update(
        &self,
        tx: &mut dyn TransactionContext,
        bean: &B,
        permissions: Option<&dyn PermissionOracle>,
    ) -> MappingResult<B> {
        match self.resolve_record(tx.dataset(), bean)? {
            Some(record) => self.modify(tx, &record, bean, permissions),
            None => Err(MappingError::not_bound(B::table_path())),
        }
    }

    /// Update when the bean resolves to a record, create otherwise
    pub fn create_or_update(
        &self,
        tx: &mut dyn TransactionContext,
        bean: &B,
        permissions: Option<&dyn PermissionOracle>,
    ) -> MappingResult<B> {
        match self.resolve_record(tx.dataset(), bean)? {
            Some(record) => self.modify(tx, &record, bean, permissions),
            None => self.create(tx, bean, permissions),
        }
    }

    /// Delete the record the bean resolves to. `false` when there is none.
    pub fn delete(&self, tx: &mut dyn TransactionContext, bean: &B) -> MappingResult<bool> {
        let Some(record) = self.resolve_record(tx.dataset(), bean)? else {
            debug!(table = B::table_path(), "Nothing to delete");
            return Ok(false);
        };

        tx.materialize_delete(record.reference(), self.config.cascade_delete)?;
        info!(
            table = B::table_path(),
            key = %record.key(),
            cascade = self.config.cascade_delete,
            "Record deleted"
        );
        Ok(true)
    }

    fn modify(
        &self,
        tx: &mut dyn TransactionContext,
        record: &Record,
        bean: &B,
        permissions: Option<&dyn PermissionOracle>,
    ) -> MappingResult<B> {
        debug!(table = B::table_path(), key = %record.key(), "Updating record");
        let mut context = tx.edit_context_for(record)?;
        self.marshal(bean, &mut context)?;

        let stored = tx.materialize_modify(record, context)?;
        info!(table = B::table_path(), key = %stored.key(), "Record updated");
        self.reread(&stored, permissions)
    }

    /// Re-read after a mutation. A record the caller may not see comes back
    /// as a key-only bean bound to it.
    fn reread(&self, stored: &Record, permissions: Option<&dyn PermissionOracle>) -> MappingResult<B> {
        if let Some(bean) = self.read(stored, permissions)? {
            return Ok(bean);
        }
        let mut bean = self.from_primary_key(stored.key())?;
        bean.state_mut().bind_to_record(stored.reference().clone());
        Ok(bean)
    }

    fn is_visible(&self, source: &dyn FieldSource, permissions: Option<&dyn PermissionOracle>) -> bool {
        permissions.map_or(true, |p| p.record_visibility(source) == RecordVisibility::Visible)
    }

    fn unmarshal(
        &self,
        source: &dyn FieldSource,
        permissions: Option<&dyn PermissionOracle>,
    ) -> MappingResult<B> {
        let mut bean = B::default();
        let reader = FieldReader::new(source, permissions, self.registry, self.config);
        bean.unmarshal(&reader)?;

        for path in source.inherited_paths() {
            if reader.is_visible(&path) {
                bean.state_mut().inherit(&path);
            }
        }
        Ok(bean)
    }

    fn marshal(&self, bean: &B, context: &mut EditContext) -> MappingResult<()> {
        let mut writer = FieldWriter::new(context, bean.state(), self.registry, self.config);
        bean.marshal(&mut writer)
    }
}
