//! Permission contracts
//!
//! The permission engine is an external collaborator. The mapping layer only
//! asks it whether a whole record is visible and what access a caller has to
//! each field. [`PermissionCache`] memoizes a user-aware rule set per
//! `(user, table, record key, field)` with explicit invalidation, so role
//! changes never leave stale decisions behind.

use std::sync::Arc;

use mdm_cache::{Cache, CacheConfig, CacheStats};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backends::FieldSource;
use crate::config::ConfigError;

/// Access a caller has to one field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessRight {
    Hidden,
    ReadOnly,
    ReadWrite,
}

/// Whether a caller may see a record at all
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordVisibility {
    Hidden,
    Visible,
}

/// Permission decisions for the current caller
pub trait PermissionOracle: Send + Sync {
    fn record_visibility(&self, record: &dyn FieldSource) -> RecordVisibility;

    fn field_access(&self, path: &str, record: &dyn FieldSource) -> AccessRight;
}

/// Oracle that grants everything
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl PermissionOracle for AllowAll {
    fn record_visibility(&self, _record: &dyn FieldSource) -> RecordVisibility {
        RecordVisibility::Visible
    }

    fn field_access(&self, _path: &str, _record: &dyn FieldSource) -> AccessRight {
        AccessRight::ReadWrite
    }
}

/// Permission rules evaluated on behalf of a named user
pub trait UserPermissions: Send + Sync {
    fn record_visibility(&self, user: &str, record: &dyn FieldSource) -> RecordVisibility;

    fn field_access(&self, user: &str, path: &str, record: &dyn FieldSource) -> AccessRight;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DecisionKey {
    user: String,
    table: String,
    record: String,
    field: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    Record(RecordVisibility),
    Field(AccessRight),
}

/// Process-wide memo of permission decisions
pub struct PermissionCache<O> {
    rules: O,
    decisions: Cache<DecisionKey, Decision>,
}

impl<O: UserPermissions> PermissionCache<O> {
    pub fn new(rules: O, config: CacheConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            rules,
            decisions: Cache::new(config)?,
        })
    }

    /// Oracle answering for `user`, backed by this cache
    pub fn session(self: &Arc<Self>, user: impl Into<String>) -> CachedPermissionOracle<O> {
        CachedPermissionOracle {
            user: user.into(),
            cache: Arc::clone(self),
        }
    }

    /// Drop every decision made for `user`
    pub fn invalidate_user(&self, user: &str) -> usize {
        let removed = self.decisions.invalidate_where(|key| key.user == user);
        debug!(user, removed, "Permission decisions invalidated");
        removed
    }

    pub fn invalidate_all(&self) {
        self.decisions.clear();
        debug!("Permission cache cleared");
    }

    pub fn stats(&self) -> CacheStats {
        self.decisions.stats()
    }

    fn key(user: &str, record: &dyn FieldSource, field: Option<&str>) -> Option<DecisionKey> {
        // Unsaved edit contexts have no stable identity to key on
        let reference = record.record_ref()?;
        Some(DecisionKey {
            user: user.to_string(),
            table: reference.table.clone(),
            record: reference.key.to_string(),
            field: field.map(str::to_string),
        })
    }

    fn record_visibility(&self, user: &str, record: &dyn FieldSource) -> RecordVisibility {
        let Some(key) = Self::key(user, record, None) else {
            return self.rules.record_visibility(user, record);
        };
        match self
            .decisions
            .get_or_insert_with(key, || Decision::Record(self.rules.record_visibility(user, record)))
        {
            Decision::Record(visibility) => visibility,
            Decision::Field(_) => self.rules.record_visibility(user, record),
        }
    }

    fn field_access(&self, user: &str, path: &str, record: &dyn FieldSource) -> AccessRight {
        let Some(key) = Self::key(user, record, Some(path)) else {
            return self.rules.field_access(user, path, record);
        };
        match self
            .decisions
            .get_or_insert_with(key, || Decision::Field(self.rules.field_access(user, path, record)))
        {
            Decision::Field(access) => access,
            Decision::Record(_) => self.rules.field_access(user, path, record),
        }
    }
}

/// [`PermissionOracle`] for one user, sharing a [`PermissionCache`]
pub struct CachedPermissionOracle<O> {
    user: String,
    cache: Arc<PermissionCache<O>>,
}

impl<O: UserPermissions> CachedPermissionOracle<O> {
    pub fn new(rules: O, user: impl Into<String>, config: CacheConfig) -> Result<Self, ConfigError> {
        let cache = Arc::new(PermissionCache::new(rules, config)?);
        Ok(cache.session(user))
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn cache(&self) -> &Arc<PermissionCache<O>> {
        &self.cache
    }

    pub fn invalidate_user(&self, user: &str) -> usize {
        self.cache.invalidate_user(user)
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all()
    }
}

impl<O: UserPermissions> PermissionOracle for CachedPermissionOracle<O> {
    fn record_visibility(&self, record: &dyn FieldSource) -> RecordVisibility {
        self.cache.record_visibility(&self.user, record)
    }

    fn field_access(&self, path: &str, record: &dyn FieldSource) -> AccessRight {
        self.cache.field_access(&self.user, path, record)
    }
}
