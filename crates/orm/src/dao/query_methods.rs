//! Query Methods - bulk reads over record lists and table scans
//!
//! Windowing is applied client-side: the cursor is advanced item by item and
//! only positions in `[offset, offset + limit)` are materialized. Records the
//! caller may not see are dropped after windowing, so positions always refer
//! to the predicate-matching set in scan order.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backends::{DatasetView, OrderDirection, Record, RecordCursor, ScanRequest, SortCriterion};
use crate::dao::Dao;
use crate::error::MappingResult;
use crate::model::core_trait::Bean;
use crate::security::PermissionOracle;

/// Filter, order and window for [`Dao::read_all`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadAllOptions {
    pub predicate: Option<String>,
    pub sort: Vec<SortCriterion>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl ReadAllOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, predicate: impl Into<String>) -> Self {
        self.predicate = Some(predicate.into());
        self
    }

    pub fn order_by(mut self, path: impl Into<String>, direction: OrderDirection) -> Self {
        self.sort.push(SortCriterion {
            path: path.into(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    fn is_paginated(&self) -> bool {
        self.limit.is_some() || self.offset.is_some()
    }

    fn scan_request(&self) -> ScanRequest {
        ScanRequest {
            predicate: self.predicate.clone(),
            sort: self.sort.clone(),
        }
    }
}

/// Closes the wrapped cursor when dropped, on every exit path
struct CursorGuard<'a> {
    cursor: Box<dyn RecordCursor + 'a>,
}

impl<'a> CursorGuard<'a> {
    fn next(&mut self) -> MappingResult<Option<Record>> {
        Ok(self.cursor.next_record()?)
    }
}

impl<'a> Drop for CursorGuard<'a> {
    fn drop(&mut self) {
        self.cursor.close();
    }
}

impl<B: Bean> Dao<B> {
    /// Read every record of an explicit list, skipping hidden ones
    pub fn read_all_records(
        &self,
        records: &[Record],
        permissions: Option<&dyn PermissionOracle>,
    ) -> MappingResult<Vec<B>> {
        let mut beans = Vec::with_capacity(records.len());
        for record in records {
            if let Some(bean) = self.read(record, permissions)? {
                beans.push(bean);
            }
        }
        Ok(beans)
    }

    /// Scan this DAO's table
    pub fn read_all(
        &self,
        dataset: &dyn DatasetView,
        options: &ReadAllOptions,
        permissions: Option<&dyn PermissionOracle>,
    ) -> MappingResult<Vec<B>> {
        debug!(
            table = B::table_path(),
            predicate = ?options.predicate,
            limit = ?options.limit,
            offset = ?options.offset,
            "Reading records"
        );
        let mut cursor = CursorGuard {
            cursor: dataset.scan(B::table_path(), &options.scan_request())?,
        };

        let mut beans = Vec::new();
        if !options.is_paginated() {
            while let Some(record) = cursor.next()? {
                if let Some(bean) = self.read(&record, permissions)? {
                    beans.push(bean);
                }
            }
            return Ok(beans);
        }

        let start = options.offset.unwrap_or(0);
        let end = options.limit.map(|limit| start.saturating_add(limit));
        let mut position = 0usize;
        while end.map_or(true, |end| position < end) {
            let Some(record) = cursor.next()? else {
                break;
            };
            if position >= start {
                if let Some(bean) = self.read(&record, permissions)? {
                    beans.push(bean);
                }
            }
            position += 1;
        }
        Ok(beans)
    }

    /// Number of records matching `predicate`, ignoring permissions
    pub fn count(&self, dataset: &dyn DatasetView, predicate: Option<&str>) -> MappingResult<usize> {
        let request = ScanRequest {
            predicate: predicate.map(str::to_string),
            sort: Vec::new(),
        };
        let mut cursor = CursorGuard {
            cursor: dataset.scan(B::table_path(), &request)?,
        };

        let mut count = 0;
        while cursor.next()?.is_some() {
            count += 1;
        }
        Ok(count)
    }
}
