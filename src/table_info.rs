//! Per-table schema cache.
//!
//! Refresh policy:
//! - with auto refresh on, a miss (or an entry seeded without a primary
//!   index) triggers one DescribeTable call and the result is cached
//! - with auto refresh off, only entries seeded through [`TableInfoCache::insert`]
//!   are served and anything else is [`Error::TableInfoUnavailable`]
//!
//! Entries are inserted fully built, so readers never see a partial entry.
//! Two concurrent misses on the same table may both describe it; the last
//! writer wins and both results are identical.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::api::DynamoDbApi;
use crate::errors::{Error, Result};
use crate::structures::TableInfo;

#[derive(Debug)]
pub struct TableInfoCache<C> {
    client: C,
    auto_refresh_table_indexes: bool,
    entries: RwLock<HashMap<String, Arc<TableInfo>>>,
}

impl<C: DynamoDbApi> TableInfoCache<C> {
    pub fn new(client: C, auto_refresh_table_indexes: bool) -> Self {
        Self {
            client,
            auto_refresh_table_indexes,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn auto_refresh_table_indexes(&self) -> bool {
        self.auto_refresh_table_indexes
    }

    /// Schema for `table_name`, describing the table on first use.
    pub async fn table_info(&self, table_name: &str) -> Result<Arc<TableInfo>> {
        let cached = self.cached(table_name)?;
        match cached {
            Some(info) if info.is_complete() => return Ok(info),
            Some(info) if !self.auto_refresh_table_indexes => return Ok(info),
            _ => {}
        }

        if !self.auto_refresh_table_indexes {
            return Err(Error::TableInfoUnavailable {
                table: table_name.to_string(),
                reason: "table is not cached and auto refresh is disabled".to_string(),
            });
        }

        self.refresh(table_name).await
    }

    /// Describe `table_name` again and replace the cached entry.
    pub async fn refresh(&self, table_name: &str) -> Result<Arc<TableInfo>> {
        tracing::debug!(table = table_name, "describing table to discover indexes");

        let description = self
            .client
            .describe_table(table_name)
            .await
            .map_err(|e| Error::TableInfoUnavailable {
                table: table_name.to_string(),
                reason: e.to_string(),
            })?;

        let info = Arc::new(TableInfo::from_description(table_name, &description)?);
        self.entries
            .write()
            .map_err(|_| poisoned(table_name))?
            .insert(table_name.to_string(), Arc::clone(&info));
        Ok(info)
    }

    /// Seed an entry, e.g. when DescribeTable permissions are not available.
    pub fn insert(&self, info: TableInfo) -> Result<()> {
        let name = info.name.clone();
        self.entries
            .write()
            .map_err(|_| poisoned(&name))?
            .insert(name, Arc::new(info));
        Ok(())
    }

    pub fn invalidate(&self, table_name: &str) -> Result<()> {
        self.entries
            .write()
            .map_err(|_| poisoned(table_name))?
            .remove(table_name);
        Ok(())
    }

    fn cached(&self, table_name: &str) -> Result<Option<Arc<TableInfo>>> {
        Ok(self
            .entries
            .read()
            .map_err(|_| poisoned(table_name))?
            .get(table_name)
            .cloned())
    }
}

fn poisoned(table_name: &str) -> Error {
    Error::TableInfoUnavailable {
        table: table_name.to_string(),
        reason: "table info cache lock poisoned".to_string(),
    }
}
