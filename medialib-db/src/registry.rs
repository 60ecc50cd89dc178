//! Registry of table descriptors known to a catalog.

use crate::descriptor::TableDescriptor;
use crate::error::{DbError, Result};
use crate::tables;

/// Latest schema version compiled into this build.
pub const LATEST_SCHEMA_VERSION: u32 = 5;

/// The ordered set of descriptors the migration engine works from.
///
/// A catalog owns one registry for its whole lifetime; dropping the catalog
/// drops the registry with it.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    tables: Vec<TableDescriptor>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every catalog table.
    pub fn standard() -> Self {
        Self {
            tables: tables::ALL.to_vec(),
        }
    }

    /// Add a descriptor after checking it can be created and upgraded.
    ///
    /// Columns added after their table existed go through `ALTER TABLE ADD
    /// COLUMN`, which cannot add a primary key or unique column, nor a
    /// `NOT NULL` column without a default.
    pub fn register(&mut self, desc: TableDescriptor) -> Result<()> {
        if self.get(desc.name).is_some() {
            return Err(DbError::invalid(format!(
                "table '{}' is already registered",
                desc.name
            )));
        }
        if desc.columns.is_empty() {
            return Err(DbError::invalid(format!("table '{}' has no columns", desc.name)));
        }
        for col in desc.columns {
            if col.since < desc.since {
                return Err(DbError::invalid(format!(
                    "column '{}.{}' predates its table",
                    desc.name, col.name
                )));
            }
            let added_later = col.since > desc.since;
            if added_later && (col.is_primary_key() || col.flags.unique.is_some()) {
                return Err(DbError::invalid(format!(
                    "column '{}.{}' is added by ALTER TABLE and cannot be a key",
                    desc.name, col.name
                )));
            }
            if let Some(v) = col.flags.unique.filter(|v| *v > col.since) {
                if desc.rebuilt_in.is_none_or(|r| r < v) {
                    return Err(DbError::invalid(format!(
                        "column '{}.{}' joins the unique key in version {} without a rebuild",
                        desc.name, col.name, v
                    )));
                }
            }
            if added_later && col.is_not_null() && col.default_value().is_none() {
                return Err(DbError::invalid(format!(
                    "column '{}.{}' is NOT NULL without a default",
                    desc.name, col.name
                )));
            }
        }
        if desc.cascade.is_some() || desc.view.is_some_and(|v| v.membership.is_some()) {
            if desc.trigger_key().is_none() {
                return Err(DbError::invalid(format!(
                    "table '{}' needs a trigger_source key column",
                    desc.name
                )));
            }
        }
        self.tables.push(desc);
        Ok(())
    }

    pub fn tables(&self) -> &[TableDescriptor] {
        &self.tables
    }

    pub fn get(&self, name: &str) -> Option<&TableDescriptor> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// The sharded media descriptor.
    pub fn media(&self) -> Result<&TableDescriptor> {
        self.tables
            .iter()
            .find(|t| t.sharded)
            .ok_or_else(|| DbError::invalid("no sharded media table registered"))
    }

    /// Highest version referenced by any registered descriptor.
    pub fn latest_version(&self) -> u32 {
        self.tables
            .iter()
            .map(TableDescriptor::max_version)
            .max()
            .unwrap_or(0)
    }
}
