//! Storage records, per-storage media tables and the union view over them.
//!
//! Every storage owns one physical media table sharing the media descriptor's
//! columns. The internal storage uses the base table itself. Detaching or
//! removing a whole volume is then a flag flip or a `DROP TABLE` instead of a
//! delete over every row.
//!
//! `media_view` is plain SQL and does not follow the storage set on its own.
//! Triggers on `storage` bump `storage_set_version` in `catalog_meta`; the
//! view records the stamp it was built at, and [`ensure_union_view`] rebuilds
//! whenever the two differ.

use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};

use crate::busy::{execute_retrying, in_savepoint};
use crate::descriptor::{self, TableDescriptor};
use crate::error::{DbError, Result};
use crate::registry::SchemaRegistry;
use crate::schema::table_exists;
use crate::sql::{quote_ident, text_literal};

/// Reserved id of the internal storage, whose rows live in the base table.
pub const INTERNAL_STORAGE_ID: &str = "media";

/// Name of the aggregate view over all live media tables.
pub const UNION_VIEW: &str = "media_view";

const STORAGE_SET_KEY: &str = "storage_set_version";
const UNION_VIEW_KEY: &str = "union_view_version";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Internal,
    External,
    Cloud,
}

impl StorageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Internal => "internal",
            Self::External => "external",
            Self::Cloud => "cloud",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "internal" => Some(Self::Internal),
            "external" => Some(Self::External),
            "cloud" => Some(Self::Cloud),
            _ => None,
        }
    }
}

/// Scan progress recorded on storages and folders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanStatus {
    #[default]
    Idle,
    Preparing,
    Processing,
    Stopped,
    Complete,
    Partial,
}

impl ScanStatus {
    pub fn as_i64(self) -> i64 {
        match self {
            Self::Idle => 0,
            Self::Preparing => 1,
            Self::Processing => 2,
            Self::Stopped => 3,
            Self::Complete => 4,
            Self::Partial => 5,
        }
    }

    pub fn from_i64(v: i64) -> Self {
        match v {
            1 => Self::Preparing,
            2 => Self::Processing,
            3 => Self::Stopped,
            4 => Self::Complete,
            5 => Self::Partial,
            _ => Self::Idle,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageRecord {
    pub storage_id: String,
    pub name: String,
    pub root_path: String,
    pub kind: StorageKind,
    pub scan_status: ScanStatus,
    pub validity: bool,
}

/// A storage about to be registered.
#[derive(Debug, Clone)]
pub struct NewStorage {
    pub storage_id: String,
    pub name: String,
    pub root_path: String,
    pub kind: StorageKind,
}

/// A physical media table and the storage that owns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaTable {
    pub storage_id: String,
    pub table: String,
}

/// What a union view rebuild included and skipped.
#[derive(Debug, Default)]
pub struct UnionViewReport {
    pub tables: Vec<String>,
    pub skipped: Vec<String>,
}

/// Storage ids become part of a table name, so keep them to a safe alphabet.
pub fn validate_storage_id(storage_id: &str) -> Result<()> {
    let ok = !storage_id.is_empty()
        && storage_id.len() <= 64
        && storage_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':' | '@'));
    if ok {
        Ok(())
    } else {
        Err(DbError::invalid(format!("invalid storage id '{storage_id}'")))
    }
}

/// Physical media table for a storage.
pub fn storage_table_name(storage_id: &str) -> String {
    if storage_id == INTERNAL_STORAGE_ID {
        INTERNAL_STORAGE_ID.to_string()
    } else {
        format!("media_{storage_id}")
    }
}

fn storage_from_row(row: &rusqlite::Row) -> rusqlite::Result<StorageRecord> {
    let kind: String = row.get("kind")?;
    Ok(StorageRecord {
        storage_id: row.get("storage_id")?,
        name: row.get("name")?,
        root_path: row.get("root_path")?,
        kind: StorageKind::parse(&kind).unwrap_or(StorageKind::External),
        scan_status: ScanStatus::from_i64(row.get("scan_status")?),
        validity: row.get::<_, i64>("validity")? != 0,
    })
}

const STORAGE_SELECT: &str =
    "SELECT storage_id, name, root_path, kind, scan_status, validity FROM storage";

// ── Storage records ─────────────────────────────────────────────────────────

/// Register a storage and create its media table.
///
/// Registering an id that already exists refreshes its name and root, marks
/// it valid again and makes sure its table exists: a card being reinserted
/// is the same storage coming back.
pub fn register_storage(
    conn: &Connection,
    registry: &SchemaRegistry,
    storage: &NewStorage,
) -> Result<StorageRecord> {
    validate_storage_id(&storage.storage_id)?;
    let internal = storage.storage_id == INTERNAL_STORAGE_ID;
    if internal != (storage.kind == StorageKind::Internal) {
        return Err(DbError::invalid(format!(
            "the internal storage must use the id '{INTERNAL_STORAGE_ID}'"
        )));
    }
    let root = crate::folder::normalize_path(&storage.root_path)?;
    check_table_name_free(conn, registry, &storage.storage_id)?;

    in_savepoint(conn, "register_storage", |conn| {
        conn.execute(
            "INSERT INTO storage (storage_id, name, root_path, kind, validity)
             VALUES (?1, ?2, ?3, ?4, 1)
             ON CONFLICT(storage_id) DO UPDATE SET
                 name = excluded.name,
                 root_path = excluded.root_path,
                 kind = excluded.kind,
                 validity = 1",
            params![storage.storage_id, storage.name, root, storage.kind.as_str()],
        )?;
        create_storage_table(conn, registry, &storage.storage_id)?;
        get_storage(conn, &storage.storage_id)
    })
}

/// SQLite folds ASCII case in object names, so a storage's table must not
/// collide in any letter case with another storage or a catalog object.
fn check_table_name_free(
    conn: &Connection,
    registry: &SchemaRegistry,
    storage_id: &str,
) -> Result<()> {
    let twin: Option<String> = conn
        .query_row(
            "SELECT storage_id FROM storage
             WHERE storage_id = ?1 COLLATE NOCASE AND storage_id <> ?1",
            params![storage_id],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(twin) = twin {
        return Err(DbError::invalid(format!(
            "storage id '{storage_id}' differs from '{twin}' only in letter case"
        )));
    }
    if storage_id == INTERNAL_STORAGE_ID {
        return Ok(());
    }

    let table = storage_table_name(storage_id);
    let reserved = registry
        .tables()
        .iter()
        .flat_map(|desc| std::iter::once(desc.name).chain(desc.view.map(|v| v.name)))
        .chain([UNION_VIEW])
        .any(|name| name.eq_ignore_ascii_case(&table));
    let other_object: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master
                       WHERE name = ?1 COLLATE NOCASE AND type <> 'table')",
        params![table],
        |row| row.get(0),
    )?;
    if reserved || other_object {
        return Err(DbError::invalid(format!(
            "storage id '{storage_id}' would name its table '{table}', which is taken"
        )));
    }
    Ok(())
}

pub fn find_storage(conn: &Connection, storage_id: &str) -> Result<Option<StorageRecord>> {
    let mut stmt = conn.prepare(&format!("{STORAGE_SELECT} WHERE storage_id = ?1"))?;
    Ok(stmt.query_row(params![storage_id], storage_from_row).optional()?)
}

pub fn get_storage(conn: &Connection, storage_id: &str) -> Result<StorageRecord> {
    find_storage(conn, storage_id)?.ok_or_else(|| DbError::not_found("storage", storage_id))
}

pub fn list_storages(conn: &Connection) -> Result<Vec<StorageRecord>> {
    let mut stmt = conn.prepare(&format!("{STORAGE_SELECT} ORDER BY storage_id"))?;
    let rows = stmt.query_map([], storage_from_row)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

/// Soft-attach or soft-detach a storage. Rows and table are untouched; the
/// union view picks the change up on its next rebuild.
pub fn set_storage_validity(conn: &Connection, storage_id: &str, valid: bool) -> Result<()> {
    let changed = execute_retrying(
        conn,
        "UPDATE storage SET validity = ?2 WHERE storage_id = ?1",
        params![storage_id, valid as i64],
    )?;
    if changed == 0 {
        return Err(DbError::not_found("storage", storage_id));
    }
    Ok(())
}

pub fn set_storage_scan_status(
    conn: &Connection,
    storage_id: &str,
    status: ScanStatus,
) -> Result<()> {
    let changed = execute_retrying(
        conn,
        "UPDATE storage SET scan_status = ?2 WHERE storage_id = ?1",
        params![storage_id, status.as_i64()],
    )?;
    if changed == 0 {
        return Err(DbError::not_found("storage", storage_id));
    }
    Ok(())
}

/// De-register a storage: drop its table, forget its folders and the record.
pub fn remove_storage(conn: &Connection, storage_id: &str) -> Result<()> {
    if storage_id == INTERNAL_STORAGE_ID {
        return Err(DbError::invalid("the internal storage cannot be removed"));
    }
    get_storage(conn, storage_id)?;
    let table = storage_table_name(storage_id);

    in_savepoint(conn, "remove_storage", |conn| {
        if table_exists(conn, &table)? && table_exists(conn, "tag_map")? {
            conn.execute_batch(&format!(
                "DELETE FROM tag_map WHERE media_id IN (SELECT media_id FROM {})",
                quote_ident(&table)
            ))?;
        }
        drop_storage_table(conn, storage_id)?;
        conn.execute("DELETE FROM folder WHERE storage_id = ?1", params![storage_id])?;
        conn.execute("DELETE FROM storage WHERE storage_id = ?1", params![storage_id])?;
        log::info!("removed storage {}", storage_id);
        Ok(())
    })
}

// ── Physical tables ─────────────────────────────────────────────────────────

/// Create the media table for `storage_id` if it does not exist yet.
pub fn create_storage_table(
    conn: &Connection,
    registry: &SchemaRegistry,
    storage_id: &str,
) -> Result<()> {
    validate_storage_id(storage_id)?;
    let desc = registry.media()?;
    let table = storage_table_name(storage_id);
    if table_exists(conn, &table)? {
        return Ok(());
    }
    in_savepoint(conn, "create_storage_table", |conn| {
        create_media_table(conn, desc, &table, registry.latest_version())?;
        bump_storage_set_version(conn)
    })?;
    log::debug!("created media table {} for storage {}", table, storage_id);
    Ok(())
}

pub(crate) fn create_media_table(
    conn: &Connection,
    desc: &TableDescriptor,
    table: &str,
    version: u32,
) -> Result<()> {
    descriptor::create_table(desc, table, version).execute(conn)?;
    for ddl in descriptor::create_indexes(desc, table, version) {
        ddl.execute(conn)?;
    }
    Ok(())
}

/// Drop the media table for `storage_id` along with every row in it.
pub fn drop_storage_table(conn: &Connection, storage_id: &str) -> Result<()> {
    validate_storage_id(storage_id)?;
    if storage_id == INTERNAL_STORAGE_ID {
        return Err(DbError::invalid("the base media table cannot be dropped"));
    }
    let table = storage_table_name(storage_id);
    in_savepoint(conn, "drop_storage_table", |conn| {
        conn.execute_batch(&format!("DROP TABLE IF EXISTS {}", quote_ident(&table)))?;
        bump_storage_set_version(conn)
    })?;
    log::debug!("dropped media table {}", table);
    Ok(())
}

/// Every existing media table: the base table first, then one per storage.
pub fn media_tables(conn: &Connection) -> Result<Vec<MediaTable>> {
    let mut tables = vec![MediaTable {
        storage_id: INTERNAL_STORAGE_ID.to_string(),
        table: INTERNAL_STORAGE_ID.to_string(),
    }];
    if !table_exists(conn, "storage")? {
        return Ok(tables);
    }
    let mut stmt = conn.prepare(
        "SELECT storage_id FROM storage WHERE storage_id <> ?1 ORDER BY storage_id",
    )?;
    let ids = stmt
        .query_map(params![INTERNAL_STORAGE_ID], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    for storage_id in ids {
        let table = storage_table_name(&storage_id);
        if table_exists(conn, &table)? {
            tables.push(MediaTable { storage_id, table });
        }
    }
    Ok(tables)
}

// ── Union view ──────────────────────────────────────────────────────────────

/// Recreate `media_view` over the base table and every valid storage's table.
///
/// A valid storage whose table is missing is logged and left out; the next
/// scan of that storage recreates it.
pub fn rebuild_union_view(conn: &Connection, registry: &SchemaRegistry) -> Result<UnionViewReport> {
    let desc = registry.media()?;
    let columns = desc
        .visible_columns_at(registry.latest_version())
        .into_iter()
        .map(quote_ident)
        .collect::<Vec<_>>()
        .join(", ");

    in_savepoint(conn, "union_view", |conn| {
        let mut report = UnionViewReport {
            tables: vec![INTERNAL_STORAGE_ID.to_string()],
            skipped: Vec::new(),
        };

        let mut stmt = conn.prepare(
            "SELECT storage_id FROM storage WHERE validity = 1 AND storage_id <> ?1 ORDER BY storage_id",
        )?;
        let valid = stmt
            .query_map(params![INTERNAL_STORAGE_ID], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        for storage_id in valid {
            let table = storage_table_name(&storage_id);
            if table_exists(conn, &table)? {
                report.tables.push(table);
            } else {
                log::warn!(
                    "storage {} is valid but has no media table; leaving it out of {}",
                    storage_id,
                    UNION_VIEW
                );
                report.skipped.push(storage_id);
            }
        }

        let selects: Vec<String> = report
            .tables
            .iter()
            .map(|t| format!("SELECT {columns} FROM {}", quote_ident(t)))
            .collect();
        conn.execute_batch(&format!(
            "DROP VIEW IF EXISTS {view}; CREATE VIEW {view} AS {body};",
            view = quote_ident(UNION_VIEW),
            body = selects.join(" UNION ALL "),
        ))?;

        if table_exists(conn, "catalog_meta")? {
            conn.execute(
                "UPDATE catalog_meta SET value = (SELECT value FROM catalog_meta WHERE key = ?1)
                 WHERE key = ?2",
                params![STORAGE_SET_KEY, UNION_VIEW_KEY],
            )?;
        }
        log::debug!("rebuilt {} over {} table(s)", UNION_VIEW, report.tables.len());
        Ok(report)
    })
}

/// Rebuild the union view only if the storage set changed since it was built.
/// Returns whether a rebuild happened.
pub fn ensure_union_view(conn: &Connection, registry: &SchemaRegistry) -> Result<bool> {
    let stale = !view_exists(conn, UNION_VIEW)?
        || storage_set_version(conn)? != meta_value(conn, UNION_VIEW_KEY)?;
    if stale {
        rebuild_union_view(conn, registry)?;
    }
    Ok(stale)
}

/// Current stamp of the set of storages and their tables.
pub fn storage_set_version(conn: &Connection) -> Result<i64> {
    meta_value(conn, STORAGE_SET_KEY)
}

fn meta_value(conn: &Connection, key: &str) -> Result<i64> {
    if !table_exists(conn, "catalog_meta")? {
        return Ok(0);
    }
    let value = conn
        .query_row(
            "SELECT value FROM catalog_meta WHERE key = ?1",
            params![key],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;
    Ok(value.unwrap_or(0))
}

fn view_exists(conn: &Connection, name: &str) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'view' AND name = ?1 COLLATE NOCASE)",
        params![name],
        |row| row.get(0),
    )?;
    Ok(exists)
}

pub(crate) fn bump_storage_set_version(conn: &Connection) -> Result<()> {
    if table_exists(conn, "catalog_meta")? {
        conn.execute(
            "UPDATE catalog_meta SET value = value + 1 WHERE key = ?1",
            params![STORAGE_SET_KEY],
        )?;
    }
    Ok(())
}

const STAMP_TRIGGERS: &[&str] = &[
    "storage_set_on_insert",
    "storage_set_on_delete",
    "storage_set_on_validity",
];

/// Seed the stamp keys and install the triggers that bump the storage stamp.
pub(crate) fn install_stamp_triggers(conn: &Connection) -> Result<()> {
    let bump = format!(
        "UPDATE catalog_meta SET value = value + 1 WHERE key = {};",
        text_literal(STORAGE_SET_KEY)
    );
    conn.execute(
        "INSERT OR IGNORE INTO catalog_meta (key, value) VALUES (?1, 1), (?2, 0)",
        params![STORAGE_SET_KEY, UNION_VIEW_KEY],
    )?;
    conn.execute_batch(&format!(
        "CREATE TRIGGER IF NOT EXISTS storage_set_on_insert AFTER INSERT ON storage
             BEGIN {bump} END;
         CREATE TRIGGER IF NOT EXISTS storage_set_on_delete AFTER DELETE ON storage
             BEGIN {bump} END;
         CREATE TRIGGER IF NOT EXISTS storage_set_on_validity AFTER UPDATE OF validity ON storage
             WHEN OLD.validity IS NOT NEW.validity
             BEGIN {bump} END;"
    ))?;
    Ok(())
}

pub(crate) fn drop_stamp_triggers(conn: &Connection) -> Result<()> {
    for name in STAMP_TRIGGERS {
        conn.execute_batch(&format!("DROP TRIGGER IF EXISTS {name}"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_storage_uses_base_table() {
        assert_eq!(storage_table_name(INTERNAL_STORAGE_ID), "media");
        assert_eq!(storage_table_name("sd-1"), "media_sd-1");
    }

    #[test]
    fn storage_ids_are_restricted() {
        assert!(validate_storage_id("sd-1234_ABCD").is_ok());
        assert!(validate_storage_id("cloud:me@example.com").is_ok());
        assert!(validate_storage_id("").is_err());
        assert!(validate_storage_id("a\"; DROP TABLE media; --").is_err());
    }

    #[test]
    fn scan_status_round_trips_codes() {
        for status in [
            ScanStatus::Idle,
            ScanStatus::Preparing,
            ScanStatus::Processing,
            ScanStatus::Stopped,
            ScanStatus::Complete,
            ScanStatus::Partial,
        ] {
            assert_eq!(ScanStatus::from_i64(status.as_i64()), status);
        }
    }
}
