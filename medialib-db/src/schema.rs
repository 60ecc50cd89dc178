//! Opening catalog databases and migrating them to the latest schema.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, params};

use crate::busy::{BusyPolicy, in_transaction};
use crate::descriptor::{self, Backfill, ColumnDescriptor, TableDescriptor};
use crate::error::{DbError, Result};
use crate::registry::SchemaRegistry;
use crate::sql::{quote_ident, text_literal};
use crate::storage::{self, INTERNAL_STORAGE_ID, MediaTable};

/// How a catalog connection is opened.
#[derive(Debug, Clone)]
pub struct OpenOptions {
    pub busy: BusyPolicy,
    /// Run `PRAGMA quick_check` before migrating.
    pub verify_integrity: bool,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            busy: BusyPolicy::default(),
            verify_integrity: true,
        }
    }
}

/// What a migration run changed.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub from_version: u32,
    pub to_version: u32,
    pub created_tables: Vec<String>,
    pub rebuilt_tables: Vec<String>,
    pub added_columns: Vec<String>,
}

impl MigrationReport {
    pub fn is_noop(&self) -> bool {
        self.from_version == self.to_version
    }
}

/// Open or create a catalog database at the given path.
pub fn open_database(path: &Path) -> Result<Connection> {
    open_database_with(path, &SchemaRegistry::standard(), &OpenOptions::default())
}

/// Open a catalog database, check it and bring it to the registry's latest version.
pub fn open_database_with(
    path: &Path,
    registry: &SchemaRegistry,
    options: &OpenOptions,
) -> Result<Connection> {
    let conn = Connection::open(path).map_err(DbError::Connect)?;
    configure(&conn)?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    if options.verify_integrity {
        check_integrity(&conn)?;
    }
    migrate(&conn, registry, &options.busy)?;
    Ok(conn)
}

/// Open an in-memory database with the full schema. Useful for testing.
pub fn open_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().map_err(DbError::Connect)?;
    configure(&conn)?;
    migrate(&conn, &SchemaRegistry::standard(), &BusyPolicy::default())?;
    Ok(conn)
}

/// Close a connection, surfacing any error SQLite reports while finalising.
pub fn close_database(conn: Connection) -> Result<()> {
    conn.close().map_err(|(_, e)| DbError::Disconnect(e))
}

fn configure(conn: &Connection) -> Result<()> {
    // Lock conflicts are retried by `BusyPolicy`, not inside SQLite.
    conn.busy_timeout(Duration::ZERO)?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
    Ok(())
}

/// Run SQLite's quick integrity check; anything but "ok" means the file is corrupt.
pub fn check_integrity(conn: &Connection) -> Result<()> {
    let mut stmt = conn.prepare("PRAGMA quick_check")?;
    let problems = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    if problems.len() == 1 && problems[0] == "ok" {
        Ok(())
    } else {
        Err(DbError::Corrupt(problems.join("; ")))
    }
}

pub fn latest_schema_version() -> u32 {
    crate::registry::LATEST_SCHEMA_VERSION
}

/// Persisted schema version, or 0 if no schema exists.
pub fn current_schema_version(conn: &Connection) -> Result<u32> {
    if !table_exists(conn, "schema_version")? {
        return Ok(0);
    }
    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;
    Ok(version as u32)
}

fn set_schema_version(conn: &Connection, version: u32) -> Result<()> {
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

const SCHEMA_VERSION_SQL: &str = "
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);";

pub fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name=?1 COLLATE NOCASE)",
        [name],
        |row| row.get(0),
    )?;
    Ok(exists)
}

pub fn table_columns(conn: &Connection, table: &str) -> Result<HashSet<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>("name"))?
        .collect::<Result<HashSet<_>, _>>()?;
    Ok(names)
}

/// Materialise the schema exactly as a release at `version` would have created
/// it. Used to seed databases that exercise upgrades.
pub fn create_schema_at(conn: &Connection, registry: &SchemaRegistry, version: u32) -> Result<()> {
    conn.execute_batch(SCHEMA_VERSION_SQL)?;
    for desc in registry.tables().iter().filter(|d| d.since <= version) {
        descriptor::create_table(desc, desc.name, version).execute(conn)?;
        for ddl in descriptor::create_indexes(desc, desc.name, version) {
            ddl.execute(conn)?;
        }
    }
    set_schema_version(conn, version)?;
    Ok(())
}

/// Bring the database up to the registry's latest version.
///
/// Everything runs in one immediate transaction, so a failure leaves the
/// database exactly at its previous version. Any failure is reported as
/// [`DbError::Migration`].
pub fn migrate(
    conn: &Connection,
    registry: &SchemaRegistry,
    policy: &BusyPolicy,
) -> Result<MigrationReport> {
    let latest = registry.latest_version();
    let wrap = |e: DbError| match e {
        e @ DbError::Migration { .. } => e,
        e => DbError::Migration {
            version: latest,
            source: Box::new(e),
        },
    };

    let from = current_schema_version(conn).map_err(wrap)?;
    if from > latest {
        return Err(wrap(DbError::invalid(format!(
            "database schema version {from} is newer than this build supports ({latest})"
        ))));
    }
    if from == latest {
        return Ok(MigrationReport {
            from_version: from,
            to_version: latest,
            ..Default::default()
        });
    }

    log::info!("migrating catalog schema from version {} to {}", from, latest);
    let report = in_transaction(conn, policy, |conn| upgrade(conn, registry, from, latest))
        .map_err(wrap)?;
    log::info!(
        "schema at version {} ({} created, {} rebuilt, {} columns added)",
        latest,
        report.created_tables.len(),
        report.rebuilt_tables.len(),
        report.added_columns.len()
    );
    Ok(report)
}

fn upgrade(
    conn: &Connection,
    registry: &SchemaRegistry,
    from: u32,
    to: u32,
) -> Result<MigrationReport> {
    let mut report = MigrationReport {
        from_version: from,
        to_version: to,
        ..Default::default()
    };

    conn.execute_batch(SCHEMA_VERSION_SQL)?;
    drop_derived_objects(conn, registry)?;

    for desc in registry.tables() {
        for table in physical_tables(conn, desc)? {
            upgrade_table(conn, desc, &table.table, from, to, &mut report)?;
        }
    }

    for desc in registry.tables() {
        for table in physical_tables(conn, desc)? {
            for ddl in descriptor::create_indexes(desc, &table.table, to) {
                ddl.execute(conn)?;
            }
            for column in desc.columns.iter().filter(|c| c.since > from) {
                backfill(conn, column, &table)?;
            }
        }
    }

    create_derived_objects(conn, registry, to)?;
    if registry.media().is_ok() && registry.get("storage").is_some() {
        storage::rebuild_union_view(conn, registry)?;
    }
    set_schema_version(conn, to)?;
    Ok(report)
}

/// Physical tables backing a descriptor: one per storage for sharded ones.
fn physical_tables(conn: &Connection, desc: &TableDescriptor) -> Result<Vec<MediaTable>> {
    if desc.sharded {
        let mut tables = storage::media_tables(conn)?;
        for table in tables.iter_mut().filter(|t| t.storage_id == INTERNAL_STORAGE_ID) {
            table.table = desc.name.to_string();
        }
        Ok(tables)
    } else {
        Ok(vec![MediaTable {
            storage_id: INTERNAL_STORAGE_ID.to_string(),
            table: desc.name.to_string(),
        }])
    }
}

fn upgrade_table(
    conn: &Connection,
    desc: &TableDescriptor,
    table: &str,
    from: u32,
    to: u32,
    report: &mut MigrationReport,
) -> Result<()> {
    if !table_exists(conn, table)? {
        descriptor::create_table(desc, table, to).execute(conn)?;
        report.created_tables.push(table.to_string());
        return Ok(());
    }

    if desc.rebuilt_in.is_some_and(|v| v > from) {
        rebuild_table(conn, desc, table, to)?;
        report.rebuilt_tables.push(table.to_string());
        return Ok(());
    }

    let existing = table_columns(conn, table)?;
    for column in desc.columns_at(to).filter(|c| c.since > from) {
        if existing.contains(column.name) {
            continue;
        }
        descriptor::add_column(table, column).execute(conn)?;
        report.added_columns.push(format!("{}.{}", table, column.name));
    }
    Ok(())
}

/// Copy-out, recreate, copy-back for changes `ADD COLUMN` cannot express.
///
/// Columns present by name in both shapes are carried over; the rest take
/// their defaults. Indexes are recreated by the caller after the old table
/// is gone.
fn rebuild_table(conn: &Connection, desc: &TableDescriptor, table: &str, to: u32) -> Result<()> {
    let temp = format!("{table}__old");
    log::info!("rebuilding table {}", table);

    conn.execute_batch(&format!(
        "DROP TABLE IF EXISTS {temp}; ALTER TABLE {live} RENAME TO {temp};",
        temp = quote_ident(&temp),
        live = quote_ident(table),
    ))?;
    descriptor::create_table(desc, table, to).execute(conn)?;

    let old_columns = table_columns(conn, &temp)?;
    let shared: Vec<String> = desc
        .columns_at(to)
        .filter(|c| old_columns.contains(c.name))
        .map(|c| quote_ident(c.name))
        .collect();
    if !shared.is_empty() {
        let list = shared.join(", ");
        conn.execute_batch(&format!(
            "INSERT INTO {} ({list}) SELECT {list} FROM {}",
            quote_ident(table),
            quote_ident(&temp),
        ))?;
    }
    conn.execute_batch(&format!("DROP TABLE {}", quote_ident(&temp)))?;
    Ok(())
}

fn backfill(conn: &Connection, column: &ColumnDescriptor, table: &MediaTable) -> Result<()> {
    let Some(rule) = column.backfill else {
        return Ok(());
    };
    let value = match rule {
        Backfill::OwningStorage => text_literal(&table.storage_id),
        Backfill::Expression(expr) => format!("({expr})"),
    };
    let filled = conn.execute(
        &format!(
            "UPDATE {table} SET {col} = {value} WHERE {col} IS NULL",
            table = quote_ident(&table.table),
            col = quote_ident(column.name),
        ),
        params![],
    )?;
    if filled > 0 {
        log::debug!("backfilled {} row(s) of {}.{}", filled, table.table, column.name);
    }
    Ok(())
}

/// Views and triggers reference tables by name, so they are dropped before
/// any table is renamed and recreated afterwards.
fn drop_derived_objects(conn: &Connection, registry: &SchemaRegistry) -> Result<()> {
    conn.execute_batch(&format!(
        "DROP VIEW IF EXISTS {}",
        quote_ident(storage::UNION_VIEW)
    ))?;
    for desc in registry.tables() {
        if let Some(view) = desc.view {
            conn.execute_batch(&format!("DROP VIEW IF EXISTS {}", quote_ident(view.name)))?;
        }
        if let Some(name) = descriptor::cascade_trigger_name(desc) {
            conn.execute_batch(&format!("DROP TRIGGER IF EXISTS {}", quote_ident(&name)))?;
        }
    }
    storage::drop_stamp_triggers(conn)
}

fn create_derived_objects(conn: &Connection, registry: &SchemaRegistry, to: u32) -> Result<()> {
    for desc in registry.tables() {
        if let Some(ddl) = descriptor::cascade_trigger(desc) {
            ddl.execute(conn)?;
        }
        if let Some(ddl) = descriptor::create_view(desc, to) {
            ddl.execute(conn)?;
        }
    }
    if registry.get("catalog_meta").is_some() && registry.get("storage").is_some() {
        storage::install_stamp_triggers(conn)?;
    }
    Ok(())
}
