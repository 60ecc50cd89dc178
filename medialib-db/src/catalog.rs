//! A catalog handle: one connection, its schema registry and its settings.
//!
//! The connection sits behind a mutex, so batch flushes and storage changes
//! from different threads commit one at a time. Free functions in the other
//! modules remain usable on a bare `Connection`; the handle only adds the
//! sequencing and keeps the union view current after storage changes.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;

use crate::batch::{BatchSession, FlushReport};
use crate::busy::in_transaction;
use crate::error::{DbError, Result};
use crate::folder::{VolumeRoots, get_or_create_folder};
use crate::registry::SchemaRegistry;
use crate::schema::{self, OpenOptions};
use crate::settings::CatalogSettings;
use crate::storage::{self, NewStorage, StorageRecord};

pub struct Catalog {
    conn: Mutex<Connection>,
    registry: SchemaRegistry,
    settings: CatalogSettings,
    configured_roots: VolumeRoots,
}

impl Catalog {
    /// Open the database named by the settings, creating its directory.
    pub fn open(settings: CatalogSettings) -> Result<Self> {
        let path = settings.database_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::open_at(&path, settings)
    }

    pub fn open_at(path: &Path, settings: CatalogSettings) -> Result<Self> {
        Self::open_with(path, SchemaRegistry::standard(), settings)
    }

    /// Open with a custom registry, e.g. one carrying extra tables.
    pub fn open_with(path: &Path, registry: SchemaRegistry, settings: CatalogSettings) -> Result<Self> {
        let options: OpenOptions = settings.open_options();
        let conn = schema::open_database_with(path, &registry, &options)?;
        log::info!("opened catalog {}", path.display());
        Self::from_parts(conn, registry, settings)
    }

    pub fn open_in_memory(settings: CatalogSettings) -> Result<Self> {
        let conn = schema::open_memory()?;
        Self::from_parts(conn, SchemaRegistry::standard(), settings)
    }

    fn from_parts(conn: Connection, registry: SchemaRegistry, settings: CatalogSettings) -> Result<Self> {
        let configured_roots = settings
            .volume_roots()
            .map_err(|e| DbError::invalid(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
            registry,
            settings,
            configured_roots,
        })
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &CatalogSettings {
        &self.settings
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the lock leaves SQLite itself consistent.
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run `f` with exclusive use of the connection.
    pub fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.lock();
        f(&conn)
    }

    /// Run a write under the settings' busy policy with exclusive use of the
    /// connection.
    fn write<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let policy = self.settings.busy_policy();
        self.with_conn(|conn| in_transaction(conn, &policy, f))
    }

    /// Flush a batch session; commits from concurrent callers are serialised.
    pub fn flush(&self, session: BatchSession) -> Result<FlushReport> {
        let options = self.settings.batch_options();
        self.with_conn(|conn| session.finish(conn, &options))
    }

    pub fn register_storage(&self, storage: &NewStorage) -> Result<StorageRecord> {
        self.write(|conn| {
            let record = storage::register_storage(conn, &self.registry, storage)?;
            storage::ensure_union_view(conn, &self.registry)?;
            Ok(record)
        })
    }

    pub fn set_storage_validity(&self, storage_id: &str, valid: bool) -> Result<()> {
        self.write(|conn| {
            storage::set_storage_validity(conn, storage_id, valid)?;
            storage::ensure_union_view(conn, &self.registry)?;
            Ok(())
        })
    }

    pub fn remove_storage(&self, storage_id: &str) -> Result<()> {
        self.write(|conn| {
            storage::remove_storage(conn, storage_id)?;
            storage::ensure_union_view(conn, &self.registry)?;
            Ok(())
        })
    }

    pub fn list_storages(&self) -> Result<Vec<StorageRecord>> {
        self.with_conn(storage::list_storages)
    }

    /// Rebuild the union view if the storage set moved on. Returns whether it did.
    pub fn refresh_union_view(&self) -> Result<bool> {
        self.write(|conn| storage::ensure_union_view(conn, &self.registry))
    }

    /// Registered storage roots, with roots from the settings filling gaps.
    pub fn volume_roots(&self) -> Result<VolumeRoots> {
        self.with_conn(|conn| self.volume_roots_in(conn))
    }

    pub(crate) fn volume_roots_in(&self, conn: &Connection) -> Result<VolumeRoots> {
        let mut roots = VolumeRoots::from_storages(conn)?;
        roots.merge(&self.configured_roots);
        Ok(roots)
    }

    pub fn resolve_folder(&self, storage_id: &str, path: &str) -> Result<String> {
        self.write(|conn| {
            let roots = self.volume_roots_in(conn)?;
            get_or_create_folder(conn, &roots, storage_id, path)
        })
    }

    pub fn schema_version(&self) -> Result<u32> {
        self.with_conn(schema::current_schema_version)
    }

    pub fn check_integrity(&self) -> Result<()> {
        self.with_conn(schema::check_integrity)
    }

    pub fn close(self) -> Result<()> {
        let conn = self
            .conn
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        schema::close_database(conn)
    }
}
