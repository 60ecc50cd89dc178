//! SQLite storage layer for the media catalog.
//!
//! Provides descriptor-driven schema creation and migration, per-volume media
//! tables joined by a union view, the folder hierarchy resolver and the
//! batched mutation queue, backed by SQLite (via rusqlite with bundled feature).

pub mod album;
pub mod batch;
pub mod busy;
pub mod catalog;
pub mod descriptor;
pub mod error;
pub mod folder;
pub mod media;
pub mod registry;
pub mod schema;
pub mod settings;
pub mod sql;
pub mod storage;
pub mod tables;
pub mod tag;

pub use album::{AlbumRecord, find_album_art, get_album, get_or_create_album, set_album_art};
pub use batch::{BatchKind, BatchOptions, BatchSession, FlushReport, PendingStatement};
pub use busy::{BusyPolicy, execute_retrying, in_savepoint, in_transaction, with_busy_retry};
pub use catalog::Catalog;
pub use error::{DbError, Result};
pub use folder::{
    FolderRecord, VolumeClassifier, VolumeRoots, find_folder_by_path, get_folder,
    get_or_create_folder, list_child_folders, normalize_path, rename_folder,
    set_folder_scan_status, set_folder_validity,
};
pub use media::{
    MediaMetadata, MediaRecord, MediaType, count_media, count_storage_media, find_media_by_path,
    get_media, list_media_in_folder,
};
pub use registry::{LATEST_SCHEMA_VERSION, SchemaRegistry};
pub use schema::{
    MigrationReport, OpenOptions, check_integrity, close_database, current_schema_version,
    latest_schema_version, migrate, open_database, open_database_with, open_memory,
};
pub use settings::{CatalogSettings, SettingsError, settings_path};
pub use storage::{
    INTERNAL_STORAGE_ID, NewStorage, ScanStatus, StorageKind, StorageRecord, UNION_VIEW,
    ensure_union_view, get_storage, list_storages, rebuild_union_view, register_storage,
    remove_storage, set_storage_scan_status, set_storage_validity, storage_table_name,
};
pub use tag::{TagSummary, add_tag, list_tags, remove_tag, tags_for_media};
