//! Scan sessions: mark a scope stale, observe what is on disk, sweep the rest.
//!
//! Folders are resolved immediately as files are observed, so every queued
//! media statement refers to a folder row that already exists. Media writes
//! are queued per kind and committed in batches.

use std::collections::HashSet;

use medialib_db::folder::parent_path;
use medialib_db::storage::create_storage_table;
use medialib_db::{
    BatchKind, BatchOptions, BatchSession, CatalogSettings, DbError, MediaMetadata, MediaRecord,
    MediaType, ScanStatus, SchemaRegistry, VolumeClassifier, ensure_union_view,
    find_media_by_path, get_or_create_folder, get_storage, in_transaction, normalize_path,
};
use rusqlite::Connection;

use crate::error::ScanError;
use crate::progress::{ScanProgress, SilentScanProgress};
use crate::scope::{ResolvedScope, ScanScope};
use crate::sweep::{SweepReport, sweep_scope};

/// Options controlling a reconciliation pass.
#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    pub batch: BatchOptions,
    /// Queued statements per kind before the session commits on its own.
    pub flush_threshold: usize,
    /// Shared thumbnails a sweep must never delete.
    pub default_assets: Vec<String>,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            batch: BatchOptions::default(),
            flush_threshold: 500,
            default_assets: Vec::new(),
        }
    }
}

impl ReconcileOptions {
    pub fn from_settings(settings: &CatalogSettings) -> Self {
        Self {
            batch: settings.batch_options(),
            flush_threshold: settings.batch.flush_threshold.max(1),
            default_assets: settings.thumbnails.default_assets.clone(),
        }
    }
}

/// A file found by the caller's filesystem walk, with whatever it extracted.
#[derive(Debug, Clone, Default)]
pub struct DiscoveredFile {
    pub path: String,
    pub size: i64,
    pub modified_time: i64,
    pub media_type: MediaType,
    pub mime_type: Option<String>,
    pub thumbnail_path: Option<String>,
    pub metadata: MediaMetadata,
}

impl DiscoveredFile {
    pub fn new(path: impl Into<String>, size: i64, modified_time: i64) -> Self {
        Self {
            path: path.into(),
            size,
            modified_time,
            ..Default::default()
        }
    }
}

/// What observing one file did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    Inserted,
    Updated,
    /// Known and unchanged; only its validity flag is restored.
    Revalidated,
    /// Already observed earlier in this session.
    Duplicate,
}

/// Statistics from a scan session.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanStats {
    pub marked_stale: usize,
    pub observed: usize,
    pub inserted: usize,
    pub updated: usize,
    pub revalidated: usize,
    pub duplicates: usize,
    pub folders: usize,
    pub flushes: usize,
}

pub struct ScanSession<'a> {
    conn: &'a Connection,
    volumes: &'a dyn VolumeClassifier,
    progress: &'a dyn ScanProgress,
    scope: ResolvedScope,
    options: ReconcileOptions,
    inserts: BatchSession,
    updates: BatchSession,
    revalidations: BatchSession,
    seen: HashSet<String>,
    stats: ScanStats,
    inserted: Vec<String>,
    updated: Vec<String>,
    revalidated: Vec<String>,
}

/// Start a scan: mark everything in `scope` stale in one transaction and set
/// its scan status to processing.
///
/// The storage's media table is recreated if it went missing.
pub fn begin_scan<'a>(
    conn: &'a Connection,
    registry: &SchemaRegistry,
    volumes: &'a dyn VolumeClassifier,
    scope: ScanScope,
    options: ReconcileOptions,
) -> Result<ScanSession<'a>, ScanError> {
    let scope = ResolvedScope::resolve(conn, &scope)?;
    let storage = get_storage(conn, &scope.storage_id)?;
    if !storage.validity {
        return Err(ScanError::Detached(storage.storage_id));
    }
    if volumes.volume_root(&storage.storage_id).is_none() {
        return Err(DbError::invalid(format!(
            "no volume root known for storage '{}'",
            storage.storage_id
        ))
        .into());
    }

    create_storage_table(conn, registry, &scope.storage_id)?;
    ensure_union_view(conn, registry)?;

    let marked = in_transaction(conn, &options.batch.busy, |conn| {
        let marked = scope.mark_stale(conn)?;
        scope.set_scan_status(conn, ScanStatus::Processing)?;
        Ok(marked)
    })?;
    log::info!("scan of {} started, {} media rows marked stale", scope.scope, marked);

    Ok(ScanSession {
        conn,
        volumes,
        progress: &SilentScanProgress,
        scope,
        options,
        inserts: BatchSession::begin(BatchKind::InsertItem, 0),
        updates: BatchSession::begin(BatchKind::UpdateItem, 0),
        revalidations: BatchSession::begin(BatchKind::SetValidity, 0),
        seen: HashSet::new(),
        stats: ScanStats {
            marked_stale: marked,
            ..Default::default()
        },
        inserted: Vec::new(),
        updated: Vec::new(),
        revalidated: Vec::new(),
    })
}

impl<'a> ScanSession<'a> {
    pub fn with_progress(mut self, progress: &'a dyn ScanProgress) -> Self {
        self.progress = progress;
        self
    }

    pub fn scope(&self) -> &ScanScope {
        &self.scope.scope
    }

    pub fn storage_id(&self) -> &str {
        &self.scope.storage_id
    }

    pub fn stats(&self) -> &ScanStats {
        &self.stats
    }

    fn out_of_scope(&self, path: &str) -> ScanError {
        ScanError::OutOfScope {
            path: path.to_string(),
            scope: self.scope.scope.to_string(),
        }
    }

    /// Record that a file exists: insert it, update it, or just mark it valid.
    pub fn observe(&mut self, file: &DiscoveredFile) -> Result<Observation, ScanError> {
        let path = normalize_path(&file.path)?;
        if !self.scope.contains_file(self.volumes, &path) {
            return Err(self.out_of_scope(&path));
        }
        if !self.seen.insert(path.clone()) {
            self.stats.duplicates += 1;
            return Ok(Observation::Duplicate);
        }
        let Some(dir) = parent_path(&path) else {
            return Err(self.out_of_scope(&path));
        };

        let storage_id = self.scope.storage_id.clone();
        let folder_id = get_or_create_folder(self.conn, self.volumes, &storage_id, dir)?;

        let outcome = match find_media_by_path(self.conn, &storage_id, &path)? {
            None => {
                let mut media = MediaRecord::new(&storage_id, &folder_id, &path)?;
                apply_file(&mut media, file);
                media.added_time = chrono::Utc::now().timestamp();
                self.inserts.insert_item(&media)?;
                self.inserted.push(media.media_id);
                self.stats.inserted += 1;
                Observation::Inserted
            }
            Some(existing)
                if existing.size == file.size
                    && existing.modified_time == file.modified_time
                    && existing.folder_id == folder_id =>
            {
                if !existing.validity {
                    self.revalidations
                        .set_item_validity(&storage_id, &existing.media_id, true)?;
                }
                self.revalidated.push(existing.media_id);
                self.stats.revalidated += 1;
                Observation::Revalidated
            }
            Some(existing) => {
                let mut media = existing;
                media.folder_id = folder_id;
                apply_file(&mut media, file);
                self.updates.update_item(&media)?;
                self.updated.push(media.media_id);
                self.stats.updated += 1;
                Observation::Updated
            }
        };

        self.stats.observed += 1;
        self.progress.on_file(self.stats.observed, &path, outcome);
        self.flush_if_full()?;
        Ok(outcome)
    }

    /// Record that a directory exists, so it survives the sweep even if empty.
    pub fn observe_folder(&mut self, path: &str) -> Result<String, ScanError> {
        let path = normalize_path(path)?;
        if !self.scope.contains_folder(self.volumes, &path) {
            return Err(self.out_of_scope(&path));
        }
        let id = get_or_create_folder(self.conn, self.volumes, &self.scope.storage_id, &path)?;
        self.stats.folders += 1;
        Ok(id)
    }

    fn flush_if_full(&mut self) -> Result<(), ScanError> {
        let threshold = self.options.flush_threshold.max(1);
        if self.inserts.len() >= threshold
            || self.updates.len() >= threshold
            || self.revalidations.len() >= threshold
        {
            self.flush()?;
        }
        Ok(())
    }

    /// Commit every queued statement now: inserts, then updates, then validity flips.
    pub fn flush(&mut self) -> Result<(), ScanError> {
        for kind in [BatchKind::InsertItem, BatchKind::UpdateItem, BatchKind::SetValidity] {
            let queue = match kind {
                BatchKind::InsertItem => &mut self.inserts,
                BatchKind::UpdateItem => &mut self.updates,
                _ => &mut self.revalidations,
            };
            if queue.is_empty() {
                continue;
            }
            let session = std::mem::replace(queue, BatchSession::begin(kind, 0));
            let report = session
                .finish(self.conn, &self.options.batch)
                .map_err(|source| ScanError::FlushFailed { kind, source })?;
            self.stats.flushes += 1;
            self.progress.on_flush(&report);
        }
        Ok(())
    }

    /// Finish the scan: commit the queues, then delete what was not observed.
    ///
    /// If any queue fails to commit, nothing is swept and the scope's status
    /// is left as partial; the stale rows wait for the next scan.
    pub fn end_scan(mut self) -> Result<SweepReport, ScanError> {
        self.progress
            .on_phase(&format!("Sweeping {}", self.scope.scope));
        if let Err(e) = self.flush() {
            if let Err(status) = self.scope.set_scan_status(self.conn, ScanStatus::Partial) {
                log::warn!("could not record partial scan of {}: {}", self.scope.scope, status);
            }
            return Err(e);
        }

        let mut report = sweep_scope(
            self.conn,
            &self.scope,
            self.volumes,
            &self.options.default_assets,
            &self.options.batch.busy,
            true,
        )?;
        report.inserted = std::mem::take(&mut self.inserted);
        report.updated = std::mem::take(&mut self.updated);
        report.revalidated = std::mem::take(&mut self.revalidated);
        self.progress.on_complete(&report);
        Ok(report)
    }
}

fn apply_file(media: &mut MediaRecord, file: &DiscoveredFile) {
    media.size = file.size;
    media.modified_time = file.modified_time;
    media.media_type = file.media_type;
    media.validity = true;
    if file.mime_type.is_some() {
        media.mime_type = file.mime_type.clone();
    }
    if file.thumbnail_path.is_some() {
        media.thumbnail_path = file.thumbnail_path.clone();
    }
    media.metadata = file.metadata.clone();
}
