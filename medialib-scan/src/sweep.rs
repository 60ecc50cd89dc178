//! The sweep half of mark-and-sweep, plus whole-volume invalidation.
//!
//! Nothing here deletes a row that is not already stale. Rows become stale
//! when a scan begins or a volume is unmounted, and become valid again when
//! observed, so an interrupted scan only ever leaves stale rows behind.

use std::collections::BTreeSet;
use std::io;

use medialib_db::schema::table_exists;
use medialib_db::sql::{descendant_prefix, quote_ident};
use medialib_db::storage::{MediaTable, create_storage_table, media_tables};
use medialib_db::tag::delete_tag_links;
use medialib_db::{
    BusyPolicy, ScanStatus, SchemaRegistry, VolumeClassifier, ensure_union_view, get_storage,
    in_transaction, set_storage_scan_status, set_storage_validity,
};
use rusqlite::{Connection, params};

use crate::error::ScanError;
use crate::scope::{ResolvedScope, ScanScope};

/// Everything a finished scan or sweep changed, for change notification.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub storage_id: String,
    pub inserted: Vec<String>,
    pub updated: Vec<String>,
    pub revalidated: Vec<String>,
    pub deleted_media: Vec<String>,
    pub deleted_folders: Vec<String>,
    pub removed_thumbnails: Vec<String>,
    /// Thumbnails that should have been removed but could not be: `(path, error)`.
    pub thumbnail_errors: Vec<(String, String)>,
}

/// Delete what is still stale in `scope`, then remove thumbnails nothing
/// refers to any more.
///
/// The database work is one transaction; thumbnail files are removed only
/// after it commits, and a failed removal is reported, not rolled back.
pub(crate) fn sweep_scope(
    conn: &Connection,
    scope: &ResolvedScope,
    volumes: &dyn VolumeClassifier,
    default_assets: &[String],
    policy: &BusyPolicy,
    complete: bool,
) -> Result<SweepReport, ScanError> {
    let (mut report, orphans) = in_transaction(conn, policy, |conn| {
        let mut report = SweepReport {
            storage_id: scope.storage_id.clone(),
            ..Default::default()
        };

        let stale = scope.stale_media(conn)?;
        let ids: Vec<String> = stale.iter().map(|(id, _)| id.clone()).collect();
        if !ids.is_empty() && table_exists(conn, "tag_map")? {
            delete_tag_links(conn, &ids)?;
        }
        scope.delete_stale_media(conn)?;
        report.deleted_media = ids;

        let candidates: BTreeSet<String> = stale
            .into_iter()
            .filter_map(|(_, thumb)| thumb)
            .filter(|thumb| !default_assets.contains(thumb))
            .collect();
        let mut orphans = Vec::new();
        if !candidates.is_empty() {
            let tables = media_tables(conn)?;
            for thumb in candidates {
                if thumbnail_references(conn, &tables, &thumb)? == 0 {
                    orphans.push(thumb);
                }
            }
        }

        for (folder_id, path) in scope.stale_folders(conn)? {
            if volumes.is_volume_root(&scope.storage_id, &path) {
                continue;
            }
            if folder_is_empty(conn, &scope.table, &scope.storage_id, &folder_id, &path)? {
                conn.execute("DELETE FROM folder WHERE folder_id = ?1", params![folder_id])?;
                report.deleted_folders.push(folder_id);
            }
        }

        if complete {
            scope.set_scan_status(conn, ScanStatus::Complete)?;
        }
        Ok((report, orphans))
    })?;

    remove_thumbnails(&orphans, &mut report);
    log::info!(
        "swept {}: {} media, {} folders, {} thumbnails",
        scope.scope,
        report.deleted_media.len(),
        report.deleted_folders.len(),
        report.removed_thumbnails.len()
    );
    Ok(report)
}

/// Rows in any media table, valid or not, still pointing at `thumb`.
fn thumbnail_references(
    conn: &Connection,
    tables: &[MediaTable],
    thumb: &str,
) -> medialib_db::Result<i64> {
    let mut total = 0;
    for table in tables {
        let n: i64 = conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM {} WHERE thumbnail_path = ?1",
                quote_ident(&table.table)
            ),
            params![thumb],
            |row| row.get(0),
        )?;
        total += n;
    }
    Ok(total)
}

fn folder_is_empty(
    conn: &Connection,
    table: &str,
    storage_id: &str,
    folder_id: &str,
    path: &str,
) -> medialib_db::Result<bool> {
    let has_media: bool = conn.query_row(
        &format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE folder_id = ?1)",
            quote_ident(table)
        ),
        params![folder_id],
        |row| row.get(0),
    )?;
    if has_media {
        return Ok(false);
    }
    let has_children: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM folder WHERE storage_id = ?1
             AND (parent_folder_id = ?2 OR substr(path, 1, length(?3)) = ?3))",
        params![storage_id, folder_id, descendant_prefix(path)],
        |row| row.get(0),
    )?;
    Ok(!has_children)
}

fn remove_thumbnails(orphans: &[String], report: &mut SweepReport) {
    for path in orphans {
        match std::fs::remove_file(path) {
            Ok(()) => {
                log::debug!("removed thumbnail {}", path);
                report.removed_thumbnails.push(path.clone());
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::debug!("thumbnail {} already gone", path);
            }
            Err(e) => {
                log::warn!("could not remove thumbnail {}: {}", path, e);
                report.thumbnail_errors.push((path.clone(), e.to_string()));
            }
        }
    }
}

// ── Whole volumes ───────────────────────────────────────────────────────────

/// Unmount: detach the storage and mark every one of its rows stale at once.
///
/// Nothing is deleted; a later [`sweep_storage`] removes what is still stale,
/// and [`remount_storage`] brings the volume back. Returns the media rows marked.
pub fn invalidate_storage(
    conn: &Connection,
    registry: &SchemaRegistry,
    storage_id: &str,
    policy: &BusyPolicy,
) -> Result<usize, ScanError> {
    let scope = ResolvedScope::resolve(conn, &ScanScope::Storage(storage_id.to_string()))?;
    let marked = in_transaction(conn, policy, |conn| {
        set_storage_validity(conn, storage_id, false)?;
        set_storage_scan_status(conn, storage_id, ScanStatus::Stopped)?;
        if table_exists(conn, &scope.table)? {
            scope.mark_stale(conn)
        } else {
            Ok(0)
        }
    })?;
    ensure_union_view(conn, registry)?;
    log::info!("invalidated storage {} ({} media rows)", storage_id, marked);
    Ok(marked)
}

/// Delete every row of a storage still stale, e.g. after an unmount turned
/// out to be a permanent removal.
pub fn sweep_storage(
    conn: &Connection,
    volumes: &dyn VolumeClassifier,
    storage_id: &str,
    default_assets: &[String],
    policy: &BusyPolicy,
) -> Result<SweepReport, ScanError> {
    let scope = ResolvedScope::resolve(conn, &ScanScope::Storage(storage_id.to_string()))?;
    if !table_exists(conn, &scope.table)? {
        return Ok(SweepReport {
            storage_id: storage_id.to_string(),
            ..Default::default()
        });
    }
    sweep_scope(conn, &scope, volumes, default_assets, policy, false)
}

/// Mount again: the storage rejoins the union view, its rows stay stale until
/// the next scan revalidates or sweeps them.
pub fn remount_storage(
    conn: &Connection,
    registry: &SchemaRegistry,
    storage_id: &str,
) -> Result<(), ScanError> {
    get_storage(conn, storage_id)?;
    create_storage_table(conn, registry, storage_id)?;
    set_storage_validity(conn, storage_id, true)?;
    set_storage_scan_status(conn, storage_id, ScanStatus::Idle)?;
    ensure_union_view(conn, registry)?;
    log::info!("remounted storage {}", storage_id);
    Ok(())
}
