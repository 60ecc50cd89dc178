use std::path::PathBuf;

use owo_colors::OwoColorize;
use owo_colors::Stream::Stdout;

use medialib_db::{INTERNAL_STORAGE_ID, NewStorage, StorageKind, count_storage_media};
use medialib_scan::{invalidate_storage, remount_storage};

use super::{Context, catalog_path, find_storage, truncate_str};
use crate::error::CliError;

pub(crate) fn run_storage_add(
    ctx: &Context,
    storage_id: String,
    root: PathBuf,
    name: Option<String>,
    kind: StorageKind,
) -> Result<(), CliError> {
    let root = catalog_path(&std::path::absolute(&root)?)?;
    if !std::path::Path::new(&root).is_dir() {
        log::warn!("{} is not a directory right now; registering anyway", root);
    }
    let catalog = ctx.open_catalog()?;
    let record = catalog.register_storage(&NewStorage {
        name: name.unwrap_or_else(|| storage_id.clone()),
        storage_id,
        root_path: root,
        kind,
    })?;
    log::info!(
        "{} Registered {} at {}",
        "\u{2714}".if_supports_color(Stdout, |t| t.green()),
        record.storage_id.if_supports_color(Stdout, |t| t.bold()),
        record.root_path,
    );
    Ok(())
}

pub(crate) fn run_storage_list(ctx: &Context) -> Result<(), CliError> {
    let catalog = ctx.open_existing()?;
    let storages = catalog.list_storages()?;

    log::info!(
        "{}",
        format!(
            "{:<12} {:<16} {:<9} {:<10} {:>8}  {}",
            "ID", "NAME", "KIND", "STATUS", "MEDIA", "ROOT"
        )
        .if_supports_color(Stdout, |t| t.bold()),
    );
    for storage in storages {
        let rows = catalog.with_conn(|conn| count_storage_media(conn, &storage.storage_id))?;
        let rows = rows.map_or_else(|| "-".to_string(), |n| n.to_string());
        let status = if storage.validity {
            format!("{:?}", storage.scan_status).to_lowercase()
        } else {
            "detached".to_string()
        };
        let line = format!(
            "{:<12} {:<16} {:<9} {:<10} {:>8}  {}",
            truncate_str(&storage.storage_id, 12),
            truncate_str(&storage.name, 16),
            storage.kind.as_str(),
            status,
            rows,
            storage.root_path,
        );
        if storage.validity {
            log::info!("{}", line);
        } else {
            log::info!("{}", line.if_supports_color(Stdout, |t| t.dimmed()));
        }
    }
    Ok(())
}

/// Unmount: hide the storage and mark its rows stale without deleting them.
pub(crate) fn run_storage_detach(ctx: &Context, storage_id: &str) -> Result<(), CliError> {
    guard_internal(storage_id)?;
    let catalog = ctx.open_existing()?;
    find_storage(&catalog, storage_id)?;
    let policy = ctx.settings.busy_policy();
    let marked = catalog
        .with_conn(|conn| Ok(invalidate_storage(conn, catalog.registry(), storage_id, &policy)))??;
    log::info!(
        "Detached {} ({} media rows kept until swept or rescanned)",
        storage_id.if_supports_color(Stdout, |t| t.bold()),
        marked,
    );
    Ok(())
}

pub(crate) fn run_storage_attach(ctx: &Context, storage_id: &str) -> Result<(), CliError> {
    let catalog = ctx.open_existing()?;
    find_storage(&catalog, storage_id)?;
    catalog.with_conn(|conn| Ok(remount_storage(conn, catalog.registry(), storage_id)))??;
    log::info!(
        "Attached {}; run 'medialib scan {}' to revalidate its media",
        storage_id.if_supports_color(Stdout, |t| t.bold()),
        storage_id,
    );
    Ok(())
}

pub(crate) fn run_storage_remove(ctx: &Context, storage_id: &str) -> Result<(), CliError> {
    guard_internal(storage_id)?;
    let catalog = ctx.open_existing()?;
    find_storage(&catalog, storage_id)?;
    catalog.remove_storage(storage_id)?;
    log::info!(
        "{} Removed {}",
        "\u{2714}".if_supports_color(Stdout, |t| t.green()),
        storage_id,
    );
    Ok(())
}

fn guard_internal(storage_id: &str) -> Result<(), CliError> {
    if storage_id == INTERNAL_STORAGE_ID {
        return Err(CliError::usage("the internal storage cannot be detached or removed"));
    }
    Ok(())
}
