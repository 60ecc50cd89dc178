use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use owo_colors::OwoColorize;
use owo_colors::Stream::Stdout;
use rusqlite::Connection;
use walkdir::WalkDir;

use medialib_db::{Catalog, MediaType, VolumeClassifier};
use medialib_scan::{
    DiscoveredFile, ReconcileOptions, ScanError, ScanScope, SweepReport, begin_scan,
    sweep_storage,
};

use super::{Context, catalog_path, find_storage};
use crate::error::CliError;
use crate::spinner::ScanSpinner;

const IMAGE_EXT: &[(&str, &str)] = &[
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("heic", "image/heic"),
    ("bmp", "image/bmp"),
    ("tif", "image/tiff"),
    ("tiff", "image/tiff"),
    ("dng", "image/x-adobe-dng"),
];

const VIDEO_EXT: &[(&str, &str)] = &[
    ("mp4", "video/mp4"),
    ("m4v", "video/mp4"),
    ("mov", "video/quicktime"),
    ("mkv", "video/x-matroska"),
    ("webm", "video/webm"),
    ("avi", "video/x-msvideo"),
    ("3gp", "video/3gpp"),
];

const MUSIC_EXT: &[(&str, &str)] = &[
    ("mp3", "audio/mpeg"),
    ("flac", "audio/flac"),
    ("m4a", "audio/mp4"),
    ("aac", "audio/aac"),
    ("ogg", "audio/ogg"),
    ("opus", "audio/opus"),
    ("wav", "audio/wav"),
];

const SOUND_EXT: &[(&str, &str)] = &[("amr", "audio/amr"), ("3ga", "audio/3gpp")];

/// Media type and MIME type for a file, judged by extension.
pub(crate) fn classify(path: &Path) -> Option<(MediaType, &'static str)> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    let tables = [
        (MediaType::Image, IMAGE_EXT),
        (MediaType::Video, VIDEO_EXT),
        (MediaType::Music, MUSIC_EXT),
        (MediaType::Sound, SOUND_EXT),
    ];
    tables.into_iter().find_map(|(kind, table)| {
        table
            .iter()
            .find(|(e, _)| *e == ext)
            .map(|(_, mime)| (kind, *mime))
    })
}

fn discover(path: &Path, metadata: &std::fs::Metadata) -> Result<Option<DiscoveredFile>, CliError> {
    let Some((media_type, mime)) = classify(path) else {
        return Ok(None);
    };
    let modified = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    let mut file = DiscoveredFile::new(catalog_path(path)?, metadata.len() as i64, modified);
    file.media_type = media_type;
    file.mime_type = Some(mime.to_string());
    Ok(Some(file))
}

/// Scan a whole storage, or one folder of it, and sweep what was not found.
pub(crate) fn run_scan(
    ctx: &Context,
    storage_id: &str,
    folder: Option<PathBuf>,
    recursive: bool,
) -> Result<(), CliError> {
    let catalog = ctx.open_existing()?;
    let storage = find_storage(&catalog, storage_id)?;
    if !storage.validity {
        return Err(ScanError::Detached(storage.storage_id).into());
    }

    let walk_root = match &folder {
        Some(folder) => catalog_path(&std::path::absolute(folder)?)?,
        None => storage.root_path.clone(),
    };
    if !Path::new(&walk_root).is_dir() {
        return Err(CliError::usage(format!(
            "{walk_root} is not reachable; detach the storage instead of scanning it"
        )));
    }

    let (scope, max_depth) = if folder.is_some() {
        let folder_id = catalog.resolve_folder(storage_id, &walk_root)?;
        let depth = if recursive { usize::MAX } else { 1 };
        (ScanScope::Folder { folder_id, recursive }, depth)
    } else {
        if recursive {
            log::debug!("--recursive has no effect without --folder");
        }
        (ScanScope::Storage(storage_id.to_string()), usize::MAX)
    };

    log::info!(
        "{}",
        format!("Scanning {} ({})", walk_root, scope).if_supports_color(Stdout, |t| t.bold()),
    );

    let spinner = ScanSpinner::new(ctx.quiet);
    let options = ReconcileOptions::from_settings(&ctx.settings);
    let result = catalog.with_conn(|conn| {
        Ok(walk_and_reconcile(
            conn, &catalog, &walk_root, scope, max_depth, options, &spinner,
        ))
    });
    spinner.finish();
    let report = result??;
    print_report(&report);
    Ok(())
}

fn walk_and_reconcile(
    conn: &Connection,
    catalog: &Catalog,
    walk_root: &str,
    scope: ScanScope,
    max_depth: usize,
    options: ReconcileOptions,
    spinner: &ScanSpinner,
) -> Result<SweepReport, CliError> {
    let mut volumes = medialib_db::VolumeRoots::from_storages(conn)?;
    volumes.merge(&catalog.settings().volume_roots()?);
    let volumes: &dyn VolumeClassifier = &volumes;

    let mut session =
        begin_scan(conn, catalog.registry(), volumes, scope, options)?.with_progress(spinner);
    let mut skipped = 0usize;

    for entry in WalkDir::new(walk_root).max_depth(max_depth).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                // Unreadable entries are left stale and swept.
                log::warn!("skipping unreadable entry: {}", e);
                skipped += 1;
                continue;
            }
        };
        let path = entry.path();
        if entry.file_type().is_dir() {
            if entry.depth() == 0 || max_depth > 1 {
                session.observe_folder(&catalog_path(path)?)?;
            }
            continue;
        }
        if !entry.file_type().is_file() {
            continue;
        }
        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                log::warn!("skipping {}: {}", path.display(), e);
                skipped += 1;
                continue;
            }
        };
        if let Some(file) = discover(path, &metadata)? {
            session.observe(&file)?;
        }
    }

    if skipped > 0 {
        log::warn!("{} entries could not be read", skipped);
    }
    Ok(session.end_scan()?)
}

/// Delete the stale rows an unmount left behind.
pub(crate) fn run_sweep(ctx: &Context, storage_id: &str) -> Result<(), CliError> {
    let catalog = ctx.open_existing()?;
    find_storage(&catalog, storage_id)?;
    let volumes = catalog.volume_roots()?;
    let assets = &ctx.settings.thumbnails.default_assets;
    let policy = ctx.settings.busy_policy();
    let report = catalog
        .with_conn(|conn| Ok(sweep_storage(conn, &volumes, storage_id, assets, &policy)))??;
    print_report(&report);
    Ok(())
}

fn print_report(report: &SweepReport) {
    log::info!("");
    log::info!(
        "{}",
        format!("Storage {}", report.storage_id).if_supports_color(Stdout, |t| t.bold()),
    );
    log::info!("  New:             {:>6}", report.inserted.len());
    log::info!("  Updated:         {:>6}", report.updated.len());
    log::info!("  Unchanged:       {:>6}", report.revalidated.len());
    log::info!("  Removed:         {:>6}", report.deleted_media.len());
    log::info!("  Empty folders:   {:>6}", report.deleted_folders.len());
    log::info!("  Thumbnails:      {:>6}", report.removed_thumbnails.len());
    for (path, error) in &report.thumbnail_errors {
        log::warn!(
            "  {} could not remove {}: {}",
            "\u{26A0}".if_supports_color(Stdout, |t| t.yellow()),
            path,
            error,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_extension_case_insensitively() {
        assert_eq!(
            classify(Path::new("/mnt/sd/DCIM/IMG_0001.JPG")),
            Some((MediaType::Image, "image/jpeg"))
        );
        assert_eq!(
            classify(Path::new("/mnt/sd/Music/track.flac")),
            Some((MediaType::Music, "audio/flac"))
        );
        assert_eq!(
            classify(Path::new("/mnt/sd/clip.MOV")).map(|(kind, _)| kind),
            Some(MediaType::Video)
        );
        assert_eq!(classify(Path::new("/mnt/sd/notes.txt")), None);
        assert_eq!(classify(Path::new("/mnt/sd/README")), None);
    }
}
