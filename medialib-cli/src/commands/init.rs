use owo_colors::OwoColorize;
use owo_colors::Stream::Stdout;
use rusqlite::{Connection, OpenFlags};

use medialib_db::{
    NewStorage, count_media, count_storage_media, current_schema_version, latest_schema_version,
};

use super::Context;
use crate::error::CliError;

/// Create or upgrade the catalog and register volumes declared in the settings.
pub(crate) fn run_init(ctx: &Context) -> Result<(), CliError> {
    let path = ctx.database_path();
    let existed = path.exists();
    let catalog = ctx.open_catalog()?;

    for volume in &ctx.settings.volumes {
        let record = catalog.register_storage(&NewStorage {
            storage_id: volume.storage_id.clone(),
            name: volume.name.clone(),
            root_path: volume.root.clone(),
            kind: volume.kind,
        })?;
        log::info!(
            "  {} {} ({})",
            "\u{2714}".if_supports_color(Stdout, |t| t.green()),
            record.storage_id,
            record.root_path,
        );
    }

    let version = catalog.schema_version()?;
    let verb = if existed { "Opened" } else { "Created" };
    log::info!(
        "{} {} (schema v{})",
        verb.if_supports_color(Stdout, |t| t.bold()),
        path.display(),
        version,
    );
    catalog.close()?;
    Ok(())
}

/// Print tool and schema versions without migrating anything.
pub(crate) fn run_version(ctx: &Context) -> Result<(), CliError> {
    log::info!("medialib {}", env!("CARGO_PKG_VERSION"));
    log::info!("  Latest schema:   v{}", latest_schema_version());

    let path = ctx.database_path();
    if !path.exists() {
        log::info!(
            "  Catalog:         {}",
            "not created".if_supports_color(Stdout, |t| t.dimmed())
        );
        return Ok(());
    }
    let conn = Connection::open_with_flags(&path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .map_err(medialib_db::DbError::from)?;
    let version = current_schema_version(&conn)?;
    let note = if version < latest_schema_version() {
        " (run 'medialib init' to upgrade)"
    } else {
        ""
    };
    log::info!("  Catalog schema:  v{}{}", version, note);
    log::info!("  Catalog:         {}", path.display());
    Ok(())
}

/// Check database integrity and that every storage's table is in place.
pub(crate) fn run_check(ctx: &Context) -> Result<(), CliError> {
    let catalog = ctx.open_existing()?;
    catalog.check_integrity()?;
    log::info!(
        "{} integrity check passed (schema v{})",
        "\u{2714}".if_supports_color(Stdout, |t| t.green()),
        catalog.schema_version()?,
    );

    let mut missing = 0;
    for storage in catalog.list_storages()? {
        let rows = catalog.with_conn(|conn| count_storage_media(conn, &storage.storage_id))?;
        if rows.is_none() && storage.validity {
            missing += 1;
            log::warn!(
                "  {} storage {} has no media table; rescan it",
                "\u{26A0}".if_supports_color(Stdout, |t| t.yellow()),
                storage.storage_id,
            );
        }
    }
    if catalog.refresh_union_view()? {
        log::info!("  Union view was stale and has been rebuilt");
    }
    log::info!("  Visible media:   {}", catalog.with_conn(count_media)?);
    if missing > 0 {
        return Err(CliError::check(format!("{missing} storage table(s) missing")));
    }
    Ok(())
}
