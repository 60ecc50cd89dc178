use owo_colors::OwoColorize;
use owo_colors::Stream::Stdout;

use medialib_db::rebuild_union_view;

use super::Context;
use crate::error::CliError;

/// Rebuild the union view when the storage set moved on, or always with `force`.
pub(crate) fn run_view_refresh(ctx: &Context, force: bool) -> Result<(), CliError> {
    let catalog = ctx.open_existing()?;
    if !force {
        if catalog.refresh_union_view()? {
            log::info!("Union view rebuilt");
        } else {
            log::info!(
                "{}",
                "Union view is current".if_supports_color(Stdout, |t| t.dimmed())
            );
        }
        return Ok(());
    }

    let report = catalog.with_conn(|conn| rebuild_union_view(conn, catalog.registry()))?;
    log::info!("Union view rebuilt over {} table(s)", report.tables.len());
    for table in &report.tables {
        log::info!("  {}", table);
    }
    for table in &report.skipped {
        log::warn!(
            "  {} {} is registered but has no table",
            "\u{26A0}".if_supports_color(Stdout, |t| t.yellow()),
            table,
        );
    }
    Ok(())
}
