//! medialib CLI
//!
//! Command-line interface for maintaining a media catalog: schema setup,
//! volume registration, scans and sweeps.

mod cli_types;
mod commands;
mod error;
mod spinner;

use std::io::Write;

use clap::Parser;
use owo_colors::OwoColorize;
use owo_colors::Stream::Stderr;

use cli_types::{Cli, Commands, ConfigAction, StorageAction, ViewAction};
use commands::Context;
use error::CliError;

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    if let Err(e) = run(cli) {
        log::error!("{}", e);
        if e.is_fatal() {
            eprintln!(
                "{}",
                "The catalog is unusable until it is repaired or recreated."
                    .if_supports_color(Stderr, |t| t.red()),
            );
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let ctx = Context::from_cli(&cli)?;

    match cli.command {
        Commands::Init => commands::init::run_init(&ctx),
        Commands::Version => commands::init::run_version(&ctx),
        Commands::Check => commands::init::run_check(&ctx),
        Commands::Storage { action } => match action {
            StorageAction::Add {
                storage_id,
                root,
                name,
                kind,
            } => commands::storage::run_storage_add(&ctx, storage_id, root, name, kind.into()),
            StorageAction::List => commands::storage::run_storage_list(&ctx),
            StorageAction::Detach { storage_id } => {
                commands::storage::run_storage_detach(&ctx, &storage_id)
            }
            StorageAction::Attach { storage_id } => {
                commands::storage::run_storage_attach(&ctx, &storage_id)
            }
            StorageAction::Remove { storage_id } => {
                commands::storage::run_storage_remove(&ctx, &storage_id)
            }
        },
        Commands::Scan {
            storage_id,
            folder,
            recursive,
        } => commands::scan::run_scan(&ctx, &storage_id, folder, recursive),
        Commands::Sweep { storage_id } => commands::scan::run_sweep(&ctx, &storage_id),
        Commands::View { action } => match action {
            ViewAction::Refresh { force } => commands::view::run_view_refresh(&ctx, force),
        },
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config::run_config_show(&ctx),
            ConfigAction::Path => {
                commands::config::run_config_path(&ctx);
                Ok(())
            }
        },
    }
}

/// Route `log` output to stderr. Plain messages by default; `--verbose`
/// adds timestamps and debug output, `--quiet` keeps warnings and errors.
fn init_logging(verbose: bool, quiet: bool) {
    let default = if quiet { "warn" } else { "info" };
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default));
    if verbose {
        builder.filter_level(log::LevelFilter::Debug);
        builder.format_timestamp_millis();
    } else {
        builder.format(|buf, record| match record.level() {
            log::Level::Info => writeln!(buf, "{}", record.args()),
            level => writeln!(
                buf,
                "{}: {}",
                level.as_str().to_lowercase(),
                record.args()
            ),
        });
    }
    builder.init();
}
