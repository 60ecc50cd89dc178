use super::Context;
use crate::error::CliError;

/// Print the effective settings, flags applied, as TOML.
pub(crate) fn run_config_show(ctx: &Context) -> Result<(), CliError> {
    let rendered = toml::to_string_pretty(&ctx.settings).map_err(medialib_db::SettingsError::from)?;
    log::info!("# {}", ctx.settings_path.display());
    log::info!("# database: {}", ctx.database_path().display());
    for line in rendered.lines() {
        log::info!("{}", line);
    }
    Ok(())
}

pub(crate) fn run_config_path(ctx: &Context) {
    println!("{}", ctx.settings_path.display());
}
