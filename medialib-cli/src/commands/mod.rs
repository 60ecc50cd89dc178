pub(crate) mod config;
pub(crate) mod init;
pub(crate) mod scan;
pub(crate) mod storage;
pub(crate) mod view;

use std::path::{Path, PathBuf};

use medialib_db::{Catalog, CatalogSettings, StorageRecord, normalize_path, settings_path};

use crate::cli_types::Cli;
use crate::error::CliError;

/// Settings resolved from the config file and the global flags.
pub(crate) struct Context {
    pub settings: CatalogSettings,
    pub settings_path: PathBuf,
    pub quiet: bool,
}

impl Context {
    pub(crate) fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        let settings_path = cli.config.clone().unwrap_or_else(settings_path);
        let mut settings = CatalogSettings::load(&settings_path)?;
        if let Some(db) = &cli.db {
            settings.database.path = Some(db.clone());
        }
        Ok(Self {
            settings,
            settings_path,
            quiet: cli.quiet,
        })
    }

    pub(crate) fn database_path(&self) -> PathBuf {
        self.settings.database_path()
    }

    /// Open (and if needed create or upgrade) the catalog.
    pub(crate) fn open_catalog(&self) -> Result<Catalog, CliError> {
        Ok(Catalog::open(self.settings.clone())?)
    }

    /// Open the catalog, refusing to create one that does not exist yet.
    pub(crate) fn open_existing(&self) -> Result<Catalog, CliError> {
        let path = self.database_path();
        if !path.exists() {
            return Err(CliError::usage(format!(
                "no catalog at {}; run 'medialib init' first",
                path.display()
            )));
        }
        self.open_catalog()
    }
}

/// Normalized UTF-8 form of a filesystem path, as stored in the catalog.
pub(crate) fn catalog_path(path: &Path) -> Result<String, CliError> {
    let Some(s) = path.to_str() else {
        return Err(CliError::usage(format!(
            "path is not valid UTF-8: {}",
            path.display()
        )));
    };
    Ok(normalize_path(s)?)
}

pub(crate) fn find_storage(catalog: &Catalog, storage_id: &str) -> Result<StorageRecord, CliError> {
    catalog
        .list_storages()?
        .into_iter()
        .find(|s| s.storage_id == storage_id)
        .ok_or_else(|| CliError::usage(format!("unknown storage '{storage_id}'")))
}

/// Truncate a string to a maximum width, appending "..." if needed.
pub(crate) fn truncate_str(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else if max > 3 {
        let head: String = s.chars().take(max - 3).collect();
        format!("{head}...")
    } else {
        s.chars().take(max).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_str("short", 10), "short");
        assert_eq!(truncate_str("/mnt/sd/DCIM", 8), "/mnt/...");
        assert_eq!(truncate_str("ééééé", 4), "é...");
        assert_eq!(truncate_str("abcdef", 2), "ab");
    }

    #[test]
    fn catalog_paths_are_normalized() {
        assert_eq!(catalog_path(Path::new("/mnt/sd/")).unwrap(), "/mnt/sd");
        assert!(catalog_path(Path::new("relative")).is_err());
    }
}
