//! Catalog settings loaded from `~/.config/medialib/settings.toml`.
//!
//! Every field has a default, so a missing file or a partial one is fine.
//! The CLI's `--config` and `--db` flags override what is read here.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::batch::{BatchOptions, DEFAULT_CHUNK_BYTES};
use crate::busy::BusyPolicy;
use crate::folder::VolumeRoots;
use crate::schema::OpenOptions;
use crate::storage::StorageKind;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("cannot serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid volume entry: {0}")]
    Volume(#[from] crate::error::DbError),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogSettings {
    pub database: DatabaseSettings,
    pub busy: BusySettings,
    pub batch: BatchSettings,
    pub thumbnails: ThumbnailSettings,
    pub volumes: Vec<VolumeSettings>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Catalog file; `None` means [`default_database_path`].
    pub path: Option<PathBuf>,
    pub verify_integrity: bool,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: None,
            verify_integrity: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusySettings {
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

impl Default for BusySettings {
    fn default() -> Self {
        let policy = BusyPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            backoff_ms: policy.backoff.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    pub chunk_bytes: usize,
    /// Statements a scan session queues before flushing on its own.
    pub flush_threshold: usize,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            chunk_bytes: DEFAULT_CHUNK_BYTES,
            flush_threshold: 500,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThumbnailSettings {
    /// Bundled thumbnails shared by many rows; never deleted by a sweep.
    pub default_assets: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeSettings {
    pub storage_id: String,
    pub name: String,
    pub root: String,
    #[serde(default = "default_kind")]
    pub kind: StorageKind,
}

fn default_kind() -> StorageKind {
    StorageKind::External
}

/// Canonical path to the settings file: `~/.config/medialib/settings.toml`.
pub fn settings_path() -> PathBuf {
    let config = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    config.join("medialib").join("settings.toml")
}

/// Default catalog location: `~/.local/share/medialib/catalog.db` or the
/// platform equivalent.
pub fn default_database_path() -> PathBuf {
    let data = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
    data.join("medialib").join("catalog.db")
}

impl CatalogSettings {
    /// Read settings from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::debug!("no settings at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(SettingsError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        toml::from_str(&contents).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load_default() -> Result<Self, SettingsError> {
        Self::load(&settings_path())
    }

    /// Write the settings atomically (temp file, then rename).
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        let io_err = |source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let serialized = toml::to_string_pretty(self)?;
        let tmp = path.with_extension("toml.tmp");
        std::fs::write(&tmp, &serialized).map_err(io_err)?;
        std::fs::rename(&tmp, path).map_err(io_err)?;
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .unwrap_or_else(default_database_path)
    }

    pub fn busy_policy(&self) -> BusyPolicy {
        BusyPolicy {
            max_attempts: self.busy.max_attempts.max(1),
            backoff: Duration::from_millis(self.busy.backoff_ms),
        }
    }

    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            chunk_bytes: self.batch.chunk_bytes.max(1),
            busy: self.busy_policy(),
        }
    }

    pub fn open_options(&self) -> OpenOptions {
        OpenOptions {
            busy: self.busy_policy(),
            verify_integrity: self.database.verify_integrity,
        }
    }

    /// Volume roots declared in the settings file.
    pub fn volume_roots(&self) -> Result<VolumeRoots, SettingsError> {
        let mut roots = VolumeRoots::new();
        for volume in &self.volumes {
            roots.insert(&volume.storage_id, &volume.root)?;
        }
        Ok(roots)
    }

    pub fn is_default_asset(&self, thumbnail: &str) -> bool {
        self.thumbnails.default_assets.iter().any(|a| a == thumbnail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_fills_defaults() {
        let settings: CatalogSettings = toml::from_str(
            r#"
            [busy]
            max_attempts = 3

            [[volumes]]
            storage_id = "sd"
            name = "SD card"
            root = "/mnt/sd"
            "#,
        )
        .unwrap();
        assert_eq!(settings.busy.max_attempts, 3);
        assert_eq!(settings.busy.backoff_ms, 50);
        assert_eq!(settings.batch.chunk_bytes, DEFAULT_CHUNK_BYTES);
        assert!(settings.database.verify_integrity);
        assert_eq!(settings.volumes[0].kind, StorageKind::External);
    }

    #[test]
    fn zero_attempts_still_tries_once() {
        let mut settings = CatalogSettings::default();
        settings.busy.max_attempts = 0;
        assert_eq!(settings.busy_policy().max_attempts, 1);
    }
}
