//! CLI type definitions: command enums and argument structs.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use medialib_db::StorageKind;

#[derive(Parser)]
#[command(name = "medialib")]
#[command(about = "Maintain an on-device media catalog", long_about = None)]
pub(crate) struct Cli {
    /// Settings file (defaults to the platform config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Catalog database, overriding the settings file
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Only show warnings and errors (suppress normal output)
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Enable verbose/debug logging (timestamps + debug-level messages)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Create or upgrade the catalog database
    Init,

    /// Show the tool, schema and database versions
    Version,

    /// Run an integrity check on the catalog
    Check,

    /// Manage registered storage volumes
    Storage {
        #[command(subcommand)]
        action: StorageAction,
    },

    /// Reconcile the catalog with what is on disk
    Scan {
        /// Storage to scan
        storage_id: String,

        /// Only scan this folder instead of the whole volume
        #[arg(long)]
        folder: Option<PathBuf>,

        /// With --folder, include every subfolder
        #[arg(short, long)]
        recursive: bool,
    },

    /// Delete rows left stale by an unmount
    Sweep {
        /// Storage to sweep
        storage_id: String,
    },

    /// Maintain the union view over all media tables
    View {
        #[command(subcommand)]
        action: ViewAction,
    },

    /// Inspect the settings file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub(crate) enum StorageAction {
    /// Register a volume (or refresh an existing one)
    Add {
        /// Short id, used in table names (letters, digits, '_')
        storage_id: String,

        /// Mount point of the volume
        root: PathBuf,

        /// Display name (defaults to the id)
        #[arg(long)]
        name: Option<String>,

        #[arg(long, value_enum, default_value_t = KindArg::External)]
        kind: KindArg,
    },

    /// List registered volumes
    List,

    /// Mark a volume unmounted; its rows stay until swept or rescanned
    Detach { storage_id: String },

    /// Bring a detached volume back
    Attach { storage_id: String },

    /// Forget a volume and drop its media table
    Remove { storage_id: String },
}

#[derive(Subcommand)]
pub(crate) enum ViewAction {
    /// Rebuild the union view if the storage set changed
    Refresh {
        /// Rebuild even if the view looks current
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Print the effective settings
    Show,

    /// Print the settings file path
    Path,
}

#[derive(Clone, Copy, ValueEnum)]
pub(crate) enum KindArg {
    Internal,
    External,
    Cloud,
}

impl From<KindArg> for StorageKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Internal => StorageKind::Internal,
            KindArg::External => StorageKind::External,
            KindArg::Cloud => StorageKind::Cloud,
        }
    }
}
