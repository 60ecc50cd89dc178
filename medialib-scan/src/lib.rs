//! Keep the media catalog consistent with the filesystem.
//!
//! A scan marks its scope stale, revalidates or inserts every file the caller
//! observes, and finally sweeps whatever is still stale. Unmounting a volume
//! marks all of its rows stale at once; a later sweep or remount decides
//! their fate.

pub mod error;
pub mod progress;
pub mod scope;
pub mod session;
pub mod sweep;

pub use error::ScanError;
pub use progress::{LogScanProgress, ScanProgress, SilentScanProgress};
pub use scope::ScanScope;
pub use session::{
    DiscoveredFile, Observation, ReconcileOptions, ScanSession, ScanStats, begin_scan,
};
pub use sweep::{SweepReport, invalidate_storage, remount_storage, sweep_storage};
