//! Default storage locations.

use std::path::PathBuf;

/// App data root: `~/Library/Application Support/jobtrail/` (macOS) or
/// `~/.local/share/jobtrail/` (Linux).
pub fn app_data_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("jobtrail"))
}

/// Job store root: `<app_data_dir>/jobs/`. One subdirectory per router.
pub fn default_jobs_root() -> Option<PathBuf> {
    app_data_dir().map(|d| d.join("jobs"))
}
