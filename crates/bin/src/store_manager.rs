//! Database location and opening.

use factorhub_data::{DataError, SqliteStore};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Get the default data directory path.
///
/// Uses platform-specific cache directories:
/// - Linux: `~/.cache/factorhub/`
/// - macOS: `~/Library/Caches/factorhub/`
/// - Windows: `%LOCALAPPDATA%\factorhub\`
pub(crate) fn default_data_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("factorhub")
}

/// Get the default database path.
pub(crate) fn default_db_path() -> PathBuf {
    default_data_dir().join("factorhub.db")
}

/// Open the store at `path`, creating the directory if needed.
pub(crate) fn open_store(path: &Path) -> Result<SqliteStore, DataError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    debug!(path = %path.display(), "opening store");
    SqliteStore::new(path)
}
