//! Online snapshots of the single-file database
//!
//! Uses SQLite's backup API on a separate connection so the pool stays in
//! use while pages are copied.

use std::path::{Path, PathBuf};

use tracing::info;

use super::models::current_timestamp;
use crate::error::NexusError;

/// Copy the database at `source` into `backups_dir/nexus-<ts>.db`
pub fn snapshot_database(source: &str, backups_dir: &Path) -> Result<PathBuf, NexusError> {
    if source == ":memory:" {
        return Err(NexusError::InvalidInput(
            "in-memory database cannot be snapshotted".into(),
        ));
    }

    std::fs::create_dir_all(backups_dir)?;
    let stamp = current_timestamp().replace([':', '.'], "-");
    let target = backups_dir.join(format!("nexus-{}.db", stamp));

    let src = rusqlite::Connection::open(source)
        .map_err(|e| NexusError::Database(format!("Failed to open source database: {}", e)))?;
    let mut dst = rusqlite::Connection::open(&target)
        .map_err(|e| NexusError::Database(format!("Failed to open backup file: {}", e)))?;

    let backup = rusqlite::backup::Backup::new(&src, &mut dst)
        .map_err(|e| NexusError::Database(format!("Failed to initialize backup: {}", e)))?;
    backup
        .step(-1)
        .map_err(|e| NexusError::Database(format!("Backup failed: {}", e)))?;

    info!(path = %target.display(), "Database snapshot written");
    Ok(target)
}
