//! Crash recovery for interrupted header rewrites.
//!
//! While a data file's header is rewritten, its complete prior content lives
//! in a hidden snapshot `.<name>.<uuid>.tmp` in the same directory. If the
//! process dies before the snapshot is deleted, that snapshot is the
//! authoritative copy: the canonical file may be missing or half-written.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{info, warn};

use crate::error::{Result, XplogError};
use crate::naming;
use crate::storage;

/// Rewrite snapshots left behind for `path`, newest first.
pub fn find_recovery_artifacts(path: &Path) -> Result<Vec<PathBuf>> {
    let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
        return Ok(vec![]);
    };
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    if !dir.is_dir() {
        return Ok(vec![]);
    }

    let mut found: Vec<(SystemTime, PathBuf)> = vec![];
    for entry in fs::read_dir(&dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if naming::is_temp_name_for(name, file_name) {
            let modified = entry.metadata()?.modified()?;
            found.push((modified, entry.path()));
        }
    }
    found.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));
    Ok(found.into_iter().map(|(_, p)| p).collect())
}

/// Restore `path` from its newest snapshot, replacing whatever is there.
///
/// Older snapshots are left untouched for inspection. Returns the snapshot used.
pub fn recover(path: &Path) -> Result<PathBuf> {
    let artifacts = find_recovery_artifacts(path)?;
    let newest = artifacts
        .into_iter()
        .next()
        .ok_or_else(|| XplogError::NoRecoveryArtifact(path.to_path_buf()))?;

    if path.exists() {
        warn!(path = %path.display(), "Replacing possibly partial file with snapshot");
    }
    fs::rename(&newest, path)?;
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        storage::fsync_dir(dir)?;
    }
    info!(path = %path.display(), from = %newest.display(), "Recovered data file");
    Ok(newest)
}
