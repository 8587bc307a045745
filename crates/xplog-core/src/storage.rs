//! File system helpers: directories, listings, durability.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::Result;
use crate::naming;

// ─── Directory helpers ────────────────────────────────────────────────────────

pub fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)?;
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct LogFileInfo {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    pub subject: Option<u32>,
}

/// List files in `dir` named `{program}...{suffix}`, sorted by name.
///
/// With `program` unset, every file ending in `suffix` is listed.
pub fn list_log_files(dir: &Path, program: Option<&str>, suffix: &str) -> Result<Vec<LogFileInfo>> {
    if !dir.exists() {
        return Ok(vec![]);
    }
    let mut files = vec![];
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            continue;
        };
        // Rewrite snapshots are hidden files; never list them as logs.
        if name.starts_with('.') || !name.ends_with(suffix) {
            continue;
        }
        let subject = match program {
            Some(program) if !name.starts_with(program) => continue,
            Some(program) => naming::parse_ordinal(&name, program, suffix),
            None => None,
        };
        files.push(LogFileInfo {
            size: path.metadata()?.len(),
            name,
            path,
            subject,
        });
    }
    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}

// ─── Durability ──────────────────────────────────────────────────────────────

/// Sync a file's contents and metadata to disk.
pub fn fsync_file(file: &File) -> io::Result<()> {
    file.sync_all()
}

/// Sync a directory so created, renamed and removed entries survive a crash.
pub fn fsync_dir(dir: &Path) -> io::Result<()> {
    // Directories cannot be opened for sync on Windows.
    if cfg!(windows) {
        return Ok(());
    }
    OpenOptions::new().read(true).open(dir)?.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn lists_matching_files_only() {
        let tmp = TempDir::new().unwrap();
        for name in ["exp_02.xpd", "exp_01.xpd", "other_01.xpd", "exp_01.xpe", ".exp_01.xpd.x.tmp"] {
            fs::write(tmp.path().join(name), "abc").unwrap();
        }
        let files = list_log_files(tmp.path(), Some("exp"), ".xpd").unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["exp_01.xpd", "exp_02.xpd"]);
        assert_eq!(files[1].subject, Some(2));
        assert_eq!(files[0].size, 3);

        let all = list_log_files(tmp.path(), None, ".xpd").unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn missing_directory_lists_nothing() {
        let tmp = TempDir::new().unwrap();
        assert!(list_log_files(&tmp.path().join("x"), None, ".xpd").unwrap().is_empty());
    }

    #[test]
    fn fsync_helpers_succeed() {
        let tmp = TempDir::new().unwrap();
        let file = File::create(tmp.path().join("a")).unwrap();
        fsync_file(&file).unwrap();
        fsync_dir(tmp.path()).unwrap();
    }
}
