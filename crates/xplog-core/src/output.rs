//! Line-oriented output file shared by data and event files.

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDateTime;
use tracing::info;

use crate::error::Result;
use crate::sink::BufferedSink;
use crate::storage;

/// Format of the `#date:` header comment.
const DATE_FORMAT: &str = "%a %b %d %Y %H:%M:%S";

#[derive(Debug)]
pub struct OutputFile {
    sink: BufferedSink,
    suffix: String,
    comment_char: char,
    eol: String,
}

impl OutputFile {
    /// Create `directory/file_name`, making the directory if needed, and
    /// queue the version comment (plus the date comment when `started_at` is known).
    pub fn create(
        directory: &Path,
        file_name: &str,
        suffix: &str,
        comment_char: char,
        eol: &str,
        started_at: Option<&NaiveDateTime>,
    ) -> Result<Self> {
        storage::ensure_dir(directory)?;
        let path = directory.join(file_name);
        let sink = BufferedSink::create(&path)?;
        info!(path = %path.display(), "Created output file");

        let mut file = Self {
            sink,
            suffix: suffix.to_string(),
            comment_char,
            eol: eol.to_string(),
        };
        file.write_comment(format!(
            "xplog {}, {}-file",
            env!("CARGO_PKG_VERSION"),
            suffix
        ));
        if let Some(started_at) = started_at {
            file.write_comment(format!("date: {}", started_at.format(DATE_FORMAT)));
        }
        Ok(file)
    }

    pub fn path(&self) -> &Path {
        self.sink.path()
    }

    pub fn file_name(&self) -> String {
        self.path()
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    pub fn directory(&self) -> PathBuf {
        self.path()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    pub fn comment_char(&self) -> char {
        self.comment_char
    }

    pub fn eol(&self) -> &str {
        &self.eol
    }

    pub fn write(&mut self, content: impl Display) {
        self.sink.write(content);
    }

    pub fn write_line(&mut self, content: impl Display) {
        self.sink.write(content);
        self.sink.write(&self.eol);
    }

    /// Write `content` as a comment line (prefixed by the comment char).
    pub fn write_comment(&mut self, content: impl Display) {
        self.sink.write(self.comment_char);
        self.write_line(content);
    }

    pub fn has_pending(&self) -> bool {
        self.sink.has_pending()
    }

    /// Flush buffered lines to disk.
    pub fn save(&mut self) -> Result<Duration> {
        self.sink.flush()
    }

    /// Rename within the same directory (or to an absolute path).
    pub fn rename(&mut self, new_file_name: impl AsRef<Path>) -> Result<()> {
        self.sink.rename(new_file_name)
    }

    pub(crate) fn sink_mut(&mut self) -> &mut BufferedSink {
        &mut self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn header_comments_and_lines() {
        let tmp = TempDir::new().unwrap();
        let started = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(14, 5, 7)
            .unwrap();
        let dir = tmp.path().join("nested");
        let mut file =
            OutputFile::create(&dir, "a.xpd", ".xpd", '#', "\n", Some(&started)).unwrap();
        file.write_line("hello");
        file.save().unwrap();

        let content = fs::read_to_string(dir.join("a.xpd")).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert!(lines[0].starts_with("#xplog "));
        assert!(lines[0].ends_with(", .xpd-file"));
        assert_eq!(lines[1], "#date: Sat Mar 09 2024 14:05:07");
        assert_eq!(lines[2], "hello");
    }
}
