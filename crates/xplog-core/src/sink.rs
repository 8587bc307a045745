//! Buffered file sink: an in-memory append buffer over a single file path.
//!
//! `write()` never touches the disk. `flush()` appends everything pending in
//! one write and only then clears the buffer, so a failed flush can be retried
//! without losing or duplicating bytes.

use std::fmt::Display;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::Result;

#[derive(Debug)]
pub struct BufferedSink {
    path: PathBuf,
    pending: Vec<String>,
}

impl BufferedSink {
    /// Create (or truncate) the file at `path` and return an empty sink over it.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        fs::File::create(&path)?;
        Ok(Self {
            path,
            pending: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Queue the display form of `content`. No I/O.
    pub fn write(&mut self, content: impl Display) {
        self.pending.push(content.to_string());
    }

    /// Queue raw bytes, which must be valid UTF-8.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let text = std::str::from_utf8(bytes)?;
        self.pending.push(text.to_string());
        Ok(())
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Number of bytes waiting to be flushed.
    pub fn pending_bytes(&self) -> usize {
        self.pending.iter().map(String::len).sum()
    }

    /// Append all pending content to the file in a single write.
    pub fn flush(&mut self) -> Result<Duration> {
        let start = Instant::now();
        if self.pending.is_empty() {
            return Ok(start.elapsed());
        }
        let chunk = self.pending.concat();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(chunk.as_bytes())?;
        self.pending.clear();
        debug!(path = %self.path.display(), bytes = chunk.len(), "Flushed buffer");
        Ok(start.elapsed())
    }

    /// Flush, then move the file to `new_path`.
    ///
    /// A relative `new_path` is taken relative to the file's current directory.
    pub fn rename(&mut self, new_path: impl AsRef<Path>) -> Result<()> {
        self.flush()?;
        let new_path = match self.path.parent() {
            Some(dir) if new_path.as_ref().is_relative() => dir.join(new_path),
            _ => new_path.as_ref().to_path_buf(),
        };
        fs::rename(&self.path, &new_path)?;
        debug!(from = %self.path.display(), to = %new_path.display(), "Renamed file");
        self.path = new_path;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::XplogError;
    use tempfile::TempDir;

    #[test]
    fn create_leaves_empty_file() {
        let tmp = TempDir::new().unwrap();
        let sink = BufferedSink::create(tmp.path().join("a.txt")).unwrap();
        assert_eq!(fs::read_to_string(sink.path()).unwrap(), "");
        assert!(!sink.has_pending());
    }

    #[test]
    fn write_is_buffered_until_flush() {
        let tmp = TempDir::new().unwrap();
        let mut sink = BufferedSink::create(tmp.path().join("a.txt")).unwrap();
        sink.write("x=");
        sink.write(3);
        assert_eq!(sink.pending_bytes(), 3);
        assert_eq!(fs::read_to_string(sink.path()).unwrap(), "");
        sink.flush().unwrap();
        assert_eq!(fs::read_to_string(sink.path()).unwrap(), "x=3");
    }

    #[test]
    fn flush_twice_writes_once() {
        let tmp = TempDir::new().unwrap();
        let mut sink = BufferedSink::create(tmp.path().join("a.txt")).unwrap();
        sink.write("row\n");
        sink.flush().unwrap();
        sink.flush().unwrap();
        assert_eq!(fs::read_to_string(sink.path()).unwrap(), "row\n");
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let mut sink = BufferedSink::create(tmp.path().join("a.txt")).unwrap();
        let err = sink.write_bytes(&[0x66, 0xff, 0x66]).unwrap_err();
        assert!(matches!(err, XplogError::Encoding(_)));
        assert!(!sink.has_pending());
    }

    #[test]
    fn rename_flushes_first() {
        let tmp = TempDir::new().unwrap();
        let mut sink = BufferedSink::create(tmp.path().join("a.txt")).unwrap();
        sink.write("kept\n");
        sink.rename("b.txt").unwrap();
        assert!(!tmp.path().join("a.txt").exists());
        assert_eq!(sink.path(), tmp.path().join("b.txt"));
        assert_eq!(fs::read_to_string(sink.path()).unwrap(), "kept\n");
    }
}
