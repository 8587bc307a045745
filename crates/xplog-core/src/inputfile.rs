//! Line-based input file, e.g. a trial list or stimulus list.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::Result;

#[derive(Debug, Clone)]
pub struct InputFile {
    path: PathBuf,
    lines: Vec<String>,
    current_line: usize,
}

impl InputFile {
    /// Read every line of `path`, line terminators stripped.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = fs::read_to_string(&path).map_err(|e| {
            io::Error::new(
                e.kind(),
                format!("the input file '{}' could not be read: {e}", path.display()),
            )
        })?;
        Ok(Self {
            lines: content.lines().map(str::to_string).collect(),
            path,
            current_line: 1,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn n_lines(&self) -> usize {
        self.lines.len()
    }

    /// 1-based number of the line `next_line()` returns next.
    pub fn current_line(&self) -> usize {
        self.current_line
    }

    /// Line `number` (1-based), `None` when out of range.
    pub fn get_line(&self, number: usize) -> Option<&str> {
        number
            .checked_sub(1)
            .and_then(|i| self.lines.get(i))
            .map(String::as_str)
    }

    /// The current line; advances until the last line, which then repeats.
    pub fn next_line(&mut self) -> Option<&str> {
        let current = self.current_line;
        if current < self.lines.len() {
            self.current_line += 1;
        }
        self.lines.get(current - 1).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn reads_lines_and_walks_cursor() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("trials.txt");
        fs::write(&path, "red,1\r\ngreen,2\nblue,3\n").unwrap();

        let mut file = InputFile::open(&path).unwrap();
        assert_eq!(file.n_lines(), 3);
        assert_eq!(file.get_line(1), Some("red,1"));
        assert_eq!(file.get_line(0), None);
        assert_eq!(file.get_line(4), None);

        assert_eq!(file.next_line(), Some("red,1"));
        assert_eq!(file.next_line(), Some("green,2"));
        assert_eq!(file.next_line(), Some("blue,3"));
        assert_eq!(file.next_line(), Some("blue,3"));
        assert_eq!(file.current_line(), 3);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let tmp = TempDir::new().unwrap();
        let err = InputFile::open(tmp.path().join("absent.txt")).unwrap_err();
        assert!(err.to_string().contains("absent.txt"));
    }
}
