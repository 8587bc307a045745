//! Output defaults, loadable from YAML.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Defaults applied when creating data and event files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory for `.xpd` data files
    pub data_directory: PathBuf,
    /// Directory for `.xpe` event files
    pub event_directory: PathBuf,
    /// Field separator of data rows
    pub data_delimiter: String,
    /// Separator between time stamp and event description
    pub event_delimiter: String,
    /// Character prefixing comment and annotation lines
    pub comment_char: char,
    /// Line terminator, fixed per file
    pub eol: String,
    /// Append the session start time (`YYYYMMDDHHMM`) to file names
    pub time_stamp: bool,
    /// Write an event file alongside the data file
    pub event_logging: bool,
    /// Code a trigger matcher waits for when none is given
    pub trigger_default_code: Option<i64>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            data_directory: PathBuf::from("data"),
            event_directory: PathBuf::from("events"),
            data_delimiter: ",".to_string(),
            event_delimiter: ",".to_string(),
            comment_char: '#',
            eol: "\n".to_string(),
            time_stamp: true,
            event_logging: true,
            trigger_default_code: None,
        }
    }
}

impl OutputConfig {
    /// Load from a YAML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Place both data and event files under `base_dir`.
    pub fn with_base_dir(mut self, base_dir: impl AsRef<Path>) -> Self {
        let base = base_dir.as_ref();
        self.data_directory = base.join("data");
        self.event_directory = base.join("events");
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_gives_defaults() {
        let tmp = TempDir::new().unwrap();
        let cfg = OutputConfig::load(&tmp.path().join("nope.yaml")).unwrap();
        assert_eq!(cfg, OutputConfig::default());
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("xplog.yaml");
        fs::write(&path, "data_delimiter: \";\"\ntime_stamp: false\n").unwrap();
        let cfg = OutputConfig::load(&path).unwrap();
        assert_eq!(cfg.data_delimiter, ";");
        assert!(!cfg.time_stamp);
        assert_eq!(cfg.comment_char, '#');
    }

    #[test]
    fn save_then_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("xplog.yaml");
        let cfg = OutputConfig {
            trigger_default_code: Some(8),
            ..OutputConfig::default()
        };
        cfg.save(&path).unwrap();
        assert_eq!(OutputConfig::load(&path).unwrap(), cfg);
    }
}
