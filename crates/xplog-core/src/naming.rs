//! File naming: `{program}[_{subject:02}][_{YYYYMMDDHHMM}]{suffix}`.

use std::fs;
use std::path::Path;

use chrono::NaiveDateTime;
use tracing::warn;
use uuid::Uuid;

use crate::error::Result;

pub const DATA_FILE_SUFFIX: &str = ".xpd";
pub const EVENT_FILE_SUFFIX: &str = ".xpe";
const TEMP_SUFFIX: &str = ".tmp";

/// Inputs of a standard file name. Pure values, no state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingContext {
    pub program_identity: String,
    pub session_ordinal: Option<u32>,
    pub timestamp: Option<NaiveDateTime>,
    pub suffix: String,
}

impl NamingContext {
    pub fn file_name(&self) -> String {
        standard_name(
            &self.program_identity,
            self.session_ordinal,
            self.timestamp.as_ref(),
            &self.suffix,
        )
    }
}

pub fn standard_name(
    program_identity: &str,
    session_ordinal: Option<u32>,
    timestamp: Option<&NaiveDateTime>,
    suffix: &str,
) -> String {
    let mut name = program_identity.to_string();
    if let Some(ordinal) = session_ordinal {
        name.push_str(&format!("_{ordinal:02}"));
    }
    if let Some(ts) = timestamp {
        name.push_str(&format!("_{}", ts.format("%Y%m%d%H%M")));
    }
    name.push_str(suffix);
    name
}

/// `.practice.xpd` for `("practice", ".xpd")`, plain `.xpd` when empty.
pub fn compose_suffix(additional: &str, base: &str) -> String {
    if additional.is_empty() {
        base.to_string()
    } else {
        format!(".{additional}{base}")
    }
}

/// Scan `directory` for `{program}_{NN}...{suffix}` and return max NN + 1.
///
/// Names that do not carry a number right after the program name, or whose
/// number has no successor, are skipped.
/// A missing directory yields 1.
pub fn next_session_ordinal(
    directory: &Path,
    program_identity: &str,
    file_suffix: &str,
) -> Result<u32> {
    let mut next = 1;
    if !directory.is_dir() {
        return Ok(next);
    }
    for entry in fs::read_dir(directory)? {
        let entry = entry?;
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        let Some(ordinal) = parse_ordinal(&name, program_identity, file_suffix) else {
            continue;
        };
        match ordinal.checked_add(1) {
            Some(after) if after > next => next = after,
            Some(_) => {}
            None => warn!(file = %name, "Subject number out of range, skipped"),
        }
    }
    Ok(next)
}

/// Ordinal embedded in a standard name, if any.
pub fn parse_ordinal(file_name: &str, program_identity: &str, file_suffix: &str) -> Option<u32> {
    let rest = file_name
        .strip_prefix(program_identity)?
        .strip_suffix(file_suffix)?
        .strip_prefix('_')?;
    let digits = rest.split(['_', '.']).next()?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Program identity of the running process: the executable's file stem.
pub fn program_identity() -> String {
    std::env::args()
        .next()
        .as_deref()
        .map(Path::new)
        .and_then(|p| p.file_stem())
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| "xplog".to_string())
}

/// Unique name for the snapshot taken while a file's header is rewritten.
pub fn temp_name(file_name: &str) -> String {
    format!(".{file_name}.{}{TEMP_SUFFIX}", Uuid::new_v4())
}

/// Whether `candidate` is a rewrite snapshot of `file_name`.
pub fn is_temp_name_for(candidate: &str, file_name: &str) -> bool {
    candidate
        .strip_prefix('.')
        .and_then(|s| s.strip_prefix(file_name))
        .and_then(|s| s.strip_prefix('.'))
        .and_then(|s| s.strip_suffix(TEMP_SUFFIX))
        .is_some_and(|id| Uuid::parse_str(id).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(14, 5, 0)
            .unwrap()
    }

    #[test]
    fn standard_name_is_deterministic() {
        let a = standard_name("stroop", Some(7), Some(&start()), ".xpd");
        let b = standard_name("stroop", Some(7), Some(&start()), ".xpd");
        assert_eq!(a, b);
        assert_eq!(a, "stroop_07_202403091405.xpd");
    }

    #[test]
    fn optional_segments_are_omitted() {
        assert_eq!(standard_name("stroop", None, None, ".xpe"), "stroop.xpe");
        assert_eq!(standard_name("stroop", Some(123), None, ".xpd"), "stroop_123.xpd");
    }

    #[test]
    fn suffix_composition() {
        assert_eq!(compose_suffix("practice", DATA_FILE_SUFFIX), ".practice.xpd");
        assert_eq!(compose_suffix("", EVENT_FILE_SUFFIX), ".xpe");
    }

    #[test]
    fn ordinal_scan_skips_malformed_names() {
        let tmp = TempDir::new().unwrap();
        for name in ["exp_01.xpd", "exp_03.xpd", "exp_notanumber.xpd", "exp_09.xpe", "expert_12.xpd"] {
            fs::write(tmp.path().join(name), "").unwrap();
        }
        assert_eq!(next_session_ordinal(tmp.path(), "exp", ".xpd").unwrap(), 4);
    }

    #[test]
    fn ordinal_scan_skips_number_without_successor() {
        let tmp = TempDir::new().unwrap();
        let largest = format!("exp_{}.xpd", u32::MAX);
        for name in ["exp_02.xpd", largest.as_str()] {
            fs::write(tmp.path().join(name), "").unwrap();
        }
        assert_eq!(next_session_ordinal(tmp.path(), "exp", ".xpd").unwrap(), 3);
    }

    #[test]
    fn ordinal_scan_reads_past_time_stamp_and_sub_suffix() {
        assert_eq!(parse_ordinal("exp_05_202401011200.xpd", "exp", ".xpd"), Some(5));
        assert_eq!(parse_ordinal("exp_06.practice.xpd", "exp", ".xpd"), Some(6));
        assert_eq!(parse_ordinal("exp.xpd", "exp", ".xpd"), None);
    }

    #[test]
    fn ordinal_scan_missing_directory() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("absent");
        assert_eq!(next_session_ordinal(&missing, "exp", ".xpd").unwrap(), 1);
    }

    #[test]
    fn temp_names_belong_to_their_file() {
        let tmp = temp_name("exp_01.xpd");
        assert!(is_temp_name_for(&tmp, "exp_01.xpd"));
        assert!(!is_temp_name_for(&tmp, "exp_02.xpd"));
        assert!(!is_temp_name_for(".exp_01.xpd.notauuid.tmp", "exp_01.xpd"));
    }
}
