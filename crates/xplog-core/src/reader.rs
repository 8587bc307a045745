//! Reading data files back: header blocks, schema and rows.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::error::Result;

#[derive(Debug, Clone, Default, Serialize)]
pub struct DataFileContents {
    pub experiment_info: Vec<String>,
    pub subject_info: Vec<String>,
    pub variable_names: Vec<String>,
    /// Body rows, each starting with the subject id.
    pub rows: Vec<Vec<String>>,
}

impl DataFileContents {
    /// Between-subject variables written as `name = value` or `name : value`.
    pub fn subject_variables(&self) -> BTreeMap<String, String> {
        self.subject_info
            .iter()
            .filter_map(|line| {
                let (key, value) = line.split_once('=').or_else(|| line.split_once(':'))?;
                let key = key.trim();
                if key.is_empty() {
                    return None;
                }
                Some((key.to_string(), value.trim().to_string()))
            })
            .collect()
    }

    /// Column names including the leading `subject_id`.
    pub fn columns(&self) -> Vec<String> {
        std::iter::once("subject_id".to_string())
            .chain(self.variable_names.iter().cloned())
            .collect()
    }
}

pub fn read_data_file(path: &Path, comment_char: char, delimiter: &str) -> Result<DataFileContents> {
    let content = fs::read_to_string(path)?;
    Ok(parse_data_file(&content, comment_char, delimiter))
}

pub fn parse_data_file(content: &str, comment_char: char, delimiter: &str) -> DataFileContents {
    let experiment_marker = format!("{comment_char}e");
    let subject_marker = format!("{comment_char}s");
    let mut contents = DataFileContents::default();
    let mut schema_seen = false;

    for line in content.lines() {
        if let Some(rest) = line.strip_prefix(&experiment_marker) {
            contents.experiment_info.push(strip_one_space(rest).to_string());
        } else if let Some(rest) = line.strip_prefix(&subject_marker) {
            contents.subject_info.push(strip_one_space(rest).to_string());
        } else if line.starts_with(comment_char) {
            continue;
        } else if !schema_seen {
            schema_seen = true;
            let names = line.strip_prefix("subject_id,").unwrap_or(line);
            if !names.is_empty() {
                contents.variable_names = names.split(delimiter).map(str::to_string).collect();
            }
        } else if !line.is_empty() {
            contents
                .rows
                .push(line.split(delimiter).map(str::to_string).collect());
        }
    }
    contents
}

fn strip_one_space(s: &str) -> &str {
    s.strip_prefix(' ').unwrap_or(s)
}
