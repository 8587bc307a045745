//! Data models for xplog.

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::{Result, XplogError};

/// Placeholder written for a missing value or an unknown subject.
pub const NULL_MARKER: &str = "None";

/// Identity of the running session, used for file naming and row prefixes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Name of the experiment program (e.g. "stroop")
    pub program_identity: String,
    /// Subject number, `None` before the session has a subject assigned
    pub subject: Option<u32>,
    /// Local start time of the session, used for time stamps and the date comment
    pub started_at: Option<NaiveDateTime>,
}

impl SessionInfo {
    pub fn new(program_identity: impl Into<String>) -> Self {
        Self {
            program_identity: program_identity.into(),
            subject: None,
            started_at: None,
        }
    }

    pub fn with_subject(mut self, subject: u32) -> Self {
        self.subject = Some(subject);
        self
    }

    pub fn with_start_time(mut self, started_at: NaiveDateTime) -> Self {
        self.started_at = Some(started_at);
        self
    }

    /// Subject identifier as rendered at the start of every data row.
    pub fn subject_label(&self) -> String {
        match self.subject {
            Some(id) => id.to_string(),
            None => NULL_MARKER.to_string(),
        }
    }
}

/// A single scalar cell of a data row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DataValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Null,
}

impl DataValue {
    /// Text form written to the data file.
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for DataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataValue::Bool(true) => write!(f, "True"),
            DataValue::Bool(false) => write!(f, "False"),
            DataValue::Int(i) => write!(f, "{i}"),
            // Debug keeps the fractional part ("1.0" rather than "1").
            DataValue::Float(v) => write!(f, "{v:?}"),
            DataValue::Text(s) => write!(f, "{s}"),
            DataValue::Null => write!(f, "{NULL_MARKER}"),
        }
    }
}

impl From<f64> for DataValue {
    fn from(v: f64) -> Self {
        DataValue::Float(v)
    }
}
impl From<f32> for DataValue {
    fn from(v: f32) -> Self {
        DataValue::Float(v as f64)
    }
}
impl From<i64> for DataValue {
    fn from(v: i64) -> Self {
        DataValue::Int(v)
    }
}
impl From<i32> for DataValue {
    fn from(v: i32) -> Self {
        DataValue::Int(v as i64)
    }
}
impl From<u32> for DataValue {
    fn from(v: u32) -> Self {
        DataValue::Int(v as i64)
    }
}
impl From<bool> for DataValue {
    fn from(v: bool) -> Self {
        DataValue::Bool(v)
    }
}
impl From<String> for DataValue {
    fn from(v: String) -> Self {
        DataValue::Text(v)
    }
}
impl From<&str> for DataValue {
    fn from(v: &str) -> Self {
        DataValue::Text(v.to_string())
    }
}
impl<T: Into<DataValue>> From<Option<T>> for DataValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(DataValue::Null)
    }
}

/// Dynamic values (e.g. decoded from JSON) are checked here; only scalars pass.
impl TryFrom<serde_json::Value> for DataValue {
    type Error = XplogError;

    fn try_from(value: serde_json::Value) -> Result<Self> {
        use serde_json::Value;
        match value {
            Value::Null => Ok(DataValue::Null),
            Value::Bool(b) => Ok(DataValue::Bool(b)),
            Value::String(s) => Ok(DataValue::Text(s)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(DataValue::Int(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(DataValue::Float(f))
                } else {
                    Err(XplogError::Type(format!("number {n} does not fit a 64-bit value")))
                }
            }
            Value::Array(_) => Err(XplogError::Type(
                "data must be booleans, strings, numerics or null; an array is not allowed".into(),
            )),
            Value::Object(_) => Err(XplogError::Type(
                "data must be booleans, strings, numerics or null; an object is not allowed".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_scalars() {
        assert_eq!(DataValue::from(true).render(), "True");
        assert_eq!(DataValue::from(42).render(), "42");
        assert_eq!(DataValue::from(1.0).render(), "1.0");
        assert_eq!(DataValue::from(0.25).render(), "0.25");
        assert_eq!(DataValue::from("left").render(), "left");
        assert_eq!(DataValue::from(None::<i64>).render(), "None");
    }

    #[test]
    fn rejects_non_scalar_json() {
        assert!(matches!(
            DataValue::try_from(json!([1, 2])),
            Err(XplogError::Type(_))
        ));
        assert!(matches!(
            DataValue::try_from(json!({"a": 1})),
            Err(XplogError::Type(_))
        ));
        assert_eq!(DataValue::try_from(json!(3)).unwrap(), DataValue::Int(3));
        assert_eq!(DataValue::try_from(json!(null)).unwrap(), DataValue::Null);
    }
}
