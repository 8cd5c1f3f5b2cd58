//! The structured event record
//!
//! An `Event` is what flows through the pipeline: a sanitised message, a UTC
//! timestamp, the level it was logged at (name and numeric value), tags, and
//! an open map of typed fields. Events are plain values; middleware receives
//! them by value and returns a replacement or drops them.

use crate::core::error::{Error, Result};
use crate::core::level::Level;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Value type for structured event fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::String(s) => write!(f, "{}", s),
            FieldValue::Int(i) => write!(f, "{}", i),
            FieldValue::Float(fl) => write!(f, "{}", fl),
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Null => write!(f, "null"),
        }
    }
}

impl FieldValue {
    /// Convert to serde_json::Value for JSON serialization
    #[must_use]
    pub fn to_json_value(&self) -> serde_json::Value {
        match self {
            FieldValue::String(s) => serde_json::Value::String(s.clone()),
            FieldValue::Int(i) => serde_json::Value::Number((*i).into()),
            FieldValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            FieldValue::Bool(b) => serde_json::Value::Bool(*b),
            FieldValue::Null => serde_json::Value::Null,
        }
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::String(s)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::String(s.to_string())
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Int(i)
    }
}

impl From<i32> for FieldValue {
    fn from(i: i32) -> Self {
        FieldValue::Int(i as i64)
    }
}

impl From<f64> for FieldValue {
    fn from(f: f64) -> Self {
        FieldValue::Float(f)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

/// One structured, leveled event.
///
/// Tag merge order is fixed: tags set on the event itself, then the
/// constructor tags of its level, then the logger's tags, appended at
/// dispatch time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub time: DateTime<Utc>,
    #[serde(rename = "level")]
    pub level_name: String,
    #[serde(rename = "levelNumber")]
    pub level_number: u8,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Constructor tags of the level, folded into `tags` at dispatch.
    #[serde(skip)]
    level_tags: Vec<String>,
    #[serde(flatten)]
    pub fields: BTreeMap<String, FieldValue>,
}

impl Event {
    /// Sanitize the message to prevent log injection
    ///
    /// Replaces newlines, carriage returns, and tabs with escape sequences
    /// so an event can never fake a second record in line-oriented output.
    fn sanitize_message(message: &str) -> String {
        message
            .replace('\n', "\\n")
            .replace('\r', "\\r")
            .replace('\t', "\\t")
    }

    /// Construct an event at `level`.
    ///
    /// Fails for the boundary levels (numeric value 0 or 100); those exist
    /// for filtering only.
    pub fn new(level: &Level, message: impl Into<String>) -> Result<Self> {
        if level.is_boundary() {
            return Err(Error::BoundaryLevel {
                name: level.name().to_string(),
                value: level.value(),
            });
        }
        Ok(Self::build(level, message.into()))
    }

    /// Constructor for levels already known to be loggable.
    pub(crate) fn build(level: &Level, message: String) -> Self {
        Event {
            time: Utc::now(),
            level_name: level.name().to_string(),
            level_number: level.value(),
            message: Self::sanitize_message(&message),
            tags: Vec::new(),
            level_tags: level.tags().to_vec(),
            fields: BTreeMap::new(),
        }
    }

    /// Add a structured field
    #[must_use]
    pub fn with_field<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<FieldValue>,
    {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Add a structured field (mutable version)
    pub fn add_field<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<FieldValue>,
    {
        self.fields.insert(key.into(), value.into());
    }

    /// Append a tag
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Append several tags
    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Fold level constructor tags and logger tags into `tags`, preserving
    /// the event ++ level ++ logger order.
    pub(crate) fn merge_tags(mut self, logger_tags: &[String]) -> Self {
        let level_tags = std::mem::take(&mut self.level_tags);
        self.tags.extend(level_tags);
        self.tags.extend(logger_tags.iter().cloned());
        self
    }
}
