//! Table sink
//!
//! Stores events column-major in one JSON file: an object mapping column
//! names to equal-length arrays. The fixed columns (`time`, `level`,
//! `levelNumber`, `message`, `tags`) are always present; custom field
//! columns appear as events introduce them, with `null` backfill so every
//! column stays the same length. Each flush rewrites the file via a temp
//! file and rename.
//!
//! Only row-producing formatters ([`Formatter::table`] or a custom
//! formatter with `requires_buffering`) can feed this sink.

use crate::core::buffer::BatchBuffer;
use crate::core::error::{Error, Result};
use crate::core::event::Event;
use crate::core::formatter::{Formatter, Row};
use crate::core::sink::Sink;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableConfig {
    pub path: PathBuf,
    /// Rows per rewrite.
    #[serde(default = "default_flush_threshold")]
    pub flush_threshold: usize,
}

fn default_flush_threshold() -> usize {
    32
}

impl TableConfig {
    pub fn new(path: impl Into<PathBuf>) -> TableConfig {
        TableConfig {
            path: path.into(),
            flush_threshold: default_flush_threshold(),
        }
    }

    #[must_use = "builder methods return a new value"]
    pub fn with_flush_threshold(mut self, rows: usize) -> Self {
        self.flush_threshold = rows;
        self
    }
}

const FIXED_COLUMNS: [&str; 5] = ["time", "level", "levelNumber", "message", "tags"];

pub struct TableSink {
    formatter: Formatter,
    path: PathBuf,
    buffer: BatchBuffer<Row>,
}

impl TableSink {
    pub fn new(formatter: Formatter, config: TableConfig) -> Result<TableSink> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    Error::io_operation(
                        "creating table directory",
                        format!("cannot create '{}'", parent.display()),
                        e,
                    )
                })?;
            }
        }
        Ok(TableSink {
            formatter,
            path: config.path,
            buffer: BatchBuffer::new(config.flush_threshold),
        })
    }

    fn write_rows(&mut self) -> Result<()> {
        let path = self.path.clone();
        self.buffer.flush_with(|rows| append_rows(&path, rows))
    }
}

/// Load the existing table, append `rows` column-major, write it back
/// atomically.
fn append_rows(path: &Path, rows: &[Row]) -> Result<()> {
    let mut table: serde_json::Map<String, Value> = if path.exists() {
        let text = fs::read_to_string(path)?;
        if text.trim().is_empty() {
            serde_json::Map::new()
        } else {
            serde_json::from_str(&text)?
        }
    } else {
        serde_json::Map::new()
    };

    let existing_len = table
        .values()
        .filter_map(|v| v.as_array())
        .map(|a| a.len())
        .max()
        .unwrap_or(0);

    let mut columns: BTreeSet<String> = table.keys().cloned().collect();
    for fixed in FIXED_COLUMNS {
        columns.insert(fixed.to_string());
    }
    for row in rows {
        for key in row.extras.keys() {
            columns.insert(key.clone());
        }
    }

    for column in &columns {
        let entry = table
            .entry(column.clone())
            .or_insert_with(|| Value::Array(vec![Value::Null; existing_len]));
        let array = entry.as_array_mut().ok_or_else(|| {
            Error::sink(format!(
                "table '{}': column \"{}\" is not an array",
                path.display(),
                column
            ))
        })?;
        // A column missing from some earlier rows gets null backfill.
        while array.len() < existing_len {
            array.push(Value::Null);
        }
        for row in rows {
            array.push(cell(row, column));
        }
    }

    let temp = PathBuf::from(format!("{}.tmp", path.display()));
    let rendered = serde_json::to_string_pretty(&Value::Object(table))?;
    fs::write(&temp, rendered).map_err(|e| {
        Error::io_operation(
            "writing table",
            format!("cannot write '{}'", temp.display()),
            e,
        )
    })?;
    fs::rename(&temp, path).map_err(|e| {
        let _ = fs::remove_file(&temp);
        Error::io_operation(
            "writing table",
            format!("cannot replace '{}'", path.display()),
            e,
        )
    })?;
    Ok(())
}

fn cell(row: &Row, column: &str) -> Value {
    match column {
        "time" => Value::String(row.time.clone()),
        "level" => Value::String(row.level.clone()),
        "levelNumber" => Value::Number(row.level_number.into()),
        "message" => Value::String(row.message.clone()),
        "tags" => Value::Array(
            row.tags
                .iter()
                .map(|tag| Value::String(tag.clone()))
                .collect(),
        ),
        extra => row
            .extras
            .get(extra)
            .map(|value| value.to_json_value())
            .unwrap_or(Value::Null),
    }
}

impl Sink for TableSink {
    fn deliver(&mut self, event: &Event) -> Result<()> {
        let row = self.formatter.render(event).into_row()?;
        self.buffer.push(row);

        if self.buffer.is_due() {
            if let Err(e) = self.write_rows() {
                // The rows stay buffered; a later flush retries.
                eprintln!(
                    "[LOGFLUME WARNING] table write to '{}' failed, {} rows retained: {}",
                    self.path.display(),
                    self.buffer.len(),
                    e
                );
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.write_rows()
    }

    fn buffered_count(&self) -> usize {
        self.buffer.len()
    }

    fn kind(&self) -> &str {
        "table"
    }
}

impl Drop for TableSink {
    fn drop(&mut self) {
        let _ = self.write_rows();
    }
}

/// Registry builder for the `table` backend.
pub(crate) fn build(
    formatter: &Formatter,
    config: &serde_json::Value,
) -> Result<Box<dyn Sink>> {
    if !formatter.requires_buffering() {
        return Err(Error::config(
            "table",
            "the table backend requires a row-producing formatter",
        ));
    }
    let config: TableConfig = serde_json::from_value(config.clone())?;
    Ok(Box::new(TableSink::new(formatter.clone(), config)?))
}

impl Formatter {
    /// Attach the table backend writing to the JSON file at `path`.
    pub fn into_table_file(self, path: impl Into<PathBuf>) -> Result<Formatter> {
        self.into_table_file_with(TableConfig::new(path))
    }

    /// Attach the table backend with explicit settings.
    pub fn into_table_file_with(self, config: TableConfig) -> Result<Formatter> {
        let config = serde_json::to_value(&config)?;
        self.with_backend("table", config)
    }
}
