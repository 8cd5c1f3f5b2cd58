//! Append-blob sink
//!
//! One long-lived object that grows by appends. The blob is created (empty)
//! on the first flush and every batch after that is appended, so restarting
//! a process keeps extending the same key. Always buffered; each flush
//! appends one batch.

use crate::core::buffer::BatchBuffer;
use crate::core::error::{Error, Result};
use crate::core::event::Event;
use crate::core::formatter::Formatter;
use crate::core::sink::Sink;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

use super::object_store::{FsObjectStore, ObjectStore};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendBlobConfig {
    /// Filesystem store root. Exactly one of `root` and `url` must be set.
    #[serde(default)]
    pub root: Option<PathBuf>,
    /// HTTP store base URL (needs the `http` feature).
    #[serde(default)]
    pub url: Option<String>,
    /// Object key to append to.
    pub key: String,
    /// Events per append.
    #[serde(default = "default_flush_threshold")]
    pub flush_threshold: usize,
}

fn default_flush_threshold() -> usize {
    16
}

impl AppendBlobConfig {
    pub fn fs(root: impl Into<PathBuf>, key: impl Into<String>) -> AppendBlobConfig {
        AppendBlobConfig {
            root: Some(root.into()),
            url: None,
            key: key.into(),
            flush_threshold: default_flush_threshold(),
        }
    }

    #[cfg(feature = "http")]
    pub fn http(url: impl Into<String>, key: impl Into<String>) -> AppendBlobConfig {
        AppendBlobConfig {
            root: None,
            url: Some(url.into()),
            key: key.into(),
            flush_threshold: default_flush_threshold(),
        }
    }

    #[must_use = "builder methods return a new value"]
    pub fn with_flush_threshold(mut self, events: usize) -> Self {
        self.flush_threshold = events;
        self
    }

    fn open_store(&self) -> Result<Arc<dyn ObjectStore>> {
        match (&self.root, &self.url) {
            (Some(root), None) => Ok(Arc::new(FsObjectStore::new(root.clone())?)),
            #[cfg(feature = "http")]
            (None, Some(url)) => Ok(Arc::new(super::object_store::HttpObjectStore::new(
                url.clone(),
            )?)),
            #[cfg(not(feature = "http"))]
            (None, Some(_)) => Err(Error::config(
                "append_blob",
                "url-backed stores need the http feature",
            )),
            _ => Err(Error::config(
                "append_blob",
                "exactly one of root and url must be set",
            )),
        }
    }
}

pub struct AppendBlobSink {
    formatter: Formatter,
    header_written: bool,
    store: Arc<dyn ObjectStore>,
    key: String,
    /// Whether this sink has ensured the blob exists.
    created: bool,
    buffer: BatchBuffer<String>,
}

impl AppendBlobSink {
    pub fn new(
        formatter: Formatter,
        store: Arc<dyn ObjectStore>,
        key: impl Into<String>,
        flush_threshold: usize,
    ) -> AppendBlobSink {
        AppendBlobSink {
            formatter,
            header_written: false,
            store,
            key: key.into(),
            created: false,
            buffer: BatchBuffer::new(flush_threshold),
        }
    }

    fn append_batch(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        if !self.created {
            self.store.create_if_absent(&self.key)?;
            self.created = true;
        }

        let store = Arc::clone(&self.store);
        let key = self.key.clone();
        self.buffer.flush_with(|lines| {
            let mut body = lines.join("\n");
            body.push('\n');
            store.append(&key, body.as_bytes())
        })
    }
}

impl Sink for AppendBlobSink {
    fn deliver(&mut self, event: &Event) -> Result<()> {
        let lines = self
            .formatter
            .render(event)
            .into_lines(&mut self.header_written)?;
        for line in lines {
            self.buffer.push(line);
        }

        if self.buffer.is_due() {
            if let Err(e) = self.append_batch() {
                // The batch stays buffered; a later flush retries.
                eprintln!(
                    "[LOGFLUME WARNING] append to \"{}\" failed, {} lines retained: {}",
                    self.key,
                    self.buffer.len(),
                    e
                );
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.append_batch()
    }

    fn buffered_count(&self) -> usize {
        self.buffer.len()
    }

    fn kind(&self) -> &str {
        "append_blob"
    }
}

impl Drop for AppendBlobSink {
    fn drop(&mut self) {
        let _ = self.append_batch();
    }
}

/// Registry builder for the `append_blob` backend.
pub(crate) fn build(
    formatter: &Formatter,
    config: &serde_json::Value,
) -> Result<Box<dyn Sink>> {
    if formatter.requires_buffering() {
        return Err(Error::config(
            "append_blob",
            "row-producing formatters need the table backend",
        ));
    }
    let config: AppendBlobConfig = serde_json::from_value(config.clone())?;
    let store = config.open_store()?;
    Ok(Box::new(AppendBlobSink::new(
        formatter.clone(),
        store,
        config.key,
        config.flush_threshold,
    )))
}

impl Formatter {
    /// Attach an append blob stored as `key` under the filesystem `root`.
    pub fn into_append_blob(
        self,
        root: impl Into<PathBuf>,
        key: impl Into<String>,
    ) -> Result<Formatter> {
        self.into_append_blob_with(AppendBlobConfig::fs(root, key))
    }

    /// Attach the append_blob backend with explicit settings.
    pub fn into_append_blob_with(self, config: AppendBlobConfig) -> Result<Formatter> {
        let config = serde_json::to_value(&config)?;
        self.with_backend("append_blob", config)
    }
}
