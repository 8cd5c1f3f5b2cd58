//! Object-store sink
//!
//! Always buffered: each flush writes one fresh, never-overwritten object
//! containing the batch. Keys are `{prefix}-{YYYYMMDD-HHMMSS}.log`; a second
//! flush in the same second gets a `-2` suffix, a third `-3`, and so on.
//!
//! The [`ObjectStore`] trait keeps the sink independent of where objects
//! live: [`FsObjectStore`] maps keys to files under a root directory, and
//! [`HttpObjectStore`] (behind the `http` feature) talks to any endpoint with
//! create-only PUT semantics.

use crate::core::buffer::BatchBuffer;
use crate::core::error::{Error, Result};
use crate::core::event::Event;
use crate::core::formatter::Formatter;
use crate::core::sink::Sink;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

/// Write-once object storage.
pub trait ObjectStore: Send + Sync {
    /// Write a fresh object. Fails with [`Error::ObjectExists`] when the key
    /// is already taken.
    fn put(&self, key: &str, body: &[u8]) -> Result<()>;

    /// Create the object empty if missing. Returns true when this call
    /// created it.
    fn create_if_absent(&self, key: &str) -> Result<bool>;

    /// Append to the object, creating it when missing.
    fn append(&self, key: &str, body: &[u8]) -> Result<()>;
}

/// Objects as files under a root directory.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<FsObjectStore> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| {
            Error::io_operation(
                "creating object store root",
                format!("cannot create '{}'", root.display()),
                e,
            )
        })?;
        Ok(FsObjectStore { root })
    }

    fn object_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

impl ObjectStore for FsObjectStore {
    fn put(&self, key: &str, body: &[u8]) -> Result<()> {
        let path = self.object_path(key);
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::AlreadyExists {
                    Error::ObjectExists {
                        key: key.to_string(),
                    }
                } else {
                    Error::io_operation(
                        "writing object",
                        format!("cannot create '{}'", path.display()),
                        e,
                    )
                }
            })?;
        file.write_all(body)?;
        Ok(())
    }

    fn create_if_absent(&self, key: &str) -> Result<bool> {
        let path = self.object_path(key);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(Error::io_operation(
                "creating object",
                format!("cannot create '{}'", path.display()),
                e,
            )),
        }
    }

    fn append(&self, key: &str, body: &[u8]) -> Result<()> {
        let path = self.object_path(key);
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&path)
            .map_err(|e| {
                Error::io_operation(
                    "appending to object",
                    format!("cannot open '{}'", path.display()),
                    e,
                )
            })?;
        file.write_all(body)?;
        Ok(())
    }
}

/// Objects behind an HTTP endpoint: `PUT {base}/{key}` with
/// `If-None-Match: *` for fresh writes (412 means the key exists) and
/// `POST {base}/{key}` for appends.
#[cfg(feature = "http")]
pub struct HttpObjectStore {
    client: reqwest::blocking::Client,
    base_url: String,
}

#[cfg(feature = "http")]
impl HttpObjectStore {
    pub fn new(base_url: impl Into<String>) -> Result<HttpObjectStore> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(5))
            .build()?;
        Ok(HttpObjectStore {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key)
    }
}

#[cfg(feature = "http")]
impl ObjectStore for HttpObjectStore {
    fn put(&self, key: &str, body: &[u8]) -> Result<()> {
        let response = self
            .client
            .put(self.object_url(key))
            .header(reqwest::header::IF_NONE_MATCH, "*")
            .body(body.to_vec())
            .send()?;
        if response.status() == reqwest::StatusCode::PRECONDITION_FAILED {
            return Err(Error::ObjectExists {
                key: key.to_string(),
            });
        }
        response.error_for_status()?;
        Ok(())
    }

    fn create_if_absent(&self, key: &str) -> Result<bool> {
        match self.put(key, b"") {
            Ok(()) => Ok(true),
            Err(Error::ObjectExists { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn append(&self, key: &str, body: &[u8]) -> Result<()> {
        self.client
            .post(self.object_url(key))
            .body(body.to_vec())
            .send()?
            .error_for_status()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectStoreConfig {
    /// Filesystem store root. Exactly one of `root` and `url` must be set.
    #[serde(default)]
    pub root: Option<PathBuf>,
    /// HTTP store base URL (needs the `http` feature).
    #[serde(default)]
    pub url: Option<String>,
    /// Object key prefix.
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Events per object.
    #[serde(default = "default_flush_threshold")]
    pub flush_threshold: usize,
}

fn default_prefix() -> String {
    "events".to_string()
}

fn default_flush_threshold() -> usize {
    64
}

impl ObjectStoreConfig {
    pub fn fs(root: impl Into<PathBuf>) -> ObjectStoreConfig {
        ObjectStoreConfig {
            root: Some(root.into()),
            url: None,
            prefix: default_prefix(),
            flush_threshold: default_flush_threshold(),
        }
    }

    #[cfg(feature = "http")]
    pub fn http(url: impl Into<String>) -> ObjectStoreConfig {
        ObjectStoreConfig {
            root: None,
            url: Some(url.into()),
            prefix: default_prefix(),
            flush_threshold: default_flush_threshold(),
        }
    }

    #[must_use = "builder methods return a new value"]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
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
            (None, Some(url)) => Ok(Arc::new(HttpObjectStore::new(url.clone())?)),
            #[cfg(not(feature = "http"))]
            (None, Some(_)) => Err(Error::config(
                "object_store",
                "url-backed stores need the http feature",
            )),
            _ => Err(Error::config(
                "object_store",
                "exactly one of root and url must be set",
            )),
        }
    }
}

pub struct ObjectStoreSink {
    formatter: Formatter,
    header_written: bool,
    store: Arc<dyn ObjectStore>,
    prefix: String,
    buffer: BatchBuffer<String>,
    /// Stamp of the last written object and its serial within that second.
    last_stamp: Option<(String, u32)>,
}

impl ObjectStoreSink {
    pub fn new(
        formatter: Formatter,
        store: Arc<dyn ObjectStore>,
        prefix: impl Into<String>,
        flush_threshold: usize,
    ) -> ObjectStoreSink {
        ObjectStoreSink {
            formatter,
            header_written: false,
            store,
            prefix: prefix.into(),
            buffer: BatchBuffer::new(flush_threshold),
            last_stamp: None,
        }
    }

    fn next_key(&mut self) -> String {
        let stamp = Utc::now().format("%Y%m%d-%H%M%S").to_string();
        let serial = match self.last_stamp.take() {
            Some((last, serial)) if last == stamp => serial + 1,
            _ => 1,
        };
        self.last_stamp = Some((stamp.clone(), serial));

        if serial == 1 {
            format!("{}-{}.log", self.prefix, stamp)
        } else {
            format!("{}-{}-{}.log", self.prefix, stamp, serial)
        }
    }

    fn write_batch(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        // A leftover object from an earlier run can still collide; bump the
        // serial and retry rather than overwrite.
        let mut attempts = 0;
        loop {
            let key = self.next_key();
            let store = Arc::clone(&self.store);
            let result = self.buffer.flush_with(|lines| {
                let mut body = lines.join("\n");
                body.push('\n');
                store.put(&key, body.as_bytes())
            });
            match result {
                Err(Error::ObjectExists { .. }) if attempts < 3 => {
                    attempts += 1;
                }
                other => return other,
            }
        }
    }
}

impl Sink for ObjectStoreSink {
    fn deliver(&mut self, event: &Event) -> Result<()> {
        let lines = self
            .formatter
            .render(event)
            .into_lines(&mut self.header_written)?;
        for line in lines {
            self.buffer.push(line);
        }

        if self.buffer.is_due() {
            if let Err(e) = self.write_batch() {
                // The batch stays buffered; a later flush retries.
                eprintln!(
                    "[LOGFLUME WARNING] object write failed, {} lines retained: {}",
                    self.buffer.len(),
                    e
                );
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.write_batch()
    }

    fn buffered_count(&self) -> usize {
        self.buffer.len()
    }

    fn kind(&self) -> &str {
        "object_store"
    }
}

impl Drop for ObjectStoreSink {
    fn drop(&mut self) {
        let _ = self.write_batch();
    }
}

/// Registry builder for the `object_store` backend.
pub(crate) fn build(
    formatter: &Formatter,
    config: &serde_json::Value,
) -> Result<Box<dyn Sink>> {
    if formatter.requires_buffering() {
        return Err(Error::config(
            "object_store",
            "row-producing formatters need the table backend",
        ));
    }
    let config: ObjectStoreConfig = serde_json::from_value(config.clone())?;
    let store = config.open_store()?;
    Ok(Box::new(ObjectStoreSink::new(
        formatter.clone(),
        store,
        config.prefix,
        config.flush_threshold,
    )))
}

impl Formatter {
    /// Attach a filesystem object store rooted at `root`.
    pub fn into_object_store(self, root: impl Into<PathBuf>) -> Result<Formatter> {
        self.into_object_store_with(ObjectStoreConfig::fs(root))
    }

    /// Attach the object_store backend with explicit settings.
    pub fn into_object_store_with(self, config: ObjectStoreConfig) -> Result<Formatter> {
        let config = serde_json::to_value(&config)?;
        self.with_backend("object_store", config)
    }
}
