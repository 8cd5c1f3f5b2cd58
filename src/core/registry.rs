//! Backend registry
//!
//! Maps backend names to builder functions. A formatter that has been
//! attached to a backend (`formatter.with_backend("file", ...)`) is resolved
//! here into a ready [`BuiltSink`]: the builder constructs the sink from the
//! backend config, and the formatter's optional level limits become the
//! sink's delivery bounds.

use crate::core::error::{Error, Result};
use crate::core::formatter::Formatter;
use crate::core::sink::{BuiltSink, Sink};
use std::collections::HashMap;
use std::sync::Arc;

/// Constructs a sink from the formatter that will feed it and the backend
/// configuration it was attached with.
pub type SinkBuilder =
    Arc<dyn Fn(&Formatter, &serde_json::Value) -> Result<Box<dyn Sink>> + Send + Sync>;

pub struct BackendRegistry {
    builders: HashMap<String, SinkBuilder>,
}

impl BackendRegistry {
    /// An empty registry. Most callers want [`BackendRegistry::with_defaults`].
    pub fn new() -> BackendRegistry {
        BackendRegistry {
            builders: HashMap::new(),
        }
    }

    /// A registry with every stock backend registered.
    pub fn with_defaults() -> BackendRegistry {
        let mut registry = BackendRegistry::new();
        registry.register("console", Arc::new(crate::sinks::console::build));
        registry.register("file", Arc::new(crate::sinks::file::build));
        registry.register("object_store", Arc::new(crate::sinks::object_store::build));
        registry.register("append_blob", Arc::new(crate::sinks::append_blob::build));
        registry.register("table", Arc::new(crate::sinks::table::build));
        #[cfg(feature = "http")]
        registry.register("http", Arc::new(crate::sinks::http::build));
        registry
    }

    /// Register `builder` under `name`. Re-registering a name replaces the
    /// previous builder, so stock backends can be overridden.
    pub fn register(&mut self, name: impl Into<String>, builder: SinkBuilder) {
        self.builders.insert(name.into(), builder);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.builders.contains_key(name)
    }

    /// Registered backend names, sorted.
    pub fn backend_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.builders.keys().cloned().collect();
        names.sort();
        names
    }

    /// Build the sink a backend-attached formatter describes.
    pub fn resolve(&self, formatter: &Formatter) -> Result<BuiltSink> {
        let name = formatter
            .backend_name()
            .ok_or_else(|| Error::MissingBackend {
                format_kind: formatter.format_kind().to_string(),
            })?;

        let builder = self
            .builders
            .get(name)
            .ok_or_else(|| Error::unknown_backend(name, self.backend_names()))?;

        let config = formatter
            .backend_config()
            .cloned()
            .unwrap_or(serde_json::Value::Null);
        let sink = builder(formatter, &config)?;

        Ok(BuiltSink::new(formatter.describe(), sink).set_bounds(formatter.limits()))
    }
}

impl Default for BackendRegistry {
    /// Equivalent to [`BackendRegistry::with_defaults`].
    fn default() -> Self {
        BackendRegistry::with_defaults()
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.backend_names())
            .finish()
    }
}
