//! Error types for the event pipeline

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error with context
    #[error("IO error while {operation}: {message}")]
    IoOperation {
        operation: String,
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP transport error
    #[cfg(feature = "http")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Custom level outside the 0..=100 scale
    #[error("invalid level '{name}': value {value} is outside 0..=100")]
    InvalidLevel { name: String, value: u16 },

    /// Boundary levels (0 and 100) exist for filtering only
    #[error("level '{name}' ({value}) is a filter boundary and cannot be logged")]
    BoundaryLevel { name: String, value: u8 },

    /// Lower bound above upper bound
    #[error("invalid level range: lower {lower} exceeds upper {upper}")]
    InvalidRange { lower: u8, upper: u8 },

    /// Invalid configuration with details
    #[error("invalid configuration for {component}: {message}")]
    InvalidConfiguration { component: String, message: String },

    /// Backend name not present in the registry
    #[error("unknown backend \"{name}\" (available: {available})")]
    UnknownBackend { name: String, available: String },

    /// A formatter can carry at most one backend
    #[error("backend already set to \"{current}\"; cannot attach \"{requested}\"")]
    BackendAlreadySet { current: String, requested: String },

    /// Formatter resolved without a backend attached
    #[error("formatter \"{format_kind}\" has no backend attached; apply a handler before resolving")]
    MissingBackend { format_kind: String },

    /// Sink names within a logger must be unique
    #[error("a sink named \"{name}\" is already attached")]
    DuplicateSink { name: String },

    /// Targeted operation on a sink name the logger does not know
    #[error("no sink named \"{name}\" is attached")]
    UnknownSink { name: String },

    /// File rotation error
    #[error("rotation failed for '{path}': {message}")]
    Rotation { path: String, message: String },

    /// Fresh-object write refused because the key exists
    #[error("object \"{key}\" already exists")]
    ObjectExists { key: String },

    /// Bounded queue full under the Reject overflow policy
    #[error("event queue full: {current}/{max} events buffered")]
    QueueRejected { current: usize, max: usize },

    /// Delivery attempted after the async workers shut down
    #[error("async sink already stopped")]
    SinkStopped,

    /// Formatter error with format kind
    #[error("formatter error ({format_kind}): {message}")]
    Formatter { format_kind: String, message: String },

    /// Generic sink failure
    #[error("sink error: {0}")]
    Sink(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an IO operation error with context
    pub fn io_operation(
        operation: impl Into<String>,
        message: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Error::IoOperation {
            operation: operation.into(),
            message: message.into(),
            source,
        }
    }

    /// Create an invalid configuration error
    pub fn config(component: impl Into<String>, message: impl Into<String>) -> Self {
        Error::InvalidConfiguration {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Create an unknown-backend error listing the registered names
    pub fn unknown_backend(name: impl Into<String>, mut available: Vec<String>) -> Self {
        available.sort();
        Error::UnknownBackend {
            name: name.into(),
            available: available.join(", "),
        }
    }

    /// Create a rotation error
    pub fn rotation(path: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Rotation {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a queue-rejected error with buffer details
    pub fn queue_rejected(current: usize, max: usize) -> Self {
        Error::QueueRejected { current, max }
    }

    /// Create a formatter error
    pub fn formatter(format_kind: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Formatter {
            format_kind: format_kind.into(),
            message: message.into(),
        }
    }

    /// Create a generic sink failure
    pub fn sink<S: Into<String>>(msg: S) -> Self {
        Error::Sink(msg.into())
    }

    /// Create a generic error
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Error::Other(msg.into())
    }
}
