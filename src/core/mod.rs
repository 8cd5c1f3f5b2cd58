//! Core pipeline types: events, levels, formatters, sinks, and the logger.

pub mod async_sink;
pub mod buffer;
pub mod error;
pub mod event;
pub mod formatter;
pub mod level;
pub mod logger;
pub mod metrics;
pub mod middleware;
pub mod registry;
pub mod sink;
pub mod timestamp;

pub use async_sink::{AsyncConfig, AsyncSink, OverflowPolicy};
pub use buffer::BatchBuffer;
pub use error::{Error, Result};
pub use event::{Event, FieldValue};
pub use formatter::{Formatter, RenderFn, Rendered, Row, DEFAULT_TEXT_TEMPLATE};
pub use level::Level;
pub use logger::{global, init, EventBuilder, Logger};
pub use metrics::{DispatchMetrics, QueueMetrics};
pub use middleware::Middleware;
pub use registry::{BackendRegistry, SinkBuilder};
pub use sink::{BuiltSink, Sink};
pub use timestamp::TimestampFormat;
