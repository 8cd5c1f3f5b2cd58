//! # Logflume
//!
//! A structured, leveled event pipeline with swappable formatting and
//! fault-isolated delivery to multiple sinks.
//!
//! ## Features
//!
//! - **Two-Tier Filtering**: Inclusive level windows on the logger and on every sink
//! - **Structured Events**: Tags and typed fields, merged through the pipeline
//! - **Multiple Sinks**: Console, rotating files, HTTP, object stores, and a
//!   columnar table file, each isolated from the others' failures
//! - **Async Delivery**: Bounded-queue wrapper with block, drop-oldest, or
//!   reject overflow handling

pub mod core;
pub mod macros;
pub mod sinks;

pub mod prelude {
    pub use crate::core::{
        global, init, AsyncConfig, AsyncSink, BackendRegistry, BatchBuffer, BuiltSink,
        DispatchMetrics, Error, Event, EventBuilder, FieldValue, Formatter, Level, Logger,
        Middleware, OverflowPolicy, QueueMetrics, RenderFn, Rendered, Result, Row, Sink,
        SinkBuilder, TimestampFormat, DEFAULT_TEXT_TEMPLATE,
    };
    pub use crate::sinks::{ConsoleSink, FileSink, MemoryBuffer, MemorySink};
}

pub use crate::core::{
    global, init, AsyncConfig, AsyncSink, BackendRegistry, BatchBuffer, BuiltSink,
    DispatchMetrics, Error, Event, EventBuilder, FieldValue, Formatter, Level, Logger, Middleware,
    OverflowPolicy, QueueMetrics, RenderFn, Rendered, Result, Row, Sink, SinkBuilder,
    TimestampFormat, DEFAULT_TEXT_TEMPLATE,
};
pub use crate::sinks::{ConsoleSink, FileSink, MemoryBuffer, MemorySink};
