//! Sink trait for event delivery targets, and the built-sink handle the
//! dispatch engine works with

use crate::core::async_sink::{AsyncConfig, AsyncSink};
use crate::core::error::{Error, Result};
use crate::core::event::Event;
use crate::core::level::Level;
use crate::core::middleware::Middleware;
use parking_lot::{Mutex, MutexGuard};
use std::fmt;

/// A delivery target. Implementations own their IO and their buffering.
pub trait Sink: Send + Sync {
    /// Deliver one event. For buffered sinks this may only accumulate.
    fn deliver(&mut self, event: &Event) -> Result<()>;

    /// Write out everything accumulated. Empty flushes are no-ops.
    fn flush(&mut self) -> Result<()>;

    /// Number of accumulated, not yet written events.
    fn buffered_count(&self) -> usize {
        0
    }

    /// Backend kind name, for labels and diagnostics.
    fn kind(&self) -> &str;
}

/// A sink wired for dispatch: label, optional level bounds, per-sink
/// middleware, and the sink itself behind a mutex.
///
/// The mutex is what keeps a flush and a concurrent delivery from
/// interleaving on the same sink.
pub struct BuiltSink {
    label: String,
    bounds: Option<(u8, u8)>,
    middleware: Vec<Middleware>,
    inner: Mutex<Box<dyn Sink>>,
}

impl BuiltSink {
    /// Wrap a sink constructed outside the registry.
    pub fn new(label: impl Into<String>, sink: Box<dyn Sink>) -> Self {
        BuiltSink {
            label: label.into(),
            bounds: None,
            middleware: Vec::new(),
            inner: Mutex::new(sink),
        }
    }

    /// Restrict this sink to levels in `lower..=upper` (inclusive).
    pub fn with_limits(mut self, lower: &Level, upper: &Level) -> Result<Self> {
        if lower.value() > upper.value() {
            return Err(Error::InvalidRange {
                lower: lower.value(),
                upper: upper.value(),
            });
        }
        self.bounds = Some((lower.value(), upper.value()));
        Ok(self)
    }

    pub(crate) fn set_bounds(mut self, bounds: Option<(u8, u8)>) -> Self {
        self.bounds = bounds;
        self
    }

    /// Append a middleware stage that runs for this sink only, after its
    /// level check.
    #[must_use]
    pub fn with_middleware(mut self, middleware: Middleware) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Move this sink behind a bounded queue with worker-thread delivery.
    ///
    /// Bounds and middleware still apply on the producer side; only the
    /// final sink call is deferred.
    #[must_use]
    pub fn into_async(self, config: AsyncConfig) -> BuiltSink {
        let label = format!(
            "async(queue={}, workers={}) {}",
            config.max_queue_size, config.workers, self.label
        );
        let inner = self.inner.into_inner();
        BuiltSink {
            label,
            bounds: self.bounds,
            middleware: self.middleware,
            inner: Mutex::new(Box::new(AsyncSink::wrap(inner, config))),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Inclusive level check; a sink without bounds accepts everything the
    /// logger passed.
    pub fn accepts(&self, level_number: u8) -> bool {
        match self.bounds {
            Some((lower, upper)) => level_number >= lower && level_number <= upper,
            None => true,
        }
    }

    pub(crate) fn middleware(&self) -> &[Middleware] {
        &self.middleware
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Box<dyn Sink>> {
        self.inner.lock()
    }
}

impl fmt::Debug for BuiltSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltSink")
            .field("label", &self.label)
            .field("bounds", &self.bounds)
            .field("middleware", &self.middleware.len())
            .finish()
    }
}
