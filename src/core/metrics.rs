//! Dispatch and queue metrics for observability
//!
//! Counters for watching pipeline health: how many events entered, where
//! they left the pipeline (middleware drop, level filter), how many sink
//! deliveries succeeded or failed, and what the async queues did under
//! pressure.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters maintained by the dispatch engine.
///
/// # Example
///
/// ```
/// use logflume::core::DispatchMetrics;
///
/// let metrics = DispatchMetrics::new();
/// metrics.record_emitted();
/// metrics.record_filtered();
/// assert_eq!(metrics.emitted(), 1);
/// assert_eq!(metrics.filtered(), 1);
/// ```
#[derive(Debug)]
pub struct DispatchMetrics {
    /// Events handed to `emit`
    emitted: AtomicU64,

    /// Events dropped by logger middleware
    suppressed: AtomicU64,

    /// Events rejected by the logger's level bounds
    filtered: AtomicU64,

    /// Successful sink deliveries (one event can count several times)
    delivered: AtomicU64,

    /// Sink calls that failed or panicked
    sink_errors: AtomicU64,

    /// Failures of the console fallback itself
    fallback_errors: AtomicU64,
}

impl DispatchMetrics {
    pub const fn new() -> Self {
        Self {
            emitted: AtomicU64::new(0),
            suppressed: AtomicU64::new(0),
            filtered: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            sink_errors: AtomicU64::new(0),
            fallback_errors: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn suppressed(&self) -> u64 {
        self.suppressed.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn filtered(&self) -> u64 {
        self.filtered.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn sink_errors(&self) -> u64 {
        self.sink_errors.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn fallback_errors(&self) -> u64 {
        self.fallback_errors.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn record_emitted(&self) -> u64 {
        self.emitted.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn record_suppressed(&self) -> u64 {
        self.suppressed.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn record_filtered(&self) -> u64 {
        self.filtered.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn record_delivered(&self) -> u64 {
        self.delivered.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn record_sink_error(&self) -> u64 {
        self.sink_errors.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn record_fallback_error(&self) -> u64 {
        self.fallback_errors.fetch_add(1, Ordering::Relaxed)
    }

    /// Share of emitted events that never reached dispatch, as a percentage.
    pub fn suppression_rate(&self) -> f64 {
        let emitted = self.emitted() as f64;
        if emitted == 0.0 {
            0.0
        } else {
            (self.suppressed() + self.filtered()) as f64 / emitted * 100.0
        }
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        self.emitted.store(0, Ordering::Relaxed);
        self.suppressed.store(0, Ordering::Relaxed);
        self.filtered.store(0, Ordering::Relaxed);
        self.delivered.store(0, Ordering::Relaxed);
        self.sink_errors.store(0, Ordering::Relaxed);
        self.fallback_errors.store(0, Ordering::Relaxed);
    }
}

impl Default for DispatchMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for DispatchMetrics {
    /// Create a snapshot of the current values
    fn clone(&self) -> Self {
        Self {
            emitted: AtomicU64::new(self.emitted()),
            suppressed: AtomicU64::new(self.suppressed()),
            filtered: AtomicU64::new(self.filtered()),
            delivered: AtomicU64::new(self.delivered()),
            sink_errors: AtomicU64::new(self.sink_errors()),
            fallback_errors: AtomicU64::new(self.fallback_errors()),
        }
    }
}

/// Counters maintained by an async sink wrapper.
#[derive(Debug)]
pub struct QueueMetrics {
    /// Events accepted into the queue
    enqueued: AtomicU64,

    /// Oldest events evicted under the DropOldest policy
    dropped_oldest: AtomicU64,

    /// Events refused under the Reject policy
    rejected: AtomicU64,

    /// Producer blockings on a full queue under the Block policy
    blocked: AtomicU64,

    /// Delivery or flush failures inside the workers
    delivery_errors: AtomicU64,
}

impl QueueMetrics {
    pub const fn new() -> Self {
        Self {
            enqueued: AtomicU64::new(0),
            dropped_oldest: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            blocked: AtomicU64::new(0),
            delivery_errors: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn dropped_oldest(&self) -> u64 {
        self.dropped_oldest.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn blocked(&self) -> u64 {
        self.blocked.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn delivery_errors(&self) -> u64 {
        self.delivery_errors.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn record_enqueued(&self) -> u64 {
        self.enqueued.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn record_dropped_oldest(&self) -> u64 {
        self.dropped_oldest.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn record_rejected(&self) -> u64 {
        self.rejected.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn record_blocked(&self) -> u64 {
        self.blocked.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn record_delivery_error(&self) -> u64 {
        self.delivery_errors.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for QueueMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for QueueMetrics {
    /// Create a snapshot of the current values
    fn clone(&self) -> Self {
        Self {
            enqueued: AtomicU64::new(self.enqueued()),
            dropped_oldest: AtomicU64::new(self.dropped_oldest()),
            rejected: AtomicU64::new(self.rejected()),
            blocked: AtomicU64::new(self.blocked()),
            delivery_errors: AtomicU64::new(self.delivery_errors()),
        }
    }
}
