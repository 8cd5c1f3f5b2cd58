//! Bounded-queue asynchronous delivery wrapper
//!
//! `AsyncSink` moves any sink behind a bounded crossbeam channel drained by
//! worker threads, so slow delivery never stalls the emitting thread beyond
//! the configured overflow policy. The wrapped sink is flushed every
//! `flush_threshold` deliveries and whenever the queue runs dry; a manual
//! flush is acknowledged by the worker that performed it, which makes
//! shutdown and tests deterministic.

use crate::core::error::{Error, Result};
use crate::core::event::Event;
use crate::core::metrics::QueueMetrics;
use crate::core::sink::Sink;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Shutdown timeout when an async sink is dropped.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a manual flush waits for its acknowledgement.
const FLUSH_ACK_TIMEOUT: Duration = Duration::from_secs(5);

/// What to do with a new event when the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Park the producer until the queue has room.
    #[default]
    Block,
    /// Evict the oldest queued event to admit the newest.
    DropOldest,
    /// Refuse the event with an error the dispatch tier surfaces through
    /// its usual sink-failure path.
    Reject,
}

#[derive(Debug, Clone)]
pub struct AsyncConfig {
    /// Flush the wrapped sink every this many deliveries.
    pub flush_threshold: usize,
    /// Capacity of the bounded queue.
    pub max_queue_size: usize,
    /// Worker threads draining the queue. One worker keeps delivery in
    /// arrival order; more trade ordering for throughput.
    pub workers: usize,
    pub overflow: OverflowPolicy,
}

impl Default for AsyncConfig {
    fn default() -> Self {
        Self {
            flush_threshold: 128,
            max_queue_size: 1024,
            workers: 1,
            overflow: OverflowPolicy::Block,
        }
    }
}

enum Job {
    Deliver(Event),
    Flush(Sender<()>),
}

pub struct AsyncSink {
    sender: Option<Sender<Job>>,
    /// Receiver clone used to evict under DropOldest.
    evict: Receiver<Job>,
    workers: Vec<thread::JoinHandle<()>>,
    inner: Arc<Mutex<Box<dyn Sink>>>,
    overflow: OverflowPolicy,
    max_queue_size: usize,
    metrics: Arc<QueueMetrics>,
}

impl AsyncSink {
    /// Move `inner` behind a bounded queue with worker-thread delivery.
    pub fn wrap(inner: Box<dyn Sink>, config: AsyncConfig) -> AsyncSink {
        let max_queue_size = config.max_queue_size.max(1);
        let flush_threshold = config.flush_threshold.max(1);
        let (sender, receiver) = bounded(max_queue_size);
        let inner = Arc::new(Mutex::new(inner));
        let metrics = Arc::new(QueueMetrics::new());

        let workers = (0..config.workers.max(1))
            .map(|_| {
                let receiver = receiver.clone();
                let inner = Arc::clone(&inner);
                let metrics = Arc::clone(&metrics);
                thread::spawn(move || worker_loop(&receiver, &inner, flush_threshold, &metrics))
            })
            .collect();

        AsyncSink {
            sender: Some(sender),
            evict: receiver,
            workers,
            inner,
            overflow: config.overflow,
            max_queue_size,
            metrics,
        }
    }

    /// Queue-side counters (evictions, rejections, delivery errors).
    pub fn metrics(&self) -> Arc<QueueMetrics> {
        Arc::clone(&self.metrics)
    }

    fn enqueue(&self, job: Job) -> Result<()> {
        let sender = self.sender.as_ref().ok_or(Error::SinkStopped)?;
        match self.overflow {
            OverflowPolicy::Block => match sender.try_send(job) {
                Ok(()) => {}
                Err(TrySendError::Full(job)) => {
                    self.metrics.record_blocked();
                    sender.send(job).map_err(|_| Error::SinkStopped)?;
                }
                Err(TrySendError::Disconnected(_)) => return Err(Error::SinkStopped),
            },
            OverflowPolicy::DropOldest => {
                let mut job = job;
                loop {
                    match sender.try_send(job) {
                        Ok(()) => break,
                        Err(TrySendError::Full(returned)) => {
                            job = returned;
                            // A worker may drain the slot before we do;
                            // either way the retry finds room. Evicting a
                            // flush request just releases its waiter.
                            match self.evict.try_recv() {
                                Ok(Job::Deliver(_)) => {
                                    self.metrics.record_dropped_oldest();
                                }
                                Ok(Job::Flush(ack)) => {
                                    let _ = ack.send(());
                                }
                                Err(_) => {}
                            }
                        }
                        Err(TrySendError::Disconnected(_)) => return Err(Error::SinkStopped),
                    }
                }
            }
            OverflowPolicy::Reject => match sender.try_send(job) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    self.metrics.record_rejected();
                    return Err(Error::queue_rejected(sender.len(), self.max_queue_size));
                }
                Err(TrySendError::Disconnected(_)) => return Err(Error::SinkStopped),
            },
        }
        self.metrics.record_enqueued();
        Ok(())
    }
}

impl Sink for AsyncSink {
    fn deliver(&mut self, event: &Event) -> Result<()> {
        self.enqueue(Job::Deliver(event.clone()))
    }

    /// Queue a flush and wait for a worker to acknowledge it.
    fn flush(&mut self) -> Result<()> {
        let sender = self.sender.as_ref().ok_or(Error::SinkStopped)?;
        let (ack_tx, ack_rx) = bounded(1);
        sender
            .send(Job::Flush(ack_tx))
            .map_err(|_| Error::SinkStopped)?;
        ack_rx
            .recv_timeout(FLUSH_ACK_TIMEOUT)
            .map_err(|_| Error::other("async flush not acknowledged within timeout"))?;
        Ok(())
    }

    fn buffered_count(&self) -> usize {
        let queued = self.sender.as_ref().map(|s| s.len()).unwrap_or(0);
        // A worker mid-delivery holds the lock; skip the inner count
        // rather than blocking the caller.
        let inner = self
            .inner
            .try_lock()
            .map(|sink| sink.buffered_count())
            .unwrap_or(0);
        queued + inner
    }

    fn kind(&self) -> &str {
        "async"
    }
}

fn worker_loop(
    receiver: &Receiver<Job>,
    inner: &Arc<Mutex<Box<dyn Sink>>>,
    flush_threshold: usize,
    metrics: &Arc<QueueMetrics>,
) {
    let mut since_flush = 0usize;
    loop {
        match receiver.recv() {
            Ok(Job::Deliver(event)) => {
                let mut sink = inner.lock();
                if let Err(e) = sink.deliver(&event) {
                    metrics.record_delivery_error();
                    eprintln!("[LOGFLUME ERROR] async delivery failed: {}", e);
                }
                since_flush += 1;
                if since_flush >= flush_threshold || receiver.is_empty() {
                    if let Err(e) = sink.flush() {
                        metrics.record_delivery_error();
                        eprintln!("[LOGFLUME ERROR] async flush failed: {}", e);
                    }
                    since_flush = 0;
                }
            }
            Ok(Job::Flush(ack)) => {
                if let Err(e) = inner.lock().flush() {
                    metrics.record_delivery_error();
                    eprintln!("[LOGFLUME ERROR] async flush failed: {}", e);
                }
                since_flush = 0;
                let _ = ack.send(());
            }
            Err(_) => {
                // Channel closed: drain is complete, write out what remains.
                if let Err(e) = inner.lock().flush() {
                    eprintln!("[LOGFLUME ERROR] final flush failed: {}", e);
                }
                break;
            }
        }
    }
}

impl Drop for AsyncSink {
    fn drop(&mut self) {
        // Close the channel first so workers drain pending jobs and exit.
        drop(self.sender.take());

        for handle in self.workers.drain(..) {
            let start = std::time::Instant::now();
            loop {
                if handle.is_finished() {
                    if let Err(e) = handle.join() {
                        eprintln!(
                            "[LOGFLUME ERROR] async worker panicked during shutdown: {:?}",
                            e
                        );
                    }
                    break;
                }

                if start.elapsed() >= DEFAULT_SHUTDOWN_TIMEOUT {
                    eprintln!(
                        "[LOGFLUME WARNING] async worker did not finish within {:?}; \
                         queued events may be lost",
                        DEFAULT_SHUTDOWN_TIMEOUT
                    );
                    break;
                }

                thread::sleep(Duration::from_millis(10));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::level::Level;

    /// Records delivered messages into a shared vector.
    struct CollectingSink {
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl Sink for CollectingSink {
        fn deliver(&mut self, event: &Event) -> Result<()> {
            self.seen.lock().push(event.message.clone());
            Ok(())
        }

        fn flush(&mut self) -> Result<()> {
            Ok(())
        }

        fn kind(&self) -> &str {
            "collecting"
        }
    }

    /// Blocks every delivery until the gate channel yields (or closes).
    struct GatedSink {
        gate: Receiver<()>,
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl Sink for GatedSink {
        fn deliver(&mut self, event: &Event) -> Result<()> {
            let _ = self.gate.recv();
            self.seen.lock().push(event.message.clone());
            Ok(())
        }

        fn flush(&mut self) -> Result<()> {
            Ok(())
        }

        fn kind(&self) -> &str {
            "gated"
        }
    }

    fn event(message: &str) -> Event {
        Event::new(&Level::INFO, message).unwrap()
    }

    fn wait_until(deadline_ms: u64, mut check: impl FnMut() -> bool) -> bool {
        let start = std::time::Instant::now();
        while start.elapsed() < Duration::from_millis(deadline_ms) {
            if check() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        check()
    }

    #[test]
    fn delivers_through_the_queue() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut sink = AsyncSink::wrap(
            Box::new(CollectingSink { seen: Arc::clone(&seen) }),
            AsyncConfig::default(),
        );

        for i in 0..10 {
            sink.deliver(&event(&format!("message {}", i))).unwrap();
        }
        sink.flush().unwrap();

        assert_eq!(seen.lock().len(), 10);
        assert_eq!(sink.metrics().enqueued(), 10);
    }

    #[test]
    fn single_worker_preserves_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut sink = AsyncSink::wrap(
            Box::new(CollectingSink { seen: Arc::clone(&seen) }),
            AsyncConfig {
                workers: 1,
                ..AsyncConfig::default()
            },
        );

        for i in 0..50 {
            sink.deliver(&event(&i.to_string())).unwrap();
        }
        sink.flush().unwrap();

        let seen = seen.lock();
        let expected: Vec<String> = (0..50).map(|i| i.to_string()).collect();
        assert_eq!(*seen, expected);
    }

    #[test]
    fn drop_drains_pending_events() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let mut sink = AsyncSink::wrap(
                Box::new(CollectingSink { seen: Arc::clone(&seen) }),
                AsyncConfig::default(),
            );
            for i in 0..20 {
                sink.deliver(&event(&format!("m{}", i))).unwrap();
            }
        }
        assert_eq!(seen.lock().len(), 20);
    }

    #[test]
    fn drop_oldest_evicts_to_admit_newest() {
        let (gate_tx, gate_rx) = crossbeam_channel::unbounded();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut sink = AsyncSink::wrap(
            Box::new(GatedSink {
                gate: gate_rx,
                seen: Arc::clone(&seen),
            }),
            AsyncConfig {
                max_queue_size: 2,
                workers: 1,
                overflow: OverflowPolicy::DropOldest,
                ..AsyncConfig::default()
            },
        );

        // First event parks the worker inside deliver, leaving the queue
        // itself free for exactly two more.
        sink.deliver(&event("first")).unwrap();
        assert!(wait_until(1000, || sink
            .sender
            .as_ref()
            .map(|s| s.is_empty())
            .unwrap_or(false)));

        sink.deliver(&event("second")).unwrap();
        sink.deliver(&event("third")).unwrap();
        sink.deliver(&event("fourth")).unwrap();

        assert_eq!(sink.metrics().dropped_oldest(), 1);

        // Release the worker for the remaining deliveries.
        drop(gate_tx);
        sink.flush().unwrap();

        let seen = seen.lock();
        assert_eq!(*seen, ["first", "third", "fourth"]);
    }

    #[test]
    fn reject_returns_structured_error() {
        let (gate_tx, gate_rx) = crossbeam_channel::unbounded();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut sink = AsyncSink::wrap(
            Box::new(GatedSink {
                gate: gate_rx,
                seen: Arc::clone(&seen),
            }),
            AsyncConfig {
                max_queue_size: 1,
                workers: 1,
                overflow: OverflowPolicy::Reject,
                ..AsyncConfig::default()
            },
        );

        sink.deliver(&event("first")).unwrap();
        assert!(wait_until(1000, || sink
            .sender
            .as_ref()
            .map(|s| s.is_empty())
            .unwrap_or(false)));

        sink.deliver(&event("second")).unwrap();
        let err = sink.deliver(&event("overflow")).unwrap_err();
        assert!(matches!(err, Error::QueueRejected { .. }));
        assert_eq!(sink.metrics().rejected(), 1);

        drop(gate_tx);
        sink.flush().unwrap();
        assert_eq!(seen.lock().len(), 2);
    }

    #[test]
    fn buffered_count_reports_queue_depth() {
        let (gate_tx, gate_rx) = crossbeam_channel::unbounded();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut sink = AsyncSink::wrap(
            Box::new(GatedSink {
                gate: gate_rx,
                seen: Arc::clone(&seen),
            }),
            AsyncConfig {
                max_queue_size: 8,
                workers: 1,
                ..AsyncConfig::default()
            },
        );

        sink.deliver(&event("first")).unwrap();
        assert!(wait_until(1000, || sink
            .sender
            .as_ref()
            .map(|s| s.is_empty())
            .unwrap_or(false)));

        sink.deliver(&event("queued-1")).unwrap();
        sink.deliver(&event("queued-2")).unwrap();
        assert_eq!(sink.buffered_count(), 2);

        drop(gate_tx);
        sink.flush().unwrap();
        assert_eq!(sink.buffered_count(), 0);
    }
}
