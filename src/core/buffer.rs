//! Shared accumulate-and-flush engine for buffered sinks
//!
//! Every buffered sink (object store, append blob, table, and the batching
//! modes of file and HTTP) delegates its accumulation discipline here so the
//! rules live in one place: flushing an empty buffer is a no-op, and the
//! pending items are cleared only after the write succeeds, so a failed
//! flush loses nothing.

use crate::core::error::Result;

#[derive(Debug)]
pub struct BatchBuffer<T> {
    pending: Vec<T>,
    threshold: usize,
    flushing: bool,
}

impl<T> BatchBuffer<T> {
    /// A buffer that becomes due every `threshold` items (minimum 1).
    pub fn new(threshold: usize) -> Self {
        BatchBuffer {
            pending: Vec::new(),
            threshold: threshold.max(1),
            flushing: false,
        }
    }

    pub fn push(&mut self, item: T) {
        self.pending.push(item);
    }

    /// True once the accumulator reached the flush threshold.
    pub fn is_due(&self) -> bool {
        self.pending.len() >= self.threshold
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Run `write` over the pending items and clear them on success.
    ///
    /// A failed write keeps the accumulator intact for the next attempt. A
    /// flush triggered while one is already running is skipped rather than
    /// interleaved.
    pub fn flush_with<F>(&mut self, write: F) -> Result<()>
    where
        F: FnOnce(&[T]) -> Result<()>,
    {
        if self.flushing || self.pending.is_empty() {
            return Ok(());
        }
        self.flushing = true;
        let result = write(&self.pending);
        if result.is_ok() {
            self.pending.clear();
        }
        self.flushing = false;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::Error;

    #[test]
    fn empty_flush_never_calls_the_writer() {
        let mut buffer: BatchBuffer<String> = BatchBuffer::new(3);
        buffer
            .flush_with(|_| panic!("writer must not run on an empty buffer"))
            .unwrap();
    }

    #[test]
    fn due_exactly_at_threshold() {
        let mut buffer = BatchBuffer::new(2);
        buffer.push(1);
        assert!(!buffer.is_due());
        buffer.push(2);
        assert!(buffer.is_due());
    }

    #[test]
    fn success_clears_the_accumulator() {
        let mut buffer = BatchBuffer::new(10);
        buffer.push("a");
        buffer.push("b");

        let mut seen = Vec::new();
        buffer
            .flush_with(|items| {
                seen = items.to_vec();
                Ok(())
            })
            .unwrap();

        assert_eq!(seen, ["a", "b"]);
        assert!(buffer.is_empty());
        assert!(!buffer.flushing);
    }

    #[test]
    fn failure_keeps_items_for_the_next_attempt() {
        let mut buffer = BatchBuffer::new(10);
        buffer.push(1);
        buffer.push(2);

        let err = buffer
            .flush_with(|_| Err(Error::sink("store unavailable")))
            .unwrap_err();
        assert!(matches!(err, Error::Sink(_)));
        assert_eq!(buffer.len(), 2);

        // Items pushed after the failure join the retried batch.
        buffer.push(3);
        let mut seen = Vec::new();
        buffer
            .flush_with(|items| {
                seen = items.to_vec();
                Ok(())
            })
            .unwrap();
        assert_eq!(seen, [1, 2, 3]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn zero_threshold_is_clamped_to_one() {
        let mut buffer = BatchBuffer::new(0);
        assert_eq!(buffer.threshold(), 1);
        buffer.push(());
        assert!(buffer.is_due());
    }
}
