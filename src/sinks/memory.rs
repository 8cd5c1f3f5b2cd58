//! In-memory sink for tests and embedded inspection.
//!
//! [`MemorySink::new`] returns the sink plus a cloneable [`MemoryBuffer`]
//! handle onto the same storage, so a test can hand the sink to a logger
//! and still read back what arrived. There is no registry backend for
//! this sink; construct it directly and wrap it in a
//! [`BuiltSink`](crate::core::sink::BuiltSink).

use crate::core::error::Result;
use crate::core::event::Event;
use crate::core::formatter::Formatter;
use crate::core::sink::Sink;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Default)]
struct Shared {
    events: Vec<Event>,
    lines: Vec<String>,
}

/// Read handle onto a [`MemorySink`]'s storage.
#[derive(Clone, Default)]
pub struct MemoryBuffer {
    shared: Arc<Mutex<Shared>>,
}

impl MemoryBuffer {
    /// Every event delivered so far, in arrival order.
    pub fn snapshot(&self) -> Vec<Event> {
        self.shared.lock().events.clone()
    }

    /// Just the messages, for terse assertions.
    pub fn messages(&self) -> Vec<String> {
        self.shared
            .lock()
            .events
            .iter()
            .map(|event| event.message.clone())
            .collect()
    }

    /// Rendered lines, when the sink was built with a formatter.
    pub fn lines(&self) -> Vec<String> {
        self.shared.lock().lines.clone()
    }

    pub fn len(&self) -> usize {
        self.shared.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.lock().events.is_empty()
    }

    pub fn clear(&self) {
        let mut shared = self.shared.lock();
        shared.events.clear();
        shared.lines.clear();
    }
}

pub struct MemorySink {
    shared: Arc<Mutex<Shared>>,
    formatter: Option<Formatter>,
    header_written: bool,
}

impl MemorySink {
    /// Sink that records raw events only.
    pub fn new() -> (MemorySink, MemoryBuffer) {
        let buffer = MemoryBuffer::default();
        let sink = MemorySink {
            shared: Arc::clone(&buffer.shared),
            formatter: None,
            header_written: false,
        };
        (sink, buffer)
    }

    /// Sink that also records what `formatter` renders for each event.
    pub fn with_formatter(formatter: Formatter) -> (MemorySink, MemoryBuffer) {
        let (mut sink, buffer) = MemorySink::new();
        sink.formatter = Some(formatter);
        (sink, buffer)
    }
}

impl Sink for MemorySink {
    fn deliver(&mut self, event: &Event) -> Result<()> {
        let mut shared = self.shared.lock();
        shared.events.push(event.clone());
        if let Some(formatter) = &self.formatter {
            let rendered = formatter.render(event);
            shared
                .lines
                .extend(rendered.into_lines(&mut self.header_written)?);
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn kind(&self) -> &str {
        "memory"
    }
}
