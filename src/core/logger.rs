//! Dispatch pipeline
//!
//! A [`Logger`] is an immutable pipeline description: an inclusive level
//! range, tags to append, middleware to run, and named sinks to deliver to.
//! Builder methods derive new loggers and leave the original untouched, so a
//! base logger can be shared and specialised per subsystem. Clones share
//! sinks and metrics.
//!
//! Delivery is isolated per sink: an error or panic in one sink is counted,
//! reported through the console fallback as a synthetic error event, and
//! never prevents the remaining sinks from receiving the original event.

use crate::core::error::{Error, Result};
use crate::core::event::{Event, FieldValue};
use crate::core::level::Level;
use crate::core::metrics::DispatchMetrics;
use crate::core::middleware::{self, Middleware};
use crate::core::sink::{BuiltSink, Sink};
use crate::sinks::console::ConsoleSink;
use parking_lot::Mutex;
use std::any::Any;
use std::sync::{Arc, OnceLock};

struct SinkEntry {
    name: String,
    built: BuiltSink,
}

/// Structured-event dispatcher.
///
/// ```
/// use logflume::core::level::Level;
/// use logflume::core::logger::Logger;
///
/// let logger = Logger::new()
///     .with_limits(&Level::INFO, &Level::CRITICAL)?
///     .with_tags(["service:auth"]);
/// logger.info("listener started");
/// # Ok::<(), logflume::core::error::Error>(())
/// ```
#[derive(Clone)]
pub struct Logger {
    lower_limit: u8,
    upper_limit: u8,
    tags: Vec<String>,
    middleware: Vec<Middleware>,
    sinks: Vec<Arc<SinkEntry>>,
    metrics: Arc<DispatchMetrics>,
    fallback: Arc<Mutex<Box<dyn Sink>>>,
}

impl Logger {
    /// A logger that accepts the full level range and has no tags,
    /// middleware, or sinks.
    pub fn new() -> Logger {
        Logger {
            lower_limit: Level::ALL.value(),
            upper_limit: Level::OFF.value(),
            tags: Vec::new(),
            middleware: Vec::new(),
            sinks: Vec::new(),
            metrics: Arc::new(DispatchMetrics::new()),
            fallback: Arc::new(Mutex::new(Box::new(ConsoleSink::fallback()))),
        }
    }

    /// Derive a logger restricted to the inclusive `lower..=upper` range.
    pub fn with_limits(&self, lower: &Level, upper: &Level) -> Result<Logger> {
        if lower.value() > upper.value() {
            return Err(Error::InvalidRange {
                lower: lower.value(),
                upper: upper.value(),
            });
        }
        let mut logger = self.clone();
        logger.lower_limit = lower.value();
        logger.upper_limit = upper.value();
        Ok(logger)
    }

    /// Derive a logger whose tags are this logger's tags plus `tags`.
    #[must_use = "builder methods return a new value"]
    pub fn with_tags<I, S>(&self, tags: I) -> Logger
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut logger = self.clone();
        logger.tags.extend(tags.into_iter().map(Into::into));
        logger
    }

    /// Derive a logger with `stage` appended to the middleware chain.
    /// Stages run in registration order before level filtering.
    #[must_use = "builder methods return a new value"]
    pub fn with_middleware(&self, stage: Middleware) -> Logger {
        let mut logger = self.clone();
        logger.middleware.push(stage);
        logger
    }

    /// Derive a logger with `built` attached under `name`. Names must be
    /// unique within a logger.
    pub fn with_sink(&self, name: impl Into<String>, built: BuiltSink) -> Result<Logger> {
        let name = name.into();
        if self.sinks.iter().any(|entry| entry.name == name) {
            return Err(Error::DuplicateSink { name });
        }
        let mut logger = self.clone();
        logger.sinks.push(Arc::new(SinkEntry { name, built }));
        Ok(logger)
    }

    /// Derive a logger that reports sink failures to `sink` instead of the
    /// console. Mostly useful for capturing failure notices in tests and
    /// embedded environments.
    #[must_use = "builder methods return a new value"]
    pub fn with_fallback(&self, sink: Box<dyn Sink>) -> Logger {
        let mut logger = self.clone();
        logger.fallback = Arc::new(Mutex::new(sink));
        logger
    }

    /// Run `event` through the pipeline: middleware, level filter, tag
    /// merge, then delivery to every accepting sink.
    ///
    /// Returns the final event as delivered, or `None` when middleware
    /// suppressed it or the level fell outside this logger's range.
    pub fn emit(&self, event: Event) -> Option<Event> {
        self.metrics.record_emitted();

        let event = match middleware::run(&self.middleware, event) {
            Some(event) => event,
            None => {
                self.metrics.record_suppressed();
                return None;
            }
        };

        if event.level_number < self.lower_limit || event.level_number > self.upper_limit {
            self.metrics.record_filtered();
            return None;
        }

        let event = event.merge_tags(&self.tags);
        self.dispatch(&event);
        Some(event)
    }

    /// Build an event at `level` and emit it. Fails on boundary levels
    /// (`ALL`, `OFF`), which exist only for range configuration.
    pub fn log(&self, level: &Level, message: impl Into<String>) -> Result<Option<Event>> {
        let event = Event::new(level, message)?;
        Ok(self.emit(event))
    }

    /// Start a structured event at `level`; finish with
    /// [`EventBuilder::emit`].
    pub fn event(&self, level: &Level, message: impl Into<String>) -> EventBuilder<'_> {
        EventBuilder {
            logger: self,
            level: level.clone(),
            message: message.into(),
            tags: Vec::new(),
            fields: Vec::new(),
        }
    }

    pub fn debug(&self, message: impl Into<String>) -> Option<Event> {
        self.emit(Event::build(&Level::DEBUG, message.into()))
    }

    pub fn info(&self, message: impl Into<String>) -> Option<Event> {
        self.emit(Event::build(&Level::INFO, message.into()))
    }

    pub fn note(&self, message: impl Into<String>) -> Option<Event> {
        self.emit(Event::build(&Level::NOTE, message.into()))
    }

    pub fn success(&self, message: impl Into<String>) -> Option<Event> {
        self.emit(Event::build(&Level::SUCCESS, message.into()))
    }

    pub fn warning(&self, message: impl Into<String>) -> Option<Event> {
        self.emit(Event::build(&Level::WARNING, message.into()))
    }

    pub fn error(&self, message: impl Into<String>) -> Option<Event> {
        self.emit(Event::build(&Level::ERROR, message.into()))
    }

    pub fn critical(&self, message: impl Into<String>) -> Option<Event> {
        self.emit(Event::build(&Level::CRITICAL, message.into()))
    }

    /// Flush every sink. All sinks are attempted; the first failure is
    /// returned after the pass completes.
    pub fn flush(&self) -> Result<()> {
        let mut first_error = None;
        for entry in &self.sinks {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                entry.built.lock().flush()
            }));
            let result = match outcome {
                Ok(result) => result,
                Err(panic_info) => Err(Error::sink(format!(
                    "sink \"{}\" panicked during flush: {}",
                    entry.name,
                    panic_message(panic_info)
                ))),
            };
            if let Err(e) = result {
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
        match first_error {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }

    /// Flush the sink registered under `name`.
    pub fn flush_sink(&self, name: &str) -> Result<()> {
        self.entry(name)?.built.lock().flush()
    }

    /// Events currently buffered by the sink registered under `name`.
    pub fn buffered_count(&self, name: &str) -> Result<usize> {
        Ok(self.entry(name)?.built.lock().buffered_count())
    }

    pub fn sink_names(&self) -> Vec<&str> {
        self.sinks.iter().map(|entry| entry.name.as_str()).collect()
    }

    pub fn metrics(&self) -> &DispatchMetrics {
        &self.metrics
    }

    fn entry(&self, name: &str) -> Result<&Arc<SinkEntry>> {
        self.sinks
            .iter()
            .find(|entry| entry.name == name)
            .ok_or_else(|| Error::UnknownSink {
                name: name.to_string(),
            })
    }

    fn dispatch(&self, event: &Event) {
        for (index, entry) in self.sinks.iter().enumerate() {
            if !entry.built.accepts(event.level_number) {
                continue;
            }

            // Sink middleware may rewrite or veto the event for this sink
            // alone, so it runs on a copy.
            let prepared;
            let stages = entry.built.middleware();
            let outgoing = if stages.is_empty() {
                event
            } else {
                match middleware::run(stages, event.clone()) {
                    Some(rewritten) => {
                        prepared = rewritten;
                        &prepared
                    }
                    None => continue,
                }
            };

            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                entry.built.lock().deliver(outgoing)
            }));

            match outcome {
                Ok(Ok(())) => {
                    self.metrics.record_delivered();
                }
                Ok(Err(e)) => {
                    self.sink_failure(index, entry, &e.to_string());
                }
                Err(panic_info) => {
                    let message = panic_message(panic_info);
                    self.sink_failure(index, entry, &format!("panicked: {}", message));
                }
            }
        }
    }

    /// Report a failed delivery through the fallback sink. Recovery stops
    /// here: a failing fallback is counted and written raw to stderr, never
    /// re-reported.
    fn sink_failure(&self, index: usize, entry: &SinkEntry, failure: &str) {
        self.metrics.record_sink_error();

        let notice = Event::build(
            &Level::ERROR,
            format!("sink #{} ({}) failed: {}", index, entry.name, failure),
        )
        .with_tag("sink_error")
        .with_field("sink", entry.name.as_str());

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.fallback.lock().deliver(&notice)
        }));

        let failure = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e.to_string(),
            Err(panic_info) => format!("panicked: {}", panic_message(panic_info)),
        };

        self.metrics.record_fallback_error();
        eprintln!("[LOGFLUME CRITICAL] fallback delivery failed: {}", failure);
        eprintln!("[LOGFLUME CRITICAL] lost notice: {}", notice.message);
    }
}

impl Default for Logger {
    fn default() -> Self {
        Logger::new()
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("lower_limit", &self.lower_limit)
            .field("upper_limit", &self.upper_limit)
            .field("tags", &self.tags)
            .field("middleware", &self.middleware.len())
            .field("sinks", &self.sink_names())
            .finish()
    }
}

/// Incrementally assembled event bound to the logger that will emit it.
pub struct EventBuilder<'a> {
    logger: &'a Logger,
    level: Level,
    message: String,
    tags: Vec<String>,
    fields: Vec<(String, FieldValue)>,
}

impl EventBuilder<'_> {
    #[must_use = "builder methods return a new value"]
    pub fn field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.push((key.into(), value.into()));
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Build and emit the event through the owning logger.
    pub fn emit(self) -> Result<Option<Event>> {
        let EventBuilder {
            logger,
            level,
            message,
            tags,
            fields,
        } = self;
        let mut event = Event::new(&level, message)?;
        for (key, value) in fields {
            event = event.with_field(key, value);
        }
        event = event.with_tags(tags);
        Ok(logger.emit(event))
    }
}

fn panic_message(panic_info: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic_info.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

static GLOBAL: OnceLock<Logger> = OnceLock::new();
static UNCONFIGURED: OnceLock<Logger> = OnceLock::new();

/// Install the process-wide logger. Returns the rejected logger if one was
/// already installed.
pub fn init(logger: Logger) -> std::result::Result<(), Logger> {
    GLOBAL.set(logger)
}

/// The process-wide logger. Until [`init`] runs this yields a logger with no
/// sinks, so events are counted but delivered nowhere.
pub fn global() -> &'static Logger {
    GLOBAL
        .get()
        .unwrap_or_else(|| UNCONFIGURED.get_or_init(Logger::new))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CollectingSink {
        seen: Arc<Mutex<Vec<Event>>>,
    }

    impl CollectingSink {
        fn pair() -> (Box<dyn Sink>, Arc<Mutex<Vec<Event>>>) {
            let seen = Arc::new(Mutex::new(Vec::new()));
            let sink = CollectingSink {
                seen: Arc::clone(&seen),
            };
            (Box::new(sink), seen)
        }
    }

    impl Sink for CollectingSink {
        fn deliver(&mut self, event: &Event) -> Result<()> {
            self.seen.lock().push(event.clone());
            Ok(())
        }

        fn flush(&mut self) -> Result<()> {
            Ok(())
        }

        fn kind(&self) -> &str {
            "collecting"
        }
    }

    struct FailingSink;

    impl Sink for FailingSink {
        fn deliver(&mut self, _event: &Event) -> Result<()> {
            Err(Error::sink("disk on fire"))
        }

        fn flush(&mut self) -> Result<()> {
            Err(Error::sink("still on fire"))
        }

        fn kind(&self) -> &str {
            "failing"
        }
    }

    struct PanickySink;

    impl Sink for PanickySink {
        fn deliver(&mut self, _event: &Event) -> Result<()> {
            panic!("sink exploded");
        }

        fn flush(&mut self) -> Result<()> {
            Ok(())
        }

        fn kind(&self) -> &str {
            "panicky"
        }
    }

    fn collecting_logger() -> (Logger, Arc<Mutex<Vec<Event>>>) {
        let (sink, seen) = CollectingSink::pair();
        let logger = Logger::new()
            .with_sink("memory", BuiltSink::new("memory", sink))
            .unwrap();
        (logger, seen)
    }

    #[test]
    fn fresh_logger_passes_every_level() {
        let logger = Logger::new();
        assert!(logger.debug("d").is_some());
        assert!(logger.critical("c").is_some());
        assert_eq!(logger.metrics().emitted(), 2);
        assert_eq!(logger.metrics().filtered(), 0);
        // No sinks attached, so nothing was delivered.
        assert_eq!(logger.metrics().delivered(), 0);
    }

    #[test]
    fn level_filter_is_inclusive_on_both_ends() {
        let logger = Logger::new()
            .with_limits(&Level::INFO, &Level::WARNING)
            .unwrap();

        assert!(logger.debug("below").is_none());
        assert!(logger.info("lower edge").is_some());
        assert!(logger.warning("upper edge").is_some());
        assert!(logger.error("above").is_none());
        assert_eq!(logger.metrics().filtered(), 2);
    }

    #[test]
    fn inverted_limits_are_rejected() {
        let err = Logger::new()
            .with_limits(&Level::ERROR, &Level::INFO)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRange { lower: 80, upper: 20 }));
    }

    #[test]
    fn middleware_can_suppress_events() {
        let (base, seen) = collecting_logger();
        let logger = base.with_middleware(middleware::stage(|event| {
            if event.message.contains("secret") {
                None
            } else {
                Some(event)
            }
        }));

        assert!(logger.info("a secret thing").is_none());
        assert!(logger.info("a public thing").is_some());
        assert_eq!(logger.metrics().suppressed(), 1);
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn middleware_runs_before_the_level_filter() {
        let logger = Logger::new()
            .with_limits(&Level::ERROR, &Level::OFF)
            .unwrap()
            .with_middleware(middleware::stage(|_| None));

        assert!(logger.info("dropped by middleware, not by level").is_none());
        assert_eq!(logger.metrics().suppressed(), 1);
        assert_eq!(logger.metrics().filtered(), 0);
    }

    #[test]
    fn tags_merge_event_then_level_then_logger() {
        let (base, seen) = collecting_logger();
        let logger = base.with_tags(["service:auth"]);
        let audit = Level::custom("AUDIT", 45)
            .unwrap()
            .with_tags(["compliance"]);

        logger
            .log(&audit, "password rotated")
            .unwrap()
            .expect("event should pass");

        let seen = seen.lock();
        assert_eq!(seen[0].tags, ["compliance", "service:auth"]);

        let tagged = logger
            .event(&audit, "password rotated")
            .tag("session")
            .emit()
            .unwrap()
            .expect("event should pass");
        assert_eq!(tagged.tags, ["session", "compliance", "service:auth"]);
    }

    #[test]
    fn sink_bounds_route_by_level() {
        let (errors_sink, errors) = CollectingSink::pair();
        let (all_sink, all) = CollectingSink::pair();

        let logger = Logger::new()
            .with_sink(
                "errors",
                BuiltSink::new("errors", errors_sink)
                    .with_limits(&Level::ERROR, &Level::CRITICAL)
                    .unwrap(),
            )
            .unwrap()
            .with_sink("all", BuiltSink::new("all", all_sink))
            .unwrap();

        logger.info("routine");
        logger.error("broken");

        assert_eq!(errors.lock().len(), 1);
        assert_eq!(all.lock().len(), 2);
        assert_eq!(logger.metrics().delivered(), 3);
    }

    #[test]
    fn failing_sink_does_not_block_others() {
        let (fallback, notices) = CollectingSink::pair();
        let (healthy, seen) = CollectingSink::pair();

        let logger = Logger::new()
            .with_fallback(fallback)
            .with_sink(
                "broken",
                BuiltSink::new("file(/bad/path)", Box::new(FailingSink)),
            )
            .unwrap()
            .with_sink("healthy", BuiltSink::new("healthy", healthy))
            .unwrap();

        assert!(logger.info("important").is_some());

        assert_eq!(seen.lock().len(), 1);
        assert_eq!(logger.metrics().sink_errors(), 1);
        assert_eq!(logger.metrics().delivered(), 1);

        let notices = notices.lock();
        assert_eq!(notices.len(), 1);
        let notice = &notices[0];
        assert_eq!(notice.level_name, "ERROR");
        assert!(notice.tags.contains(&"sink_error".to_string()));
        assert!(notice.message.contains("sink #0 (file(/bad/path)) failed"));
        assert!(notice.message.contains("disk on fire"));
    }

    #[test]
    fn panicking_sink_is_isolated() {
        let (fallback, notices) = CollectingSink::pair();
        let (healthy, seen) = CollectingSink::pair();

        let logger = Logger::new()
            .with_fallback(fallback)
            .with_sink("panicky", BuiltSink::new("panicky", Box::new(PanickySink)))
            .unwrap()
            .with_sink("healthy", BuiltSink::new("healthy", healthy))
            .unwrap();

        logger.warning("brace for impact");

        assert_eq!(seen.lock().len(), 1);
        assert_eq!(logger.metrics().sink_errors(), 1);
        let notices = notices.lock();
        assert!(notices[0].message.contains("panicked: sink exploded"));
    }

    #[test]
    fn broken_fallback_never_recurses() {
        let logger = Logger::new()
            .with_fallback(Box::new(FailingSink))
            .with_sink("panicky", BuiltSink::new("panicky", Box::new(PanickySink)))
            .unwrap();

        // Both the sink and the fallback fail; recovery must stop after the
        // stderr report rather than looping.
        logger.error("cascading failure");
        assert_eq!(logger.metrics().sink_errors(), 1);
        assert_eq!(logger.metrics().fallback_errors(), 1);
    }

    #[test]
    fn duplicate_sink_names_are_rejected() {
        let (first, _) = CollectingSink::pair();
        let (second, _) = CollectingSink::pair();

        let logger = Logger::new()
            .with_sink("memory", BuiltSink::new("memory", first))
            .unwrap();
        let err = logger
            .with_sink("memory", BuiltSink::new("memory", second))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateSink { .. }));
    }

    #[test]
    fn per_sink_middleware_does_not_leak_across_sinks() {
        let (redacted_sink, redacted) = CollectingSink::pair();
        let (plain_sink, plain) = CollectingSink::pair();

        let logger = Logger::new()
            .with_sink(
                "redacted",
                BuiltSink::new("redacted", redacted_sink)
                    .with_middleware(middleware::redact_fields(["card"])),
            )
            .unwrap()
            .with_sink("plain", BuiltSink::new("plain", plain_sink))
            .unwrap();

        logger
            .event(&Level::INFO, "payment accepted")
            .field("card", "4111-1111")
            .emit()
            .unwrap();

        assert_eq!(
            redacted.lock()[0].fields["card"],
            FieldValue::String("[redacted]".to_string())
        );
        assert_eq!(
            plain.lock()[0].fields["card"],
            FieldValue::String("4111-1111".to_string())
        );
    }

    #[test]
    fn boundary_levels_cannot_be_logged() {
        let logger = Logger::new();
        assert!(matches!(
            logger.log(&Level::ALL, "nope"),
            Err(Error::BoundaryLevel { value: 0, .. })
        ));
        assert!(matches!(
            logger.log(&Level::OFF, "nope"),
            Err(Error::BoundaryLevel { value: 100, .. })
        ));
    }

    #[test]
    fn flush_reports_first_error_after_trying_every_sink() {
        let (healthy, _) = CollectingSink::pair();
        let logger = Logger::new()
            .with_sink("broken", BuiltSink::new("broken", Box::new(FailingSink)))
            .unwrap()
            .with_sink("healthy", BuiltSink::new("healthy", healthy))
            .unwrap();

        let err = logger.flush().unwrap_err();
        assert!(err.to_string().contains("still on fire"));
    }

    #[test]
    fn flush_sink_rejects_unknown_names() {
        let logger = Logger::new();
        assert!(matches!(
            logger.flush_sink("nope"),
            Err(Error::UnknownSink { .. })
        ));
        assert!(matches!(
            logger.buffered_count("nope"),
            Err(Error::UnknownSink { .. })
        ));
    }

    #[test]
    fn derived_loggers_share_sinks_and_metrics() {
        let (base, seen) = collecting_logger();
        let child = base.with_tags(["child"]);

        base.info("from base");
        child.info("from child");

        assert_eq!(seen.lock().len(), 2);
        assert_eq!(base.metrics().emitted(), 2);
        assert_eq!(child.metrics().emitted(), 2);
    }

    #[test]
    fn suppression_rate_counts_both_drop_paths() {
        let logger = Logger::new()
            .with_limits(&Level::WARNING, &Level::OFF)
            .unwrap()
            .with_middleware(middleware::stage(|event| {
                if event.message == "veto" {
                    None
                } else {
                    Some(event)
                }
            }));

        logger.info("filtered");
        logger.warning("veto");
        logger.warning("passes");

        let rate = logger.metrics().suppression_rate();
        assert!((66.0..67.0).contains(&rate), "rate was {}", rate);
    }

    #[test]
    fn global_logger_is_installed_once() {
        // Before init, the accessor yields a sinkless logger.
        assert!(global().sink_names().is_empty());

        let (sink, seen) = CollectingSink::pair();
        let configured = Logger::new()
            .with_sink("memory", BuiltSink::new("memory", sink))
            .unwrap();
        init(configured).expect("first install succeeds");

        global().info("through the global pipeline");
        assert_eq!(seen.lock().len(), 1);

        assert!(init(Logger::new()).is_err());
    }
}
