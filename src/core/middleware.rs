//! Middleware stages for the dispatch pipeline
//!
//! A middleware stage receives an event by value and returns `Some(event)`
//! to pass it on (possibly transformed) or `None` to drop it. Stages run in
//! attachment order, once at the logger tier before filtering and again per
//! sink after the sink's own level check.

use crate::core::event::{Event, FieldValue};
use crate::core::level::Level;
use rand::Rng;
use std::sync::Arc;

/// A pipeline stage: transform, enrich, or drop an event.
pub type Middleware = Arc<dyn Fn(Event) -> Option<Event> + Send + Sync>;

/// Build a middleware stage from any matching closure.
///
/// # Example
///
/// ```
/// use logflume::core::middleware;
///
/// let drop_chatty = middleware::stage(|event| {
///     if event.tags.iter().any(|t| t == "chatty") {
///         None
///     } else {
///         Some(event)
///     }
/// });
/// ```
pub fn stage<F>(f: F) -> Middleware
where
    F: Fn(Event) -> Option<Event> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Set a field on every event passing through, overwriting any existing
/// value under the same key.
pub fn enrich_field(key: impl Into<String>, value: impl Into<FieldValue>) -> Middleware {
    let key = key.into();
    let value = value.into();
    Arc::new(move |mut event| {
        event.add_field(key.clone(), value.clone());
        Some(event)
    })
}

/// Replace the values of the named fields with `"[redacted]"` where present.
pub fn redact_fields<I, S>(keys: I) -> Middleware
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
    Arc::new(move |mut event| {
        for key in &keys {
            if event.fields.contains_key(key) {
                event.add_field(key.clone(), "[redacted]");
            }
        }
        Some(event)
    })
}

/// Keep roughly `rate` of the traffic below WARNING; WARNING and above
/// always pass.
///
/// The rate is clamped into 0.0..=1.0.
pub fn sample(rate: f64) -> Middleware {
    let rate = rate.clamp(0.0, 1.0);
    Arc::new(move |event| {
        if event.level_number >= Level::WARNING.value() {
            return Some(event);
        }
        if rate >= 1.0 || rand::thread_rng().gen::<f64>() < rate {
            Some(event)
        } else {
            None
        }
    })
}

/// Run a chain of stages; stops at the first stage that drops the event.
pub(crate) fn run(stages: &[Middleware], mut event: Event) -> Option<Event> {
    for stage in stages {
        event = stage(event)?;
    }
    Some(event)
}
