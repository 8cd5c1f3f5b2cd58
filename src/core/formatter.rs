//! Formatters: pure event-to-representation functions plus sink construction
//! state
//!
//! A `Formatter` renders events into one of three shapes: a single line
//! (text, JSON), a CSV record with an optional once-per-sink header, or a
//! columnar [`Row`]. It also carries the construction state a
//! [`BackendRegistry`](crate::core::registry::BackendRegistry) needs to turn
//! it into a running sink: the backend name and config, and optional
//! per-sink level bounds.
//!
//! Rendering never touches the outside world; delivery is the sink's job.

use crate::core::error::{Error, Result};
use crate::core::event::{Event, FieldValue};
use crate::core::level::Level;
use crate::core::timestamp::TimestampFormat;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Default text template.
pub const DEFAULT_TEXT_TEMPLATE: &str = "{time} [{level}:{levelNumber}] {message}";

/// Render function for custom formatters.
pub type RenderFn = Arc<dyn Fn(&Event, &TimestampFormat) -> Rendered + Send + Sync>;

/// One rendered event, ready for a sink.
#[derive(Debug, Clone)]
pub enum Rendered {
    /// A single output line (text and JSON formatters).
    Line(String),
    /// A CSV record with the header derived from this event's shape; the
    /// sink writes the header once per lifetime.
    Csv { header: String, record: String },
    /// A columnar row for table sinks.
    Row(Row),
}

/// Column-wise view of one event, consumed by columnar sinks.
#[derive(Debug, Clone)]
pub struct Row {
    pub time: String,
    pub level: String,
    pub level_number: u8,
    pub message: String,
    pub tags: Vec<String>,
    /// Custom fields, already sorted by key.
    pub extras: BTreeMap<String, FieldValue>,
}

impl Rendered {
    /// Flatten into output lines for a line-oriented sink.
    ///
    /// A CSV header is emitted only on the first call per `header_written`
    /// flag. Rows have no line form; asking for one is a formatter/backend
    /// mismatch the builders normally reject at construction.
    pub fn into_lines(self, header_written: &mut bool) -> Result<Vec<String>> {
        match self {
            Rendered::Line(line) => Ok(vec![line]),
            Rendered::Csv { header, record } => {
                if *header_written {
                    Ok(vec![record])
                } else {
                    *header_written = true;
                    Ok(vec![header, record])
                }
            }
            Rendered::Row(_) => Err(Error::formatter(
                "table",
                "row output requires a columnar sink",
            )),
        }
    }

    /// Extract the columnar row, failing for line output.
    pub fn into_row(self) -> Result<Row> {
        match self {
            Rendered::Row(row) => Ok(row),
            Rendered::Line(_) | Rendered::Csv { .. } => Err(Error::formatter(
                "table",
                "columnar sinks require a row formatter",
            )),
        }
    }
}

#[derive(Clone)]
enum FormatKind {
    Text { template: String },
    Json,
    Csv { header: bool },
    Table,
    Custom {
        name: String,
        requires_buffering: bool,
        render: RenderFn,
    },
}

/// An attached backend: registry name plus its config blob.
#[derive(Debug, Clone)]
struct Backend {
    name: String,
    config: serde_json::Value,
}

/// A formatter plus the construction state needed to resolve it into a sink.
#[derive(Clone)]
pub struct Formatter {
    kind: FormatKind,
    timestamp: TimestampFormat,
    backend: Option<Backend>,
    limits: Option<(u8, u8)>,
}

impl Formatter {
    fn with_kind(kind: FormatKind) -> Self {
        Formatter {
            kind,
            timestamp: TimestampFormat::default(),
            backend: None,
            limits: None,
        }
    }

    /// Text lines using the default `{time} [{level}:{levelNumber}] {message}`
    /// template.
    pub fn text() -> Self {
        Self::text_template(DEFAULT_TEXT_TEMPLATE)
    }

    /// Text lines using a custom template.
    ///
    /// Recognised placeholders: `{time}`, `{level}`, `{levelNumber}`,
    /// `{message}`, `{tags}` (rendered `[a, b]`, empty when there are none),
    /// `{fields}` (`key=value` pairs, space separated), and any custom field
    /// by name. Unknown placeholders render empty. Substitution is a single
    /// pass over the template, so placeholder-shaped text inside the message
    /// stays literal.
    pub fn text_template(template: impl Into<String>) -> Self {
        Self::with_kind(FormatKind::Text {
            template: template.into(),
        })
    }

    /// One JSON object per event: `time`, `level`, `levelNumber`, `message`,
    /// `tags` (omitted when empty), custom fields flattened alongside.
    pub fn json() -> Self {
        Self::with_kind(FormatKind::Json)
    }

    /// CSV records without a header row.
    ///
    /// Fixed columns `time,level,levelNumber,message,tags` followed by the
    /// event's custom field names in sorted order. Tags share one cell,
    /// pipe-delimited.
    pub fn csv() -> Self {
        Self::with_kind(FormatKind::Csv { header: false })
    }

    /// CSV records preceded by a header row derived from the first event.
    pub fn csv_with_header() -> Self {
        Self::with_kind(FormatKind::Csv { header: true })
    }

    /// Columnar rows for table sinks. Requires a buffering backend.
    pub fn table() -> Self {
        Self::with_kind(FormatKind::Table)
    }

    /// A custom render function.
    ///
    /// `requires_buffering` marks formatters whose output only makes sense
    /// accumulated (row-like); only buffering backends accept those.
    pub fn custom(name: impl Into<String>, requires_buffering: bool, render: RenderFn) -> Self {
        Self::with_kind(FormatKind::Custom {
            name: name.into(),
            requires_buffering,
            render,
        })
    }

    /// Change the timestamp rendering.
    #[must_use]
    pub fn with_timestamp_format(mut self, format: TimestampFormat) -> Self {
        self.timestamp = format;
        self
    }

    /// Restrict the resulting sink to levels in `lower..=upper` (inclusive).
    pub fn with_limits(mut self, lower: &Level, upper: &Level) -> Result<Self> {
        if lower.value() > upper.value() {
            return Err(Error::InvalidRange {
                lower: lower.value(),
                upper: upper.value(),
            });
        }
        self.limits = Some((lower.value(), upper.value()));
        Ok(self)
    }

    /// Attach a backend by registry name.
    ///
    /// A formatter carries at most one backend; attaching a second is a
    /// construction error. The typed `into_*` handlers on the sink modules
    /// all funnel through here.
    pub fn with_backend(mut self, name: impl Into<String>, config: serde_json::Value) -> Result<Self> {
        let name = name.into();
        if let Some(existing) = &self.backend {
            return Err(Error::BackendAlreadySet {
                current: existing.name.clone(),
                requested: name,
            });
        }
        self.backend = Some(Backend { name, config });
        Ok(self)
    }

    /// The format kind name: `text`, `json`, `csv`, `table`, or the custom
    /// formatter's name.
    pub fn format_kind(&self) -> &str {
        match &self.kind {
            FormatKind::Text { .. } => "text",
            FormatKind::Json => "json",
            FormatKind::Csv { .. } => "csv",
            FormatKind::Table => "table",
            FormatKind::Custom { name, .. } => name,
        }
    }

    /// True when output only makes sense accumulated (table rows).
    pub fn requires_buffering(&self) -> bool {
        match &self.kind {
            FormatKind::Table => true,
            FormatKind::Custom {
                requires_buffering, ..
            } => *requires_buffering,
            _ => false,
        }
    }

    pub fn backend_name(&self) -> Option<&str> {
        self.backend.as_ref().map(|b| b.name.as_str())
    }

    pub fn backend_config(&self) -> Option<&serde_json::Value> {
        self.backend.as_ref().map(|b| &b.config)
    }

    /// Inclusive level bounds for the resulting sink, when set.
    pub fn limits(&self) -> Option<(u8, u8)> {
        self.limits
    }

    pub fn timestamp_format(&self) -> &TimestampFormat {
        &self.timestamp
    }

    /// Human-readable reconstruction of how this formatter was built; used
    /// as the sink label in diagnostics.
    pub fn describe(&self) -> String {
        let mut label = self.format_kind().to_string();
        if let Some((lower, upper)) = self.limits {
            label.push_str(&format!(" [{}..={}]", lower, upper));
        }
        match &self.backend {
            Some(backend) => {
                label.push_str(" -> ");
                label.push_str(&backend.name);
                if !backend.config.is_null() {
                    let compact = serde_json::to_string(&backend.config).unwrap_or_default();
                    if compact != "{}" {
                        label.push_str(&format!("({})", compact));
                    }
                }
            }
            None => label.push_str(" (unattached)"),
        }
        label
    }

    /// Render one event. Pure: no IO, no shared state.
    pub fn render(&self, event: &Event) -> Rendered {
        match &self.kind {
            FormatKind::Text { template } => {
                Rendered::Line(self.render_text(event, template))
            }
            FormatKind::Json => Rendered::Line(self.render_json(event)),
            FormatKind::Csv { header } => {
                let (header_row, record) = self.render_csv(event);
                if *header {
                    Rendered::Csv {
                        header: header_row,
                        record,
                    }
                } else {
                    Rendered::Line(record)
                }
            }
            FormatKind::Table => Rendered::Row(self.render_row(event)),
            FormatKind::Custom { render, .. } => render(event, &self.timestamp),
        }
    }

    fn render_text(&self, event: &Event, template: &str) -> String {
        let mut out = String::with_capacity(template.len() + event.message.len());
        let mut rest = template;
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let tail = &rest[open + 1..];
            let Some(close) = tail.find('}') else {
                // Unterminated brace stays literal.
                out.push_str(&rest[open..]);
                return out;
            };
            out.push_str(&self.placeholder(event, &tail[..close]));
            rest = &tail[close + 1..];
        }
        out.push_str(rest);
        out
    }

    fn placeholder(&self, event: &Event, name: &str) -> String {
        match name {
            "time" => self.timestamp.format(&event.time),
            "level" => event.level_name.clone(),
            "levelNumber" => event.level_number.to_string(),
            "message" => event.message.clone(),
            "tags" => {
                if event.tags.is_empty() {
                    String::new()
                } else {
                    format!("[{}]", event.tags.join(", "))
                }
            }
            "fields" => event
                .fields
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join(" "),
            name => event
                .fields
                .get(name)
                .map(|v| v.to_string())
                .unwrap_or_default(),
        }
    }

    fn render_json(&self, event: &Event) -> String {
        let mut json_obj = serde_json::Map::new();

        let time = if self.timestamp.is_numeric() {
            match self.timestamp {
                TimestampFormat::Unix => serde_json::Value::Number(event.time.timestamp().into()),
                _ => serde_json::Value::Number(event.time.timestamp_millis().into()),
            }
        } else {
            serde_json::Value::String(self.timestamp.format(&event.time))
        };
        json_obj.insert("time".to_string(), time);

        json_obj.insert(
            "level".to_string(),
            serde_json::Value::String(event.level_name.clone()),
        );
        json_obj.insert(
            "levelNumber".to_string(),
            serde_json::Value::Number(event.level_number.into()),
        );
        json_obj.insert(
            "message".to_string(),
            serde_json::Value::String(event.message.clone()),
        );

        if !event.tags.is_empty() {
            json_obj.insert(
                "tags".to_string(),
                serde_json::Value::Array(
                    event
                        .tags
                        .iter()
                        .map(|t| serde_json::Value::String(t.clone()))
                        .collect(),
                ),
            );
        }

        for (key, value) in &event.fields {
            json_obj.insert(key.clone(), value.to_json_value());
        }

        serde_json::to_string(&serde_json::Value::Object(json_obj)).unwrap_or_default()
    }

    fn render_csv(&self, event: &Event) -> (String, String) {
        let mut header = vec![
            "time".to_string(),
            "level".to_string(),
            "levelNumber".to_string(),
            "message".to_string(),
            "tags".to_string(),
        ];
        let mut record = vec![
            escape_csv(&self.timestamp.format(&event.time)),
            escape_csv(&event.level_name),
            event.level_number.to_string(),
            escape_csv(&event.message),
            escape_csv(&event.tags.join("|")),
        ];

        // BTreeMap iteration gives the sorted custom-field order.
        for (key, value) in &event.fields {
            header.push(escape_csv(key));
            record.push(escape_csv(&value.to_string()));
        }

        (header.join(","), record.join(","))
    }

    fn render_row(&self, event: &Event) -> Row {
        Row {
            time: self.timestamp.format(&event.time),
            level: event.level_name.clone(),
            level_number: event.level_number,
            message: event.message.clone(),
            tags: event.tags.clone(),
            extras: event.fields.clone(),
        }
    }
}

impl Default for Formatter {
    fn default() -> Self {
        Formatter::text()
    }
}

impl fmt::Debug for Formatter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Formatter")
            .field("kind", &self.format_kind())
            .field("timestamp", &self.timestamp)
            .field("backend", &self.backend_name())
            .field("limits", &self.limits)
            .finish()
    }
}

/// Quote a CSV cell when it contains a delimiter, quote, or line break.
fn escape_csv(cell: &str) -> String {
    if cell.contains(',') || cell.contains('"') || cell.contains('\n') || cell.contains('\r') {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}
