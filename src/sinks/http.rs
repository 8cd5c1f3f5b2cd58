//! HTTP sink
//!
//! Posts rendered events to an endpoint with a blocking client. JSON
//! formatters post as `application/json`; everything else as `text/plain`.
//! With `flush_threshold` set, lines accumulate and each flush posts one
//! newline-delimited body. Pair with the async wrapper when request latency
//! must not reach the emitting thread.

use crate::core::buffer::BatchBuffer;
use crate::core::error::{Error, Result};
use crate::core::event::Event;
use crate::core::formatter::Formatter;
use crate::core::sink::Sink;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub url: String,
    /// Request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Batch lines and post every this many. Absent means one request per
    /// delivery.
    #[serde(default)]
    pub flush_threshold: Option<usize>,
}

fn default_timeout_ms() -> u64 {
    5_000
}

impl HttpConfig {
    pub fn new(url: impl Into<String>) -> HttpConfig {
        HttpConfig {
            url: url.into(),
            timeout_ms: default_timeout_ms(),
            flush_threshold: None,
        }
    }

    #[must_use = "builder methods return a new value"]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn with_flush_threshold(mut self, lines: usize) -> Self {
        self.flush_threshold = Some(lines);
        self
    }
}

pub struct HttpSink {
    formatter: Formatter,
    header_written: bool,
    client: reqwest::blocking::Client,
    url: String,
    content_type: &'static str,
    buffer: Option<BatchBuffer<String>>,
}

impl HttpSink {
    pub fn new(formatter: Formatter, config: HttpConfig) -> Result<HttpSink> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        let content_type = if formatter.format_kind() == "json" {
            "application/json"
        } else {
            "text/plain"
        };

        Ok(HttpSink {
            formatter,
            header_written: false,
            client,
            url: config.url,
            content_type,
            buffer: config.flush_threshold.map(BatchBuffer::new),
        })
    }
}

fn post_lines(
    client: &reqwest::blocking::Client,
    url: &str,
    content_type: &str,
    lines: &[String],
) -> Result<()> {
    let mut body = lines.join("\n");
    body.push('\n');
    client
        .post(url)
        .header(reqwest::header::CONTENT_TYPE, content_type)
        .body(body)
        .send()?
        .error_for_status()?;
    Ok(())
}

impl Sink for HttpSink {
    fn deliver(&mut self, event: &Event) -> Result<()> {
        let lines = self
            .formatter
            .render(event)
            .into_lines(&mut self.header_written)?;

        match &mut self.buffer {
            Some(buffer) => {
                for line in lines {
                    buffer.push(line);
                }
                if buffer.is_due() {
                    let client = &self.client;
                    let url = &self.url;
                    let content_type = self.content_type;
                    if let Err(e) =
                        buffer.flush_with(|batch| post_lines(client, url, content_type, batch))
                    {
                        // The batch stays buffered; a later flush retries.
                        eprintln!(
                            "[LOGFLUME WARNING] post to '{}' failed, {} lines retained: {}",
                            url,
                            buffer.len(),
                            e
                        );
                    }
                }
                Ok(())
            }
            None => post_lines(&self.client, &self.url, self.content_type, &lines),
        }
    }

    fn flush(&mut self) -> Result<()> {
        if let Some(buffer) = &mut self.buffer {
            let client = &self.client;
            let url = &self.url;
            let content_type = self.content_type;
            buffer.flush_with(|batch| post_lines(client, url, content_type, batch))?;
        }
        Ok(())
    }

    fn buffered_count(&self) -> usize {
        self.buffer.as_ref().map(|b| b.len()).unwrap_or(0)
    }

    fn kind(&self) -> &str {
        "http"
    }
}

/// Registry builder for the `http` backend.
pub(crate) fn build(
    formatter: &Formatter,
    config: &serde_json::Value,
) -> Result<Box<dyn Sink>> {
    if formatter.requires_buffering() {
        return Err(Error::config(
            "http",
            "row-producing formatters need the table backend",
        ));
    }
    let config: HttpConfig = serde_json::from_value(config.clone())?;
    Ok(Box::new(HttpSink::new(formatter.clone(), config)?))
}

impl Formatter {
    /// Attach the http backend posting to `url`.
    pub fn into_http(self, url: impl Into<String>) -> Result<Formatter> {
        self.into_http_with(HttpConfig::new(url))
    }

    /// Attach the http backend with explicit settings.
    pub fn into_http_with(self, config: HttpConfig) -> Result<Formatter> {
        let config = serde_json::to_value(&config)?;
        self.with_backend("http", config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::level::Level;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::thread;

    /// One-shot HTTP server on a loopback port; sends each request body
    /// through the channel and answers 200.
    fn spawn_server(requests: usize) -> (String, mpsc::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            for _ in 0..requests {
                let Ok((mut stream, _)) = listener.accept() else {
                    return;
                };
                let mut raw = Vec::new();
                let mut chunk = [0u8; 1024];
                let body = loop {
                    let n = stream.read(&mut chunk).unwrap_or(0);
                    if n == 0 {
                        return;
                    }
                    raw.extend_from_slice(&chunk[..n]);
                    if let Some(split) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
                        let headers = String::from_utf8_lossy(&raw[..split]).to_string();
                        let wanted = headers
                            .lines()
                            .find_map(|line| {
                                line.to_ascii_lowercase()
                                    .strip_prefix("content-length:")
                                    .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                            })
                            .unwrap_or(0);
                        let mut body = raw[split + 4..].to_vec();
                        while body.len() < wanted {
                            let n = stream.read(&mut chunk).unwrap_or(0);
                            if n == 0 {
                                break;
                            }
                            body.extend_from_slice(&chunk[..n]);
                        }
                        break String::from_utf8_lossy(&body).to_string();
                    }
                };
                let _ = tx.send(body);
                let _ = stream.write_all(
                    b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
                );
            }
        });

        (format!("http://{}/events", addr), rx)
    }

    fn event(message: &str) -> Event {
        Event::new(&Level::INFO, message).unwrap()
    }

    #[test]
    fn posts_one_request_per_delivery() {
        let (url, rx) = spawn_server(1);
        let mut sink = HttpSink::new(Formatter::json(), HttpConfig::new(url)).unwrap();

        sink.deliver(&event("shipped over http")).unwrap();

        let body = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(body.contains("shipped over http"));
        assert!(body.trim_end().starts_with('{'));
    }

    #[test]
    fn batches_into_a_single_post() {
        let (url, rx) = spawn_server(1);
        let config = HttpConfig::new(url).with_flush_threshold(3);
        let mut sink = HttpSink::new(Formatter::text(), config).unwrap();

        sink.deliver(&event("one")).unwrap();
        sink.deliver(&event("two")).unwrap();
        assert_eq!(sink.buffered_count(), 2);

        sink.deliver(&event("three")).unwrap();
        assert_eq!(sink.buffered_count(), 0);

        let body = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(body.lines().count(), 3);
    }

    #[test]
    fn failed_post_keeps_the_batch_for_retry() {
        // Nothing listens on this port, so the post fails.
        let config = HttpConfig::new("http://127.0.0.1:9/events")
            .with_timeout_ms(300)
            .with_flush_threshold(1);
        let mut sink = HttpSink::new(Formatter::text(), config).unwrap();

        sink.deliver(&event("stuck")).unwrap();
        assert_eq!(sink.buffered_count(), 1);
        assert!(sink.flush().is_err());
        assert_eq!(sink.buffered_count(), 1);
    }

    #[test]
    fn content_type_follows_the_formatter() {
        let json = HttpSink::new(Formatter::json(), HttpConfig::new("http://x/")).unwrap();
        assert_eq!(json.content_type, "application/json");

        let text = HttpSink::new(Formatter::text(), HttpConfig::new("http://x/")).unwrap();
        assert_eq!(text.content_type, "text/plain");
    }

    #[test]
    fn builder_rejects_row_formatters() {
        let err = build(
            &Formatter::table(),
            &serde_json::json!({"url": "http://x/"}),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration { .. }));
    }
}
