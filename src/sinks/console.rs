//! Console sink
//!
//! Writes rendered lines to stdout, switching to stderr at a configurable
//! level (errors by default). Colors follow the event's level value so
//! custom levels pick up the color of the range they sit in.

use crate::core::error::{Error, Result};
use crate::core::event::Event;
use crate::core::formatter::Formatter;
use crate::core::level::Level;
use crate::core::sink::Sink;
use colored::Colorize;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleConfig {
    /// Colorize output by level.
    #[serde(default = "default_colors")]
    pub colors: bool,
    /// Events at or above this level value go to stderr.
    #[serde(default = "default_stderr_from")]
    pub stderr_from: u8,
}

fn default_colors() -> bool {
    true
}

fn default_stderr_from() -> u8 {
    Level::ERROR.value()
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        ConsoleConfig {
            colors: default_colors(),
            stderr_from: default_stderr_from(),
        }
    }
}

pub struct ConsoleSink {
    formatter: Formatter,
    colors: bool,
    stderr_from: u8,
    header_written: bool,
}

impl ConsoleSink {
    pub fn new(formatter: Formatter) -> ConsoleSink {
        Self::with_config(formatter, ConsoleConfig::default())
    }

    pub fn with_config(formatter: Formatter, config: ConsoleConfig) -> ConsoleSink {
        ConsoleSink {
            formatter,
            colors: config.colors,
            stderr_from: config.stderr_from,
            header_written: false,
        }
    }

    /// Plain-text console used when a sink fails: no colors, default
    /// template, errors to stderr.
    pub(crate) fn fallback() -> ConsoleSink {
        Self::with_config(
            Formatter::text(),
            ConsoleConfig {
                colors: false,
                stderr_from: Level::ERROR.value(),
            },
        )
    }
}

impl Sink for ConsoleSink {
    fn deliver(&mut self, event: &Event) -> Result<()> {
        let lines = self
            .formatter
            .render(event)
            .into_lines(&mut self.header_written)?;

        for line in lines {
            let line = if self.colors {
                line.color(color_for(event.level_number)).to_string()
            } else {
                line
            };
            if event.level_number >= self.stderr_from {
                eprintln!("{}", line);
            } else {
                println!("{}", line);
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        use std::io::Write;
        // Both streams, since output is split by level.
        std::io::stdout().flush()?;
        std::io::stderr().flush()?;
        Ok(())
    }

    fn kind(&self) -> &str {
        "console"
    }
}

/// Level-value color bands.
fn color_for(value: u8) -> colored::Color {
    use colored::Color::*;
    match value {
        0..=9 => BrightBlack,
        10..=19 => Blue,
        20..=29 => Green,
        30..=39 => Cyan,
        40..=59 => BrightGreen,
        60..=79 => Yellow,
        80..=89 => Red,
        _ => BrightRed,
    }
}

/// Registry builder for the `console` backend.
pub(crate) fn build(
    formatter: &Formatter,
    config: &serde_json::Value,
) -> Result<Box<dyn Sink>> {
    if formatter.requires_buffering() {
        return Err(Error::config(
            "console",
            "row-producing formatters need the table backend",
        ));
    }
    let config: ConsoleConfig = if config.is_null() {
        ConsoleConfig::default()
    } else {
        serde_json::from_value(config.clone())?
    };
    Ok(Box::new(ConsoleSink::with_config(formatter.clone(), config)))
}

impl Formatter {
    /// Attach the console backend with default settings.
    pub fn into_console(self) -> Result<Formatter> {
        self.into_console_with(ConsoleConfig::default())
    }

    /// Attach the console backend with explicit settings.
    pub fn into_console_with(self, config: ConsoleConfig) -> Result<Formatter> {
        let config = serde_json::to_value(&config)?;
        self.with_backend("console", config)
    }
}
