//! File sink with size-based rotation
//!
//! Rendered lines are appended through a `BufWriter`. When `max_size` is
//! non-zero, a pre-write check rotates the file once it reaches that size:
//! `path.(N-1)` moves to `path.N` (oldest deleted), the active file becomes
//! `path.1`, and a fresh file is opened. Rotated files can be gzip
//! compressed, in which case the backups are `path.N.gz`.
//!
//! With `flush_threshold` set, lines accumulate in memory and reach the file
//! in batches; without it every delivery writes through immediately.

use crate::core::buffer::BatchBuffer;
use crate::core::error::{Error, Result};
use crate::core::event::Event;
use crate::core::formatter::Formatter;
use crate::core::sink::Sink;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    pub path: PathBuf,
    /// Rotate once the active file reaches this many bytes. Zero disables
    /// rotation.
    #[serde(default)]
    pub max_size: u64,
    /// Rotated files to keep (`path.1` .. `path.N`).
    #[serde(default = "default_max_files")]
    pub max_files: usize,
    /// Gzip rotated files.
    #[serde(default)]
    pub compress: bool,
    /// Batch lines in memory and write every this many. Absent means write
    /// through on every delivery.
    #[serde(default)]
    pub flush_threshold: Option<usize>,
}

fn default_max_files() -> usize {
    5
}

impl FileConfig {
    pub fn new(path: impl Into<PathBuf>) -> FileConfig {
        FileConfig {
            path: path.into(),
            max_size: 0,
            max_files: default_max_files(),
            compress: false,
            flush_threshold: None,
        }
    }

    #[must_use = "builder methods return a new value"]
    pub fn with_max_size(mut self, bytes: u64) -> Self {
        self.max_size = bytes;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn with_max_files(mut self, count: usize) -> Self {
        self.max_files = count;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn with_compress(mut self, enabled: bool) -> Self {
        self.compress = enabled;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn with_flush_threshold(mut self, lines: usize) -> Self {
        self.flush_threshold = Some(lines);
        self
    }
}

/// Writer state: the open file, its size, and the rotation settings.
struct FileOut {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    current_size: u64,
    max_size: u64,
    max_files: usize,
    compress: bool,
}

impl FileOut {
    fn open(config: &FileConfig) -> Result<FileOut> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    Error::io_operation(
                        "creating log directory",
                        format!("cannot create '{}'", parent.display()),
                        e,
                    )
                })?;
            }
        }

        let file = Self::open_append(&config.path)?;
        let current_size = file.metadata().map(|m| m.len()).unwrap_or(0);

        Ok(FileOut {
            path: config.path.clone(),
            writer: Some(BufWriter::new(file)),
            current_size,
            max_size: config.max_size,
            max_files: config.max_files,
            compress: config.compress,
        })
    }

    fn open_append(path: &Path) -> Result<File> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| {
                Error::io_operation(
                    "opening log file",
                    format!("cannot open '{}'", path.display()),
                    e,
                )
            })
    }

    fn backup_path(&self, index: usize) -> PathBuf {
        PathBuf::from(format!("{}.{}", self.path.display(), index))
    }

    fn compressed_path(&self, index: usize) -> PathBuf {
        PathBuf::from(format!("{}.{}.gz", self.path.display(), index))
    }

    fn write_lines(&mut self, lines: &[String]) -> Result<()> {
        if self.max_size > 0 && self.current_size >= self.max_size {
            self.rotate()?;
        }

        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| Error::sink("file writer not open"))?;
        for line in lines {
            writer.write_all(line.as_bytes())?;
            writer.write_all(b"\n")?;
            self.current_size += line.len() as u64 + 1;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush().map_err(|e| {
                Error::io_operation(
                    "flushing log file",
                    format!("cannot flush '{}'", self.path.display()),
                    e,
                )
            })?;
        }
        Ok(())
    }

    fn rotate(&mut self) -> Result<()> {
        // Release the handle before any renames.
        if let Some(mut writer) = self.writer.take() {
            writer.flush().map_err(|e| {
                Error::rotation(
                    self.path.display().to_string(),
                    format!("flush before rotation failed: {}", e),
                )
            })?;
        }

        // Drop the backup falling off the end, in either form.
        for stale in [
            self.backup_path(self.max_files),
            self.compressed_path(self.max_files),
        ] {
            if stale.exists() {
                if let Err(e) = fs::remove_file(&stale) {
                    eprintln!(
                        "[LOGFLUME WARNING] cannot remove stale backup '{}': {}",
                        stale.display(),
                        e
                    );
                }
            }
        }

        // Shift the remaining backups up by one, newest last.
        for index in (1..self.max_files).rev() {
            for (old, new) in [
                (self.compressed_path(index), self.compressed_path(index + 1)),
                (self.backup_path(index), self.backup_path(index + 1)),
            ] {
                if old.exists() {
                    fs::rename(&old, &new).map_err(|e| {
                        Error::rotation(
                            old.display().to_string(),
                            format!("cannot shift backup: {}", e),
                        )
                    })?;
                }
            }
        }

        if self.path.exists() {
            let fresh_backup = self.backup_path(1);
            fs::rename(&self.path, &fresh_backup).map_err(|e| {
                Error::rotation(
                    self.path.display().to_string(),
                    format!("cannot move active file aside: {}", e),
                )
            })?;

            if self.compress {
                compress_file(&fresh_backup, &self.compressed_path(1))?;
            }
        }

        self.writer = Some(BufWriter::new(Self::open_append(&self.path)?));
        self.current_size = 0;
        Ok(())
    }
}

/// Gzip `source` into `target` via a temp file, then remove the original.
/// The original survives any failure.
fn compress_file(source: &Path, target: &Path) -> Result<()> {
    let temp = PathBuf::from(format!("{}.tmp", target.display()));

    let result = (|| -> Result<()> {
        let input = File::open(source)?;
        let mut reader = BufReader::new(input);
        let output = File::create(&temp)?;
        let mut encoder =
            flate2::write::GzEncoder::new(BufWriter::new(output), flate2::Compression::default());
        std::io::copy(&mut reader, &mut encoder)?;
        encoder.finish()?;
        fs::rename(&temp, target)?;
        Ok(())
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&temp);
        return Err(Error::rotation(
            source.display().to_string(),
            format!("compression failed: {}", e),
        ));
    }

    if let Err(e) = fs::remove_file(source) {
        // Compressed copy exists, leaving the original is harmless; the
        // next rotation shift will move it along.
        eprintln!(
            "[LOGFLUME WARNING] compressed '{}' but cannot remove the original: {}",
            source.display(),
            e
        );
    }
    Ok(())
}

pub struct FileSink {
    formatter: Formatter,
    header_written: bool,
    out: FileOut,
    buffer: Option<BatchBuffer<String>>,
}

impl FileSink {
    pub fn new(formatter: Formatter, config: FileConfig) -> Result<FileSink> {
        if config.max_size > 0 && config.max_files == 0 {
            return Err(Error::config(
                "file",
                "max_files must be at least 1 when rotation is enabled",
            ));
        }

        let out = FileOut::open(&config)?;
        Ok(FileSink {
            formatter,
            header_written: false,
            out,
            buffer: config.flush_threshold.map(BatchBuffer::new),
        })
    }
}

impl Sink for FileSink {
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
                    let out = &mut self.out;
                    if let Err(e) = buffer.flush_with(|batch| out.write_lines(batch)) {
                        // The batch stays buffered; a later flush retries.
                        eprintln!(
                            "[LOGFLUME WARNING] buffered write to '{}' failed, {} lines retained: {}",
                            out.path.display(),
                            buffer.len(),
                            e
                        );
                    }
                }
                Ok(())
            }
            None => self.out.write_lines(&lines),
        }
    }

    fn flush(&mut self) -> Result<()> {
        if let Some(buffer) = &mut self.buffer {
            let out = &mut self.out;
            buffer.flush_with(|batch| out.write_lines(batch))?;
        }
        self.out.flush()
    }

    fn buffered_count(&self) -> usize {
        self.buffer.as_ref().map(|b| b.len()).unwrap_or(0)
    }

    fn kind(&self) -> &str {
        "file"
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

/// Registry builder for the `file` backend.
pub(crate) fn build(
    formatter: &Formatter,
    config: &serde_json::Value,
) -> Result<Box<dyn Sink>> {
    if formatter.requires_buffering() {
        return Err(Error::config(
            "file",
            "row-producing formatters need the table backend",
        ));
    }
    let config: FileConfig = serde_json::from_value(config.clone())?;
    Ok(Box::new(FileSink::new(formatter.clone(), config)?))
}

impl Formatter {
    /// Attach the file backend writing to `path`, no rotation or batching.
    pub fn into_file(self, path: impl Into<PathBuf>) -> Result<Formatter> {
        self.into_file_with(FileConfig::new(path))
    }

    /// Attach the file backend with explicit settings.
    pub fn into_file_with(self, config: FileConfig) -> Result<Formatter> {
        let config = serde_json::to_value(&config)?;
        self.with_backend("file", config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::level::Level;
    use tempfile::tempdir;

    fn event(message: &str) -> Event {
        Event::new(&Level::INFO, message).unwrap()
    }

    #[test]
    fn writes_through_without_threshold() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");
        let mut sink = FileSink::new(Formatter::text(), FileConfig::new(&path)).unwrap();

        sink.deliver(&event("first line")).unwrap();
        sink.deliver(&event("second line")).unwrap();
        sink.flush().unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("first line"));
        assert!(content.contains("second line"));
        assert_eq!(content.lines().count(), 2);
        assert_eq!(sink.buffered_count(), 0);
    }

    #[test]
    fn batches_until_the_threshold() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("batched.log");
        let config = FileConfig::new(&path).with_flush_threshold(3);
        let mut sink = FileSink::new(Formatter::text(), config).unwrap();

        sink.deliver(&event("one")).unwrap();
        sink.deliver(&event("two")).unwrap();
        assert_eq!(sink.buffered_count(), 2);
        sink.out.flush().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "");

        // Third delivery reaches the threshold and writes the batch.
        sink.deliver(&event("three")).unwrap();
        assert_eq!(sink.buffered_count(), 0);
        sink.flush().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 3);
    }

    #[test]
    fn manual_flush_drains_a_partial_batch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("partial.log");
        let config = FileConfig::new(&path).with_flush_threshold(100);
        let mut sink = FileSink::new(Formatter::text(), config).unwrap();

        sink.deliver(&event("only")).unwrap();
        sink.flush().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 1);
        assert_eq!(sink.buffered_count(), 0);
    }

    #[test]
    fn rotation_produces_numbered_backups() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rot.log");
        let config = FileConfig::new(&path).with_max_size(80).with_max_files(2);
        let mut sink = FileSink::new(Formatter::text(), config).unwrap();

        for i in 0..30 {
            sink.deliver(&event(&format!("filler message number {}", i)))
                .unwrap();
        }
        sink.flush().unwrap();

        assert!(path.exists());
        assert!(PathBuf::from(format!("{}.1", path.display())).exists());

        let log_files = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("rot.log"))
            .count();
        // Active file plus at most two backups.
        assert!(log_files <= 3, "{} files", log_files);
    }

    #[test]
    fn rotation_can_compress_backups() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gz.log");
        let config = FileConfig::new(&path)
            .with_max_size(60)
            .with_max_files(3)
            .with_compress(true);
        let mut sink = FileSink::new(Formatter::text(), config).unwrap();

        for i in 0..20 {
            sink.deliver(&event(&format!("compressible message {}", i)))
                .unwrap();
        }
        sink.flush().unwrap();

        let gz = PathBuf::from(format!("{}.1.gz", path.display()));
        let plain = PathBuf::from(format!("{}.1", path.display()));
        assert!(gz.exists());
        assert!(!plain.exists());
    }

    #[test]
    fn zero_max_size_never_rotates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("never.log");
        let mut sink = FileSink::new(Formatter::text(), FileConfig::new(&path)).unwrap();

        for i in 0..200 {
            sink.deliver(&event(&format!("entry {}", i))).unwrap();
        }
        sink.flush().unwrap();

        assert!(!PathBuf::from(format!("{}.1", path.display())).exists());
        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 200);
    }

    #[test]
    fn rotation_requires_a_backup_slot() {
        let dir = tempdir().unwrap();
        let config = FileConfig::new(dir.path().join("bad.log"))
            .with_max_size(10)
            .with_max_files(0);
        let err = FileSink::new(Formatter::text(), config).unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration { .. }));
    }

    #[test]
    fn csv_header_lands_once_at_the_top() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.csv");
        let mut sink =
            FileSink::new(Formatter::csv_with_header(), FileConfig::new(&path)).unwrap();

        sink.deliver(&event("row one")).unwrap();
        sink.deliver(&event("row two")).unwrap();
        sink.flush().unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("time,level,levelNumber,message,tags"));
        assert!(lines[1].contains("row one"));
        assert!(lines[2].contains("row two"));
    }

    #[test]
    fn config_json_round_trip_with_defaults() {
        let config: FileConfig =
            serde_json::from_value(serde_json::json!({"path": "x.log"})).unwrap();
        assert_eq!(config.max_size, 0);
        assert_eq!(config.max_files, 5);
        assert!(!config.compress);
        assert!(config.flush_threshold.is_none());
    }

    #[test]
    fn drop_flushes_pending_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dropped.log");
        {
            let config = FileConfig::new(&path).with_flush_threshold(100);
            let mut sink = FileSink::new(Formatter::text(), config).unwrap();
            sink.deliver(&event("written on drop")).unwrap();
        }
        assert!(fs::read_to_string(&path).unwrap().contains("written on drop"));
    }
}
