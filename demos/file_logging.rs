//! File logging example
//!
//! Demonstrates a rotated JSON application log and a CSV audit trail fed by
//! the same logger through per-sink level windows.
//!
//! Run with: cargo run --example file_logging

use logflume::prelude::*;
use logflume::sinks::file::FileConfig;

fn main() -> Result<()> {
    println!("=== Logflume - File Logging Example ===\n");

    let registry = BackendRegistry::with_defaults();

    // JSON application log, rotated at 64 KiB, three gzipped backups.
    let app_log = Formatter::json().into_file_with(
        FileConfig::new("application.jsonl")
            .with_max_size(64 * 1024)
            .with_max_files(3)
            .with_compress(true),
    )?;

    // CSV audit trail that only sees WARNING and above.
    let audit_log = Formatter::csv_with_header()
        .with_limits(&Level::WARNING, &Level::OFF)?
        .into_file("audit.csv")?;

    let logger = Logger::new()
        .with_sink("app", registry.resolve(&app_log)?)?
        .with_sink("audit", registry.resolve(&audit_log)?)?;

    println!("1. Logging to both files:");
    logger.info("Application started");
    logger.debug("Loading configuration...");
    logger.info("Configuration loaded successfully");
    logger.warning("Using default settings for some options");
    logger.info("Connecting to database...");
    logger.error("Failed to load optional plugin");
    logger.info("Application initialization complete");

    println!("\n2. Performing some operations:");
    for i in 1..=5 {
        logger.info(format!("Processing item {}/5", i));
        if i == 3 {
            logger.warning("Item 3 took longer than expected");
        }
    }
    logger.info("All operations completed");

    logger.flush()?;

    println!("\n=== Example completed successfully! ===");
    println!("Check 'application.jsonl' and 'audit.csv' for the output");
    Ok(())
}
