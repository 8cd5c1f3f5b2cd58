//! Basic pipeline usage
//!
//! Demonstrates console output, level windows, custom levels, and structured
//! events.
//!
//! Run with: cargo run --example basic_usage

use logflume::prelude::*;

fn main() -> Result<()> {
    println!("=== Logflume - Basic Usage Example ===\n");

    let formatter = Formatter::text().into_console()?;
    let sink = BackendRegistry::with_defaults().resolve(&formatter)?;
    let logger = Logger::new().with_sink("console", sink)?;

    println!("1. Logging at the built-in levels:");
    logger.debug("This is a debug event");
    logger.info("This is an info event");
    logger.note("This is a note");
    logger.success("This is a success event");
    logger.warning("This is a warning");
    logger.error("This is an error");
    logger.critical("This is a critical event");

    println!("\n2. Narrowing the window to NOTE..=OFF:");
    let narrowed = logger.with_limits(&Level::NOTE, &Level::OFF)?;
    narrowed.debug("Debug event (hidden)");
    narrowed.info("Info event (hidden)");
    narrowed.note("Note event (visible)");

    println!("\n3. Custom levels sit anywhere on the 0..=100 scale:");
    let audit = Level::custom("AUDIT", 55)?.with_tags(["compliance"]);
    narrowed.log(&audit, "Quarterly export finished")?;

    println!("\n4. Structured events carry tags and typed fields:");
    logger
        .event(&Level::WARNING, "disk usage climbing")
        .field("percent", 87)
        .field("mount", "/var")
        .tag("storage")
        .emit()?;

    println!("\n5. Dispatch metrics (shared by derived loggers):");
    let metrics = logger.metrics();
    println!(
        "   emitted={} delivered={} filtered={}",
        metrics.emitted(),
        metrics.delivered(),
        metrics.filtered()
    );

    println!("\n=== Example completed successfully! ===");
    Ok(())
}
