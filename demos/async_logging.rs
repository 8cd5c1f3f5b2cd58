//! Async delivery example
//!
//! Demonstrates the bounded-queue async wrapper under multi-threaded load.
//!
//! Run with: cargo run --example async_logging

use logflume::prelude::*;
use std::thread;

fn main() -> Result<()> {
    println!("=== Logflume - Async Logging Example ===\n");

    let formatter = Formatter::text().into_file("async_test.log")?;
    let sink = BackendRegistry::with_defaults()
        .resolve(&formatter)?
        .into_async(AsyncConfig {
            max_queue_size: 1000,
            ..AsyncConfig::default()
        });
    let logger = Logger::new().with_sink("file", sink)?;

    println!("1. High-throughput async logging:");
    for i in 0..100 {
        logger.info(format!("Message #{}", i));
    }
    println!("   Enqueued 100 messages");

    println!("\n2. Multi-threaded logging:");
    let mut handles = vec![];
    for thread_id in 0..5 {
        let logger = logger.clone();
        let handle = thread::spawn(move || {
            for i in 0..20 {
                logger.info(format!("Thread {} - Message {}", thread_id, i));
            }
        });
        handles.push(handle);
    }
    for handle in handles {
        handle.join().unwrap();
    }
    println!("   5 threads logged 20 messages each");

    // Blocks until the queue drains and the file is flushed.
    logger.flush_sink("file")?;
    println!(
        "\n3. Queue drained; {} events delivered",
        logger.metrics().delivered()
    );

    println!("\n=== Example completed successfully! ===");
    println!("Check 'async_test.log' for file output");
    Ok(())
}
