use std::path::Path;

use anyhow::Result;
use foldwatch_runtime::sweep_once;

use crate::context::RuntimeContext;

pub fn list(data_dir: &Path) -> Result<()> {
    let ctx = RuntimeContext::build(data_dir)?;
    if ctx.registry.handles().is_empty() {
        println!("No file-based clients configured; nothing to benchmark.");
        return Ok(());
    }

    // Benchmarks are rebuilt from the clients' logs each invocation.
    sweep_once(&ctx.registry, 2);

    let records = ctx.tracker.snapshot();
    if records.is_empty() {
        println!("No frame times observed.");
        return Ok(());
    }

    println!(
        "{:<20} {:>8} {:>8} {:>8} {:>8}",
        "CLIENT", "PROJECT", "SAMPLES", "MIN", "AVG"
    );
    for record in records {
        println!(
            "{:<20} {:>8} {:>8} {:>7}s {:>7}s",
            record.key.client_name,
            record.key.project,
            record.sample_count(),
            record.minimum_secs().unwrap_or(0),
            record.average_secs().unwrap_or(0),
        );
    }
    Ok(())
}
