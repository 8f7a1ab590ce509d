//! Human-readable run summaries on stdout.

use klinesync::{CacheStats, DatasetInventory, PurgeReport, RunReport};

pub fn print_run(report: &RunReport) {
    for pair in &report.pairs {
        match &pair.outcome {
            Ok(rows) => println!("ok     {:<20} {rows} rows", pair.key.to_string()),
            Err(e) => println!("FAILED {:<20} {e}", pair.key.to_string()),
        }
    }
    let uploaded: usize = report.flushes.iter().map(|f| f.uploaded.len()).sum();
    let upload_failures: usize = report.flushes.iter().map(|f| f.failed.len()).sum();
    let cancelled = report.flushes.iter().any(|f| f.cancelled);
    println!(
        "{:?}: {} succeeded, {} failed; {} uploaded in {} batches, {} upload failures{}",
        report.mode,
        report.succeeded(),
        report.failed(),
        uploaded,
        report.flushes.len(),
        upload_failures,
        if cancelled { " (cancelled)" } else { "" },
    );
}

pub fn print_status(stats: &CacheStats, inventory: Option<&DatasetInventory>) {
    println!(
        "cache: {} pending ({} rows, {} bytes), {} uploaded",
        stats.pending, stats.pending_rows, stats.pending_bytes, stats.uploaded
    );
    if let Some(inv) = inventory {
        println!(
            "dataset: {} present, {} missing",
            inv.present.len(),
            inv.missing.len()
        );
        for key in &inv.missing {
            println!("missing {key}");
        }
    }
}

pub fn print_purge(report: &PurgeReport) {
    for (path, e) in &report.failed {
        println!("FAILED {path}: {e}");
    }
    println!(
        "purge: {} deleted, {} failed",
        report.deleted.len(),
        report.failed.len()
    );
}
