//! Derived statistics and terminal output for finished operations.

use console::style;
use poolwarm_core::{PageDescriptor, Phase, ServerStatus, SnapshotMetadata, TimingLedger};
use poolwarm_engine::{RestoreReport, SaveReport};
use std::path::Path;
use std::time::Duration;

/// Numbers shown after a restore.
#[derive(Debug, Clone, PartialEq)]
pub struct RestoreStats {
    pub run_time: Duration,
    pub pages_fetched: u64,
    pub pages_attempted: u64,
    /// Fetched pages per second of fetch phase.
    pub pages_per_second: Option<f64>,
    /// Growth of `Innodb_data_read` over the run, in bytes.
    pub data_read_delta: Option<u64>,
    pub occupancy_before: Option<f64>,
    pub occupancy_after: Option<f64>,
    pub restored_percent: Option<f64>,
}

impl RestoreStats {
    pub fn from_report(report: &RestoreReport, run_time: Duration) -> Self {
        Self {
            run_time,
            pages_fetched: report.pages_fetched,
            pages_attempted: report.pages_attempted,
            pages_per_second: rate(report.pages_fetched, report.timings.get(Phase::Fetch)),
            data_read_delta: data_read_delta(&report.status_before, &report.status_after),
            occupancy_before: report.status_before.occupancy_percent(),
            occupancy_after: report.status_after.occupancy_percent(),
            restored_percent: restored_percent(&report.metadata, &report.status_after),
        }
    }
}

fn rate(pages: u64, elapsed: Option<Duration>) -> Option<f64> {
    let secs = elapsed?.as_secs_f64();
    (secs > 0.0).then(|| pages as f64 / secs)
}

/// Counter growth between two snapshots. A counter reset (server restart
/// mid-run) reports nothing rather than a bogus wrap.
pub fn data_read_delta(before: &ServerStatus, after: &ServerStatus) -> Option<u64> {
    after.data_read()?.checked_sub(before.data_read()?)
}

/// Approximate re-warm completeness: pages now holding data on the target
/// against pages holding data when the image was captured. Can exceed 100
/// when the target pool is busier or larger than the source was.
pub fn restored_percent(metadata: &SnapshotMetadata, after: &ServerStatus) -> Option<f64> {
    if metadata.buffer_pool_pages_data == 0 {
        return None;
    }
    let now = after.pool_pages_data()?;
    Some(now as f64 * 100.0 / metadata.buffer_pool_pages_data as f64)
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

fn percent(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.1}%", v))
        .unwrap_or_else(|| "n/a".to_string())
}

fn print_timings(timings: &TimingLedger) {
    println!("  {}", style("Phase timings").bold());
    for (phase, elapsed) in timings.iter() {
        println!("    {:<10} {:>9.3}s", phase.as_str(), elapsed.as_secs_f64());
    }
}

pub fn print_save(report: &SaveReport, path: &Path, format: &str, run_time: Duration) {
    if report.cancelled {
        println!(
            "{} Save cancelled, {} left unchanged",
            style("!").yellow(),
            path.display()
        );
        return;
    }
    println!(
        "{} Saved {} pages to {} ({})",
        style("✓").green(),
        style(report.page_count).bold(),
        path.display(),
        format
    );
    println!("  Run time   {:.3}s", run_time.as_secs_f64());
    print_timings(&report.timings);
}

pub fn print_restore(report: &RestoreReport, stats: &RestoreStats) {
    let mark = if report.cancelled {
        style("!").yellow()
    } else {
        style("✓").green()
    };
    let verb = if report.cancelled {
        "Restore cancelled after"
    } else {
        "Restored"
    };
    println!(
        "{} {} {} of {} pages in {} batches",
        mark,
        verb,
        style(stats.pages_fetched).bold(),
        stats.pages_attempted,
        report.batches
    );
    if report.capacity_warning {
        println!(
            "  {} image holds {} pages, more than the target buffer pool",
            style("warning:").yellow(),
            report.metadata.page_count
        );
    }

    println!("  Run time        {:.3}s", stats.run_time.as_secs_f64());
    if let Some(speed) = stats.pages_per_second {
        println!("  Fetch speed     {:.0} pages/s", speed);
    }
    if let Some(delta) = stats.data_read_delta {
        println!("  Data read       {}", format_bytes(delta));
    }
    println!(
        "  Pool occupancy  {} -> {}",
        percent(stats.occupancy_before),
        percent(stats.occupancy_after)
    );
    println!(
        "  Restored        {} {}",
        percent(stats.restored_percent),
        style("(approximate)").dim()
    );
    print_timings(&report.timings);
}

pub fn print_metadata(
    path: &Path,
    format: &str,
    metadata: &SnapshotMetadata,
    preview: &[PageDescriptor],
) {
    println!("{} {}", style("Image").bold(), path.display());
    println!("  Format          {}", format);
    println!("  Captured at     {}", metadata.captured_at.to_rfc3339());
    println!("  Server version  {}", metadata.server_version);
    println!("  Pages           {}", metadata.page_count);
    println!(
        "  Source pool     {} of {} pages held data",
        metadata.buffer_pool_pages_data, metadata.buffer_pool_pages_total
    );
    if !preview.is_empty() {
        println!("  {}", style("First pages").bold());
        for (i, page) in preview.iter().enumerate() {
            println!("    {:>6}  {}", i + 1, page);
        }
    }
}
