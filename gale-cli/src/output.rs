//! Result export and console summary
//!
//! Writes the primary `Metric,Value` CSV plus the secondary per-second TPS
//! and resource snapshot files, and prints the end-of-test summary. All
//! inputs come from the immutable `TestReport`, so exporting the same
//! report twice produces identical files.

use anyhow::{Context, Result};
use chrono::{Local, TimeZone};
use gale_core::report::TestReport;
use std::path::Path;

const MB: f64 = 1024.0 * 1024.0;

/// `<name>_<yyyyMMdd_HHmmss>.csv`, stamped from the test start time
pub fn result_file_name(test_name: &str, start_time_ms: u64) -> String {
    let stamp = match Local.timestamp_millis_opt(start_time_ms as i64).single() {
        Some(when) => when.format("%Y%m%d_%H%M%S").to_string(),
        None => start_time_ms.to_string(),
    };
    format!("{test_name}_{stamp}.csv")
}

fn format_timestamp(timestamp_ms: u64) -> String {
    match Local.timestamp_millis_opt(timestamp_ms as i64).single() {
        Some(when) => when.format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
        None => timestamp_ms.to_string(),
    }
}

/// Write the primary metrics CSV and both secondary files next to it
pub fn export_report(report: &TestReport, output_file: &Path) -> Result<()> {
    tracing::info!("Exporting metrics to {}", output_file.display());
    write_primary(report, output_file)?;

    let parent = output_file.parent().unwrap_or_else(|| Path::new("."));
    write_tps_samples(report, &parent.join("tps_samples.csv"))?;
    if !report.resource_snapshots.is_empty() {
        write_resource_snapshots(report, &parent.join("resource_snapshots.csv"))?;
    }

    tracing::info!("Metrics exported successfully");
    Ok(())
}

fn write_primary(report: &TestReport, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;

    writer.write_record(["Metric", "Value"])?;

    writer.write_record(["Start Time", &format_timestamp(report.start_time_ms)])?;
    writer.write_record(["End Time", &format_timestamp(report.end_time_ms)])?;
    writer.write_record(["Duration (ms)", &report.duration_ms.to_string()])?;
    writer.write_record(["Duration (s)", &format!("{}", report.duration_ms as f64 / 1000.0)])?;

    writer.write_record(["Total Requests", &report.total_requests.to_string()])?;
    writer.write_record(["Successful Requests", &report.success_count.to_string()])?;
    writer.write_record(["Failed Requests", &report.failure_count.to_string()])?;
    writer.write_record(["Timeout Requests", &report.timeout_count.to_string()])?;
    writer.write_record(["Skipped Requests", &report.skipped_count.to_string()])?;
    writer.write_record(["Success Rate", &format!("{:.4}", report.success_rate)])?;

    writer.write_record(["Average TPS", &format!("{:.2}", report.average_tps)])?;
    writer.write_record(["Max TPS", &report.max_tps.to_string()])?;

    let rt = &report.response_times;
    writer.write_record(["Min Response Time (ms)", &rt.min_ms.to_string()])?;
    writer.write_record(["Median Response Time (ms)", &rt.median_ms.to_string()])?;
    writer.write_record(["P90 Response Time (ms)", &rt.p90_ms.to_string()])?;
    writer.write_record(["P95 Response Time (ms)", &rt.p95_ms.to_string()])?;
    writer.write_record(["P99 Response Time (ms)", &rt.p99_ms.to_string()])?;
    writer.write_record(["Max Response Time (ms)", &rt.max_ms.to_string()])?;

    let wait = &report.limiter_waits;
    writer.write_record(["Min Rate Limiter Wait (ms)", &wait.min_ms.to_string()])?;
    writer.write_record(["Median Rate Limiter Wait (ms)", &wait.median_ms.to_string()])?;
    writer.write_record(["P90 Rate Limiter Wait (ms)", &wait.p90_ms.to_string()])?;
    writer.write_record(["P99 Rate Limiter Wait (ms)", &wait.p99_ms.to_string()])?;
    writer.write_record(["Max Rate Limiter Wait (ms)", &wait.max_ms.to_string()])?;

    for (status, count) in &report.status_codes {
        writer.write_record([format!("Status Code {status}"), count.to_string()])?;
    }

    writer.write_record(["Max CPU Usage (%)", &format!("{:.2}", report.max_cpu_pct)])?;
    writer.write_record([
        "Max Memory Usage (MB)",
        &format!("{:.2}", report.max_rss_bytes as f64 / MB),
    ])?;

    writer.flush()?;
    Ok(())
}

fn write_tps_samples(report: &TestReport, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;

    writer.write_record(["Timestamp", "Elapsed (ms)", "TPS"])?;
    for sample in &report.tps_samples {
        writer.write_record([
            format_timestamp(sample.timestamp_ms),
            sample.timestamp_ms.saturating_sub(report.start_time_ms).to_string(),
            sample.tps.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn write_resource_snapshots(report: &TestReport, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;

    writer.write_record([
        "Timestamp",
        "Elapsed (ms)",
        "CPU (%)",
        "RSS (MB)",
        "Virtual (MB)",
        "System Used (MB)",
        "Total Memory (MB)",
        "Free Memory (MB)",
        "Threads",
    ])?;

    let first = report.resource_snapshots[0].timestamp_ms;
    for snapshot in &report.resource_snapshots {
        writer.write_record([
            format_timestamp(snapshot.timestamp_ms),
            snapshot.timestamp_ms.saturating_sub(first).to_string(),
            format!("{:.2}", snapshot.cpu_pct),
            format!("{:.2}", snapshot.rss_bytes as f64 / MB),
            format!("{:.2}", snapshot.virtual_bytes as f64 / MB),
            format!("{:.2}", snapshot.system_used_bytes as f64 / MB),
            format!("{:.2}", snapshot.system_total_bytes as f64 / MB),
            format!("{:.2}", snapshot.system_free_bytes as f64 / MB),
            snapshot.thread_count.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Console summary printed once the run reaches its terminal state
pub fn print_summary(report: &TestReport) {
    println!("\n=== Test Summary ===");
    println!(
        "Duration: {}",
        gale_core::timing::format_duration(std::time::Duration::from_millis(report.duration_ms))
    );
    println!("Total Requests: {}", report.total_requests);
    println!("Successful Requests: {}", report.success_count);
    println!("Failed Requests: {}", report.failure_count);
    println!("Success Rate: {:.2}%", report.success_rate * 100.0);
    println!("Average TPS: {:.2}", report.average_tps);
    println!("P95 Response Time: {} ms", report.response_times.p95_ms);
    for (percentile, value) in &report.requested_percentiles {
        if *percentile != 95 {
            println!("P{percentile} Response Time: {value} ms");
        }
    }
    println!("Max CPU Usage: {:.2}%", report.max_cpu_pct);
    println!(
        "Max Memory Usage: {:.2} MB",
        report.max_rss_bytes as f64 / MB
    );

    if !report.errors.top_status_codes.is_empty() || !report.errors.top_error_kinds.is_empty() {
        println!("--- Errors ---");
        for (status, count) in &report.errors.top_status_codes {
            println!("Status {status}: {count}");
        }
        for (kind, count) in &report.errors.top_error_kinds {
            println!("{kind}: {count}");
        }
    }
    println!("==================");
}
