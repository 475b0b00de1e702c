//! Traffic profiles for time-varying load intensity
//!
//! A profile is a pure function from elapsed time to target TPS. The
//! execution controller samples it at 1 Hz and feeds the result into the
//! rate regulator.

use crate::config::TrafficConfig;
use crate::error::{Error, Result};
use std::path::Path;

/// One point of a custom profile: `(time since start, target TPS)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatternPoint {
    pub time_ms: u64,
    pub tps: f64,
}

/// Traffic profile variants
#[derive(Debug, Clone)]
pub enum TrafficProfile {
    /// Constant rate for the whole test
    Stable { target_tps: f64 },

    /// Linear ramp from `start_tps` to `target_tps` over `ramp_ms`, then
    /// constant
    Ramp {
        start_tps: f64,
        target_tps: f64,
        ramp_ms: u64,
    },

    /// `base_tps` with a burst of `spike_tps` on
    /// `[spike_start_ms, spike_start_ms + spike_duration_ms)`
    Spike {
        base_tps: f64,
        spike_tps: f64,
        spike_start_ms: u64,
        spike_duration_ms: u64,
    },

    /// Piecewise-linear interpolation over sorted points loaded from a
    /// pattern file; clamped to the first/last TPS outside the range
    Custom { points: Vec<PatternPoint> },
}

impl TrafficProfile {
    /// Build a profile from the config block. `type` is matched
    /// case-insensitively; the custom variant loads its pattern file here.
    pub fn from_config(config: &TrafficConfig) -> Result<Self> {
        match config.pattern_type.to_lowercase().as_str() {
            "stable" => Ok(TrafficProfile::Stable {
                target_tps: config.target_tps,
            }),
            "rampup" => {
                let ramp = config.ramp_duration.ok_or_else(|| {
                    Error::Config("trafficPattern.rampDuration is required for rampUp".into())
                })?;
                Ok(TrafficProfile::Ramp {
                    start_tps: config.start_tps,
                    target_tps: config.target_tps,
                    ramp_ms: ramp.as_millis() as u64,
                })
            }
            "spike" => {
                let start = config.spike_start_time.ok_or_else(|| {
                    Error::Config("trafficPattern.spikeStartTime is required for spike".into())
                })?;
                let duration = config.spike_duration.ok_or_else(|| {
                    Error::Config("trafficPattern.spikeDuration is required for spike".into())
                })?;
                Ok(TrafficProfile::Spike {
                    base_tps: config.target_tps,
                    spike_tps: config.spike_tps,
                    spike_start_ms: start.as_millis() as u64,
                    spike_duration_ms: duration.as_millis() as u64,
                })
            }
            "custom" => {
                let path = config.pattern_file.as_ref().ok_or_else(|| {
                    Error::Config("trafficPattern.patternFile is required for custom".into())
                })?;
                let points = load_pattern_file(path, config.time_in_milliseconds)?;
                Ok(TrafficProfile::Custom { points })
            }
            other => Err(Error::Config(format!(
                "trafficPattern.type '{other}' is not one of stable, rampUp, spike, custom"
            ))),
        }
    }

    /// Target TPS after `elapsed_ms` of a `total_ms`-long test; always >= 0
    pub fn tps_at(&self, elapsed_ms: u64, _total_ms: u64) -> f64 {
        match self {
            TrafficProfile::Stable { target_tps } => *target_tps,
            TrafficProfile::Ramp {
                start_tps,
                target_tps,
                ramp_ms,
            } => {
                if elapsed_ms >= *ramp_ms {
                    return *target_tps;
                }
                let progress = elapsed_ms as f64 / *ramp_ms as f64;
                start_tps + (target_tps - start_tps) * progress
            }
            TrafficProfile::Spike {
                base_tps,
                spike_tps,
                spike_start_ms,
                spike_duration_ms,
            } => {
                if elapsed_ms >= *spike_start_ms
                    && elapsed_ms < spike_start_ms + spike_duration_ms
                {
                    *spike_tps
                } else {
                    *base_tps
                }
            }
            TrafficProfile::Custom { points } => interpolate(points, elapsed_ms),
        }
    }

    /// Upper bound on the TPS this profile will ever request; a sizing hint
    pub fn max_tps(&self) -> f64 {
        match self {
            TrafficProfile::Stable { target_tps } => *target_tps,
            TrafficProfile::Ramp {
                start_tps,
                target_tps,
                ..
            } => start_tps.max(*target_tps),
            TrafficProfile::Spike {
                base_tps, spike_tps, ..
            } => base_tps.max(*spike_tps),
            TrafficProfile::Custom { points } => {
                points.iter().map(|p| p.tps).fold(0.0, f64::max)
            }
        }
    }

    /// Profile name for log lines
    pub fn name(&self) -> &'static str {
        match self {
            TrafficProfile::Stable { .. } => "stable",
            TrafficProfile::Ramp { .. } => "rampUp",
            TrafficProfile::Spike { .. } => "spike",
            TrafficProfile::Custom { .. } => "custom",
        }
    }
}

/// Binary-search interpolation over sorted points, clamped at both ends
fn interpolate(points: &[PatternPoint], elapsed_ms: u64) -> f64 {
    match points {
        [] => 0.0,
        [only] => only.tps,
        [first, ..] if elapsed_ms <= first.time_ms => first.tps,
        [.., last] if elapsed_ms >= last.time_ms => last.tps,
        _ => {
            let after_idx = points.partition_point(|p| p.time_ms <= elapsed_ms);
            let before = points[after_idx - 1];
            let after = points[after_idx];
            if after.time_ms == before.time_ms {
                return before.tps;
            }
            let ratio =
                (elapsed_ms - before.time_ms) as f64 / (after.time_ms - before.time_ms) as f64;
            before.tps + ratio * (after.tps - before.tps)
        }
    }
}

/// Load a custom pattern file: CSV with a header naming one time column
/// (contains `time`, or is exactly `t`) and one rate column (contains `tps`
/// or `rate`), case-insensitively. Malformed rows are skipped with a
/// warning; zero valid rows is fatal. Rows are sorted by time after load.
pub fn load_pattern_file<P: AsRef<Path>>(
    path: P,
    time_in_milliseconds: bool,
) -> Result<Vec<PatternPoint>> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| Error::Pattern(format!("failed to open pattern file {}: {e}", path.display())))?;

    let headers = reader
        .headers()
        .map_err(|e| Error::Pattern(format!("failed to read pattern file header: {e}")))?
        .clone();

    let mut time_col = None;
    let mut tps_col = None;
    for (idx, header) in headers.iter().enumerate() {
        let lower = header.trim().to_lowercase();
        if lower.contains("time") || lower == "t" {
            time_col.get_or_insert(idx);
        } else if lower.contains("tps") || lower.contains("rate") {
            tps_col.get_or_insert(idx);
        }
    }
    let (time_col, tps_col) = match (time_col, tps_col) {
        (Some(t), Some(r)) => (t, r),
        _ => {
            return Err(Error::Pattern(format!(
                "pattern file {} must have a time column and a tps/rate column",
                path.display()
            )))
        }
    };

    let mut points = Vec::new();
    for record in reader.records() {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("Skipping unreadable row in pattern file: {e}");
                continue;
            }
        };
        let parsed = record
            .get(time_col)
            .and_then(|t| t.trim().parse::<f64>().ok())
            .zip(record.get(tps_col).and_then(|r| r.trim().parse::<f64>().ok()));
        match parsed {
            Some((time, tps)) if time >= 0.0 && tps >= 0.0 => {
                let time_ms = if time_in_milliseconds {
                    time as u64
                } else {
                    (time * 1000.0) as u64
                };
                points.push(PatternPoint { time_ms, tps });
            }
            _ => {
                tracing::warn!("Skipping invalid data point in pattern file: {record:?}");
            }
        }
    }

    if points.is_empty() {
        return Err(Error::Pattern(format!(
            "no valid data points found in pattern file {}",
            path.display()
        )));
    }

    points.sort_by_key(|p| p.time_ms);
    tracing::info!(
        "Loaded custom traffic pattern with {} data points from {}",
        points.len(),
        path.display()
    );
    Ok(points)
}
