//! Parameter value sources
//!
//! A source produces one string value per call and must be safe to share
//! across worker threads. File-backed sources load their values once at
//! construction and never reread.

use crate::config::ParameterSourceConfig;
use crate::error::{Error, Result};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Default cap on values loaded from a single file
pub const DEFAULT_MAX_FILE_LINES: usize = 100_000;

/// Thread-safe generator of one string value per call
pub trait ParameterSource: Send + Sync {
    /// Produce the next value
    fn next_value(&self) -> Result<String>;

    /// Source kind for logging
    fn kind(&self) -> &'static str;
}

/// Uniform random integer in an inclusive range
pub struct UniformIntSource {
    min: i64,
    max: i64,
}

impl UniformIntSource {
    pub fn new(min: i64, max: i64) -> Result<Self> {
        if min > max {
            return Err(Error::Source(format!(
                "uniform range is inverted: min {min} > max {max}"
            )));
        }
        Ok(Self { min, max })
    }
}

impl ParameterSource for UniformIntSource {
    fn next_value(&self) -> Result<String> {
        let value = rand::rng().random_range(self.min..=self.max);
        Ok(value.to_string())
    }

    fn kind(&self) -> &'static str {
        "uniform"
    }
}

/// Normal distribution truncated to `[min, max)` by resampling
pub struct TruncatedNormalSource {
    normal: Normal<f64>,
    min: f64,
    max: f64,
    /// Whole-number mean and stddev format as integers, otherwise one decimal
    integral: bool,
}

impl TruncatedNormalSource {
    pub fn new(mean: f64, stddev: f64, min: f64, max: f64) -> Result<Self> {
        if stddev <= 0.0 {
            return Err(Error::Source(format!("stddev must be positive, got {stddev}")));
        }
        if min >= max {
            return Err(Error::Source(format!(
                "normal range is empty: min {min} >= max {max}"
            )));
        }
        let normal = Normal::new(mean, stddev)
            .map_err(|e| Error::Source(format!("invalid normal distribution: {e}")))?;
        Ok(Self {
            normal,
            min,
            max,
            integral: mean.fract() == 0.0 && stddev.fract() == 0.0,
        })
    }
}

impl ParameterSource for TruncatedNormalSource {
    fn next_value(&self) -> Result<String> {
        let mut rng = rand::rng();
        let value = loop {
            let sample = self.normal.sample(&mut rng);
            if sample >= self.min && sample < self.max {
                break sample;
            }
        };
        if self.integral {
            Ok((value.round() as i64).to_string())
        } else {
            Ok(format!("{value:.1}"))
        }
    }

    fn kind(&self) -> &'static str {
        "normal"
    }
}

/// Selection order for file-backed sources
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileSelection {
    RoundRobin,
    Random,
}

/// Values loaded once from a CSV or plain-text file
pub struct FileSource {
    values: Vec<String>,
    selection: FileSelection,
    cursor: AtomicUsize,
}

impl FileSource {
    /// Load up to `max_lines` values. CSV files (by extension) read the
    /// named column, or the first column when none is given; other files
    /// read one value per line. Values are trimmed and blanks skipped; an
    /// empty result is a construction error.
    pub fn new<P: AsRef<Path>>(
        path: P,
        column: Option<&str>,
        selection: FileSelection,
        max_lines: usize,
    ) -> Result<Self> {
        let path = path.as_ref();
        let is_csv = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("csv"))
            .unwrap_or(false);

        let values = if is_csv {
            load_csv_values(path, column, max_lines)?
        } else {
            load_plain_values(path, max_lines)?
        };

        if values.is_empty() {
            return Err(Error::Source(format!(
                "no values loaded from file {}",
                path.display()
            )));
        }
        tracing::info!("Loaded {} values from file {}", values.len(), path.display());

        Ok(Self {
            values,
            selection,
            cursor: AtomicUsize::new(0),
        })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl ParameterSource for FileSource {
    fn next_value(&self) -> Result<String> {
        let index = match self.selection {
            FileSelection::RoundRobin => self
                .cursor
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |i| {
                    Some((i + 1) % self.values.len())
                })
                .unwrap_or(0),
            FileSelection::Random => rand::rng().random_range(0..self.values.len()),
        };
        Ok(self.values[index].clone())
    }

    fn kind(&self) -> &'static str {
        "file"
    }
}

fn load_csv_values(path: &Path, column: Option<&str>, max_lines: usize) -> Result<Vec<String>> {
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| Error::Source(format!("failed to open file {}: {e}", path.display())))?;

    let column_index = match column {
        Some(name) => {
            let headers = reader
                .headers()
                .map_err(|e| Error::Source(format!("failed to read CSV header: {e}")))?;
            let idx = headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name.trim()));
            match idx {
                Some(i) => i,
                None => {
                    return Err(Error::Source(format!(
                        "column '{name}' not found in {}",
                        path.display()
                    )))
                }
            }
        }
        None => 0,
    };

    let mut values = Vec::new();
    for record in reader.records() {
        if values.len() >= max_lines {
            tracing::warn!(
                "File {} has more than {max_lines} records, truncating",
                path.display()
            );
            break;
        }
        let record =
            record.map_err(|e| Error::Source(format!("failed to read CSV record: {e}")))?;
        if let Some(value) = record.get(column_index) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                values.push(trimmed.to_string());
            }
        }
    }
    Ok(values)
}

fn load_plain_values(path: &Path, max_lines: usize) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Source(format!("failed to read file {}: {e}", path.display())))?;

    let mut values = Vec::new();
    for line in content.lines() {
        if values.len() >= max_lines {
            tracing::warn!(
                "File {} has more than {max_lines} lines, truncating",
                path.display()
            );
            break;
        }
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            values.push(trimmed.to_string());
        }
    }
    Ok(values)
}

/// Build a source from its config block. `type`, `distribution`, and
/// `selection` are matched case-insensitively.
pub fn build(name: &str, config: &ParameterSourceConfig) -> Result<Box<dyn ParameterSource>> {
    match config.source_type.to_lowercase().as_str() {
        "random" => build_random(name, config),
        "file" => build_file(name, config),
        other => Err(Error::Config(format!(
            "parameterSources.{name}.type '{other}' is not one of random, file"
        ))),
    }
}

fn build_random(name: &str, config: &ParameterSourceConfig) -> Result<Box<dyn ParameterSource>> {
    let distribution = config
        .distribution
        .as_deref()
        .unwrap_or("uniform")
        .to_lowercase();
    match distribution.as_str() {
        "uniform" => {
            let (min, max) = match (&config.range, config.min, config.max) {
                (Some(range), _, _) if range.len() == 2 => (range[0], range[1]),
                (Some(range), _, _) => {
                    return Err(Error::Config(format!(
                        "parameterSources.{name}.range must have exactly two entries, got {}",
                        range.len()
                    )))
                }
                (None, Some(min), Some(max)) => (min as i64, max as i64),
                _ => {
                    return Err(Error::Config(format!(
                        "parameterSources.{name} needs a range or min/max"
                    )))
                }
            };
            Ok(Box::new(UniformIntSource::new(min, max)?))
        }
        "normal" => {
            let mean = config.mean.ok_or_else(|| {
                Error::Config(format!("parameterSources.{name}.mean is required for normal"))
            })?;
            let stddev = config.stddev.ok_or_else(|| {
                Error::Config(format!("parameterSources.{name}.stddev is required for normal"))
            })?;
            let min = config.min.unwrap_or(f64::MIN);
            let max = config.max.unwrap_or(f64::MAX);
            Ok(Box::new(TruncatedNormalSource::new(mean, stddev, min, max)?))
        }
        other => Err(Error::Config(format!(
            "parameterSources.{name}.distribution '{other}' is not one of uniform, normal"
        ))),
    }
}

fn build_file(name: &str, config: &ParameterSourceConfig) -> Result<Box<dyn ParameterSource>> {
    let path = config.path.as_ref().ok_or_else(|| {
        Error::Config(format!("parameterSources.{name}.path is required for file sources"))
    })?;
    let selection = match config
        .selection
        .as_deref()
        .unwrap_or("round-robin")
        .to_lowercase()
        .as_str()
    {
        "round-robin" | "roundrobin" => FileSelection::RoundRobin,
        "random" => FileSelection::Random,
        other => {
            return Err(Error::Config(format!(
                "parameterSources.{name}.selection '{other}' is not one of round-robin, random"
            )))
        }
    };
    let max_lines = config.max_lines.unwrap_or(DEFAULT_MAX_FILE_LINES);
    Ok(Box::new(FileSource::new(
        path,
        config.column.as_deref(),
        selection,
        max_lines,
    )?))
}
