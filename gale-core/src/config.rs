//! Test specification types
//!
//! A test is described by a JSON document (unknown fields ignored). The
//! structures here are deserialized once, validated with field-naming error
//! messages, and then treated as immutable for the lifetime of a run.

use crate::error::{Error, Result};
use crate::request::template::RequestTemplate;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Serde helpers for durations given as humantime shorthand (`10m`) or
/// ISO-8601 (`PT10M`).
pub(crate) mod duration_str {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        crate::timing::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

pub(crate) mod opt_duration_str {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        match raw {
            Some(s) => crate::timing::parse_duration(&s)
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

/// Complete specification for one load test run
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSpec {
    /// Human-readable test name; used in log lines and result file names
    pub name: String,

    /// Base URL of the target service (informational; templates carry
    /// absolute URLs)
    #[serde(default)]
    pub target_service_url: String,

    /// Total test duration
    #[serde(with = "duration_str")]
    pub test_duration: Duration,

    /// Traffic shaping configuration
    pub traffic_pattern: TrafficConfig,

    /// Worker pool sizing
    #[serde(default)]
    pub thread_pool: ThreadPoolConfig,

    /// Request templates; at least one is required
    pub request_templates: Vec<RequestTemplate>,

    /// Parameter sources keyed by placeholder name
    #[serde(default)]
    pub parameter_sources: HashMap<String, ParameterSourceConfig>,

    /// Metrics options
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Circuit breaker options
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,

    /// Hard per-request timeout for the HTTP call
    #[serde(default = "default_http_timeout", with = "duration_str")]
    pub http_timeout: Duration,
}

fn default_http_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Traffic shaping configuration; `pattern_type` selects the profile and the
/// remaining fields feed whichever variant it names
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TrafficConfig {
    /// One of `stable`, `rampUp`, `spike`, `custom` (case-insensitive)
    #[serde(rename = "type")]
    pub pattern_type: String,

    /// Target TPS (stable rate, ramp target, spike base)
    #[serde(default)]
    pub target_tps: f64,

    /// Starting TPS for the ramp profile
    #[serde(default)]
    pub start_tps: f64,

    /// Spike TPS for the spike profile
    #[serde(default)]
    pub spike_tps: f64,

    /// Spike start offset for the spike profile
    #[serde(default, with = "opt_duration_str")]
    pub spike_start_time: Option<Duration>,

    /// Spike length for the spike profile
    #[serde(default, with = "opt_duration_str")]
    pub spike_duration: Option<Duration>,

    /// Ramp length for the ramp profile
    #[serde(default, with = "opt_duration_str")]
    pub ramp_duration: Option<Duration>,

    /// CSV pattern file for the custom profile
    #[serde(default)]
    pub pattern_file: Option<PathBuf>,

    /// Whether pattern file times are milliseconds (default: seconds)
    #[serde(default)]
    pub time_in_milliseconds: bool,
}

/// Worker pool sizing
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadPoolConfig {
    #[serde(default = "default_core_size")]
    pub core_size: usize,
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
    /// Idle lifetime of threads spawned beyond the core size
    #[serde(default = "default_keep_alive", with = "duration_str")]
    pub keep_alive_time: Duration,
}

fn default_core_size() -> usize {
    10
}

fn default_max_size() -> usize {
    50
}

fn default_queue_size() -> usize {
    1000
}

fn default_keep_alive() -> Duration {
    Duration::from_secs(60)
}

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        Self {
            core_size: default_core_size(),
            max_size: default_max_size(),
            queue_size: default_queue_size(),
            keep_alive_time: default_keep_alive(),
        }
    }
}

/// Parameter source configuration; `source_type` selects the variant
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ParameterSourceConfig {
    /// One of `random`, `file` (case-insensitive)
    #[serde(rename = "type")]
    pub source_type: String,

    /// Distribution for random sources: `uniform` (default) or `normal`
    #[serde(default)]
    pub distribution: Option<String>,

    /// Inclusive `[min, max]` range for uniform integer sources
    #[serde(default)]
    pub range: Option<Vec<i64>>,

    /// Minimum value for normal sources
    #[serde(default)]
    pub min: Option<f64>,

    /// Maximum value (exclusive) for normal sources
    #[serde(default)]
    pub max: Option<f64>,

    /// Mean for normal sources
    #[serde(default)]
    pub mean: Option<f64>,

    /// Standard deviation for normal sources
    #[serde(default)]
    pub stddev: Option<f64>,

    /// Value file for file sources
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// CSV column to read (file sources; default: first column)
    #[serde(default)]
    pub column: Option<String>,

    /// Selection order for file sources: `round-robin` (default) or `random`
    #[serde(default)]
    pub selection: Option<String>,

    /// Cap on loaded lines; excess is truncated with a warning
    #[serde(default)]
    pub max_lines: Option<usize>,
}

/// Metrics options
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsConfig {
    /// Response time percentiles surfaced in the report
    #[serde(default = "default_percentiles")]
    pub response_time_percentiles: Vec<u8>,

    /// Optional output file name override for exporters
    #[serde(default)]
    pub output_file: Option<String>,

    #[serde(default)]
    pub resource_monitoring: ResourceMonitoringConfig,
}

fn default_percentiles() -> Vec<u8> {
    vec![50, 90, 95, 99]
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            response_time_percentiles: default_percentiles(),
            output_file: None,
            resource_monitoring: ResourceMonitoringConfig::default(),
        }
    }
}

/// Resource monitoring options
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMonitoringConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_sample_interval", with = "duration_str")]
    pub sample_interval: Duration,
}

fn default_true() -> bool {
    true
}

fn default_sample_interval() -> Duration {
    Duration::from_secs(5)
}

impl Default for ResourceMonitoringConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sample_interval: default_sample_interval(),
        }
    }
}

/// Circuit breaker options
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreakerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_error_threshold")]
    pub error_threshold: f64,
    #[serde(default = "default_window_size")]
    pub window_size: usize,
}

fn default_error_threshold() -> f64 {
    0.5
}

fn default_window_size() -> usize {
    100
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            error_threshold: default_error_threshold(),
            window_size: default_window_size(),
        }
    }
}

impl TestSpec {
    /// Load and validate a spec from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read config file {}: {e}", path.display()))
        })?;
        Self::from_json(&content)
    }

    /// Parse and validate a spec from a JSON string
    pub fn from_json(content: &str) -> Result<Self> {
        let spec: TestSpec = serde_json::from_str(content)
            .map_err(|e| Error::Config(format!("failed to parse config: {e}")))?;
        spec.validate()?;
        Ok(spec)
    }

    /// Validate the spec; error messages name the violating field
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Config("name must not be blank".into()));
        }
        if self.test_duration.is_zero() {
            return Err(Error::Config("testDuration must be positive".into()));
        }
        if self.traffic_pattern.pattern_type.trim().is_empty() {
            return Err(Error::Config("trafficPattern.type is required".into()));
        }
        if self.traffic_pattern.target_tps <= 0.0 {
            return Err(Error::Config("trafficPattern.targetTps must be positive".into()));
        }
        if self.thread_pool.core_size == 0 {
            return Err(Error::Config("threadPool.coreSize must be at least 1".into()));
        }
        if self.thread_pool.max_size < self.thread_pool.core_size {
            return Err(Error::Config(
                "threadPool.maxSize must be >= threadPool.coreSize".into(),
            ));
        }
        if self.request_templates.is_empty() {
            return Err(Error::Config("requestTemplates must contain at least one template".into()));
        }
        for template in &self.request_templates {
            if template.weight == 0 {
                return Err(Error::Config(format!(
                    "requestTemplates[{}].weight must be at least 1",
                    template.name
                )));
            }
            if template.url_template.trim().is_empty() {
                return Err(Error::Config(format!(
                    "requestTemplates[{}].urlTemplate must not be blank",
                    template.name
                )));
            }
        }
        if self.circuit_breaker.enabled {
            if !(0.0..=1.0).contains(&self.circuit_breaker.error_threshold) {
                return Err(Error::Config(
                    "circuitBreaker.errorThreshold must be between 0.0 and 1.0".into(),
                ));
            }
            if self.circuit_breaker.window_size == 0 {
                return Err(Error::Config("circuitBreaker.windowSize must be at least 1".into()));
            }
        }
        if self.http_timeout.is_zero() {
            return Err(Error::Config("httpTimeout must be positive".into()));
        }
        Ok(())
    }
}
