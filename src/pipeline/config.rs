//! Pipeline configuration from environment variables

use super::error::ConfigError;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    Sqlite,
    Jsonl,
}

impl BackendType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendType::Sqlite => "sqlite",
            BackendType::Jsonl => "jsonl",
        }
    }
}

impl FromStr for BackendType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(BackendType::Sqlite),
            "jsonl" => Ok(BackendType::Jsonl),
            other => Err(ConfigError::InvalidValue(format!(
                "unknown backend '{}' (expected sqlite or jsonl)",
                other
            ))),
        }
    }
}

/// Configuration for the partitioned aggregation runtime
///
/// Loaded from environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Trailing window span in milliseconds
    pub window_span_ms: i64,

    /// Recompute / emit cadence in milliseconds
    pub flush_interval_ms: u64,

    /// Number of stream partitions (one worker each)
    pub partitions: usize,

    /// Per-partition channel capacity (records)
    pub channel_buffer: usize,

    /// Snapshot persistence backend
    pub backend: BackendType,

    /// Path to SQLite database file
    pub db_path: String,

    /// Path to JSONL output file
    pub output_path: String,

    /// Host label stamped on every snapshot
    pub host: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            window_span_ms: 10_000,
            flush_interval_ms: 1_000,
            partitions: 2,
            channel_buffer: 10_000,
            backend: BackendType::Sqlite,
            db_path: "data/fieldflow.db".to_string(),
            output_path: "streams/snapshots.jsonl".to_string(),
            host: default_host(None),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `FIELDFLOW_WINDOW_SPAN_MS` (default: 10000)
    /// - `FIELDFLOW_FLUSH_INTERVAL_MS` (default: 1000)
    /// - `FIELDFLOW_PARTITIONS` (default: 2)
    /// - `FIELDFLOW_CHANNEL_BUFFER` (default: 10000)
    /// - `FIELDFLOW_BACKEND` (default: sqlite)
    /// - `FIELDFLOW_DB_PATH` (default: data/fieldflow.db)
    /// - `FIELDFLOW_OUTPUT_PATH` (default: streams/snapshots.jsonl)
    /// - `FIELDFLOW_HOST` (default: $HOSTNAME, then worker-<uuid>)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let backend = match lookup("FIELDFLOW_BACKEND") {
            Some(raw) => raw.parse().unwrap_or_else(|e| {
                log::warn!("⚠️  {}, falling back to sqlite", e);
                BackendType::Sqlite
            }),
            None => defaults.backend,
        };

        Self {
            window_span_ms: parse_or(&lookup, "FIELDFLOW_WINDOW_SPAN_MS", defaults.window_span_ms),
            flush_interval_ms: parse_or(
                &lookup,
                "FIELDFLOW_FLUSH_INTERVAL_MS",
                defaults.flush_interval_ms,
            ),
            partitions: parse_or(&lookup, "FIELDFLOW_PARTITIONS", defaults.partitions),
            channel_buffer: parse_or(&lookup, "FIELDFLOW_CHANNEL_BUFFER", defaults.channel_buffer),
            backend,
            db_path: lookup("FIELDFLOW_DB_PATH").unwrap_or(defaults.db_path),
            output_path: lookup("FIELDFLOW_OUTPUT_PATH").unwrap_or(defaults.output_path),
            host: lookup("FIELDFLOW_HOST")
                .filter(|h| !h.is_empty())
                .unwrap_or_else(|| default_host(lookup("HOSTNAME"))),
        }
    }

    /// Reject settings that make the window meaningless
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_span_ms <= 0 {
            return Err(ConfigError::InvalidValue(
                "FIELDFLOW_WINDOW_SPAN_MS must be positive".to_string(),
            ));
        }
        if self.flush_interval_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "FIELDFLOW_FLUSH_INTERVAL_MS must be positive".to_string(),
            ));
        }
        let interval_too_long = i64::try_from(self.flush_interval_ms)
            .map_or(true, |ms| ms >= self.window_span_ms);
        if interval_too_long {
            return Err(ConfigError::InvalidValue(format!(
                "flush interval ({}ms) must be shorter than window span ({}ms)",
                self.flush_interval_ms, self.window_span_ms
            )));
        }
        if self.partitions == 0 {
            return Err(ConfigError::InvalidValue(
                "FIELDFLOW_PARTITIONS must be at least 1".to_string(),
            ));
        }
        if self.channel_buffer == 0 {
            return Err(ConfigError::InvalidValue(
                "FIELDFLOW_CHANNEL_BUFFER must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(key)
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn default_host(hostname: Option<String>) -> String {
    hostname
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| format!("worker-{}", uuid::Uuid::new_v4()))
}
