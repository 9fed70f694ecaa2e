use engine_core::connectors::origin::key_factory::ExplodeMap;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::PathBuf, time::Duration};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for '{field}': {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
}

/// What happens when the number of outstanding writes reaches its ceiling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackpressureMode {
    /// Wait up to `max_retries × retry_delay`, then dispatch anyway.
    #[default]
    Soft,
    /// Wait until a slot frees up.
    Hard,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackpressureConfig {
    pub mode: BackpressureMode,
    pub max_retries: u32,
    #[serde(with = "duration_ms")]
    pub retry_delay: Duration,
}

impl Default for BackpressureConfig {
    fn default() -> Self {
        Self {
            mode: BackpressureMode::Soft,
            max_retries: 100,
            retry_delay: Duration::from_millis(10),
        }
    }
}

impl BackpressureConfig {
    /// Longest a soft gate waits before letting a write through.
    pub fn wait_budget(&self) -> Duration {
        self.retry_delay.saturating_mul(self.max_retries)
    }
}

/// Tuning of one copy or validation job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Records per dispatched batch; 1 writes record by record.
    pub batch_size: usize,
    /// Dispatched-but-unpromoted records after which the accumulator is
    /// flushed and `UNFLUSHED` promoted into `WRITE`.
    pub fetch_size: u64,
    pub max_pending_writes: usize,
    pub backpressure: BackpressureConfig,
    /// Origin reads per second, 0 = unlimited.
    pub read_rate: u32,
    /// Target writes per second, 0 = unlimited.
    pub write_rate: u32,
    /// Partitions processed concurrently.
    pub parallelism: usize,
    /// Point lookups in flight per partition during validation.
    pub lookup_concurrency: usize,
    /// Target merges counter columns, so every record is read before it is written.
    pub counter_table: bool,
    /// Target column → literal written for every record.
    pub constant_columns: BTreeMap<String, String>,
    pub explode_map: Option<ExplodeMap>,
    pub log_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 25,
            fetch_size: 1000,
            max_pending_writes: 100,
            backpressure: BackpressureConfig::default(),
            read_rate: 0,
            write_rate: 0,
            parallelism: 4,
            lookup_concurrency: 1,
            counter_table: false,
            constant_columns: BTreeMap::new(),
            explode_map: None,
            log_dir: PathBuf::from("migration_logs"),
        }
    }
}

impl PipelineConfig {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_fetch_size(mut self, fetch_size: u64) -> Self {
        self.fetch_size = fetch_size;
        self
    }

    pub fn with_max_pending_writes(mut self, max: usize) -> Self {
        self.max_pending_writes = max;
        self
    }

    pub fn with_backpressure(mut self, backpressure: BackpressureConfig) -> Self {
        self.backpressure = backpressure;
        self
    }

    pub fn with_rates(mut self, read_rate: u32, write_rate: u32) -> Self {
        self.read_rate = read_rate;
        self.write_rate = write_rate;
        self
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    pub fn with_lookup_concurrency(mut self, lookups: usize) -> Self {
        self.lookup_concurrency = lookups;
        self
    }

    pub fn with_counter_table(mut self, counter_table: bool) -> Self {
        self.counter_table = counter_table;
        self
    }

    pub fn with_constant_column(mut self, column: &str, literal: &str) -> Self {
        self.constant_columns
            .insert(column.to_string(), literal.to_string());
        self
    }

    pub fn with_explode_map(mut self, explode: ExplodeMap) -> Self {
        self.explode_map = Some(explode);
        self
    }

    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = dir.into();
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        fn positive(field: &'static str, value: u64) -> Result<(), ConfigError> {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    message: "must be at least 1".to_string(),
                });
            }
            Ok(())
        }

        positive("batch_size", self.batch_size as u64)?;
        positive("fetch_size", self.fetch_size)?;
        positive("max_pending_writes", self.max_pending_writes as u64)?;
        positive("parallelism", self.parallelism as u64)?;
        positive("lookup_concurrency", self.lookup_concurrency as u64)?;

        if self.constant_columns.keys().any(|c| c.trim().is_empty()) {
            return Err(ConfigError::Invalid {
                field: "constant_columns",
                message: "column name must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
