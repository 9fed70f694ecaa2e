use crate::{
    connectors::sink::MetricsSink,
    counter::{CounterSnapshot, CounterType},
    error::SinkError,
};
use chrono::{DateTime, Utc};
use std::{
    collections::BTreeMap,
    fmt::Write as _,
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};
use tracing::info;

#[derive(Debug)]
struct InnerMetrics {
    partitions: Mutex<BTreeMap<String, CounterSnapshot>>,
    started: Instant,
    started_at: DateTime<Utc>,
}

/// Job-wide totals built from the last snapshot published by each partition.
///
/// A partition publishing twice replaces its earlier snapshot, so totals never
/// double count.
#[derive(Debug, Clone)]
pub struct JobMetrics {
    inner: Arc<InnerMetrics>,
}

impl JobMetrics {
    pub fn new() -> Self {
        JobMetrics {
            inner: Arc::new(InnerMetrics {
                partitions: Mutex::new(BTreeMap::new()),
                started: Instant::now(),
                started_at: Utc::now(),
            }),
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.inner.started_at
    }

    pub fn partition(&self, label: &str) -> Option<CounterSnapshot> {
        self.partitions().get(label).copied()
    }

    pub fn partition_count(&self) -> usize {
        self.partitions().len()
    }

    pub fn totals(&self) -> CounterSnapshot {
        self.partitions()
            .values()
            .fold(CounterSnapshot::default(), |mut acc, snapshot| {
                acc.merge(snapshot);
                acc
            })
    }

    pub fn summary(&self) -> PerformanceSummary {
        PerformanceSummary::new(self.inner.started.elapsed(), self.totals())
    }

    fn partitions(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, CounterSnapshot>> {
        self.inner
            .partitions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for JobMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSink for JobMetrics {
    fn publish(&self, partition: &str, snapshot: &CounterSnapshot) {
        self.partitions().insert(partition.to_string(), *snapshot);
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerformanceSummary {
    pub duration: Duration,
    pub totals: CounterSnapshot,
}

impl PerformanceSummary {
    pub fn new(duration: Duration, totals: CounterSnapshot) -> Self {
        Self { duration, totals }
    }

    /// Records written per second.
    pub fn throughput(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.totals.get(CounterType::Write) as f64 / secs
        } else {
            0.0
        }
    }

    /// Errors as a percentage of records read.
    pub fn error_rate(&self) -> f64 {
        self.percent_of_reads(CounterType::Error)
    }

    /// Writes as a percentage of records read.
    pub fn success_rate(&self) -> f64 {
        self.percent_of_reads(CounterType::Write)
    }

    fn percent_of_reads(&self, counter: CounterType) -> f64 {
        let reads = self.totals.get(CounterType::Read);
        if reads == 0 {
            0.0
        } else {
            self.totals.get(counter) as f64 * 100.0 / reads as f64
        }
    }

    pub fn render(&self) -> String {
        let t = &self.totals;
        let mut out = String::new();
        let _ = writeln!(out, "=== Migration Performance Summary ===");
        let _ = writeln!(out, "Duration: {}", format_duration(self.duration));
        let _ = writeln!(out, "Records read: {}", t.get(CounterType::Read));
        let _ = writeln!(out, "Records written: {}", t.get(CounterType::Write));
        let _ = writeln!(out, "Records skipped: {}", t.get(CounterType::Skipped));
        let _ = writeln!(out, "Errors: {}", t.get(CounterType::Error));

        let validated = t.get(CounterType::Valid)
            + t.get(CounterType::Mismatch)
            + t.get(CounterType::Missing);
        if validated > 0 {
            let _ = writeln!(out, "Valid: {}", t.get(CounterType::Valid));
            let _ = writeln!(out, "Mismatched: {}", t.get(CounterType::Mismatch));
            let _ = writeln!(out, "Missing: {}", t.get(CounterType::Missing));
        }

        let _ = writeln!(out, "Partitions passed: {}", t.get(CounterType::PartitionsPassed));
        let _ = writeln!(out, "Partitions failed: {}", t.get(CounterType::PartitionsFailed));
        let _ = writeln!(out, "Throughput: {:.2} records/sec", self.throughput());
        let _ = writeln!(out, "Error rate: {:.2}%", self.error_rate());
        let _ = writeln!(out, "Success rate: {:.2}%", self.success_rate());
        out
    }

    /// Writes the rendered summary to `performance_<yyyyMMdd_HHmmss>.txt`.
    pub fn write_to(&self, dir: impl AsRef<Path>) -> Result<PathBuf, SinkError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = dir.join(format!(
            "performance_{}.txt",
            Utc::now().format("%Y%m%d_%H%M%S")
        ));
        fs::write(&path, self.render())?;
        info!(path = %path.display(), "Performance summary written");
        Ok(path)
    }
}

/// `1h 2m 3s`, `2m 3s` or `3s`.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::JobCounter;
    use tempfile::tempdir;

    fn snapshot(read: u64, write: u64, error: u64) -> CounterSnapshot {
        let counter = JobCounter::new();
        counter.increment_by(CounterType::Read, read);
        counter.increment_by(CounterType::Write, write);
        counter.increment_by(CounterType::Error, error);
        counter.increment(CounterType::PartitionsPassed);
        counter.snapshot()
    }

    #[test]
    fn republishing_does_not_double_count() {
        let metrics = JobMetrics::new();
        metrics.publish("[0, 10)", &snapshot(10, 10, 0));
        metrics.publish("[10, 20)", &snapshot(5, 4, 1));
        metrics.publish("[10, 20)", &snapshot(5, 4, 1));

        let totals = metrics.totals();
        assert_eq!(metrics.partition_count(), 2);
        assert_eq!(totals.get(CounterType::Read), 15);
        assert_eq!(totals.get(CounterType::Write), 14);
        assert_eq!(totals.get(CounterType::PartitionsPassed), 2);
    }

    #[test]
    fn formats_durations() {
        assert_eq!(format_duration(Duration::from_secs(5)), "5s");
        assert_eq!(format_duration(Duration::from_secs(65)), "1m 5s");
        assert_eq!(format_duration(Duration::from_secs(3723)), "1h 2m 3s");
    }

    #[test]
    fn rates_are_relative_to_reads() {
        let summary = PerformanceSummary::new(Duration::from_secs(4), snapshot(200, 198, 2));
        assert!((summary.throughput() - 49.5).abs() < 1e-9);
        assert!((summary.error_rate() - 1.0).abs() < 1e-9);
        assert!((summary.success_rate() - 99.0).abs() < 1e-9);

        let empty = PerformanceSummary::new(Duration::ZERO, CounterSnapshot::default());
        assert_eq!(empty.throughput(), 0.0);
        assert_eq!(empty.error_rate(), 0.0);
    }

    #[test]
    fn writes_summary_file() {
        let dir = tempdir().unwrap();
        let summary = PerformanceSummary::new(Duration::from_secs(65), snapshot(10, 9, 1));
        let path = summary.write_to(dir.path()).unwrap();

        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("performance_") && name.ends_with(".txt"));

        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.contains("Duration: 1m 5s"));
        assert!(text.contains("Records written: 9"));
        assert!(text.contains("Error rate: 10.00%"));
        assert!(!text.contains("Mismatched"));
    }
}
