use crate::connectors::sink::MetricsSink;
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

const COUNTER_SLOTS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CounterType {
    Read,
    Write,
    Skipped,
    Error,
    Unflushed,
    Valid,
    Mismatch,
    Missing,
    PartitionsPassed,
    PartitionsFailed,
}

impl CounterType {
    pub const ALL: [CounterType; COUNTER_SLOTS] = [
        CounterType::Read,
        CounterType::Write,
        CounterType::Skipped,
        CounterType::Error,
        CounterType::Unflushed,
        CounterType::Valid,
        CounterType::Mismatch,
        CounterType::Missing,
        CounterType::PartitionsPassed,
        CounterType::PartitionsFailed,
    ];

    fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            CounterType::Read => "READ",
            CounterType::Write => "WRITE",
            CounterType::Skipped => "SKIPPED",
            CounterType::Error => "ERROR",
            CounterType::Unflushed => "UNFLUSHED",
            CounterType::Valid => "VALID",
            CounterType::Mismatch => "MISMATCH",
            CounterType::Missing => "MISSING",
            CounterType::PartitionsPassed => "PARTITIONS_PASSED",
            CounterType::PartitionsFailed => "PARTITIONS_FAILED",
        }
    }
}

impl fmt::Display for CounterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Default)]
struct InnerCounter {
    counts: [AtomicU64; COUNTER_SLOTS],
}

/// Named counters owned by one partition.
///
/// All counters only grow except `UNFLUSHED`, which is zeroed every time it is
/// promoted into `WRITE`. Clones share the same underlying counters so
/// completion tasks can report into the partition that spawned them.
#[derive(Debug, Clone, Default)]
pub struct JobCounter {
    inner: Arc<InnerCounter>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    counts: [u64; COUNTER_SLOTS],
}

impl JobCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self, counter: CounterType) {
        self.increment_by(counter, 1);
    }

    pub fn increment_by(&self, counter: CounterType, count: u64) {
        if count > 0 {
            self.slot(counter).fetch_add(count, Ordering::Relaxed);
        }
    }

    pub fn get(&self, counter: CounterType) -> u64 {
        self.slot(counter).load(Ordering::Relaxed)
    }

    /// Moves everything counted as `UNFLUSHED` into `WRITE` and returns the
    /// amount promoted.
    pub fn promote_unflushed(&self) -> u64 {
        let pending = self.slot(CounterType::Unflushed).swap(0, Ordering::AcqRel);
        self.increment_by(CounterType::Write, pending);
        pending
    }

    /// Moves at most `count` out of `UNFLUSHED` into `to` and returns the
    /// amount moved.
    pub fn settle_unflushed(&self, to: CounterType, count: u64) -> u64 {
        let previous = self
            .slot(CounterType::Unflushed)
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |pending| {
                Some(pending - pending.min(count))
            })
            .unwrap_or_else(|pending| pending);
        let moved = previous.min(count);
        self.increment_by(to, moved);
        moved
    }

    /// Attributes rows that were read but never accounted for as errors.
    /// Returns the amount added to `ERROR`.
    pub fn reconcile_copy_errors(&self) -> u64 {
        let accounted = self.get(CounterType::Write)
            + self.get(CounterType::Skipped)
            + self.get(CounterType::Error);
        self.reconcile(accounted)
    }

    /// Validation counterpart of [`JobCounter::reconcile_copy_errors`].
    pub fn reconcile_validation_errors(&self) -> u64 {
        let accounted = self.get(CounterType::Valid)
            + self.get(CounterType::Mismatch)
            + self.get(CounterType::Missing)
            + self.get(CounterType::Skipped)
            + self.get(CounterType::Error);
        self.reconcile(accounted)
    }

    fn reconcile(&self, accounted: u64) -> u64 {
        let remainder = self.get(CounterType::Read).saturating_sub(accounted);
        self.increment_by(CounterType::Error, remainder);
        remainder
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        let mut snapshot = CounterSnapshot::default();
        for counter in CounterType::ALL {
            snapshot.counts[counter.index()] = self.get(counter);
        }
        snapshot
    }

    /// Publishes the current counts for `partition`.
    pub fn flush(&self, sink: &dyn MetricsSink, partition: &str) -> CounterSnapshot {
        let snapshot = self.snapshot();
        sink.publish(partition, &snapshot);
        snapshot
    }

    fn slot(&self, counter: CounterType) -> &AtomicU64 {
        &self.inner.counts[counter.index()]
    }
}

impl CounterSnapshot {
    pub fn get(&self, counter: CounterType) -> u64 {
        self.counts[counter.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (CounterType, u64)> + '_ {
        CounterType::ALL.into_iter().map(|c| (c, self.get(c)))
    }

    pub fn merge(&mut self, other: &CounterSnapshot) {
        for (slot, value) in self.counts.iter_mut().zip(other.counts) {
            *slot += value;
        }
    }

    /// `READ == WRITE + SKIPPED + ERROR`
    pub fn is_conserved(&self) -> bool {
        self.get(CounterType::Read)
            == self.get(CounterType::Write)
                + self.get(CounterType::Skipped)
                + self.get(CounterType::Error)
    }
}

impl fmt::Display for CounterSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts = self
            .iter()
            .filter(|(_, v)| *v > 0)
            .map(|(c, v)| format!("{c}={v}"))
            .collect::<Vec<_>>();
        write!(f, "{}", parts.join(" "))
    }
}
