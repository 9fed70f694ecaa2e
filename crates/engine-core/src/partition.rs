use crate::counter::JobCounter;
use num_bigint::BigInt;
use std::fmt;

/// Half-open slice `[min, max)` of the origin token ring, together with the
/// counters of the one pipeline run that processes it.
#[derive(Debug, Clone)]
pub struct PartitionRange {
    min: BigInt,
    max: BigInt,
    counter: JobCounter,
}

impl PartitionRange {
    pub fn new(min: impl Into<BigInt>, max: impl Into<BigInt>) -> Self {
        Self {
            min: min.into(),
            max: max.into(),
            counter: JobCounter::new(),
        }
    }

    pub fn min(&self) -> &BigInt {
        &self.min
    }

    pub fn max(&self) -> &BigInt {
        &self.max
    }

    pub fn counter(&self) -> &JobCounter {
        &self.counter
    }

    pub fn contains(&self, token: &BigInt) -> bool {
        token >= &self.min && token < &self.max
    }

    pub fn label(&self) -> String {
        self.to_string()
    }

    /// Divides `[min, max)` into `parts` contiguous ranges of equal width, the
    /// last one absorbing the remainder. When `parts` exceeds the number of
    /// tokens every token gets its own range; an empty span yields nothing.
    pub fn split(min: &BigInt, max: &BigInt, parts: usize) -> Vec<PartitionRange> {
        let span = max - min;
        if parts == 0 || span <= BigInt::from(0) {
            return Vec::new();
        }

        let parts = BigInt::from(parts).min(span.clone());
        let width = &span / &parts;
        let count = usize::try_from(&parts).unwrap_or(usize::MAX);

        let mut ranges = Vec::with_capacity(count);
        let mut start = min.clone();
        for i in 0..count {
            let end = if i + 1 == count {
                max.clone()
            } else {
                &start + &width
            };
            ranges.push(PartitionRange::new(start, end.clone()));
            start = end;
        }
        ranges
    }
}

impl fmt::Display for PartitionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.min, self.max)
    }
}
