/// Buffers bound writes until a batch is full.
///
/// `add` hands back the full batch as soon as the threshold is reached, so the
/// buffer never holds more than `threshold` items between calls.
#[derive(Debug)]
pub struct BatchAccumulator<T> {
    pending: Vec<T>,
    threshold: usize,
}

impl<T> BatchAccumulator<T> {
    pub fn new(threshold: usize) -> Self {
        let threshold = threshold.max(1);
        Self {
            pending: Vec::with_capacity(threshold),
            threshold,
        }
    }

    /// Buffers `item`; returns the accumulated batch once it reaches the
    /// threshold.
    pub fn add(&mut self, item: T) -> Option<Vec<T>> {
        self.pending.push(item);
        if self.pending.len() >= self.threshold {
            Some(self.take())
        } else {
            None
        }
    }

    /// Empties the buffer regardless of its size.
    pub fn take(&mut self) -> Vec<T> {
        std::mem::replace(&mut self.pending, Vec::with_capacity(self.threshold))
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }
}
