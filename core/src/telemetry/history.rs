use std::collections::VecDeque;
use std::time::Duration;

/// Fixed-capacity rolling buffer of battery-voltage samples. Inserting into
/// a full buffer evicts the oldest sample.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryHistory {
    samples: VecDeque<f32>,
    capacity: usize,
    interval: Duration,
}

impl TelemetryHistory {
    pub fn new(capacity: usize, interval: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            interval,
        }
    }

    /// Appends a sample, returning the evicted one if the buffer was full.
    pub fn push(&mut self, sample: f32) -> Option<f32> {
        let evicted = if self.samples.len() == self.capacity {
            self.samples.pop_front()
        } else {
            None
        };
        self.samples.push_back(sample);
        evicted
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<f32> {
        self.samples.back().copied()
    }

    /// Samples oldest first.
    pub fn to_vec(&self) -> Vec<f32> {
        self.samples.iter().copied().collect()
    }

    /// The newest `count` samples, oldest first.
    pub fn tail(&self, count: usize) -> Vec<f32> {
        let skip = self.samples.len().saturating_sub(count);
        self.samples.iter().skip(skip).copied().collect()
    }

    /// Relative time axis in seconds for a full buffer: `capacity` points
    /// spread evenly from `-interval * capacity` to zero.
    pub fn timeline(&self) -> Vec<f64> {
        let span = self.interval.as_secs_f64() * self.capacity as f64;
        if self.capacity == 1 {
            return vec![-span];
        }
        let last = (self.capacity - 1) as f64;
        (0..self.capacity)
            .map(|i| -span * (1.0 - i as f64 / last))
            .collect()
    }
}
