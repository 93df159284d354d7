// Fixed-capacity circular store with chronological read-out and per-buffer time gating.
// next_index counts every add since construction; the slot of item i is i % capacity.

use std::num::NonZeroUsize;
use std::time::Duration;

use tokio::time::Instant;

use crate::models::{DeviceRecord, Sample};

#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    items: Vec<T>,
    next_index: u64,
    last_update: Option<Instant>,
    interval: Duration,
    span: usize,
}

impl<T: Clone + Default> RingBuffer<T> {
    /// `interval` is this buffer's own update cadence (gating only); `span` is the number of
    /// base samples averaged into one item here, 0 for the base buffer.
    pub fn new(capacity: NonZeroUsize, interval: Duration, span: usize) -> Self {
        Self {
            items: vec![T::default(); capacity.get()],
            next_index: 0,
            last_update: None,
            interval,
            span,
        }
    }

    pub fn capacity(&self) -> usize {
        self.items.len()
    }

    /// Number of readable items: min(items added, capacity).
    pub fn len(&self) -> usize {
        self.window_len(self.capacity())
    }

    pub fn is_empty(&self) -> bool {
        self.next_index == 0
    }

    /// Total number of items ever added.
    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn span(&self) -> usize {
        self.span
    }

    pub fn last_update(&self) -> Option<Instant> {
        self.last_update
    }

    /// Convenience form of [`add_at`](Self::add_at) stamped with the current time.
    pub fn add(&mut self, item: T) {
        self.add_at(item, Instant::now());
    }

    /// Adds `item`, overwriting the oldest slot once full, and stamps the update time.
    pub fn add_at(&mut self, item: T, now: Instant) {
        let slot = self.slot(self.next_index);
        self.items[slot] = item;
        self.next_index += 1;
        self.last_update = Some(now);
    }

    /// The `min(k, len)` most recently added items, oldest first.
    pub fn last(&self, k: usize) -> Vec<T> {
        self.window(k).cloned().collect()
    }

    /// Full current contents, oldest first.
    pub fn last_available(&self) -> Vec<T> {
        self.last(self.capacity())
    }

    /// True when `k` items have been added and a window of `k` does not wrap past capacity.
    pub fn has_last(&self, k: usize) -> bool {
        self.next_index >= k as u64 && k <= self.capacity()
    }

    /// Convenience form of [`is_due_at`](Self::is_due_at) against the current time.
    pub fn is_due(&self, interval: Duration) -> bool {
        self.is_due_at(interval, Instant::now())
    }

    /// True if nothing was ever added, or at least `interval` has passed since the last add.
    pub fn is_due_at(&self, interval: Duration, now: Instant) -> bool {
        match self.last_update {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= interval,
        }
    }

    fn slot(&self, index: u64) -> usize {
        (index % self.items.len() as u64) as usize
    }

    fn window_len(&self, k: usize) -> usize {
        (k as u64).min(self.next_index).min(self.capacity() as u64) as usize
    }

    fn window(&self, k: usize) -> impl Iterator<Item = &T> + '_ {
        let from = self.next_index - self.window_len(k) as u64;
        (from..self.next_index).map(move |i| &self.items[self.slot(i)])
    }
}

impl RingBuffer<Sample> {
    /// Averages the `k` most recent samples into one.
    ///
    /// - `timestamp` is the oldest sample's timestamp.
    /// - Means use truncating integer division (sum / k).
    /// - Device slots (count and index) come from the oldest sample; each slot averages the
    ///   same position across the window. Samples without that position contribute zero.
    ///
    /// Returns `None` for an empty window.
    pub fn last_average(&self, k: usize) -> Option<Sample> {
        let n = self.window_len(k);
        let mut window = self.window(k);
        let oldest = window.next()?;

        let mut cpu_sum = i128::from(oldest.cpu_util);
        let mut mem_sum = i128::from(oldest.mem_used);
        let mut device_sums: Vec<(i128, i128)> = oldest
            .devices
            .iter()
            .map(|d| (i128::from(d.gpu_util), i128::from(d.mem_used)))
            .collect();

        for sample in window {
            cpu_sum += i128::from(sample.cpu_util);
            mem_sum += i128::from(sample.mem_used);
            for (sums, device) in device_sums.iter_mut().zip(&sample.devices) {
                sums.0 += i128::from(device.gpu_util);
                sums.1 += i128::from(device.mem_used);
            }
        }

        let n = n as i128;
        let devices = oldest
            .devices
            .iter()
            .zip(device_sums)
            .map(|(device, (util_sum, mem_sum))| DeviceRecord {
                index: device.index,
                mem_used: (mem_sum / n) as i64,
                gpu_util: (util_sum / n) as i32,
            })
            .collect();

        Some(Sample {
            timestamp: oldest.timestamp,
            cpu_util: (cpu_sum / n) as i32,
            mem_used: (mem_sum / n) as i64,
            devices,
        })
    }
}
