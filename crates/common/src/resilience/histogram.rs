//! Histogram for execution and waiting durations
//!
//! Lock-free, logarithmically bucketed, nanosecond resolution. Cloning a
//! [`Histogram`] yields another handle onto the same measurements.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

const NUM_BUCKETS: usize = 64;
const MIN_NANOS: u64 = 1_000; // 1µs
const MAX_NANOS: u64 = 3_600_000_000_000; // 1 hour

#[derive(Debug)]
struct Cells {
    buckets: [AtomicU64; NUM_BUCKETS],
    count: AtomicU64,
    sum_nanos: AtomicU64,
    min_nanos: AtomicU64,
    max_nanos: AtomicU64,
}

/// Duration histogram
///
/// ```rust
/// use std::time::Duration;
///
/// use bulwark_common::resilience::Histogram;
///
/// let histogram = Histogram::new();
/// histogram.record(Duration::from_millis(10));
/// histogram.record(Duration::from_millis(30));
///
/// let snapshot = histogram.snapshot();
/// assert_eq!(snapshot.count(), 2);
/// assert_eq!(snapshot.mean(), Some(Duration::from_millis(20)));
/// ```
#[derive(Debug, Clone)]
pub struct Histogram {
    cells: Arc<Cells>,
}

impl Histogram {
    pub fn new() -> Self {
        Self {
            cells: Arc::new(Cells {
                buckets: std::array::from_fn(|_| AtomicU64::new(0)),
                count: AtomicU64::new(0),
                sum_nanos: AtomicU64::new(0),
                min_nanos: AtomicU64::new(u64::MAX),
                max_nanos: AtomicU64::new(0),
            }),
        }
    }

    /// Record one measurement
    pub fn record(&self, duration: Duration) {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        self.record_nanos(nanos);
    }

    /// Record one measurement given in nanoseconds
    pub fn record_nanos(&self, nanos: u64) {
        let cells = &self.cells;
        cells.buckets[bucket_index(nanos)].fetch_add(1, Ordering::Relaxed);
        cells.count.fetch_add(1, Ordering::Relaxed);
        cells
            .sum_nanos
            .fetch_update(Ordering::AcqRel, Ordering::Relaxed, |sum| Some(sum.saturating_add(nanos)))
            .ok();
        cells.min_nanos.fetch_min(nanos, Ordering::AcqRel);
        cells.max_nanos.fetch_max(nanos, Ordering::AcqRel);
    }

    pub fn count(&self) -> u64 {
        self.cells.count.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> HistogramSnapshot {
        let cells = &self.cells;
        let min = cells.min_nanos.load(Ordering::Acquire);
        HistogramSnapshot {
            buckets: std::array::from_fn(|i| cells.buckets[i].load(Ordering::Acquire)),
            count: cells.count.load(Ordering::Acquire),
            sum_nanos: cells.sum_nanos.load(Ordering::Acquire),
            min_nanos: if min == u64::MAX { 0 } else { min },
            max_nanos: cells.max_nanos.load(Ordering::Acquire),
        }
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of a [`Histogram`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistogramSnapshot {
    buckets: [u64; NUM_BUCKETS],
    count: u64,
    sum_nanos: u64,
    min_nanos: u64,
    max_nanos: u64,
}

impl HistogramSnapshot {
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn sum(&self) -> Duration {
        Duration::from_nanos(self.sum_nanos)
    }

    pub fn mean(&self) -> Option<Duration> {
        (self.count > 0).then(|| Duration::from_nanos(self.sum_nanos / self.count))
    }

    pub fn min(&self) -> Option<Duration> {
        (self.count > 0).then(|| Duration::from_nanos(self.min_nanos))
    }

    pub fn max(&self) -> Option<Duration> {
        (self.count > 0).then(|| Duration::from_nanos(self.max_nanos))
    }

    /// Approximate quantile (`0.0..=1.0`) from bucket midpoints, clamped to
    /// the observed min and max.
    pub fn percentile(&self, p: f64) -> Option<Duration> {
        if self.count == 0 || !(0.0..=1.0).contains(&p) {
            return None;
        }

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
        let rank = ((self.count - 1) as f64 * p).ceil() as u64;

        let mut seen = 0u64;
        for (index, &count) in self.buckets.iter().enumerate() {
            seen += count;
            if seen > rank {
                let nanos = bucket_midpoint(index).clamp(self.min_nanos, self.max_nanos);
                return Some(Duration::from_nanos(nanos));
            }
        }
        self.max()
    }
}

#[allow(clippy::cast_precision_loss)]
fn bucket_ratio() -> f64 {
    static RATIO: OnceLock<f64> = OnceLock::new();
    *RATIO.get_or_init(|| {
        (MAX_NANOS as f64 / MIN_NANOS as f64).powf(1.0 / (NUM_BUCKETS as f64 - 1.0))
    })
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn bucket_index(nanos: u64) -> usize {
    if nanos <= MIN_NANOS {
        return 0;
    }
    if nanos >= MAX_NANOS {
        return NUM_BUCKETS - 1;
    }
    let clamped = nanos as f64 / MIN_NANOS as f64;
    let index = (clamped.ln() / bucket_ratio().ln()).floor() as usize;
    index.min(NUM_BUCKETS - 1)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn bucket_midpoint(index: usize) -> u64 {
    if index == 0 {
        return MIN_NANOS;
    }
    (MIN_NANOS as f64 * bucket_ratio().powf(index as f64 + 0.5)).round() as u64
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    /// Validates basic statistics of a populated histogram.
    ///
    /// Assertions:
    /// - Confirms count, min, max and mean.
    /// - Ensures the median lies between min and max.
    #[test]
    fn test_histogram_statistics() {
        let histogram = Histogram::new();
        for millis in [5_u64, 10, 15, 20, 25] {
            histogram.record(Duration::from_millis(millis));
        }

        let snapshot = histogram.snapshot();
        assert_eq!(snapshot.count(), 5);
        assert_eq!(snapshot.min(), Some(Duration::from_millis(5)));
        assert_eq!(snapshot.max(), Some(Duration::from_millis(25)));
        assert_eq!(snapshot.mean(), Some(Duration::from_millis(15)));

        let median = snapshot.percentile(0.5).expect("non-empty histogram");
        assert!(median >= Duration::from_millis(5) && median <= Duration::from_millis(25));
    }

    /// Validates an empty histogram reports no statistics.
    ///
    /// Assertions:
    /// - Ensures mean, min, max and percentiles are `None`.
    #[test]
    fn test_empty_histogram() {
        let snapshot = Histogram::new().snapshot();
        assert_eq!(snapshot.count(), 0);
        assert!(snapshot.mean().is_none());
        assert!(snapshot.min().is_none());
        assert!(snapshot.percentile(0.99).is_none());
    }

    #[test]
    fn test_bucket_index_bounds() {
        assert_eq!(bucket_index(0), 0);
        assert_eq!(bucket_index(MIN_NANOS), 0);
        assert_eq!(bucket_index(u64::MAX), NUM_BUCKETS - 1);
        assert!(bucket_index(1_000_000) < bucket_index(1_000_000_000));
    }

    /// Validates concurrent recording through cloned handles.
    ///
    /// Assertions:
    /// - Confirms no measurement is lost across threads.
    #[test]
    fn test_concurrent_recording() {
        let histogram = Histogram::new();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let histogram = histogram.clone();
                thread::spawn(move || {
                    for _ in 0..1_000 {
                        histogram.record_nanos(42_000);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("recording thread panicked");
        }
        assert_eq!(histogram.count(), 8_000);
    }
}
