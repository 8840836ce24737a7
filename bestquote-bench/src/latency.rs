//! Latency measurement backed by an HDR histogram.

use hdrhistogram::{CreationError, Histogram};
use std::time::{Duration, Instant};

/// Latency statistics.
#[derive(Debug, Clone)]
pub struct LatencyStats {
    /// Minimum latency.
    pub min: Duration,
    /// Maximum latency.
    pub max: Duration,
    /// Mean latency.
    pub mean: Duration,
    /// Median latency (p50).
    pub median: Duration,
    /// 99th percentile latency.
    pub p99: Duration,
    /// 99.9th percentile latency.
    pub p999: Duration,
    /// Sample count.
    pub count: u64,
}

impl std::fmt::Display for LatencyStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "n={} min={:?} p50={:?} p99={:?} p99.9={:?} max={:?} mean={:?}",
            self.count, self.min, self.median, self.p99, self.p999, self.max, self.mean
        )
    }
}

/// Collects nanosecond samples into an auto-resizing histogram.
pub struct LatencyCollector {
    histogram: Histogram<u64>,
}

impl std::fmt::Debug for LatencyCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let h = &self.histogram;
        f.debug_struct("LatencyCollector")
            .field("count", &h.len())
            .field("p50_ns", &h.value_at_quantile(0.5))
            .field("p99_ns", &h.value_at_quantile(0.99))
            .field("max_ns", &h.max())
            .finish()
    }
}

impl LatencyCollector {
    /// Creates a collector with three significant digits of precision.
    ///
    /// # Errors
    /// Returns the histogram creation error.
    pub fn new() -> Result<Self, CreationError> {
        Ok(Self {
            histogram: Histogram::new(3)?,
        })
    }

    /// Records a latency sample.
    pub fn record(&mut self, latency: Duration) {
        let nanos = u64::try_from(latency.as_nanos()).unwrap_or(u64::MAX);
        self.histogram.saturating_record(nanos);
    }

    /// Measures the latency of a function.
    pub fn measure<F, T>(&mut self, f: F) -> T
    where
        F: FnOnce() -> T,
    {
        let start = Instant::now();
        let result = f();
        self.record(start.elapsed());
        result
    }

    /// Merges samples from another collector, e.g. one per thread.
    pub fn merge(&mut self, other: &LatencyCollector) {
        // Both histograms auto-resize, so adding cannot go out of range.
        let _ = self.histogram.add(&other.histogram);
    }

    /// Computes statistics from collected samples.
    #[must_use]
    pub fn stats(&self) -> Option<LatencyStats> {
        if self.histogram.is_empty() {
            return None;
        }

        let h = &self.histogram;
        Some(LatencyStats {
            min: Duration::from_nanos(h.min()),
            max: Duration::from_nanos(h.max()),
            mean: Duration::from_nanos(h.mean() as u64),
            median: Duration::from_nanos(h.value_at_quantile(0.5)),
            p99: Duration::from_nanos(h.value_at_quantile(0.99)),
            p999: Duration::from_nanos(h.value_at_quantile(0.999)),
            count: h.len(),
        })
    }

    /// Clears all samples.
    pub fn clear(&mut self) {
        self.histogram.reset();
    }

    /// Returns the number of samples.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.histogram.len()
    }

    /// Returns true if no samples have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.histogram.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_stats() {
        let mut collector = LatencyCollector::new().unwrap();

        for i in 1..=100 {
            collector.record(Duration::from_nanos(i * 100));
        }

        let stats = collector.stats().unwrap();
        assert_eq!(stats.count, 100);
        assert_eq!(stats.min, Duration::from_nanos(100));
        // Three significant digits.
        assert!(stats.max.as_nanos().abs_diff(10_000) <= 10);
        assert!(stats.median.as_nanos().abs_diff(5_000) <= 10);
    }

    #[test]
    fn test_debug_summarizes_samples() {
        let mut collector = LatencyCollector::new().unwrap();
        collector.record(Duration::from_nanos(1_000));
        let debug = format!("{collector:?}");
        assert!(debug.starts_with("LatencyCollector {"));
        assert!(debug.contains("count: 1"));
    }

    #[test]
    fn test_measure_and_merge() {
        let mut a = LatencyCollector::new().unwrap();
        let mut b = LatencyCollector::new().unwrap();

        assert_eq!(a.measure(|| 42), 42);
        b.record(Duration::from_micros(3));
        a.merge(&b);
        assert_eq!(a.len(), 2);

        a.clear();
        assert!(a.is_empty());
        assert!(a.stats().is_none());
    }
}
