//! Block counters and latency statistics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters updated from the audio thread.
#[derive(Debug, Default)]
pub struct ProcessStats {
    processed: AtomicU64,
    fallback: AtomicU64,
    faults: AtomicU64,
}

/// A point-in-time copy of [`ProcessStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Blocks rendered by the module
    pub processed_blocks: u64,
    /// Blocks rendered by the fallback (any reason)
    pub fallback_blocks: u64,
    /// Blocks in which the module trapped
    pub faults: u64,
}

impl ProcessStats {
    pub(crate) fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fallback(&self) {
        self.fallback.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fault(&self) {
        self.faults.fetch_add(1, Ordering::Relaxed);
    }

    /// Read all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            processed_blocks: self.processed.load(Ordering::Relaxed),
            fallback_blocks: self.fallback.load(Ordering::Relaxed),
            faults: self.faults.load(Ordering::Relaxed),
        }
    }

    /// Zero all counters.
    pub fn reset(&self) {
        self.processed.store(0, Ordering::Relaxed);
        self.fallback.store(0, Ordering::Relaxed);
        self.faults.store(0, Ordering::Relaxed);
    }
}

/// Latency collector for measuring per-block processing cost.
pub struct LatencyStats {
    samples: Vec<u64>,
}

impl LatencyStats {
    /// Create a new collector.
    pub fn new() -> Self {
        Self { samples: Vec::new() }
    }

    /// Record a timing sample in microseconds.
    pub fn record(&mut self, us: u64) {
        self.samples.push(us);
    }

    /// Get the number of samples.
    pub fn count(&self) -> usize {
        self.samples.len()
    }

    /// Get the mean time in microseconds.
    pub fn mean_us(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<u64>() as f64 / self.samples.len() as f64
    }

    /// Get a percentile value.
    pub fn percentile(&self, p: usize) -> u64 {
        if self.samples.is_empty() {
            return 0;
        }
        let mut sorted = self.samples.clone();
        sorted.sort_unstable();
        let idx = (p * sorted.len() / 100).min(sorted.len() - 1);
        sorted[idx]
    }

    /// Get the worst time.
    pub fn max_us(&self) -> u64 {
        self.samples.iter().copied().max().unwrap_or(0)
    }

    /// Fraction of the block period spent processing, at the p99 latency.
    pub fn realtime_load(&self, block_size: usize, sample_rate: f64) -> f64 {
        if block_size == 0 || sample_rate <= 0.0 {
            return 0.0;
        }
        let period_us = block_size as f64 / sample_rate * 1e6;
        self.percentile(99) as f64 / period_us
    }

    /// One-line summary.
    pub fn summary(&self) -> String {
        format!(
            "n={} mean={:.1}us p50={}us p99={}us max={}us",
            self.count(),
            self.mean_us(),
            self.percentile(50),
            self.percentile(99),
            self.max_us()
        )
    }
}

impl Default for LatencyStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let stats = ProcessStats::default();
        stats.record_processed();
        stats.record_processed();
        stats.record_fallback();
        stats.record_fault();
        assert_eq!(
            stats.snapshot(),
            StatsSnapshot {
                processed_blocks: 2,
                fallback_blocks: 1,
                faults: 1
            }
        );
        stats.reset();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn test_latency_percentiles() {
        let mut latency = LatencyStats::new();
        for i in 1..=100 {
            latency.record(i);
        }
        assert_eq!(latency.count(), 100);
        assert_eq!(latency.percentile(50), 51);
        assert_eq!(latency.percentile(99), 100);
        assert_eq!(latency.max_us(), 100);
        assert!((latency.mean_us() - 50.5).abs() < 1e-9);
    }

    #[test]
    fn test_latency_empty() {
        let latency = LatencyStats::new();
        assert_eq!(latency.percentile(99), 0);
        assert_eq!(latency.realtime_load(512, 44_100.0), 0.0);
        assert!(latency.summary().contains("n=0"));
    }

    #[test]
    fn test_realtime_load() {
        let mut latency = LatencyStats::new();
        latency.record(1000);
        // 441 samples at 44.1 kHz is a 10 ms period
        assert!((latency.realtime_load(441, 44_100.0) - 0.1).abs() < 1e-9);
    }
}
