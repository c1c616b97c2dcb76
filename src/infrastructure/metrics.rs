//! Collector metrics: named counters and timings

use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};

pub const EVENTS_INGESTED: &str = "events_ingested";
pub const EVENTS_DROPPED: &str = "events_dropped";
pub const DELETES_ISSUED: &str = "deletes_issued";
pub const FINALIZERS_REMOVED: &str = "finalizers_removed";
pub const OWNER_REFS_REMOVED: &str = "owner_refs_removed";
pub const CYCLES_BROKEN: &str = "cycles_broken";
pub const RETRIES: &str = "retries";
pub const PROCESS_ITEM: &str = "process_item";

/// Metrics collector shared by ingestion and workers
pub struct GcMetrics {
    /// Individual timing measurements
    timings: RwLock<HashMap<String, Vec<Duration>>>,

    /// Counter metrics
    counters: RwLock<HashMap<String, u64>>,

    /// Start time for uptime
    start_time: Instant,
}

impl GcMetrics {
    pub fn new() -> Self {
        Self {
            timings: RwLock::new(HashMap::new()),
            counters: RwLock::new(HashMap::new()),
            start_time: Instant::now(),
        }
    }

    /// Record a timing measurement
    pub fn record_timing(&self, name: impl Into<String>, duration: Duration) {
        let mut timings = self.timings.write();
        timings.entry(name.into()).or_default().push(duration);
    }

    /// Increment a counter
    pub fn increment(&self, name: impl Into<String>) {
        self.add(name, 1);
    }

    /// Add to a counter
    pub fn add(&self, name: impl Into<String>, value: u64) {
        let mut counters = self.counters.write();
        *counters.entry(name.into()).or_default() += value;
    }

    /// Get statistics for a timing metric
    pub fn get_timing_stats(&self, name: &str) -> Option<TimingStats> {
        let timings = self.timings.read();
        timings.get(name).map(|durations| TimingStats::from_durations(durations))
    }

    /// Get counter value
    pub fn get_counter(&self, name: &str) -> u64 {
        self.counters.read().get(name).copied().unwrap_or(0)
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn reset(&self) {
        self.timings.write().clear();
        self.counters.write().clear();
    }

    pub fn summary(&self) -> MetricsSummary {
        let timings = self.timings.read();
        let counters = self.counters.read();

        MetricsSummary {
            uptime: self.uptime(),
            timings: timings
                .iter()
                .map(|(name, durations)| (name.clone(), TimingStats::from_durations(durations)))
                .collect(),
            counters: counters.clone(),
        }
    }
}

impl Default for GcMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics for timing measurements
#[derive(Debug, Clone)]
pub struct TimingStats {
    pub count: usize,
    pub total: Duration,
    pub mean: Duration,
    pub min: Duration,
    pub max: Duration,
    pub p50: Duration,
    pub p95: Duration,
    pub p99: Duration,
}

impl TimingStats {
    fn from_durations(durations: &[Duration]) -> Self {
        if durations.is_empty() {
            return Self {
                count: 0,
                total: Duration::ZERO,
                mean: Duration::ZERO,
                min: Duration::ZERO,
                max: Duration::ZERO,
                p50: Duration::ZERO,
                p95: Duration::ZERO,
                p99: Duration::ZERO,
            };
        }

        let mut sorted = durations.to_vec();
        sorted.sort();

        let count = sorted.len();
        let total: Duration = sorted.iter().sum();
        let percentile = |p: f64| {
            let idx = ((count as f64 * p) as usize).min(count - 1);
            sorted[idx]
        };

        Self {
            count,
            total,
            mean: total / count as u32,
            min: sorted[0],
            max: sorted[count - 1],
            p50: percentile(0.50),
            p95: percentile(0.95),
            p99: percentile(0.99),
        }
    }
}

/// Summary of all metrics
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub uptime: Duration,
    pub timings: HashMap<String, TimingStats>,
    pub counters: HashMap<String, u64>,
}

impl MetricsSummary {
    /// Format as human-readable report
    pub fn report(&self) -> String {
        let mut lines = vec![
            format!("Uptime: {:.2?}", self.uptime),
            String::new(),
            "=== Timings ===".to_string(),
        ];

        let mut timings: Vec<_> = self.timings.iter().collect();
        timings.sort_by(|a, b| a.0.cmp(b.0));
        for (name, stats) in timings {
            lines.push(format!("{}:", name));
            lines.push(format!("  count: {}", stats.count));
            lines.push(format!("  mean:  {:.2?}", stats.mean));
            lines.push(format!("  p50:   {:.2?}", stats.p50));
            lines.push(format!("  p99:   {:.2?}", stats.p99));
            lines.push(format!("  max:   {:.2?}", stats.max));
        }

        lines.push(String::new());
        lines.push("=== Counters ===".to_string());

        let mut counters: Vec<_> = self.counters.iter().collect();
        counters.sort();
        for (name, value) in counters {
            lines.push(format!("{}: {}", name, value));
        }

        lines.join("\n")
    }
}

/// RAII timer for automatic timing measurement
pub struct Timer<'a> {
    metrics: &'a GcMetrics,
    name: &'static str,
    start: Instant,
}

impl<'a> Timer<'a> {
    pub fn new(metrics: &'a GcMetrics, name: &'static str) -> Self {
        Self {
            metrics,
            name,
            start: Instant::now(),
        }
    }
}

impl<'a> Drop for Timer<'a> {
    fn drop(&mut self) {
        self.metrics.record_timing(self.name, self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_timing() {
        let metrics = GcMetrics::new();

        metrics.record_timing(PROCESS_ITEM, Duration::from_millis(100));
        metrics.record_timing(PROCESS_ITEM, Duration::from_millis(200));
        metrics.record_timing(PROCESS_ITEM, Duration::from_millis(150));

        let stats = metrics.get_timing_stats(PROCESS_ITEM).unwrap();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.min, Duration::from_millis(100));
        assert_eq!(stats.max, Duration::from_millis(200));
        assert_eq!(stats.p50, Duration::from_millis(150));
    }

    #[test]
    fn test_counter() {
        let metrics = GcMetrics::new();

        metrics.increment(DELETES_ISSUED);
        metrics.increment(DELETES_ISSUED);
        metrics.add(OWNER_REFS_REMOVED, 3);

        assert_eq!(metrics.get_counter(DELETES_ISSUED), 2);
        assert_eq!(metrics.get_counter(OWNER_REFS_REMOVED), 3);
        assert_eq!(metrics.get_counter(CYCLES_BROKEN), 0);

        metrics.reset();
        assert_eq!(metrics.get_counter(DELETES_ISSUED), 0);
    }

    #[test]
    fn test_timer() {
        let metrics = GcMetrics::new();

        {
            let _timer = Timer::new(&metrics, PROCESS_ITEM);
            thread::sleep(Duration::from_millis(10));
        }

        let stats = metrics.get_timing_stats(PROCESS_ITEM).unwrap();
        assert_eq!(stats.count, 1);
        assert!(stats.total >= Duration::from_millis(10));
    }

    #[test]
    fn test_summary_report() {
        let metrics = GcMetrics::new();

        metrics.record_timing(PROCESS_ITEM, Duration::from_millis(5));
        metrics.increment(FINALIZERS_REMOVED);

        let report = metrics.summary().report();
        assert!(report.contains(PROCESS_ITEM));
        assert!(report.contains("finalizers_removed: 1"));
    }
}
