//! In-process metrics for the provenance registry
//!
//! Counters, gauges and latency histograms keyed by dotted names, exported as
//! JSON or Prometheus text at `/metrics`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::RwLock;

/// Prefix applied to every exported Prometheus name
const PROMETHEUS_PREFIX: &str = "provenance";

/// Metrics registry shared through `AppState`
pub struct MetricsRegistry {
    counters: RwLock<BTreeMap<String, Arc<AtomicU64>>>,
    gauges: RwLock<BTreeMap<String, Arc<AtomicU64>>>,
    histograms: RwLock<BTreeMap<String, Arc<Histogram>>>,
    start_time: Instant,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            counters: RwLock::new(BTreeMap::new()),
            gauges: RwLock::new(BTreeMap::new()),
            histograms: RwLock::new(BTreeMap::new()),
            start_time: Instant::now(),
        }
    }

    /// Increment a counter
    pub async fn inc_counter(&self, name: &str) {
        self.add_counter(name, 1).await;
    }

    /// Add to a counter, creating it on first use
    pub async fn add_counter(&self, name: &str, value: u64) {
        if let Some(counter) = self.counters.read().await.get(name) {
            counter.fetch_add(value, Ordering::Relaxed);
            return;
        }

        self.counters
            .write()
            .await
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(AtomicU64::new(0)))
            .fetch_add(value, Ordering::Relaxed);
    }

    pub async fn set_gauge(&self, name: &str, value: u64) {
        if let Some(gauge) = self.gauges.read().await.get(name) {
            gauge.store(value, Ordering::Relaxed);
            return;
        }

        self.gauges
            .write()
            .await
            .insert(name.to_string(), Arc::new(AtomicU64::new(value)));
    }

    pub async fn get_counter(&self, name: &str) -> u64 {
        self.counters
            .read()
            .await
            .get(name)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub async fn get_gauge(&self, name: &str) -> u64 {
        self.gauges
            .read()
            .await
            .get(name)
            .map(|g| g.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Record a histogram observation in seconds
    pub async fn observe_histogram(&self, name: &str, value: f64) {
        if let Some(histogram) = self.histograms.read().await.get(name) {
            histogram.observe(value);
            return;
        }

        self.histograms
            .write()
            .await
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Histogram::default()))
            .observe(value);
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// All metrics as JSON
    pub async fn to_json(&self) -> serde_json::Value {
        let counters: BTreeMap<String, u64> = self
            .counters
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.load(Ordering::Relaxed)))
            .collect();

        let gauges: BTreeMap<String, u64> = self
            .gauges
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.load(Ordering::Relaxed)))
            .collect();

        let histograms: BTreeMap<String, serde_json::Value> = self
            .histograms
            .read()
            .await
            .iter()
            .map(|(k, h)| (k.clone(), h.to_json()))
            .collect();

        serde_json::json!({
            "uptime_seconds": self.uptime_seconds(),
            "counters": counters,
            "gauges": gauges,
            "histograms": histograms,
        })
    }

    /// Prometheus text exposition
    pub async fn to_prometheus(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!(
            "# HELP {PROMETHEUS_PREFIX}_uptime_seconds Time since service start\n"
        ));
        output.push_str(&format!("# TYPE {PROMETHEUS_PREFIX}_uptime_seconds gauge\n"));
        output.push_str(&format!(
            "{PROMETHEUS_PREFIX}_uptime_seconds {}\n\n",
            self.uptime_seconds()
        ));

        for (name, counter) in self.counters.read().await.iter() {
            let name = prometheus_name(name);
            output.push_str(&format!("# TYPE {name} counter\n"));
            output.push_str(&format!("{name} {}\n", counter.load(Ordering::Relaxed)));
        }

        for (name, gauge) in self.gauges.read().await.iter() {
            let name = prometheus_name(name);
            output.push_str(&format!("# TYPE {name} gauge\n"));
            output.push_str(&format!("{name} {}\n", gauge.load(Ordering::Relaxed)));
        }

        for (name, histogram) in self.histograms.read().await.iter() {
            output.push_str(&histogram.to_prometheus(&prometheus_name(name)));
        }

        output
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn prometheus_name(name: &str) -> String {
    let name = name.replace(['.', '-'], "_");
    if name.starts_with(PROMETHEUS_PREFIX) {
        name
    } else {
        format!("{PROMETHEUS_PREFIX}_{name}")
    }
}

/// Fixed-bucket histogram; sum kept in microseconds
pub struct Histogram {
    buckets: Vec<f64>,
    counts: Vec<AtomicU64>,
    sum_micros: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    pub fn new(buckets: Vec<f64>) -> Self {
        let counts = buckets.iter().map(|_| AtomicU64::new(0)).collect();
        Self {
            buckets,
            counts,
            sum_micros: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    pub fn observe(&self, value: f64) {
        self.sum_micros
            .fetch_add((value * 1_000_000.0) as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        if let Some(i) = self.buckets.iter().position(|b| value <= *b) {
            self.counts[i].fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    fn sum_seconds(&self) -> f64 {
        self.sum_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0
    }

    pub fn to_json(&self) -> serde_json::Value {
        let counts: Vec<u64> = self
            .counts
            .iter()
            .map(|c| c.load(Ordering::Relaxed))
            .collect();

        serde_json::json!({
            "buckets": self.buckets,
            "counts": counts,
            "sum": self.sum_seconds(),
            "count": self.count(),
        })
    }

    pub fn to_prometheus(&self, name: &str) -> String {
        let mut output = format!("# TYPE {name} histogram\n");

        let mut cumulative = 0u64;
        for (bucket, count) in self.buckets.iter().zip(&self.counts) {
            cumulative += count.load(Ordering::Relaxed);
            output.push_str(&format!("{name}_bucket{{le=\"{bucket}\"}} {cumulative}\n"));
        }

        output.push_str(&format!("{name}_bucket{{le=\"+Inf\"}} {}\n", self.count()));
        output.push_str(&format!("{name}_sum {}\n", self.sum_seconds()));
        output.push_str(&format!("{name}_count {}\n", self.count()));
        output
    }
}

impl Default for Histogram {
    fn default() -> Self {
        // Ledger calls run from tens of milliseconds to tens of seconds
        Self::new(vec![
            0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
        ])
    }
}

/// Metric names
pub mod metric_names {
    pub const OWNERSHIP_CHECKS: &str = "ownership_checks_total";
    pub const REGISTRATIONS: &str = "registrations_total";
    pub const CONFLICTS: &str = "conflicts_total";
    pub const UNVERIFIABLE: &str = "unverifiable_total";
    pub const UNMIRRORED: &str = "unmirrored_total";
    pub const DEGRADED_READS: &str = "degraded_reads_total";
    pub const RECONCILED: &str = "reconciled_total";

    pub const LEDGER_LATENCY: &str = "ledger.latency_seconds";

    pub const RECONCILIATION_QUEUE_DEPTH: &str = "reconciliation.queue_depth";
}

/// Time an async operation into a histogram
pub async fn timed<F, T>(metrics: &MetricsRegistry, metric_name: &str, f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    let start = Instant::now();
    let result = f.await;
    metrics
        .observe_histogram(metric_name, start.elapsed().as_secs_f64())
        .await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_counter() {
        let registry = MetricsRegistry::new();

        registry.inc_counter(metric_names::CONFLICTS).await;
        registry.inc_counter(metric_names::CONFLICTS).await;
        registry.add_counter(metric_names::CONFLICTS, 3).await;

        assert_eq!(registry.get_counter(metric_names::CONFLICTS).await, 5);
        assert_eq!(registry.get_counter("never.touched").await, 0);
    }

    #[tokio::test]
    async fn test_gauge() {
        let registry = MetricsRegistry::new();

        registry.set_gauge("queue", 4).await;
        registry.set_gauge("queue", 1).await;
        assert_eq!(registry.get_gauge("queue").await, 1);
    }

    #[tokio::test]
    async fn test_timed_records_histogram() {
        let registry = MetricsRegistry::new();
        let value = timed(&registry, metric_names::LEDGER_LATENCY, async { 7 }).await;
        assert_eq!(value, 7);

        let json = registry.to_json().await;
        let latency = &json["histograms"][metric_names::LEDGER_LATENCY];
        assert_eq!(latency["count"].as_u64(), Some(1));
    }

    #[tokio::test]
    async fn test_prometheus_format() {
        let registry = MetricsRegistry::new();

        registry.inc_counter(metric_names::REGISTRATIONS).await;
        registry.set_gauge(metric_names::RECONCILIATION_QUEUE_DEPTH, 2).await;
        registry
            .observe_histogram(metric_names::LEDGER_LATENCY, 0.3)
            .await;

        let text = registry.to_prometheus().await;
        assert!(text.contains("provenance_registrations_total 1"));
        assert!(text.contains("provenance_reconciliation_queue_depth 2"));
        assert!(text.contains("provenance_ledger_latency_seconds_bucket{le=\"0.5\"} 1"));
        assert!(text.contains("provenance_ledger_latency_seconds_count 1"));
    }
}
