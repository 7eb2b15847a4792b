use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

/// Default latency buckets, in seconds.
pub const DEFAULT_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Process-wide time series used by every [`CallSpan`](crate::CallSpan).
///
/// Built once at startup and shared behind an `Arc`; nothing in here is reset between requests.
#[derive(Debug)]
pub struct Metrics {
    /// Outbound calls, by service and method.
    pub client_requests: CounterVec,
    pub client_latency: HistogramVec,
    /// Inbound requests, by method.
    pub server_requests: CounterVec,
    pub server_latency: HistogramVec,
    /// Inbound latency excluding the time spent waiting on outbound calls.
    pub server_exclusive_latency: HistogramVec,
}

impl Metrics {
    pub fn new() -> Self {
        Self::with_buckets(DEFAULT_BUCKETS)
    }

    pub fn with_buckets(buckets: &[f64]) -> Self {
        Self {
            client_requests: CounterVec::new("client_request_total", &["service", "method"]),
            client_latency: HistogramVec::new("client_latency", &["service", "method"], buckets),
            server_requests: CounterVec::new("server_request_total", &["method"]),
            server_latency: HistogramVec::new("server_latency", &["method"], buckets),
            server_exclusive_latency: HistogramVec::new(
                "server_exclusive_latency",
                &["method"],
                buckets,
            ),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

// A tuple of the wrong arity is still recorded, under exactly the values given.
fn label_key(name: &str, label_names: &[String], values: &[&str]) -> Vec<String> {
    if label_names.len() != values.len() {
        tracing::warn!(
            metric = name,
            expected = ?label_names,
            got = ?values,
            "label values do not match label names"
        );
    }
    values.iter().map(|v| (*v).to_owned()).collect()
}

/// A family of counters partitioned by label values.
#[derive(Debug)]
pub struct CounterVec {
    name: String,
    label_names: Vec<String>,
    children: DashMap<Vec<String>, Arc<Counter>>,
}

impl CounterVec {
    pub fn new(name: &str, label_names: &[&str]) -> Self {
        Self {
            name: name.to_owned(),
            label_names: label_names.iter().map(|l| (*l).to_owned()).collect(),
            children: DashMap::new(),
        }
    }

    /// Returns the counter for the given label tuple, creating it on first use.
    pub fn with_label_values(&self, values: &[&str]) -> Arc<Counter> {
        let key = label_key(&self.name, &self.label_names, values);
        self.children.entry(key).or_default().clone()
    }

    /// Current value for a label tuple, zero if it was never touched.
    pub fn get(&self, values: &[&str]) -> u64 {
        let key: Vec<String> = values.iter().map(|v| (*v).to_owned()).collect();
        self.children.get(&key).map(|c| c.get()).unwrap_or(0)
    }
}

#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A family of latency histograms partitioned by label values.
#[derive(Debug)]
pub struct HistogramVec {
    name: String,
    label_names: Vec<String>,
    buckets: Vec<f64>,
    children: DashMap<Vec<String>, Arc<Histogram>>,
}

impl HistogramVec {
    pub fn new(name: &str, label_names: &[&str], buckets: &[f64]) -> Self {
        let mut buckets = buckets.to_vec();
        buckets.sort_by(|a, b| a.total_cmp(b));
        buckets.dedup();
        Self {
            name: name.to_owned(),
            label_names: label_names.iter().map(|l| (*l).to_owned()).collect(),
            buckets,
            children: DashMap::new(),
        }
    }

    pub fn with_label_values(&self, values: &[&str]) -> Arc<Histogram> {
        let key = label_key(&self.name, &self.label_names, values);
        self.children.entry(key).or_insert_with(|| Arc::new(Histogram::new(&self.buckets))).clone()
    }

    /// Number of observations for a label tuple, zero if it was never touched.
    pub fn sample_count(&self, values: &[&str]) -> u64 {
        let key: Vec<String> = values.iter().map(|v| (*v).to_owned()).collect();
        self.children.get(&key).map(|h| h.sample_count()).unwrap_or(0)
    }
}

/// Cumulative-bucket histogram. Observations are seconds.
#[derive(Debug)]
pub struct Histogram {
    upper_bounds: Vec<f64>,
    // One slot per bound plus the implicit +Inf bucket. Counts are per-slot, not cumulative.
    counts: Vec<AtomicU64>,
    count: AtomicU64,
    sum_bits: AtomicU64,
}

impl Histogram {
    fn new(upper_bounds: &[f64]) -> Self {
        Self {
            upper_bounds: upper_bounds.to_vec(),
            counts: (0..=upper_bounds.len()).map(|_| AtomicU64::new(0)).collect(),
            count: AtomicU64::new(0),
            sum_bits: AtomicU64::new(0f64.to_bits()),
        }
    }

    pub fn observe(&self, value: f64) {
        let slot = self.upper_bounds.partition_point(|bound| *bound < value);
        self.counts[slot].fetch_add(1, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        let mut current = self.sum_bits.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(current) + value).to_bits();
            match self.sum_bits.compare_exchange_weak(
                current,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
    }

    pub fn sample_count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn sample_sum(&self) -> f64 {
        f64::from_bits(self.sum_bits.load(Ordering::Relaxed))
    }

    /// Cumulative `(upper_bound, count)` pairs, ending with the `+Inf` bucket.
    pub fn bucket_counts(&self) -> Vec<(f64, u64)> {
        let mut running = 0;
        self.upper_bounds
            .iter()
            .copied()
            .chain(std::iter::once(f64::INFINITY))
            .zip(self.counts.iter())
            .map(|(bound, count)| {
                running += count.load(Ordering::Relaxed);
                (bound, running)
            })
            .collect()
    }
}
