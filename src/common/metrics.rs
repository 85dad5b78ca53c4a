//! Coordinator metrics
//!
//! Prometheus-compatible counters, gauges and a latency histogram for the
//! upload, download, delete and health-check workflows.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Histogram bucket boundaries for chunk transfer latency (in milliseconds)
const LATENCY_BUCKETS: [f64; 11] = [
    1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0,
];

/// A simple histogram implementation for latency tracking
#[derive(Debug)]
pub struct Histogram {
    buckets: Vec<AtomicU64>,
    boundaries: Vec<f64>,
    sum: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    /// Create a new histogram with default latency buckets
    pub fn new() -> Self {
        Self::with_buckets(&LATENCY_BUCKETS)
    }

    /// Create a histogram with custom bucket boundaries
    pub fn with_buckets(boundaries: &[f64]) -> Self {
        let buckets = (0..=boundaries.len()).map(|_| AtomicU64::new(0)).collect();
        Self {
            buckets,
            boundaries: boundaries.to_vec(),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Record a value in the histogram
    pub fn observe(&self, value: f64) {
        let bucket_idx = self
            .boundaries
            .iter()
            .position(|&boundary| value <= boundary)
            .unwrap_or(self.boundaries.len());

        self.buckets[bucket_idx].fetch_add(1, Ordering::Relaxed);
        // Sum kept in thousandths for precision
        self.sum
            .fetch_add((value * 1000.0) as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn observe_duration(&self, duration: Duration) {
        self.observe(duration.as_secs_f64() * 1000.0);
    }

    /// Cumulative bucket counts, ending with +Inf
    pub fn get_buckets(&self) -> Vec<(f64, u64)> {
        let mut cumulative = 0u64;
        let mut result = Vec::with_capacity(self.boundaries.len() + 1);

        for (i, &boundary) in self.boundaries.iter().enumerate() {
            cumulative += self.buckets[i].load(Ordering::Relaxed);
            result.push((boundary, cumulative));
        }

        cumulative += self.buckets[self.boundaries.len()].load(Ordering::Relaxed);
        result.push((f64::INFINITY, cumulative));

        result
    }

    pub fn sum(&self) -> f64 {
        self.sum.load(Ordering::Relaxed) as f64 / 1000.0
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

/// Monotonic counter
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Gauge for tracking current values
#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicU64,
}

impl Gauge {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    pub fn set(&self, v: u64) {
        self.value.store(v, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Metrics owned by one coordinator
#[derive(Debug)]
pub struct CoordinatorMetrics {
    pub uploads_ok: Counter,
    pub uploads_failed: Counter,
    pub downloads_ok: Counter,
    pub downloads_failed: Counter,
    pub deletes_ok: Counter,
    pub deletes_partial: Counter,
    pub chunks_stored: Counter,
    pub chunks_fetched: Counter,
    pub chunks_deleted: Counter,
    pub chunk_failures: Counter,
    pub bytes_uploaded: Counter,
    pub bytes_downloaded: Counter,
    pub health_checks: Counter,
    pub unreachable_nodes: Gauge,
    pub chunk_latency: Histogram,
    start_time: Instant,
}

impl CoordinatorMetrics {
    pub fn new() -> Self {
        Self {
            uploads_ok: Counter::new(),
            uploads_failed: Counter::new(),
            downloads_ok: Counter::new(),
            downloads_failed: Counter::new(),
            deletes_ok: Counter::new(),
            deletes_partial: Counter::new(),
            chunks_stored: Counter::new(),
            chunks_fetched: Counter::new(),
            chunks_deleted: Counter::new(),
            chunk_failures: Counter::new(),
            bytes_uploaded: Counter::new(),
            bytes_downloaded: Counter::new(),
            health_checks: Counter::new(),
            unreachable_nodes: Gauge::new(),
            chunk_latency: Histogram::new(),
            start_time: Instant::now(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Generate Prometheus-compatible metrics output
    pub fn to_prometheus(&self) -> String {
        let mut out = String::new();

        let counters: [(&str, &str, &Counter); 13] = [
            ("chunkvault_uploads_total", "Successful uploads", &self.uploads_ok),
            ("chunkvault_upload_failures_total", "Failed uploads", &self.uploads_failed),
            ("chunkvault_downloads_total", "Successful downloads", &self.downloads_ok),
            ("chunkvault_download_failures_total", "Failed downloads", &self.downloads_failed),
            ("chunkvault_deletes_total", "Fully successful deletes", &self.deletes_ok),
            ("chunkvault_deletes_partial_total", "Deletes with failed chunk deletes", &self.deletes_partial),
            ("chunkvault_chunks_stored_total", "Chunks stored on nodes", &self.chunks_stored),
            ("chunkvault_chunks_fetched_total", "Chunks fetched from nodes", &self.chunks_fetched),
            ("chunkvault_chunks_deleted_total", "Chunks deleted from nodes", &self.chunks_deleted),
            ("chunkvault_chunk_failures_total", "Failed chunk operations", &self.chunk_failures),
            ("chunkvault_bytes_uploaded_total", "Bytes accepted by uploads", &self.bytes_uploaded),
            ("chunkvault_bytes_downloaded_total", "Bytes returned by downloads", &self.bytes_downloaded),
            ("chunkvault_health_checks_total", "Health check rounds", &self.health_checks),
        ];

        for (name, help, counter) in counters {
            let _ = writeln!(out, "# HELP {} {}", name, help);
            let _ = writeln!(out, "# TYPE {} counter", name);
            let _ = writeln!(out, "{} {}", name, counter.get());
        }

        out.push_str("# HELP chunkvault_unreachable_nodes Nodes unreachable at last health check\n");
        out.push_str("# TYPE chunkvault_unreachable_nodes gauge\n");
        let _ = writeln!(
            out,
            "chunkvault_unreachable_nodes {}",
            self.unreachable_nodes.get()
        );

        out.push_str("# HELP chunkvault_uptime_seconds Coordinator uptime in seconds\n");
        out.push_str("# TYPE chunkvault_uptime_seconds gauge\n");
        let _ = writeln!(out, "chunkvault_uptime_seconds {}", self.uptime_seconds());

        out.push_str("# HELP chunkvault_chunk_duration_ms Chunk transfer duration in milliseconds\n");
        out.push_str("# TYPE chunkvault_chunk_duration_ms histogram\n");
        for (le, count) in self.chunk_latency.get_buckets() {
            if le.is_infinite() {
                let _ = writeln!(out, "chunkvault_chunk_duration_ms_bucket{{le=\"+Inf\"}} {}", count);
            } else {
                let _ = writeln!(
                    out,
                    "chunkvault_chunk_duration_ms_bucket{{le=\"{}\"}} {}",
                    le, count
                );
            }
        }
        let _ = writeln!(
            out,
            "chunkvault_chunk_duration_ms_sum {}",
            self.chunk_latency.sum()
        );
        let _ = writeln!(
            out,
            "chunkvault_chunk_duration_ms_count {}",
            self.chunk_latency.count()
        );

        out
    }
}

impl Default for CoordinatorMetrics {
    fn default() -> Self {
        Self::new()
    }
}
