//! `MetricsRegistry` — counters, histograms, and gauges exposed over a
//! scrape endpoint (spec §2 "Logger / Metrics / ErrorHandler").
//!
//! This is "the spec's only legitimate global" (§9): one instance is built
//! at bootstrap and handed to every module through `ModuleCtx`, rather than
//! reached for via a `static`.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;

#[derive(Default)]
pub struct MetricsRegistry {
    counters: DashMap<&'static str, AtomicU64>,
    gauges: DashMap<&'static str, AtomicI64>,
    histograms: DashMap<&'static str, Mutex<Histogram>>,
}

#[derive(Default)]
struct Histogram {
    count: u64,
    sum: f64,
    buckets: Vec<(f64, u64)>,
}

impl Histogram {
    fn new() -> Self {
        // Matches the latency ranges the server's own timeout policy cares
        // about (spec §5 "Timeouts", default 30s).
        Self {
            count: 0,
            sum: 0.0,
            buckets: vec![
                (0.01, 0),
                (0.05, 0),
                (0.1, 0),
                (0.5, 0),
                (1.0, 0),
                (5.0, 0),
                (30.0, 0),
            ],
        }
    }

    fn observe(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        for (bound, count) in &mut self.buckets {
            if value <= *bound {
                *count += 1;
            }
        }
    }
}

impl MetricsRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr_counter(&self, name: &'static str) {
        self.add_counter(name, 1);
    }

    pub fn add_counter(&self, name: &'static str, delta: u64) {
        self.counters
            .entry(name)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(delta, Ordering::Relaxed);
    }

    #[must_use]
    pub fn counter(&self, name: &'static str) -> u64 {
        self.counters.get(name).map_or(0, |c| c.load(Ordering::Relaxed))
    }

    pub fn set_gauge(&self, name: &'static str, value: i64) {
        self.gauges
            .entry(name)
            .or_insert_with(|| AtomicI64::new(0))
            .store(value, Ordering::Relaxed);
    }

    pub fn incr_gauge(&self, name: &'static str) {
        self.gauges
            .entry(name)
            .or_insert_with(|| AtomicI64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn decr_gauge(&self, name: &'static str) {
        self.gauges
            .entry(name)
            .or_insert_with(|| AtomicI64::new(0))
            .fetch_sub(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn gauge(&self, name: &'static str) -> i64 {
        self.gauges.get(name).map_or(0, |g| g.load(Ordering::Relaxed))
    }

    pub fn observe_histogram(&self, name: &'static str, value_seconds: f64) {
        self.histograms
            .entry(name)
            .or_insert_with(|| Mutex::new(Histogram::new()))
            .lock()
            .observe(value_seconds);
    }

    /// Render every registered metric in the Prometheus text exposition
    /// format, for `GET /metrics` (spec §6.1).
    #[must_use]
    pub fn render_prometheus(&self) -> String {
        let mut out = String::new();
        for entry in &self.counters {
            out.push_str(&format!("# TYPE {} counter\n{} {}\n", entry.key(), entry.key(), entry.value().load(Ordering::Relaxed)));
        }
        for entry in &self.gauges {
            out.push_str(&format!("# TYPE {} gauge\n{} {}\n", entry.key(), entry.key(), entry.value().load(Ordering::Relaxed)));
        }
        for entry in &self.histograms {
            let h = entry.value().lock();
            out.push_str(&format!("# TYPE {}_sum untyped\n{}_sum {}\n", entry.key(), entry.key(), h.sum));
            out.push_str(&format!("# TYPE {}_count untyped\n{}_count {}\n", entry.key(), entry.key(), h.count));
            for (bound, count) in &h.buckets {
                out.push_str(&format!("{}_bucket{{le=\"{bound}\"}} {count}\n", entry.key()));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_accumulates() {
        let m = MetricsRegistry::new();
        m.incr_counter("requests_total");
        m.add_counter("requests_total", 4);
        assert_eq!(m.counter("requests_total"), 5);
    }

    #[test]
    fn gauge_tracks_active_count() {
        let m = MetricsRegistry::new();
        m.incr_gauge("active_executions");
        m.incr_gauge("active_executions");
        m.decr_gauge("active_executions");
        assert_eq!(m.gauge("active_executions"), 1);
    }

    #[test]
    fn histogram_renders_buckets() {
        let m = MetricsRegistry::new();
        m.observe_histogram("request_duration_seconds", 0.2);
        let rendered = m.render_prometheus();
        assert!(rendered.contains("request_duration_seconds_count 1"));
    }
}
