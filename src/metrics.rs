//! Timing metrics for the detection pipeline: ring-buffered histograms
//! with p50/p95/p99 summaries. Records inference time, sampler gate
//! verdicts, queue wait, and consequence dispatch latency.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

/// Well-known metric names.
pub mod metric_names {
    pub const VISION_INFER: &str = "t_vision_infer";
    pub const VISION_QUEUE_WAIT: &str = "queue_wait_vision";
    pub const AUDIO_QUEUE_WAIT: &str = "queue_wait_audio";
    pub const CONSEQUENCE_DISPATCH: &str = "t_consequence_dispatch";
    pub const FRAMES_ACCEPTED: &str = "frames_accepted";
    pub const FRAMES_GATED: &str = "frames_gated";
}

/// Fixed-capacity ring of samples for one metric.
struct SampleRing {
    samples: Vec<f64>,
    pos: usize,
    count: usize,
    capacity: usize,
}

impl SampleRing {
    fn new(capacity: usize) -> Self {
        Self {
            samples: vec![0.0; capacity],
            pos: 0,
            count: 0,
            capacity,
        }
    }

    fn push(&mut self, value: f64) {
        self.samples[self.pos] = value;
        self.pos = (self.pos + 1) % self.capacity;
        if self.count < self.capacity {
            self.count += 1;
        }
    }

    fn percentile(&self, p: f64) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let mut sorted: Vec<f64> = self.samples[..self.count].to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let idx = ((p / 100.0) * (self.count as f64 - 1.0)).round() as usize;
        sorted[idx.min(self.count - 1)]
    }
}

/// Histogram registry shared by the session workers.
pub struct MetricsRegistry {
    histograms: Mutex<HashMap<&'static str, SampleRing>>,
    ring_capacity: usize,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            histograms: Mutex::new(HashMap::new()),
            ring_capacity: 1024,
        }
    }

    /// Record one sample (microseconds for timings, 1.0 for counters).
    pub fn record(&self, name: &'static str, value: f64) {
        let mut hists = self.histograms.lock();
        hists
            .entry(name)
            .or_insert_with(|| SampleRing::new(self.ring_capacity))
            .push(value);
    }

    /// Start a span that records elapsed microseconds on finish.
    pub fn span(self: &Arc<Self>, name: &'static str) -> TimingSpan {
        TimingSpan {
            name,
            start: Instant::now(),
            registry: Arc::clone(self),
        }
    }

    pub fn sample_count(&self, name: &str) -> usize {
        self.histograms
            .lock()
            .get(name)
            .map(|r| r.count)
            .unwrap_or(0)
    }

    pub fn percentile(&self, name: &str, p: f64) -> f64 {
        self.histograms
            .lock()
            .get(name)
            .map(|r| r.percentile(p))
            .unwrap_or(0.0)
    }

    /// Snapshot of every metric at p50/p95/p99.
    pub fn summary(&self) -> HashMap<String, MetricSummary> {
        let hists = self.histograms.lock();
        hists
            .iter()
            .map(|(&name, ring)| {
                (
                    name.to_string(),
                    MetricSummary {
                        p50_us: ring.percentile(50.0),
                        p95_us: ring.percentile(95.0),
                        p99_us: ring.percentile(99.0),
                        count: ring.count,
                    },
                )
            })
            .collect()
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A span measuring elapsed time from creation to explicit finish.
pub struct TimingSpan {
    name: &'static str,
    start: Instant,
    registry: Arc<MetricsRegistry>,
}

impl TimingSpan {
    /// End the span, recording elapsed microseconds.
    pub fn finish(self) -> f64 {
        let elapsed_us = self.start.elapsed().as_micros() as f64;
        self.registry.record(self.name, elapsed_us);
        elapsed_us
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricSummary {
    pub p50_us: f64,
    pub p95_us: f64,
    pub p99_us: f64,
    pub count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentiles_over_known_samples() {
        let reg = MetricsRegistry::new();
        for v in 1..=100 {
            reg.record("t", v as f64);
        }
        assert_eq!(reg.percentile("t", 50.0), 51.0);
        assert_eq!(reg.percentile("t", 99.0), 99.0);
        assert_eq!(reg.sample_count("t"), 100);
    }

    #[test]
    fn unknown_metric_reads_as_zero() {
        let reg = MetricsRegistry::new();
        assert_eq!(reg.percentile("missing", 95.0), 0.0);
        assert_eq!(reg.sample_count("missing"), 0);
    }

    #[test]
    fn span_records_on_finish() {
        let reg = Arc::new(MetricsRegistry::new());
        let span = reg.span(metric_names::VISION_INFER);
        span.finish();
        assert_eq!(reg.sample_count(metric_names::VISION_INFER), 1);
    }

    #[test]
    fn ring_keeps_only_the_newest_capacity_samples() {
        let reg = MetricsRegistry::new();
        for v in 0..2048 {
            reg.record("t", v as f64);
        }
        assert_eq!(reg.sample_count("t"), 1024);
        // Oldest half evicted: minimum surviving sample is 1024.
        assert!(reg.percentile("t", 0.0) >= 1024.0);
    }
}
