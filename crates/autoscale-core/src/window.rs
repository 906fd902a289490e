use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::model::{Aggregation, MetricKind, MetricSample, MetricSpec};

/// Samples retained per (metric_name, source_id) pair before the oldest
/// are evicted early, ahead of the next prune.
const MAX_SAMPLES_PER_SOURCE: usize = 4096;

/// Serializable snapshot of a [`MetricWindow`], used for checkpointing.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct MetricWindowSnapshot {
    samples: HashMap<String, HashMap<String, Vec<MetricSample>>>,
    last_updated_at: HashMap<String, f64>,
}

/// Multi-source, time-bounded telemetry buffer for one service. Samples
/// are mutated by ingestion and read by the control tick under a single
/// mutex; `aggregate`/`is_stale` observe a consistent snapshot.
#[derive(Debug)]
pub struct MetricWindow {
    window_seconds: f64,
    source_ttl_seconds: f64,
    inner: Mutex<MetricWindowSnapshot>,
}

impl MetricWindow {
    pub fn new(window_seconds: f64, source_ttl_seconds: f64) -> Self {
        Self {
            window_seconds,
            source_ttl_seconds: source_ttl_seconds.max(window_seconds),
            inner: Mutex::new(MetricWindowSnapshot::default()),
        }
    }

    /// Convenience constructor deriving window/TTL from a `MetricSpec`.
    pub fn from_spec(spec: &MetricSpec) -> Self {
        Self::new(spec.window_seconds, spec.window_seconds.max(spec.stale_after_seconds))
    }

    pub fn ingest(&self, samples: &[MetricSample]) {
        if samples.is_empty() {
            return;
        }
        let mut inner = self.inner.lock().unwrap();
        for s in samples {
            let buf = inner
                .samples
                .entry(s.name.clone())
                .or_default()
                .entry(s.source_id.clone())
                .or_default();
            buf.push(s.clone());
            if buf.len() > MAX_SAMPLES_PER_SOURCE {
                buf.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
                let excess = buf.len() - MAX_SAMPLES_PER_SOURCE;
                buf.drain(0..excess);
            }

            let entry = inner.last_updated_at.entry(s.source_id.clone()).or_insert(s.timestamp);
            if s.timestamp > *entry {
                *entry = s.timestamp;
            }
        }
    }

    pub fn prune(&self, now: f64) {
        let mut inner = self.inner.lock().unwrap();
        let cutoff = now - self.window_seconds;
        for per_source in inner.samples.values_mut() {
            per_source.retain(|_, buf| {
                buf.retain(|s| s.timestamp >= cutoff);
                !buf.is_empty()
            });
        }

        let ttl_cutoff = now - self.source_ttl_seconds;
        let stale_sources: Vec<String> = inner
            .last_updated_at
            .iter()
            .filter(|(_, &ts)| ts < ttl_cutoff)
            .map(|(source_id, _)| source_id.clone())
            .collect();
        for source_id in &stale_sources {
            inner.last_updated_at.remove(source_id);
            for per_source in inner.samples.values_mut() {
                per_source.remove(source_id);
            }
        }
    }

    /// Per-source reduction followed by cross-source combination. Returns
    /// `None` when no in-window samples exist for any source.
    pub fn aggregate(&self, spec: &MetricSpec, now: f64) -> Option<f64> {
        let inner = self.inner.lock().unwrap();
        let per_source = inner.samples.get(&spec.name)?;
        let cutoff = now - spec.window_seconds;

        // (source_id, reduced value, newest in-window timestamp)
        let mut values: Vec<(&str, f64, f64)> = Vec::new();
        for (source_id, buf) in per_source {
            let mut in_window: Vec<&MetricSample> =
                buf.iter().filter(|s| s.timestamp >= cutoff).collect();
            if in_window.is_empty() {
                continue;
            }
            in_window.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

            match spec.kind {
                MetricKind::Gauge => {
                    let newest = in_window.last().unwrap();
                    values.push((source_id, newest.value, newest.timestamp));
                }
                MetricKind::Rate => {
                    if in_window.len() < 2 {
                        continue;
                    }
                    let oldest = in_window.first().unwrap();
                    let newest = in_window.last().unwrap();
                    let dt = newest.timestamp - oldest.timestamp;
                    if dt <= 0.0 {
                        continue;
                    }
                    let rate = ((newest.value - oldest.value) / dt).max(0.0);
                    values.push((source_id, rate, newest.timestamp));
                }
            }
        }

        if values.is_empty() {
            return None;
        }

        Some(match spec.aggregation {
            Aggregation::Sum => values.iter().map(|(_, v, _)| *v).sum(),
            Aggregation::Avg => values.iter().map(|(_, v, _)| *v).sum::<f64>() / values.len() as f64,
            Aggregation::Max => values.iter().map(|(_, v, _)| *v).fold(f64::NEG_INFINITY, f64::max),
            Aggregation::Min => values.iter().map(|(_, v, _)| *v).fold(f64::INFINITY, f64::min),
            Aggregation::Latest => {
                // Ties broken by lexicographic source_id for determinism (open question in spec §9).
                values
                    .iter()
                    .max_by(|a, b| a.2.total_cmp(&b.2).then_with(|| b.0.cmp(a.0)))
                    .unwrap()
                    .1
            }
        })
    }

    /// True iff the newest sample across all sources for this metric is
    /// older than `stale_after_seconds`, or no samples exist at all.
    pub fn is_stale(&self, spec: &MetricSpec, now: f64) -> bool {
        let inner = self.inner.lock().unwrap();
        let Some(per_source) = inner.samples.get(&spec.name) else {
            return true;
        };
        let newest = per_source
            .values()
            .flat_map(|buf| buf.iter().map(|s| s.timestamp))
            .fold(None::<f64>, |acc, ts| Some(acc.map_or(ts, |a| a.max(ts))));

        match newest {
            None => true,
            Some(ts) => ts < now - spec.stale_after_seconds,
        }
    }

    pub fn dump(&self) -> MetricWindowSnapshot {
        self.inner.lock().unwrap().clone()
    }

    pub fn load(window_seconds: f64, source_ttl_seconds: f64, snapshot: MetricWindowSnapshot) -> Self {
        Self {
            window_seconds,
            source_ttl_seconds: source_ttl_seconds.max(window_seconds),
            inner: Mutex::new(snapshot),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(name: &str, value: f64, ts: f64, source: &str) -> MetricSample {
        MetricSample { name: name.into(), value, timestamp: ts, source_id: source.into() }
    }

    fn spec(kind: MetricKind, aggregation: Aggregation, target: f64, window: f64, stale: f64) -> MetricSpec {
        MetricSpec {
            name: "m".into(),
            target_per_replica: target,
            kind,
            aggregation,
            window_seconds: window,
            stale_after_seconds: stale,
        }
    }

    #[test]
    fn gauge_sum_across_two_sources() {
        let w = MetricWindow::new(60.0, 60.0);
        let now = 1_000.0;
        w.ingest(&[sample("m", 25.0, now - 5.0, "a"), sample("m", 18.0, now - 2.0, "b")]);
        let s = spec(MetricKind::Gauge, Aggregation::Sum, 10.0, 60.0, 60.0);
        assert_eq!(w.aggregate(&s, now), Some(43.0));
    }

    #[test]
    fn gauge_avg_across_two_sources() {
        let w = MetricWindow::new(60.0, 60.0);
        let now = 1_000.0;
        w.ingest(&[sample("m", 25.0, now - 5.0, "a"), sample("m", 15.0, now - 2.0, "b")]);
        let s = spec(MetricKind::Gauge, Aggregation::Avg, 10.0, 60.0, 60.0);
        assert_eq!(w.aggregate(&s, now), Some(20.0));
    }

    #[test]
    fn rate_single_source() {
        let w = MetricWindow::new(20.0, 20.0);
        let now = 1_000.0;
        w.ingest(&[sample("m", 100.0, now - 10.0, "default"), sample("m", 125.0, now - 5.0, "default")]);
        let s = spec(MetricKind::Rate, Aggregation::Sum, 2.0, 20.0, 60.0);
        assert_eq!(w.aggregate(&s, now), Some(5.0));
    }

    #[test]
    fn rate_single_sample_contributes_nothing() {
        let w = MetricWindow::new(20.0, 20.0);
        let now = 1_000.0;
        w.ingest(&[sample("m", 100.0, now - 5.0, "default")]);
        let s = spec(MetricKind::Rate, Aggregation::Sum, 2.0, 20.0, 60.0);
        assert_eq!(w.aggregate(&s, now), None);
    }

    #[test]
    fn rate_counter_reset_clamps_to_zero() {
        let w = MetricWindow::new(20.0, 20.0);
        let now = 1_000.0;
        w.ingest(&[sample("m", 100.0, now - 10.0, "default"), sample("m", 10.0, now - 5.0, "default")]);
        let s = spec(MetricKind::Rate, Aggregation::Sum, 2.0, 20.0, 60.0);
        assert_eq!(w.aggregate(&s, now), Some(0.0));
    }

    #[test]
    fn no_samples_in_window_returns_none() {
        let w = MetricWindow::new(10.0, 10.0);
        let s = spec(MetricKind::Gauge, Aggregation::Sum, 1.0, 10.0, 10.0);
        assert_eq!(w.aggregate(&s, 1_000.0), None);
    }

    #[test]
    fn out_of_order_ingestion_still_sorts_for_rate() {
        let w = MetricWindow::new(20.0, 20.0);
        let now = 1_000.0;
        // Newest arrives first.
        w.ingest(&[sample("m", 125.0, now - 5.0, "default"), sample("m", 100.0, now - 10.0, "default")]);
        let s = spec(MetricKind::Rate, Aggregation::Sum, 2.0, 20.0, 60.0);
        assert_eq!(w.aggregate(&s, now), Some(5.0));
    }

    #[test]
    fn prune_drops_samples_outside_window() {
        let w = MetricWindow::new(10.0, 10.0);
        let now = 1_000.0;
        w.ingest(&[sample("m", 1.0, now - 20.0, "default")]);
        w.prune(now);
        let s = spec(MetricKind::Gauge, Aggregation::Sum, 1.0, 10.0, 60.0);
        assert_eq!(w.aggregate(&s, now), None);
    }

    #[test]
    fn prune_drops_sources_past_ttl() {
        let w = MetricWindow::new(60.0, 30.0);
        let now = 1_000.0;
        w.ingest(&[sample("m", 30.0, now, "a"), sample("m", 5.0, now - 31.0, "b")]);
        w.prune(now);
        let s = spec(MetricKind::Gauge, Aggregation::Sum, 10.0, 60.0, 60.0);
        assert_eq!(w.aggregate(&s, now), Some(30.0));
    }

    #[test]
    fn is_stale_true_when_empty() {
        let w = MetricWindow::new(10.0, 10.0);
        let s = spec(MetricKind::Gauge, Aggregation::Sum, 1.0, 10.0, 10.0);
        assert!(w.is_stale(&s, 1_000.0));
    }

    #[test]
    fn is_stale_true_past_threshold() {
        let w = MetricWindow::new(60.0, 60.0);
        let now = 1_000.0;
        w.ingest(&[sample("m", 1.0, now - 20.0, "default")]);
        let s = spec(MetricKind::Gauge, Aggregation::Sum, 1.0, 60.0, 10.0);
        assert!(w.is_stale(&s, now));
    }

    #[test]
    fn latest_ties_break_by_source_id() {
        let w = MetricWindow::new(60.0, 60.0);
        let now = 1_000.0;
        w.ingest(&[sample("m", 9.0, now, "zzz"), sample("m", 3.0, now, "aaa")]);
        let s = spec(MetricKind::Gauge, Aggregation::Latest, 1.0, 60.0, 60.0);
        assert_eq!(w.aggregate(&s, now), Some(3.0));
    }
}
