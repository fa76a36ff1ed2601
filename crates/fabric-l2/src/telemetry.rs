use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One eviction event, kept in a bounded ring for telemetry.
#[derive(Debug, Clone, Serialize)]
pub struct EvictionRecord {
    pub oid: String,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// Attempt/success/failure counters for an ANN backend, plus the last error seen.
/// This implementation searches via an exact brute-force scan (`fabric-vector`), so
/// these stay at zero unless a future ANN backend is wired in behind the same
/// `fabric_vector::Index` trait — the fields are still exposed because the shape is
/// part of the telemetry contract external tooling reads.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AnnUsage {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub last_error: Option<String>,
    pub last_duration_ms: Option<f64>,
    pub last_used: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchMetrics {
    pub queries: u64,
    pub avg_latency_ms: f64,
    pub last_latency_ms: f64,
    pub avg_similarity: f64,
    pub max_similarity: f64,
    pub min_similarity: f64,
    pub last_similarity_avg: f64,
    pub last_result_count: usize,
    pub total_results_returned: u64,
    pub last_query_timestamp: Option<DateTime<Utc>>,
    pub diskann_usage: AnnUsage,
}

/// Telemetry surfaced by the façade's `get_l2_telemetry()`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct L2Telemetry {
    pub search_metrics: SearchMetrics,
    pub eviction_history: Vec<EvictionRecord>,
    pub diskann_metrics: AnnUsage,
}

/// Mutable telemetry accumulator. Kept separate from the cache's SQLite connection so
/// recording a query never needs the database lock.
pub struct TelemetryState {
    metrics: SearchMetrics,
    running_similarity_sum: f64,
    running_similarity_count: u64,
    eviction_history: VecDeque<EvictionRecord>,
    eviction_history_capacity: usize,
}

impl TelemetryState {
    pub fn new(eviction_history_capacity: usize) -> Self {
        Self {
            metrics: SearchMetrics {
                min_similarity: f64::INFINITY,
                max_similarity: f64::NEG_INFINITY,
                ..Default::default()
            },
            running_similarity_sum: 0.0,
            running_similarity_count: 0,
            eviction_history: VecDeque::new(),
            eviction_history_capacity,
        }
    }

    pub fn record_search(&mut self, similarities: &[f64], latency_ms: f64) {
        self.metrics.queries += 1;
        self.metrics.last_latency_ms = latency_ms;
        self.metrics.avg_latency_ms = ((self.metrics.avg_latency_ms * (self.metrics.queries - 1) as f64)
            + latency_ms)
            / self.metrics.queries as f64;
        self.metrics.last_result_count = similarities.len();
        self.metrics.total_results_returned += similarities.len() as u64;
        self.metrics.last_query_timestamp = Some(Utc::now());

        if similarities.is_empty() {
            self.metrics.last_similarity_avg = 0.0;
            return;
        }
        let sum: f64 = similarities.iter().sum();
        let avg = sum / similarities.len() as f64;
        self.metrics.last_similarity_avg = avg;
        self.running_similarity_sum += sum;
        self.running_similarity_count += similarities.len() as u64;
        self.metrics.avg_similarity = self.running_similarity_sum / self.running_similarity_count as f64;
        for &s in similarities {
            self.metrics.max_similarity = self.metrics.max_similarity.max(s);
            self.metrics.min_similarity = self.metrics.min_similarity.min(s);
        }
    }

    pub fn record_eviction(&mut self, oid: String, reason: &str) {
        if self.eviction_history.len() >= self.eviction_history_capacity {
            self.eviction_history.pop_front();
        }
        self.eviction_history.push_back(EvictionRecord {
            oid,
            reason: reason.to_string(),
            timestamp: Utc::now(),
        });
    }

    pub fn snapshot(&self) -> L2Telemetry {
        let mut metrics = self.metrics.clone();
        if !metrics.min_similarity.is_finite() {
            metrics.min_similarity = 0.0;
        }
        if !metrics.max_similarity.is_finite() {
            metrics.max_similarity = 0.0;
        }
        L2Telemetry {
            search_metrics: metrics,
            eviction_history: self.eviction_history.iter().cloned().collect(),
            diskann_metrics: AnnUsage::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_search_tracks_min_max_avg() {
        let mut state = TelemetryState::new(10);
        state.record_search(&[0.2, 0.8, 0.5], 1.5);
        let snap = state.snapshot();
        assert_eq!(snap.search_metrics.queries, 1);
        assert!((snap.search_metrics.avg_similarity - 0.5).abs() < 1e-9);
        assert_eq!(snap.search_metrics.max_similarity, 0.8);
        assert_eq!(snap.search_metrics.min_similarity, 0.2);
    }

    #[test]
    fn eviction_history_ring_is_bounded() {
        let mut state = TelemetryState::new(2);
        state.record_eviction("a".into(), "capacity");
        state.record_eviction("b".into(), "capacity");
        state.record_eviction("c".into(), "capacity");
        let snap = state.snapshot();
        assert_eq!(snap.eviction_history.len(), 2);
        assert_eq!(snap.eviction_history[0].oid, "b");
        assert_eq!(snap.eviction_history[1].oid, "c");
    }

    #[test]
    fn snapshot_on_untouched_telemetry_has_zeroed_similarity_bounds() {
        let state = TelemetryState::new(10);
        let snap = state.snapshot();
        assert_eq!(snap.search_metrics.min_similarity, 0.0);
        assert_eq!(snap.search_metrics.max_similarity, 0.0);
    }
}
