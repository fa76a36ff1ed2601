//! Hybrid LFU/LRU eviction scoring, factored out as pure logic so it can
//! be unit- and property-tested without touching the concurrent cache.

use chrono::{DateTime, Utc};
use fabric_core::Oid;

/// The subset of an entry's telemetry the eviction score needs.
pub struct Candidate {
    pub oid: Oid,
    pub access_count: u64,
    pub last_access_time: DateTime<Utc>,
    pub pinned: bool,
}

/// Percentile rank of `value` within `sorted` (ascending), as a fraction in `[0, 1]`.
/// A population of size 1 ranks at `1.0` (the sole entry is never the "worst").
fn percentile_rank(sorted: &[i64], value: i64) -> f64 {
    if sorted.len() <= 1 {
        return 1.0;
    }
    // Index of the first element >= value among equals: ties share the lowest rank
    // of their group so that equal entries get an equal, stable percentile.
    let rank = sorted.partition_point(|&v| v < value);
    rank as f64 / (sorted.len() - 1) as f64
}

/// Choose which OIDs to evict so that the population drops from its current size to
/// at or below `target_size`. Pinned candidates are never chosen. Returns OIDs in
/// evict-first order (lowest score first), ties broken by OID ascending for
/// determinism.
pub fn choose_evictions(candidates: &[Candidate], alpha: f64, target_size: usize) -> Vec<Oid> {
    let evictable: Vec<&Candidate> = candidates.iter().filter(|c| !c.pinned).collect();
    let total = candidates.len();
    if total <= target_size || evictable.is_empty() {
        return Vec::new();
    }
    let to_evict = total - target_size;

    let mut freq: Vec<i64> = evictable.iter().map(|c| c.access_count as i64).collect();
    freq.sort_unstable();
    let mut recency: Vec<i64> = evictable.iter().map(|c| c.last_access_time.timestamp_nanos_opt().unwrap_or(0)).collect();
    recency.sort_unstable();

    let mut scored: Vec<(f64, &Oid)> = evictable
        .iter()
        .map(|c| {
            let freq_pct = percentile_rank(&freq, c.access_count as i64);
            let recency_pct =
                percentile_rank(&recency, c.last_access_time.timestamp_nanos_opt().unwrap_or(0));
            let score = alpha * freq_pct + (1.0 - alpha) * recency_pct;
            (score, &c.oid)
        })
        .collect();

    scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.1.cmp(b.1)));
    scored.into_iter().take(to_evict).map(|(_, oid)| oid.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn candidate(oid: &str, access_count: u64, age_seconds: i64, pinned: bool) -> Candidate {
        Candidate {
            oid: oid.to_string(),
            access_count,
            last_access_time: Utc::now() - Duration::seconds(age_seconds),
            pinned,
        }
    }

    #[test]
    fn evicts_the_coldest_entry_first() {
        let candidates = vec![
            candidate("hot", 100, 0, false),
            candidate("cold", 1, 1000, false),
            candidate("warm", 50, 100, false),
        ];
        let evicted = choose_evictions(&candidates, 0.5, 2);
        assert_eq!(evicted, vec!["cold".to_string()]);
    }

    #[test]
    fn pinned_entries_are_never_evicted() {
        let candidates = vec![
            candidate("pinned-cold", 0, 10_000, true),
            candidate("warm", 50, 10, false),
        ];
        let evicted = choose_evictions(&candidates, 0.5, 0);
        assert_eq!(evicted, vec!["warm".to_string()]);
    }

    #[test]
    fn no_eviction_needed_below_target() {
        let candidates = vec![candidate("a", 1, 1, false)];
        assert!(choose_evictions(&candidates, 0.5, 5).is_empty());
    }

    #[test]
    fn ties_broken_by_oid_ascending() {
        let now_candidates = vec![
            candidate("b", 1, 1, false),
            candidate("a", 1, 1, false),
        ];
        let evicted = choose_evictions(&now_candidates, 0.5, 0);
        assert_eq!(evicted, vec!["a".to_string(), "b".to_string()]);
    }
}
