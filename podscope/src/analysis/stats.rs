//! Latency summaries and rankings.

// Counts are converted to f64 for averages and percentages
#![allow(clippy::cast_precision_loss)]

use serde::Serialize;
use std::collections::HashMap;
use std::hash::Hash;

use crate::domain::Event;

/// Nearest-rank percentile over an ascending slice: `sorted[floor((n-1)·p/100)]`.
///
/// Returns 0 for an empty slice.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let index = ((sorted.len() - 1) as f64 * p / 100.0) as usize;
    sorted[index.min(sorted.len() - 1)]
}

/// Latency distribution of a set of events, in milliseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LatencySummary {
    pub count: usize,
    pub avg_ms: f64,
    pub max_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

impl LatencySummary {
    #[must_use]
    pub fn from_events<'a>(events: impl IntoIterator<Item = &'a Event>) -> Self {
        let mut samples: Vec<f64> = events.into_iter().map(Event::latency_ms).collect();
        Self::from_samples(&mut samples)
    }

    /// Sorts `samples` in place.
    #[must_use]
    pub fn from_samples(samples: &mut [f64]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        samples.sort_by(f64::total_cmp);

        let total: f64 = samples.iter().sum();
        Self {
            count: samples.len(),
            avg_ms: total / samples.len() as f64,
            max_ms: samples[samples.len() - 1],
            p50_ms: percentile(samples, 50.0),
            p95_ms: percentile(samples, 95.0),
            p99_ms: percentile(samples, 99.0),
        }
    }
}

/// Count occurrences of each key and keep the `n` most frequent.
///
/// Ties are broken by ascending key so rankings are stable across runs.
#[must_use]
pub fn top_n<K: Ord + Hash + Clone>(keys: impl IntoIterator<Item = K>, n: usize) -> Vec<(K, usize)> {
    let mut ranked = count_by(keys).into_iter().collect::<Vec<_>>();
    ranked.sort_by(|(ka, ca), (kb, cb)| cb.cmp(ca).then_with(|| ka.cmp(kb)));
    ranked.truncate(n);
    ranked
}

#[must_use]
pub fn count_by<K: Hash + Eq>(keys: impl IntoIterator<Item = K>) -> HashMap<K, usize> {
    let mut counts = HashMap::new();
    for key in keys {
        *counts.entry(key).or_insert(0) += 1;
    }
    counts
}

/// `part / whole` as a percentage, 0 when `whole` is 0
#[must_use]
pub fn pct(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_nearest_rank() {
        let samples = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&samples, 50.0), 3.0);
        assert_eq!(percentile(&samples, 95.0), 4.0);
        assert_eq!(percentile(&samples, 99.0), 4.0);
    }

    #[test]
    fn test_percentile_edges() {
        assert_eq!(percentile(&[7.5], 50.0), 7.5);
        assert_eq!(percentile(&[7.5], 99.0), 7.5);
        assert_eq!(percentile(&[], 50.0), 0.0);
        assert_eq!(LatencySummary::from_samples(&mut []), LatencySummary::default());
    }

    #[test]
    fn test_summary_sorts_unordered_input() {
        let mut samples = vec![5.0, 1.0, 4.0, 2.0, 3.0];
        let summary = LatencySummary::from_samples(&mut samples);
        assert_eq!(summary.count, 5);
        assert_eq!(summary.avg_ms, 3.0);
        assert_eq!(summary.max_ms, 5.0);
        assert_eq!((summary.p50_ms, summary.p95_ms, summary.p99_ms), (3.0, 4.0, 4.0));
    }

    #[test]
    fn test_top_n_ties_break_by_key() {
        let keys = ["b", "a", "c", "a", "b", "d", "e", "f", "g"];
        let top = top_n(keys, 5);
        assert_eq!(top, vec![("a", 2), ("b", 2), ("c", 1), ("d", 1), ("e", 1)]);
    }

    #[test]
    fn test_pct() {
        assert_eq!(pct(10, 100), 10.0);
        assert_eq!(pct(1, 0), 0.0);
    }
}
