//! Temporal analysis: timeline buckets, bursts, connection and I/O patterns.
//!
//! All functions take monotonic nanosecond timestamps and a window
//! `[start_ns, end_ns]` in the same clock.

// Rates and statistics are computed in f64
#![allow(clippy::cast_precision_loss)]

use serde::{Serialize, Serializer};
use std::fmt;
use std::time::Duration;

use super::policy::Policy;

/// Collection window in monotonic nanoseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Span {
    pub start_ns: u64,
    pub end_ns: u64,
}

impl Span {
    #[must_use]
    pub fn duration(self) -> Duration {
        Duration::from_nanos(self.end_ns.saturating_sub(self.start_ns))
    }

    /// `count` per second over this span, 0 for an empty span
    #[must_use]
    pub fn rate(self, count: usize) -> f64 {
        let secs = self.duration().as_secs_f64();
        if secs > 0.0 {
            count as f64 / secs
        } else {
            0.0
        }
    }

    /// Count timestamps in `n` consecutive half-open windows of `width`
    /// starting at `start_ns`.
    #[must_use]
    pub fn window_counts(self, timestamps: &[u64], width: Duration, n: usize) -> Vec<usize> {
        let mut counts = vec![0; n];
        let width_ns = u64::try_from(width.as_nanos()).unwrap_or(u64::MAX);
        if width_ns == 0 {
            return counts;
        }
        for &ts in timestamps {
            let Some(elapsed) = ts.checked_sub(self.start_ns) else {
                continue;
            };
            if let Some(slot) = usize::try_from(elapsed / width_ns).ok().and_then(|i| counts.get_mut(i)) {
                *slot += 1;
            }
        }
        counts
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineBucket {
    /// Bucket bounds as offsets from the window start
    #[serde(serialize_with = "as_secs")]
    pub from: Duration,
    #[serde(serialize_with = "as_secs")]
    pub to: Duration,
    pub count: usize,
    pub percentage: f64,
}

/// Split the window into equal buckets and count events by timestamp.
///
/// Events before the start land in the first bucket, events after the end
/// in the last.
#[must_use]
pub fn timeline(timestamps: &[u64], span: Span, policy: &Policy) -> Vec<TimelineBucket> {
    if timestamps.is_empty() {
        return Vec::new();
    }

    let buckets = policy.timeline_buckets.max(1);
    let bucket = span.duration() / buckets;
    let bucket_ns = bucket.as_nanos();
    let last = buckets as usize - 1;

    let mut counts = vec![0usize; buckets as usize];
    for &ts in timestamps {
        let elapsed = u128::from(ts.saturating_sub(span.start_ns));
        let index = if bucket_ns == 0 {
            0
        } else {
            usize::try_from(elapsed / bucket_ns).unwrap_or(last).min(last)
        };
        counts[index] += 1;
    }

    let total = timestamps.len();
    counts
        .into_iter()
        .zip(0u32..)
        .map(|(count, i)| TimelineBucket {
            from: bucket * i,
            to: bucket * (i + 1),
            count,
            percentage: count as f64 * 100.0 / total as f64,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Burst {
    /// Window start as an offset from the collection start
    #[serde(serialize_with = "as_secs")]
    pub offset: Duration,
    pub rate: f64,
    pub multiplier: f64,
}

/// Bursts found in the run, capped at `policy.max_bursts`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BurstReport {
    pub detected: usize,
    pub bursts: Vec<Burst>,
}

/// Flag 1-second windows whose rate exceeds `burst_factor` × the run average.
#[must_use]
pub fn detect_bursts(timestamps: &[u64], span: Span, policy: &Policy) -> BurstReport {
    if timestamps.len() < policy.burst_min_events {
        return BurstReport::default();
    }

    let avg_rate = span.rate(timestamps.len());
    let window = policy.burst_window;
    let windows = whole_windows(span.duration(), window);
    if windows < 2 || avg_rate <= 0.0 {
        return BurstReport::default();
    }

    let mut bursts: Vec<Burst> = span
        .window_counts(timestamps, window, windows)
        .into_iter()
        .zip(0u32..)
        .filter_map(|(count, i)| {
            let rate = count as f64 / window.as_secs_f64();
            (rate > avg_rate * policy.burst_factor).then(|| Burst {
                offset: window * i,
                rate,
                multiplier: rate / avg_rate,
            })
        })
        .collect();

    let detected = bursts.len();
    bursts.truncate(policy.max_bursts);
    BurstReport { detected, bursts }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Pattern {
    Steady,
    Sporadic,
    Bursty,
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Steady => "steady",
            Self::Sporadic => "sporadic",
            Self::Bursty => "bursty",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionPattern {
    pub pattern: Pattern,
    pub avg_rate: f64,
    /// Highest sub-window rate
    pub peak_rate: f64,
    pub variance: f64,
    pub unique_targets: usize,
}

/// Classify how connection attempts are spread across the window.
///
/// The population variance of per-sub-window counts is compared directly
/// against mean-scaled cutoffs (no square root).
#[must_use]
pub fn connection_pattern(
    timestamps: &[u64],
    unique_targets: usize,
    span: Span,
    policy: &Policy,
) -> ConnectionPattern {
    let width = (span.duration() / policy.pattern_windows.max(1)).max(policy.min_pattern_window);
    let windows = usize::try_from(span.duration().as_nanos().div_ceil(width.as_nanos()))
        .unwrap_or(0)
        .max(1);
    let counts = span.window_counts(timestamps, width, windows);

    let n = counts.len() as f64;
    let sum: f64 = counts.iter().map(|&c| c as f64).sum();
    let sum_sq: f64 = counts.iter().map(|&c| (c * c) as f64).sum();
    let mean = sum / n;
    let variance = sum_sq / n - mean * mean;

    let pattern = if variance > mean * policy.bursty_factor {
        Pattern::Bursty
    } else if variance < mean * policy.steady_factor {
        Pattern::Steady
    } else {
        Pattern::Sporadic
    };

    let peak = counts.iter().copied().max().unwrap_or(0);
    ConnectionPattern {
        pattern,
        avg_rate: span.rate(timestamps.len()),
        peak_rate: peak as f64 / width.as_secs_f64(),
        variance,
        unique_targets,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IoPattern {
    pub send_recv_ratio: f64,
    pub avg_throughput: f64,
    pub peak_throughput: f64,
}

/// Send/receive balance and throughput of TCP operations.
#[must_use]
pub fn io_pattern(sends: usize, recvs: usize, timestamps: &[u64], span: Span, policy: &Policy) -> IoPattern {
    let send_recv_ratio = if recvs > 0 { sends as f64 / recvs as f64 } else { 1.0 };

    let window = policy.burst_window;
    let windows = whole_windows(span.duration(), window).max(1);
    let peak = span.window_counts(timestamps, window, windows).into_iter().max().unwrap_or(0);

    IoPattern {
        send_recv_ratio,
        avg_throughput: span.rate(timestamps.len()),
        peak_throughput: peak as f64 / window.as_secs_f64(),
    }
}

/// Serialize a `Duration` as fractional seconds
///
/// # Errors
/// Propagates the serializer's error.
pub fn as_secs<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

fn whole_windows(total: Duration, window: Duration) -> usize {
    if window.is_zero() {
        return 0;
    }
    usize::try_from(total.as_nanos() / window.as_nanos()).unwrap_or(usize::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::policy::POLICY;

    const SEC: u64 = 1_000_000_000;
    const START: u64 = 1_000 * SEC;

    fn span(secs: u64) -> Span {
        Span { start_ns: START, end_ns: START + secs * SEC }
    }

    /// `per_window[i]` events spread inside the i-th `width_ns` window
    fn spread(per_window: &[usize], width_ns: u64) -> Vec<u64> {
        let mut out = Vec::new();
        for (i, &count) in per_window.iter().enumerate() {
            let base = START + i as u64 * width_ns;
            for j in 0..count as u64 {
                out.push(base + width_ns / 4 + j * (width_ns / 2) / (count as u64).max(1));
            }
        }
        out
    }

    #[test]
    fn test_timeline_five_buckets() {
        let ts = spread(&[4, 0, 2, 2, 2], 2 * SEC);
        let buckets = timeline(&ts, span(10), &POLICY);
        assert_eq!(buckets.len(), 5);
        assert_eq!(buckets.iter().map(|b| b.count).collect::<Vec<_>>(), vec![4, 0, 2, 2, 2]);
        assert_eq!(buckets[0].percentage, 40.0);
        assert_eq!(buckets[4].to, Duration::from_secs(10));
    }

    #[test]
    fn test_timeline_clamps_late_events() {
        let buckets = timeline(&[START + 20 * SEC, START - 1], span(10), &POLICY);
        assert_eq!(buckets[4].count, 1);
        assert_eq!(buckets[0].count, 1);
    }

    #[test]
    fn test_single_burst_at_three_times_average() {
        // 90 events over 10s: average 9/s; window 4 holds 27 (3x), others 7.
        let mut per_window = [7usize; 10];
        per_window[4] = 27;
        let ts = spread(&per_window, SEC);
        assert_eq!(ts.len(), 90);

        let report = detect_bursts(&ts, span(10), &POLICY);
        assert_eq!(report.detected, 1);
        let burst = &report.bursts[0];
        assert_eq!(burst.offset, Duration::from_secs(4));
        assert_eq!(burst.rate, 27.0);
        assert!((burst.multiplier - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_bursts_need_minimum_events() {
        let ts = spread(&[9, 0, 0, 0, 0, 0, 0, 0, 0, 0], SEC);
        assert_eq!(detect_bursts(&ts, span(10), &POLICY), BurstReport::default());
    }

    #[test]
    fn test_bursts_capped_at_three() {
        let ts = spread(&[50, 50, 50, 50, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0], SEC);
        let report = detect_bursts(&ts, span(20), &POLICY);
        assert_eq!(report.detected, 4);
        assert_eq!(report.bursts.len(), 3);
    }

    #[test]
    fn test_uniform_connections_are_steady() {
        let ts = spread(&[1; 10], SEC);
        let pattern = connection_pattern(&ts, 1, span(10), &POLICY);
        assert_eq!(pattern.pattern, Pattern::Steady);
        assert_eq!(pattern.variance, 0.0);
        assert_eq!(pattern.avg_rate, 1.0);
    }

    #[test]
    fn test_alternating_connections_are_bursty() {
        let ts = spread(&[0, 10, 0, 10, 0, 10, 0, 10, 0, 10], SEC);
        let pattern = connection_pattern(&ts, 3, span(10), &POLICY);
        assert_eq!(pattern.pattern, Pattern::Bursty);
        assert_eq!(pattern.variance, 25.0);
        assert_eq!(pattern.peak_rate, 10.0);
        assert_eq!(pattern.unique_targets, 3);
    }

    #[test]
    fn test_sporadic_between_thresholds() {
        // mean 4, variance 0.8: between 0.4 and 2.0
        let ts = spread(&[2, 6, 4, 4, 4, 4, 4, 4, 4, 4], SEC);
        let pattern = connection_pattern(&ts, 0, span(10), &POLICY);
        assert_eq!(pattern.pattern, Pattern::Sporadic);
    }

    #[test]
    fn test_short_window_uses_minimum_sub_window() {
        let window = Span { start_ns: START, end_ns: START + 500_000_000 };
        let ts = vec![START + 10, START + 150_000_000, START + 450_000_000];
        let pattern = connection_pattern(&ts, 0, window, &POLICY);
        // 100ms sub-windows → 5 windows; busiest holds 1 → 10/s
        assert_eq!(pattern.peak_rate, 10.0);
    }

    #[test]
    fn test_io_pattern() {
        let ts = spread(&[6, 2, 0, 0], SEC);
        let io = io_pattern(6, 2, &ts, span(4), &POLICY);
        assert_eq!(io.send_recv_ratio, 3.0);
        assert_eq!(io.avg_throughput, 2.0);
        assert_eq!(io.peak_throughput, 6.0);

        assert_eq!(io_pattern(4, 0, &ts, span(4), &POLICY).send_recv_ratio, 1.0);
    }
}
