use hdrhistogram::Histogram;

/// Nearest-rank percentile of an ascending slice. `p` is in `0.0..=100.0`.
#[must_use]
pub fn percentile(sorted: &[u32], p: f64) -> Option<u32> {
    if sorted.is_empty() {
        return None;
    }

    let n = sorted.len();
    let rank = ((p.clamp(0.0, 100.0) / 100.0) * n as f64).ceil() as usize;
    let idx = rank.saturating_sub(1).min(n - 1);
    sorted.get(idx).copied()
}

/// Latency statistics in microseconds.
#[derive(Debug, Clone, PartialEq)]
pub struct LatencySummary {
    pub count: u64,
    pub min_us: u32,
    pub mean_us: f64,
    pub stdev_us: f64,
    pub p50_us: u32,
    pub p90_us: u32,
    pub p99_us: u32,
    pub p99_9_us: u32,
    pub p99_99_us: u32,
    pub max_us: u32,
    /// `(percentile, value)` for percentiles 1..=99, at histogram precision.
    pub distribution_us: Vec<(u8, u64)>,
}

impl LatencySummary {
    /// `None` when there are no samples.
    #[must_use]
    pub fn from_sorted(sorted: &[u32]) -> Option<Self> {
        let (&min_us, &max_us) = (sorted.first()?, sorted.last()?);

        let count = sorted.len() as f64;
        let sum: f64 = sorted.iter().map(|&v| f64::from(v)).sum();
        let mean_us = sum / count;
        let variance = sorted
            .iter()
            .map(|&v| {
                let d = f64::from(v) - mean_us;
                d * d
            })
            .sum::<f64>()
            / count;

        let at = |p: f64| percentile(sorted, p).unwrap_or(max_us);

        Some(Self {
            count: sorted.len() as u64,
            min_us,
            mean_us,
            stdev_us: variance.sqrt(),
            p50_us: at(50.0),
            p90_us: at(90.0),
            p99_us: at(99.0),
            p99_9_us: at(99.9),
            p99_99_us: at(99.99),
            max_us,
            distribution_us: distribution(sorted),
        })
    }
}

fn distribution(sorted: &[u32]) -> Vec<(u8, u64)> {
    let Ok(mut hist) = Histogram::<u64>::new_with_bounds(1, u64::from(u32::MAX), 3) else {
        return Vec::new();
    };
    for &v in sorted {
        // Zero-microsecond samples land in the lowest bucket.
        if hist.record(u64::from(v.max(1))).is_err() {
            return Vec::new();
        }
    }

    (1..=99u8)
        .map(|p| (p, hist.value_at_quantile(f64::from(p) / 100.0)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearest_rank_percentiles() {
        let sorted: Vec<u32> = (1..=100).collect();
        assert_eq!(percentile(&sorted, 50.0), Some(50));
        assert_eq!(percentile(&sorted, 90.0), Some(90));
        assert_eq!(percentile(&sorted, 99.9), Some(100));
        assert_eq!(percentile(&sorted, 0.0), Some(1));
        assert_eq!(percentile(&[], 50.0), None);
    }

    #[test]
    fn summary_of_constant_samples() {
        let sorted = vec![1_000u32; 10];
        let summary =
            LatencySummary::from_sorted(&sorted).unwrap_or_else(|| panic!("expected a summary"));

        assert_eq!(summary.count, 10);
        assert_eq!(summary.min_us, 1_000);
        assert_eq!(summary.max_us, 1_000);
        assert_eq!(summary.p99_99_us, 1_000);
        assert!((summary.mean_us - 1_000.0).abs() < f64::EPSILON);
        assert!(summary.stdev_us.abs() < f64::EPSILON);
        assert_eq!(summary.distribution_us.len(), 99);
    }

    #[test]
    fn summary_spread() {
        let sorted = vec![10, 20, 30, 40];
        let summary =
            LatencySummary::from_sorted(&sorted).unwrap_or_else(|| panic!("expected a summary"));

        assert_eq!(summary.p50_us, 20);
        assert_eq!(summary.p90_us, 40);
        assert!((summary.mean_us - 25.0).abs() < 1e-9);
        assert!((summary.stdev_us - 125f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn empty_input_has_no_summary() {
        assert!(LatencySummary::from_sorted(&[]).is_none());
    }
}
