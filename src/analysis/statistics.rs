//! Statistics Engine
//!
//! Aggregate numeric summaries over invocation samples:
//! - Mean, min/max and population variance
//! - Nearest-rank percentiles (p50, p90, p95, p99)
//! - Fixed distribution buckets with inclusive upper bounds

use super::schemas::{DistributionBucket, StatisticalSummary};
use tracing::debug;

/// Ordered bucket boundaries for a distribution
///
/// A sample lands in the first bucket whose upper bound is `>=` the sample;
/// anything above the last bound lands in the open-ended overflow bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketScheme {
    upper_bounds: Vec<f64>,
    unit: &'static str,
}

impl BucketScheme {
    /// Create a scheme from ascending upper bounds
    pub fn new(upper_bounds: Vec<f64>, unit: &'static str) -> Self {
        let mut upper_bounds: Vec<f64> = upper_bounds.into_iter().filter(|b| b.is_finite()).collect();
        upper_bounds.sort_by(f64::total_cmp);
        upper_bounds.dedup();
        Self { upper_bounds, unit }
    }

    /// Duration buckets: 0-500ms, 500-1000ms, 1000-2000ms, 2000-5000ms, 5000ms+
    pub fn duration_ms() -> Self {
        Self::new(vec![500.0, 1000.0, 2000.0, 5000.0], "ms")
    }

    /// Memory buckets: 0-128MB up to 1024MB+
    pub fn memory_mb() -> Self {
        Self::new(vec![128.0, 256.0, 512.0, 1024.0], "MB")
    }

    /// Empty buckets in display order
    pub fn empty_buckets(&self) -> Vec<DistributionBucket> {
        let mut lower = 0.0;
        let mut buckets: Vec<DistributionBucket> = self
            .upper_bounds
            .iter()
            .map(|&upper| {
                let bucket = DistributionBucket {
                    label: format!("{}-{}{}", lower, upper, self.unit),
                    upper_bound: Some(upper),
                    count: 0,
                };
                lower = upper;
                bucket
            })
            .collect();
        buckets.push(DistributionBucket {
            label: format!("{}{}+", lower, self.unit),
            upper_bound: None,
            count: 0,
        });
        buckets
    }

    /// Index of the bucket a sample belongs to
    pub fn bucket_index(&self, value: f64) -> usize {
        self.upper_bounds.partition_point(|&upper| upper < value)
    }

    /// Count samples into buckets
    pub fn distribute(&self, samples: &[f64]) -> Vec<DistributionBucket> {
        let mut buckets = self.empty_buckets();
        for &value in samples {
            if let Some(bucket) = buckets.get_mut(self.bucket_index(value)) {
                bucket.count += 1;
            }
        }
        buckets
    }
}

/// Computes [`StatisticalSummary`] values
#[derive(Debug, Clone)]
pub struct StatisticsEngine {
    scheme: BucketScheme,
}

impl Default for StatisticsEngine {
    fn default() -> Self {
        Self::new(BucketScheme::duration_ms())
    }
}

impl StatisticsEngine {
    /// Create an engine using the given bucket scheme
    pub fn new(scheme: BucketScheme) -> Self {
        Self { scheme }
    }

    /// Engine bucketing durations in milliseconds
    pub fn for_durations() -> Self {
        Self::new(BucketScheme::duration_ms())
    }

    /// Engine bucketing memory in megabytes
    pub fn for_memory() -> Self {
        Self::new(BucketScheme::memory_mb())
    }

    /// Summarize a sample set
    ///
    /// Non-finite samples are dropped. No samples yields an all-zero summary
    /// with empty buckets.
    pub fn summarize(&self, samples: &[f64]) -> StatisticalSummary {
        let mut sorted: Vec<f64> = samples.iter().copied().filter(|v| v.is_finite()).collect();
        if sorted.len() != samples.len() {
            debug!(
                dropped = samples.len() - sorted.len(),
                "Dropped non-finite samples"
            );
        }
        sorted.sort_by(f64::total_cmp);

        let (Some(&min), Some(&max)) = (sorted.first(), sorted.last()) else {
            return self.empty();
        };

        let n = sorted.len() as f64;
        // Rounding may push the mean outside the sample range
        let mean = (sorted.iter().sum::<f64>() / n).clamp(min, max);
        let variance = sorted.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;

        StatisticalSummary {
            count: sorted.len() as u64,
            mean,
            p50: percentile(&sorted, 50.0),
            p90: percentile(&sorted, 90.0),
            p95: percentile(&sorted, 95.0),
            p99: percentile(&sorted, 99.0),
            min,
            max,
            variance,
            std_dev: variance.sqrt(),
            distribution_buckets: self.scheme.distribute(&sorted),
        }
    }

    /// Summary of an empty sample set
    pub fn empty(&self) -> StatisticalSummary {
        StatisticalSummary {
            count: 0,
            mean: 0.0,
            p50: 0.0,
            p90: 0.0,
            p95: 0.0,
            p99: 0.0,
            min: 0.0,
            max: 0.0,
            variance: 0.0,
            std_dev: 0.0,
            distribution_buckets: self.scheme.empty_buckets(),
        }
    }
}

/// Nearest-rank percentile of ascending samples
///
/// Index `ceil(p / 100 * n) - 1`, clamped to `[0, n - 1]`.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }

    let n = sorted.len();
    let rank = (p / 100.0 * n as f64).ceil() as i64 - 1;
    let index = rank.clamp(0, n as i64 - 1) as usize;
    sorted[index]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nearest_rank_percentile() {
        let sorted: Vec<f64> = (1..=10).map(f64::from).collect();
        assert_eq!(percentile(&sorted, 50.0), 5.0);
        assert_eq!(percentile(&sorted, 90.0), 9.0);
        assert_eq!(percentile(&sorted, 95.0), 10.0);
        assert_eq!(percentile(&sorted, 99.0), 10.0);
        assert_eq!(percentile(&sorted, 0.0), 1.0);
        assert_eq!(percentile(&sorted, 100.0), 10.0);
        assert_eq!(percentile(&[], 50.0), 0.0);
        assert_eq!(percentile(&[42.0], 99.0), 42.0);
    }

    #[test]
    fn test_summary_basic() {
        let summary = StatisticsEngine::for_durations().summarize(&[100.0, 200.0, 300.0, 400.0]);

        assert_eq!(summary.count, 4);
        assert_eq!(summary.mean, 250.0);
        assert_eq!(summary.min, 100.0);
        assert_eq!(summary.max, 400.0);
        assert_eq!(summary.p50, 200.0);
        assert_eq!(summary.p99, 400.0);
        assert_eq!(summary.variance, 12_500.0);
        assert!((summary.std_dev - 111.803).abs() < 0.001);
    }

    #[test]
    fn test_bucket_boundaries_go_to_lower_bucket() {
        let scheme = BucketScheme::duration_ms();
        assert_eq!(scheme.bucket_index(0.0), 0);
        assert_eq!(scheme.bucket_index(500.0), 0);
        assert_eq!(scheme.bucket_index(500.5), 1);
        assert_eq!(scheme.bucket_index(1000.0), 1);
        assert_eq!(scheme.bucket_index(5000.0), 3);
        assert_eq!(scheme.bucket_index(5000.1), 4);
    }

    #[test]
    fn test_bucket_labels_are_ordered() {
        let labels: Vec<String> = BucketScheme::duration_ms()
            .empty_buckets()
            .into_iter()
            .map(|b| b.label)
            .collect();
        assert_eq!(
            labels,
            vec!["0-500ms", "500-1000ms", "1000-2000ms", "2000-5000ms", "5000ms+"]
        );

        let memory = BucketScheme::memory_mb().empty_buckets();
        assert_eq!(memory.first().map(|b| b.label.as_str()), Some("0-128MB"));
        assert_eq!(memory.last().map(|b| b.label.as_str()), Some("1024MB+"));
    }

    #[test]
    fn test_summary_invariants_hold() {
        let engine = StatisticsEngine::for_durations();
        let sample_sets: Vec<Vec<f64>> = vec![
            vec![7.0],
            vec![0.1, 0.2, 0.3],
            vec![499.9, 500.0, 500.1, 1000.0, 2000.0, 5000.0, 9000.0],
            (0..257).map(|i| (i * 37 % 101) as f64 * 61.3).collect(),
            vec![1e-9, 1e12, 3.0, 3.0, 3.0],
        ];

        for samples in sample_sets {
            let s = engine.summarize(&samples);
            assert_eq!(s.count, samples.len() as u64);
            assert!(s.min <= s.p50 && s.p50 <= s.p90, "{:?}", s);
            assert!(s.p90 <= s.p95 && s.p95 <= s.p99 && s.p99 <= s.max, "{:?}", s);
            assert!(s.min <= s.mean && s.mean <= s.max, "{:?}", s);
            assert!(s.variance >= 0.0);
            let bucketed: u64 = s.distribution_buckets.iter().map(|b| b.count).sum();
            assert_eq!(bucketed, s.count);
        }
    }

    #[test]
    fn test_empty_and_non_finite_samples() {
        let engine = StatisticsEngine::for_durations();

        let empty = engine.summarize(&[]);
        assert_eq!(empty.count, 0);
        assert_eq!(empty.mean, 0.0);
        assert_eq!(empty.distribution_buckets.len(), 5);
        assert!(empty.distribution_buckets.iter().all(|b| b.count == 0));

        let summary = engine.summarize(&[f64::NAN, 10.0, f64::INFINITY]);
        assert_eq!(summary.count, 1);
        assert_eq!(summary.mean, 10.0);
    }
}
