//! Temporal pattern detection
//!
//! Derives when cold starts happen and why they probably happen:
//! hour-of-day distribution, peak hours, frequency class, inter-invocation
//! gaps, deployment clustering and scaling bursts.

use super::schemas::{AnalysisConfig, FrequencyClass, GapAnalysis, PatternResult, Trigger};
use super::statistics::percentile;
use chrono::{DateTime, FixedOffset, Offset, Timelike, Utc};
use std::collections::BTreeSet;
use tracing::debug;

/// Temporal pattern detector
#[derive(Debug, Clone)]
pub struct TemporalPatternDetector {
    offset: FixedOffset,
    peak_hour_count: usize,
    clustering_gap_ms: i64,
    clustering_ratio: f64,
    scaling_threshold: u64,
    long_idle_gap_ms: f64,
    moderate_idle_gap_ms: f64,
}

impl Default for TemporalPatternDetector {
    fn default() -> Self {
        Self::new(&AnalysisConfig::default())
    }
}

impl TemporalPatternDetector {
    /// Create a detector from analysis configuration
    pub fn new(config: &AnalysisConfig) -> Self {
        let offset = FixedOffset::east_opt(config.utc_offset_minutes.saturating_mul(60))
            .unwrap_or_else(|| Utc.fix());

        Self {
            offset,
            peak_hour_count: config.peak_hour_count,
            clustering_gap_ms: i64::try_from(config.clustering_gap_ms).unwrap_or(i64::MAX),
            clustering_ratio: config.clustering_ratio,
            scaling_threshold: config.scaling_cold_start_threshold,
            long_idle_gap_ms: config.long_idle_gap_ms as f64,
            moderate_idle_gap_ms: config.moderate_idle_gap_ms as f64,
        }
    }

    /// Detect patterns from cold start and invocation timestamps
    ///
    /// `invocation_timestamps` covers every invocation of the window, cold
    /// or warm, and determines the invocation count.
    pub fn detect(&self, cold_start_timestamps: &[i64], invocation_timestamps: &[i64]) -> PatternResult {
        let total_invocations = invocation_timestamps.len() as u64;
        let cold_starts = cold_start_timestamps.len() as u64;

        let hourly_distribution = self.hourly_distribution(cold_start_timestamps);
        let peak_hours = peak_hours(&hourly_distribution, self.peak_hour_count);
        let cold_start_rate = cold_start_rate(cold_starts, total_invocations);
        let frequency_class = frequency_class(cold_starts, total_invocations);
        let gap_analysis = gap_analysis(invocation_timestamps);
        let clustering_detected = self.detect_clustering(cold_start_timestamps);

        let mut triggers = BTreeSet::new();
        if let Some(ref gaps) = gap_analysis {
            if gaps.average_gap_ms > self.long_idle_gap_ms {
                triggers.insert(Trigger::LongIdlePeriods);
            }
            if gaps.average_gap_ms > self.moderate_idle_gap_ms {
                triggers.insert(Trigger::ModerateIdlePeriods);
            }
        }
        if clustering_detected {
            triggers.insert(Trigger::DeploymentUpdate);
        }
        if cold_starts > self.scaling_threshold {
            triggers.insert(Trigger::ScalingEvents);
        }
        if triggers.is_empty() {
            triggers.insert(Trigger::NormalLifecycle);
        }

        debug!(
            cold_starts,
            total_invocations,
            frequency = %frequency_class,
            clustering_detected,
            "Detected temporal patterns"
        );

        PatternResult {
            peak_hours,
            hourly_distribution,
            frequency_class,
            cold_start_rate,
            triggers,
            clustering_detected,
            gap_analysis,
        }
    }

    /// Count timestamps per local hour of day
    pub fn hourly_distribution(&self, timestamps: &[i64]) -> [u64; 24] {
        let mut hours = [0u64; 24];
        for hour in timestamps.iter().filter_map(|&ts| self.local_hour(ts)) {
            hours[hour] += 1;
        }
        hours
    }

    fn local_hour(&self, timestamp_ms: i64) -> Option<usize> {
        DateTime::from_timestamp_millis(timestamp_ms)
            .map(|dt| dt.with_timezone(&self.offset).hour() as usize)
            .filter(|&h| h < 24)
    }

    /// Whether cold starts fire in bursts, as after a deployment
    ///
    /// Counts sorted cold starts that follow their predecessor within the
    /// clustering gap; clustering is detected when that share of all cold
    /// starts exceeds the clustering ratio.
    pub fn detect_clustering(&self, cold_start_timestamps: &[i64]) -> bool {
        if cold_start_timestamps.len() < 2 {
            return false;
        }

        let mut sorted = cold_start_timestamps.to_vec();
        sorted.sort_unstable();

        let clustered = sorted
            .windows(2)
            .filter(|pair| pair[1].saturating_sub(pair[0]) <= self.clustering_gap_ms)
            .count();

        clustered as f64 / sorted.len() as f64 > self.clustering_ratio
    }
}

/// Top `count` hours by cold starts as `HH:00`, ties to the earlier hour
///
/// Hours without cold starts are never peaks.
pub fn peak_hours(hourly_distribution: &[u64; 24], count: usize) -> Vec<String> {
    let mut hours: Vec<(usize, u64)> = hourly_distribution
        .iter()
        .copied()
        .enumerate()
        .filter(|&(_, c)| c > 0)
        .collect();
    hours.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    hours
        .into_iter()
        .take(count)
        .map(|(hour, _)| format!("{:02}:00", hour))
        .collect()
}

/// Cold starts per 100 invocations, within `[0, 100]`
pub fn cold_start_rate(cold_starts: u64, total_invocations: u64) -> f64 {
    if total_invocations == 0 {
        return 0.0;
    }
    (cold_starts as f64 * 100.0 / total_invocations as f64).clamp(0.0, 100.0)
}

/// Classify the cold start rate
pub fn frequency_class(cold_starts: u64, total_invocations: u64) -> FrequencyClass {
    if total_invocations == 0 {
        return FrequencyClass::None;
    }

    match cold_start_rate(cold_starts, total_invocations) {
        r if r > 50.0 => FrequencyClass::VeryHigh,
        r if r > 25.0 => FrequencyClass::High,
        r if r > 10.0 => FrequencyClass::Moderate,
        r if r > 5.0 => FrequencyClass::Low,
        _ => FrequencyClass::VeryLow,
    }
}

/// Gaps between consecutive invocations, `None` below two invocations
pub fn gap_analysis(invocation_timestamps: &[i64]) -> Option<GapAnalysis> {
    if invocation_timestamps.len() < 2 {
        return None;
    }

    let mut sorted = invocation_timestamps.to_vec();
    sorted.sort_unstable();

    let mut gaps: Vec<f64> = sorted
        .windows(2)
        .map(|pair| pair[1].saturating_sub(pair[0]) as f64)
        .collect();
    gaps.sort_by(f64::total_cmp);

    let (&min_gap_ms, &max_gap_ms) = (gaps.first()?, gaps.last()?);
    Some(GapAnalysis {
        gap_count: gaps.len() as u64,
        average_gap_ms: gaps.iter().sum::<f64>() / gaps.len() as f64,
        median_gap_ms: percentile(&gaps, 50.0),
        min_gap_ms,
        max_gap_ms,
    })
}
