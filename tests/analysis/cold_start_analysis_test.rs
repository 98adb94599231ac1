//! Integration tests for cold start analysis
//!
//! These tests drive the full pipeline through the public API, from raw
//! log lines served by a telemetry source to the serialized result.

use async_trait::async_trait;
use serverless_latency_lens::analysis::{
    AnalysisConfig, AnalysisCoordinator, AnalysisStatus, AnalysisWindow, FrequencyClass,
    TimeRange, Trigger,
};
use serverless_latency_lens::telemetry_source::{
    Datapoint, InMemoryTelemetrySource, LogPage, LogQuery, MetricQuery, RawLogLine,
    TelemetryError, TelemetrySource,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const MINUTE: i64 = 60_000;
// 2024-03-10T00:00:00Z
const BASE: i64 = 1_710_028_800_000;

fn report(id: &str, duration: f64, memory_used: u32) -> String {
    format!(
        "REPORT RequestId: {}\tDuration: {:.2} ms\tBilled Duration: {} ms\tMemory Size: 512 MB\tMax Memory Used: {} MB",
        id,
        duration,
        duration.ceil(),
        memory_used
    )
}

/// One invocation per minute; every `cold_every`-th one starts cold
fn steady_traffic(invocations: i64, cold_every: i64) -> Vec<RawLogLine> {
    let mut lines = Vec::new();
    for i in 0..invocations {
        let id = format!("req-{:04}", i);
        let t = BASE + i * MINUTE;
        let stream = format!("2024/03/10/[$LATEST]{:02}", i % 7);
        if i % cold_every == 0 {
            lines.push(RawLogLine::new(t, format!("INIT_START RequestId: {}", id), &stream));
            lines.push(RawLogLine::new(t + 400, format!("RequestId: {} INIT_DURATION: 400 ms", id), &stream));
        }
        lines.push(RawLogLine::new(t + 450, format!("START RequestId: {} Version: $LATEST", id), &stream));
        lines.push(RawLogLine::new(t + 500, report(&id, 80.0 + (i % 13) as f64 * 7.5, 150 + (i % 5) as u32 * 10), &stream));
        lines.push(RawLogLine::new(t + 501, format!("END RequestId: {}", id), &stream));
    }
    // Out of order delivery
    lines.reverse();
    lines
}

fn window(function_name: &str) -> AnalysisWindow {
    AnalysisWindow::new(
        function_name,
        TimeRange::from_millis(BASE, BASE + 24 * 60 * MINUTE).unwrap(),
    )
}

fn coordinator(source: impl TelemetrySource + 'static) -> AnalysisCoordinator {
    AnalysisCoordinator::new(Arc::new(source), AnalysisConfig::default())
        .unwrap()
        .without_telemetry()
}

/// Test: steady traffic with 5% cold starts is classified as very low frequency
#[tokio::test]
async fn test_steady_traffic_pipeline() -> anyhow::Result<()> {
    let source = InMemoryTelemetrySource::new()
        .with_log_lines("/aws/lambda/orders", steady_traffic(100, 20))
        .with_page_size(64)
        .with_metric(
            "Invocations",
            vec![
                Datapoint { timestamp: BASE, value: 60.0 },
                Datapoint { timestamp: BASE + 60 * MINUTE, value: 40.0 },
            ],
        );

    let analysis = coordinator(source).analyze(&window("orders")).await?;

    assert_eq!(analysis.status, AnalysisStatus::Complete);
    assert_eq!(analysis.total_invocations, 100);
    assert_eq!(analysis.cold_starts.total, 5);
    assert_eq!(analysis.cold_starts.rate, 5.0);
    assert_eq!(analysis.cold_starts.avg_duration_ms, 400.0);
    assert_eq!(analysis.pattern.frequency_class, FrequencyClass::VeryLow);
    assert_eq!(analysis.pattern.peak_hours, vec!["00:00", "01:00"]);
    assert!(!analysis.pattern.clustering_detected);
    assert!(analysis.pattern.triggers.contains(&Trigger::NormalLifecycle));
    assert_eq!(analysis.duration_stats.count, 100);
    assert_eq!(analysis.memory_stats.count, 100);
    assert_eq!(analysis.metric_summary.invocations, Some(50.0));
    assert_eq!(analysis.correlation.complete_records, 100);
    assert_eq!(analysis.correlation.unresolved_init_starts, 0);

    let bucketed: u64 = analysis
        .duration_stats
        .distribution_buckets
        .iter()
        .map(|b| b.count)
        .sum();
    assert_eq!(bucketed, analysis.duration_stats.count);
    Ok(())
}

/// Test: a redeploy burst is reported as a deployment trigger
#[tokio::test]
async fn test_deployment_burst_detected() {
    let mut lines = Vec::new();
    for i in 0..15i64 {
        // Six environments replaced within 45 seconds, the rest spread out
        let t = if i < 6 { BASE + i * 9_000 } else { BASE + i * 30 * MINUTE };
        let id = format!("burst-{}", i);
        let stream = format!("stream-{}", i);
        lines.push(RawLogLine::new(t, "INIT_START Runtime Version: nodejs:20.v13", &stream));
        lines.push(RawLogLine::new(t + 300, "INIT_DURATION: 290.25 ms", &stream));
        lines.push(RawLogLine::new(t + 900, report(&id, 410.0, 210), &stream));
    }
    let source = InMemoryTelemetrySource::new().with_log_lines("/aws/lambda/web", lines);

    let analysis = coordinator(source).analyze(&window("web")).await.unwrap();

    assert_eq!(analysis.cold_starts.total, 15);
    assert_eq!(analysis.cold_starts.min_duration_ms, 290.25);
    assert!(analysis.pattern.clustering_detected);
    assert!(analysis.pattern.triggers.contains(&Trigger::DeploymentUpdate));
    assert!(analysis.pattern.triggers.contains(&Trigger::ScalingEvents));
}

/// Test: a cold start without REPORT keeps its record but no durations
#[tokio::test]
async fn test_partial_record_excluded_from_duration_stats() {
    let lines = vec![
        RawLogLine::new(BASE, "INIT_START RequestId: lost-1", "s1"),
        RawLogLine::new(BASE + 5 * MINUTE, report("ok-1", 12.0, 90), "s2"),
    ];
    let source = InMemoryTelemetrySource::new().with_log_lines("/aws/lambda/jobs", lines);

    let analysis = coordinator(source).analyze(&window("jobs")).await.unwrap();

    assert_eq!(analysis.total_invocations, 2);
    assert_eq!(analysis.cold_starts.total, 1);
    assert_eq!(analysis.cold_starts.init_duration_stats.count, 0);
    assert_eq!(analysis.duration_stats.count, 1);
    assert_eq!(analysis.duration_stats.mean, 12.0);
    assert_eq!(analysis.correlation.complete_records, 1);
}

/// Test: identical input produces identical aggregates
#[tokio::test]
async fn test_analysis_is_idempotent() {
    let source = InMemoryTelemetrySource::new()
        .with_log_lines("/aws/lambda/orders", steady_traffic(250, 9))
        .with_page_size(100);
    let coordinator = coordinator(source);

    let first = coordinator.analyze(&window("orders")).await.unwrap();
    let second = coordinator.analyze(&window("orders")).await.unwrap();

    assert_ne!(first.analysis_id, second.analysis_id);
    assert_eq!(first.duration_stats, second.duration_stats);
    assert_eq!(first.memory_stats, second.memory_stats);
    assert_eq!(first.cold_starts, second.cold_starts);
    assert_eq!(first.pattern, second.pattern);
    assert_eq!(first.correlation, second.correlation);
}

/// Test: the result serializes with camelCase field names
#[tokio::test]
async fn test_result_serialization() {
    let source = InMemoryTelemetrySource::new()
        .with_log_lines("/aws/lambda/orders", steady_traffic(10, 5));

    let analysis = coordinator(source).analyze(&window("orders")).await.unwrap();
    let json = serde_json::to_value(&analysis).unwrap();

    assert_eq!(json["functionName"], "orders");
    assert_eq!(json["totalInvocations"], 10);
    assert_eq!(json["coldStarts"]["total"], 2);
    assert_eq!(json["status"], "complete");
    assert_eq!(json["pattern"]["frequencyClass"], "Moderate");
    assert!(json["durationStats"]["distributionBuckets"].is_array());
    assert_eq!(json["pattern"]["hourlyDistribution"].as_array().map(|a| a.len()), Some(24));
}

/// Test: an unknown log group degrades to the empty result
#[tokio::test]
async fn test_missing_log_group_is_unavailable() {
    let source = InMemoryTelemetrySource::new();

    let analysis = coordinator(source).analyze(&window("ghost")).await.unwrap();

    assert_eq!(analysis.status, AnalysisStatus::TelemetryUnavailable);
    assert_eq!(analysis.total_invocations, 0);
    assert_eq!(analysis.cold_starts.rate, 0.0);
    assert_eq!(analysis.pattern.frequency_class, FrequencyClass::None);
    assert_eq!(analysis.recommendations.len(), 1);
}

/// Test: a bad range token is rejected
#[tokio::test]
async fn test_unrecognized_range_token() {
    let coordinator = coordinator(InMemoryTelemetrySource::new());
    let result = coordinator
        .analyze_range("orders", "fortnight", chrono::Utc::now())
        .await;
    assert!(result.is_err());
}

/// Source that records how many log requests are in flight at once
struct ConcurrencyProbe {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ConcurrencyProbe {
    fn new() -> Self {
        Self {
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl TelemetrySource for ConcurrencyProbe {
    async fn fetch_log_lines(&self, query: &LogQuery) -> Result<LogPage, TelemetryError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if query.log_group_id.ends_with("denied") {
            return Err(TelemetryError::AccessDenied(query.log_group_id.clone()));
        }
        Ok(LogPage {
            lines: vec![RawLogLine::new(
                query.start_time + 1,
                report(&query.log_group_id, 25.0, 64),
                "probe",
            )],
            next_token: None,
        })
    }

    async fn fetch_metric_statistic(
        &self,
        _query: &MetricQuery,
    ) -> Result<Vec<Datapoint>, TelemetryError> {
        Ok(Vec::new())
    }
}

/// Test: concurrent windows are bounded, ordered and isolated
#[tokio::test(start_paused = true)]
async fn test_analyze_many_bounded_and_isolated() {
    let probe = Arc::new(ConcurrencyProbe::new());
    let config = AnalysisConfig {
        max_concurrency: 2,
        ..Default::default()
    };
    let coordinator = AnalysisCoordinator::new(probe.clone(), config)
        .unwrap()
        .without_telemetry();

    let names = ["a", "b", "denied", "c", "d", "e"];
    let windows: Vec<AnalysisWindow> = names.iter().map(|n| window(n)).collect();

    let results = coordinator.analyze_many(windows).await;

    assert_eq!(results.len(), names.len());
    for (name, result) in names.iter().zip(&results) {
        let analysis = result.as_ref().unwrap();
        assert_eq!(analysis.function_name, *name);
        if *name == "denied" {
            assert_eq!(analysis.status, AnalysisStatus::TelemetryUnavailable);
        } else {
            assert_eq!(analysis.status, AnalysisStatus::Complete);
            assert_eq!(analysis.total_invocations, 1);
        }
    }
    assert!(probe.max_in_flight.load(Ordering::SeqCst) <= 2);
}

/// Test: aborting one analysis leaves the others running
#[tokio::test(start_paused = true)]
async fn test_abort_one_analysis() {
    let source = InMemoryTelemetrySource::new()
        .with_log_lines("/aws/lambda/slow", steady_traffic(5, 5))
        .with_log_lines("/aws/lambda/fast", steady_traffic(5, 5))
        .with_latency(Duration::from_millis(200));
    let coordinator = coordinator(source);

    let slow = coordinator.spawn(window("slow"));
    let fast = coordinator.spawn(window("fast"));
    slow.abort();

    let fast = fast.await.unwrap().unwrap();
    assert_eq!(fast.status, AnalysisStatus::Complete);
    assert_eq!(fast.total_invocations, 5);

    assert!(slow.await.unwrap_err().is_cancelled());
}
