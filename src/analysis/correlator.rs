//! Invocation correlation
//!
//! Reassembles per-invocation records from an unordered stream of log
//! lines. INIT_START and INIT_DURATION lines do not always carry the
//! request id, so they are bound to an invocation by proximity: an
//! INIT_START opens a correlation window on its log stream, and facts that
//! arrive inside that window are attributed to the window's invocation
//! unless they name another one. A REPORT line's own `RequestId` always
//! wins.
//!
//! The correlation is a fold over time-ordered facts into a map keyed by
//! request id; records are materialized once, at the end.

use super::classifier::ColdStartClassifier;
use super::extractor::EventExtractor;
use super::schemas::{AnalysisConfig, CorrelationStats, ExtractedFact, InvocationRecord};
use crate::telemetry_source::RawLogLine;
use std::collections::HashMap;
use tracing::{debug, trace};

/// Default association horizon after an INIT_START (milliseconds)
pub const DEFAULT_CORRELATION_WINDOW_MS: u64 = 30_000;

/// Facts gathered for one request id before materialization
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationEvidence {
    request_id: String,
    first_seen: i64,
    init_started: bool,
    init_duration_ms: Option<f64>,
    total_duration_ms: Option<f64>,
    billed_duration_ms: Option<f64>,
    memory_allocated_mb: Option<f64>,
    memory_used_mb: Option<f64>,
}

impl InvocationEvidence {
    pub(crate) fn new(request_id: impl Into<String>, first_seen: i64) -> Self {
        Self {
            request_id: request_id.into(),
            first_seen,
            init_started: false,
            init_duration_ms: None,
            total_duration_ms: None,
            billed_duration_ms: None,
            memory_allocated_mb: None,
            memory_used_mb: None,
        }
    }

    pub(crate) fn with_init_start(mut self) -> Self {
        self.init_started = true;
        self
    }

    /// Request id the evidence belongs to
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Whether an INIT_START fact was associated with the invocation
    pub fn init_started(&self) -> bool {
        self.init_started
    }

    fn touch(&mut self, timestamp: i64) {
        self.first_seen = self.first_seen.min(timestamp);
    }

    fn into_record(self, classifier: &ColdStartClassifier) -> InvocationRecord {
        InvocationRecord {
            is_cold_start: classifier.is_cold_start(&self),
            request_id: self.request_id,
            timestamp: self.first_seen,
            init_duration_ms: self.init_duration_ms,
            total_duration_ms: self.total_duration_ms,
            billed_duration_ms: self.billed_duration_ms,
            memory_allocated_mb: self.memory_allocated_mb,
            memory_used_mb: self.memory_used_mb,
        }
    }
}

/// Correlation window opened by an INIT_START on one log stream
#[derive(Debug, Clone)]
struct OpenWindow {
    request_id: Option<String>,
    opened_at: i64,
    /// INIT_DURATION seen before the window learned its request id
    pending_init_duration_ms: Option<f64>,
}

impl OpenWindow {
    fn covers(&self, timestamp: i64, horizon_ms: i64) -> bool {
        timestamp >= self.opened_at && timestamp <= self.opened_at.saturating_add(horizon_ms)
    }
}

/// One extracted fact with the line it came from
struct Observation<'a> {
    sequence: usize,
    line: &'a RawLogLine,
    fact: ExtractedFact,
}

#[derive(Default)]
struct CorrelationState {
    evidence: HashMap<String, InvocationEvidence>,
    windows: HashMap<String, OpenWindow>,
    stats: CorrelationStats,
}

impl CorrelationState {
    fn apply(mut self, observation: &Observation<'_>, horizon_ms: i64) -> Self {
        let line = observation.line;
        let timestamp = line.timestamp;

        match &observation.fact {
            ExtractedFact::InitStart { request_id, .. } => {
                if let Some(id) = request_id {
                    self.evidence_for(id, timestamp).init_started = true;
                }
                let replaced = self.windows.insert(
                    line.stream_id.clone(),
                    OpenWindow {
                        request_id: request_id.clone(),
                        opened_at: timestamp,
                        pending_init_duration_ms: None,
                    },
                );
                self.close(replaced);
            }

            ExtractedFact::InitDuration {
                request_id,
                duration_ms,
            } => {
                let resolved = request_id
                    .clone()
                    .or_else(|| self.resolve_by_proximity(line, horizon_ms));

                match resolved {
                    Some(id) => {
                        self.evidence_for(&id, timestamp).init_duration_ms = Some(*duration_ms);
                    }
                    None => match self.windows.get_mut(&line.stream_id) {
                        Some(window) if window.covers(timestamp, horizon_ms) => {
                            window.pending_init_duration_ms = Some(*duration_ms);
                        }
                        _ => {
                            trace!(stream = %line.stream_id, timestamp, "INIT_DURATION without invocation");
                            self.stats.orphan_init_durations += 1;
                        }
                    },
                }
            }

            ExtractedFact::ReportSummary {
                request_id,
                total_duration_ms,
                billed_duration_ms,
                memory_allocated_mb,
                memory_used_mb,
                init_duration_ms,
            } => {
                let evidence = self.evidence_for(request_id, timestamp);
                evidence.total_duration_ms = Some(*total_duration_ms);
                evidence.billed_duration_ms = *billed_duration_ms;
                evidence.memory_allocated_mb = *memory_allocated_mb;
                evidence.memory_used_mb = *memory_used_mb;
                if init_duration_ms.is_some() {
                    evidence.init_duration_ms = *init_duration_ms;
                }

                self.bind_window(line, request_id, horizon_ms);
            }
        }

        self
    }

    fn evidence_for(&mut self, request_id: &str, timestamp: i64) -> &mut InvocationEvidence {
        let evidence = self
            .evidence
            .entry(request_id.to_string())
            .or_insert_with(|| InvocationEvidence::new(request_id, timestamp));
        evidence.touch(timestamp);
        evidence
    }

    /// Request id of an open window whose id appears in the line text,
    /// else of the window open on the line's own stream
    fn resolve_by_proximity(&self, line: &RawLogLine, horizon_ms: i64) -> Option<String> {
        let mentioned = self
            .windows
            .values()
            .filter(|w| w.covers(line.timestamp, horizon_ms))
            .filter_map(|w| w.request_id.as_deref())
            .filter(|id| line.message.contains(id))
            // Longest id wins so a prefix id cannot mis-bind; equal lengths break on the id
            .max_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
        if let Some(id) = mentioned {
            return Some(id.to_string());
        }

        self.windows
            .get(&line.stream_id)
            .filter(|w| w.covers(line.timestamp, horizon_ms))
            .and_then(|w| w.request_id.clone())
    }

    /// Close the stream's window on a REPORT that belongs to it
    ///
    /// An anonymous window takes the REPORT's id. A window already bound to
    /// a different id stays open: the REPORT's own id is authoritative.
    fn bind_window(&mut self, line: &RawLogLine, request_id: &str, horizon_ms: i64) {
        let window_request_id = match self.windows.get(&line.stream_id) {
            Some(window) if window.covers(line.timestamp, horizon_ms) => window.request_id.clone(),
            _ => return,
        };

        match window_request_id.as_deref() {
            Some(id) if id == request_id => {
                self.windows.remove(&line.stream_id);
            }
            Some(other) => {
                debug!(
                    window_request_id = other,
                    report_request_id = request_id,
                    "REPORT names a different invocation than the open window"
                );
            }
            None => {
                if let Some(window) = self.windows.remove(&line.stream_id) {
                    let evidence = self.evidence_for(request_id, window.opened_at);
                    evidence.init_started = true;
                    if evidence.init_duration_ms.is_none() {
                        evidence.init_duration_ms = window.pending_init_duration_ms;
                    }
                }
            }
        }
    }

    fn close(&mut self, window: Option<OpenWindow>) {
        if let Some(window) = window {
            if window.request_id.is_none() {
                self.stats.unresolved_init_starts += 1;
                if window.pending_init_duration_ms.is_some() {
                    self.stats.orphan_init_durations += 1;
                }
            }
        }
    }

    fn finish(mut self, classifier: &ColdStartClassifier) -> Correlation {
        let leftover: Vec<OpenWindow> = self.windows.drain().map(|(_, w)| w).collect();
        for window in leftover {
            self.close(Some(window));
        }

        let mut records: Vec<InvocationRecord> = self
            .evidence
            .into_values()
            .map(|e| e.into_record(classifier))
            .collect();
        records.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.request_id.cmp(&b.request_id))
        });

        let mut stats = self.stats;
        stats.records = records.len() as u64;
        stats.complete_records = records.iter().filter(|r| r.is_complete()).count() as u64;

        Correlation { records, stats }
    }
}

/// Records reconstructed from one window's log lines
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Correlation {
    /// One record per request id, ordered by first-seen time
    pub records: Vec<InvocationRecord>,
    pub stats: CorrelationStats,
}

/// Groups extracted facts into invocation records
#[derive(Debug, Clone)]
pub struct InvocationCorrelator {
    extractor: EventExtractor,
    classifier: ColdStartClassifier,
    horizon_ms: i64,
}

impl Default for InvocationCorrelator {
    fn default() -> Self {
        Self::new(DEFAULT_CORRELATION_WINDOW_MS)
    }
}

impl InvocationCorrelator {
    /// Create a correlator with the given association horizon
    pub fn new(correlation_window_ms: u64) -> Self {
        Self {
            extractor: EventExtractor::new(),
            classifier: ColdStartClassifier::new(),
            horizon_ms: i64::try_from(correlation_window_ms).unwrap_or(i64::MAX),
        }
    }

    /// Create a correlator from analysis configuration
    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(config.correlation_window_ms)
    }

    /// Correlate raw log lines into invocation records
    ///
    /// No lines yield an empty correlation, never an error.
    pub fn correlate(&self, lines: &[RawLogLine]) -> Correlation {
        let mut observations: Vec<Observation<'_>> = lines
            .iter()
            .enumerate()
            .filter_map(|(sequence, line)| {
                self.extractor.extract(line).map(|fact| Observation {
                    sequence,
                    line,
                    fact,
                })
            })
            .collect();
        observations.sort_by_key(|o| (o.line.timestamp, o.sequence));

        let facts_extracted = observations.len() as u64;
        let mut correlation = observations
            .iter()
            .fold(CorrelationState::default(), |state, observation| {
                state.apply(observation, self.horizon_ms)
            })
            .finish(&self.classifier);

        correlation.stats.lines_scanned = lines.len() as u64;
        correlation.stats.facts_extracted = facts_extracted;

        debug!(
            lines = lines.len(),
            facts = facts_extracted,
            records = correlation.stats.records,
            complete = correlation.stats.complete_records,
            unresolved_init_starts = correlation.stats.unresolved_init_starts,
            "Correlation complete"
        );
        correlation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STREAM: &str = "2024/03/10/[$LATEST]0f1e2d";

    fn line(timestamp: i64, message: &str) -> RawLogLine {
        RawLogLine::new(timestamp, message, STREAM)
    }

    fn report(id: &str, duration: f64) -> String {
        format!(
            "REPORT RequestId: {} Duration: {} ms Billed Duration: {} ms Memory Size: 512 MB Max Memory Used: 300 MB",
            id, duration, duration
        )
    }

    #[test]
    fn test_full_cold_invocation() {
        let lines = vec![
            line(0, "INIT_START RequestId: A"),
            line(1200, "RequestId: A INIT_DURATION: 1200 ms"),
            line(2600, &report("A", 1300.0)),
        ];

        let correlation = InvocationCorrelator::default().correlate(&lines);

        assert_eq!(correlation.records.len(), 1);
        let record = &correlation.records[0];
        assert_eq!(record.request_id, "A");
        assert!(record.is_cold_start);
        assert_eq!(record.timestamp, 0);
        assert_eq!(record.init_duration_ms, Some(1200.0));
        assert_eq!(record.total_duration_ms, Some(1300.0));
        assert_eq!(record.billed_duration_ms, Some(1300.0));
        assert_eq!(record.memory_allocated_mb, Some(512.0));
        assert_eq!(record.memory_used_mb, Some(300.0));
    }

    #[test]
    fn test_unordered_lines_are_sorted_first() {
        let lines = vec![
            line(2600, &report("A", 1300.0)),
            line(1200, "INIT_DURATION: 1200 ms"),
            line(0, "INIT_START RequestId: A"),
        ];

        let correlation = InvocationCorrelator::default().correlate(&lines);

        assert_eq!(correlation.records.len(), 1);
        assert_eq!(correlation.records[0].init_duration_ms, Some(1200.0));
        assert!(correlation.records[0].is_cold_start);
    }

    #[test]
    fn test_init_start_without_report_is_partial() {
        let lines = vec![line(0, "INIT_START RequestId: A")];

        let correlation = InvocationCorrelator::default().correlate(&lines);

        let record = &correlation.records[0];
        assert!(record.is_cold_start);
        assert!(!record.is_complete());
        assert_eq!(record.init_duration_ms, None);
        assert_eq!(record.total_duration_ms, None);
        assert_eq!(record.memory_used_mb, None);
        assert_eq!(correlation.stats.complete_records, 0);
    }

    #[test]
    fn test_anonymous_init_start_binds_to_next_report_on_stream() {
        let lines = vec![
            line(1_000, "INIT_START Runtime Version: python:3.12.v18"),
            line(1_400, "INIT_DURATION: 380.5 ms"),
            line(1_900, &report("B", 20.0)),
        ];

        let correlation = InvocationCorrelator::default().correlate(&lines);

        assert_eq!(correlation.records.len(), 1);
        let record = &correlation.records[0];
        assert_eq!(record.request_id, "B");
        assert!(record.is_cold_start);
        assert_eq!(record.timestamp, 1_000);
        assert_eq!(record.init_duration_ms, Some(380.5));
        assert_eq!(correlation.stats.unresolved_init_starts, 0);
    }

    #[test]
    fn test_report_outside_horizon_does_not_bind_anonymous_init() {
        let lines = vec![
            line(0, "INIT_START Runtime Version: python:3.12.v18"),
            line(45_000, &report("C", 10.0)),
        ];

        let correlation = InvocationCorrelator::new(30_000).correlate(&lines);

        assert_eq!(correlation.records.len(), 1);
        assert!(!correlation.records[0].is_cold_start);
        assert_eq!(correlation.stats.unresolved_init_starts, 1);
    }

    #[test]
    fn test_report_request_id_overrides_proximity() {
        let lines = vec![
            line(0, "INIT_START RequestId: A"),
            line(500, &report("Z", 40.0)),
        ];

        let correlation = InvocationCorrelator::default().correlate(&lines);

        assert_eq!(correlation.records.len(), 2);
        let a = correlation.records.iter().find(|r| r.request_id == "A").unwrap();
        let z = correlation.records.iter().find(|r| r.request_id == "Z").unwrap();
        assert!(a.is_cold_start);
        assert_eq!(a.total_duration_ms, None);
        assert!(!z.is_cold_start);
        assert_eq!(z.total_duration_ms, Some(40.0));
    }

    #[test]
    fn test_duplicate_reports_last_write_wins() {
        let lines = vec![
            line(100, &report("D", 10.0)),
            line(200, &report("D", 25.0)),
        ];

        let correlation = InvocationCorrelator::default().correlate(&lines);

        assert_eq!(correlation.records.len(), 1);
        assert_eq!(correlation.records[0].total_duration_ms, Some(25.0));
        assert_eq!(correlation.records[0].timestamp, 100);
    }

    #[test]
    fn test_init_duration_bound_by_id_mentioned_in_text() {
        let lines = vec![
            RawLogLine::new(0, "INIT_START RequestId: req-77", "stream-1"),
            RawLogLine::new(0, "INIT_START RequestId: req-88", "stream-2"),
            RawLogLine::new(900, "extension req-88 INIT_DURATION: 900 ms", "stream-3"),
        ];

        let correlation = InvocationCorrelator::default().correlate(&lines);

        let r88 = correlation.records.iter().find(|r| r.request_id == "req-88").unwrap();
        let r77 = correlation.records.iter().find(|r| r.request_id == "req-77").unwrap();
        assert_eq!(r88.init_duration_ms, Some(900.0));
        assert_eq!(r77.init_duration_ms, None);
    }

    #[test]
    fn test_equal_length_mentions_resolve_the_same_way_every_run() {
        let lines = vec![
            RawLogLine::new(0, "INIT_START RequestId: req-77", "stream-1"),
            RawLogLine::new(0, "INIT_START RequestId: req-88", "stream-2"),
            RawLogLine::new(900, "ext req-77 req-88 INIT_DURATION: 900 ms", "stream-3"),
        ];

        for _ in 0..200 {
            let correlation = InvocationCorrelator::default().correlate(&lines);
            let owner = correlation
                .records
                .iter()
                .find(|r| r.init_duration_ms.is_some())
                .map(|r| r.request_id.as_str());
            assert_eq!(owner, Some("req-88"));
        }
    }

    #[test]
    fn test_orphan_init_duration_counted() {
        let lines = vec![line(0, "INIT_DURATION: 12 ms"), line(5, "some application output")];

        let correlation = InvocationCorrelator::default().correlate(&lines);

        assert!(correlation.records.is_empty());
        assert_eq!(correlation.stats.orphan_init_durations, 1);
        assert_eq!(correlation.stats.lines_scanned, 2);
        assert_eq!(correlation.stats.facts_extracted, 1);
    }

    #[test]
    fn test_empty_input() {
        let correlation = InvocationCorrelator::default().correlate(&[]);
        assert!(correlation.records.is_empty());
        assert_eq!(correlation.stats, CorrelationStats::default());
    }

    #[test]
    fn test_platform_report_init_duration_without_init_start_is_warm() {
        let message = format!("{} Init Duration: 210.0 ms", report("E", 30.0));
        let correlation = InvocationCorrelator::default().correlate(&[line(0, &message)]);

        let record = &correlation.records[0];
        assert_eq!(record.init_duration_ms, Some(210.0));
        assert!(!record.is_cold_start);
    }
}
