//! Log line extraction
//!
//! Turns one raw log line into at most one [`ExtractedFact`]. Lines are
//! tokenized on whitespace and read as a sequence of `Label: value [unit]`
//! fields drawn from a fixed label vocabulary, so every matching rule lives
//! in this module and nothing downstream inspects free text for values.

use super::schemas::ExtractedFact;
use crate::telemetry_source::RawLogLine;
use tracing::trace;

/// Marker token of an end-of-invocation summary line
pub const REPORT_MARKER: &str = "REPORT";
/// Marker token of a runtime initialization line
pub const INIT_START_MARKER: &str = "INIT_START";

const REQUEST_ID: &str = "RequestId";
const DURATION: &str = "Duration";
const BILLED_DURATION: &str = "Billed Duration";
const MEMORY_SIZE: &str = "Memory Size";
const MAX_MEMORY_USED: &str = "Max Memory Used";
const INIT_DURATION: &str = "Init Duration";
const INIT_DURATION_FIELD: &str = "INIT_DURATION";

/// Field labels, multi-word labels first so `Billed Duration:` never reads
/// as a bare `Duration:`
const LABELS: &[&str] = &[
    MAX_MEMORY_USED,
    BILLED_DURATION,
    MEMORY_SIZE,
    INIT_DURATION,
    REQUEST_ID,
    DURATION,
    INIT_DURATION_FIELD,
];

const UNITS: &[&str] = &["ms", "MB"];

/// One `Label: value [unit]` field of a line
#[derive(Debug, Clone, PartialEq, Eq)]
struct Field<'a> {
    label: &'static str,
    value: &'a str,
    unit: Option<&'a str>,
}

/// Tokenized view of one log line
struct TokenizedLine<'a> {
    tokens: Vec<&'a str>,
    fields: Vec<Field<'a>>,
}

impl<'a> TokenizedLine<'a> {
    fn new(message: &'a str) -> Self {
        let tokens: Vec<&str> = message.split_whitespace().collect();
        let fields = scan_fields(&tokens);
        Self { tokens, fields }
    }

    fn has_marker(&self, marker: &str) -> bool {
        self.tokens
            .iter()
            .any(|t| trim_token(t).trim_end_matches(':') == marker)
    }

    fn field(&self, label: &str) -> Option<&Field<'a>> {
        self.fields.iter().find(|f| f.label == label)
    }

    fn number(&self, label: &str) -> Option<f64> {
        self.field(label)
            .and_then(|f| f.value.parse::<f64>().ok())
            .filter(|v| v.is_finite())
    }

    /// `RequestId:` field, else the first UUID-shaped token
    fn request_id(&self) -> Option<String> {
        if let Some(field) = self.field(REQUEST_ID) {
            let id = trim_token(field.value);
            if !id.is_empty() {
                return Some(id.to_string());
            }
        }

        self.tokens
            .iter()
            .map(|t| trim_token(t))
            .find(|t| is_uuid_token(t))
            .map(str::to_string)
    }
}

fn scan_fields<'a>(tokens: &[&'a str]) -> Vec<Field<'a>> {
    let mut fields = Vec::new();
    let mut i = 0;

    'scan: while i < tokens.len() {
        for &label in LABELS {
            let words: Vec<&str> = label.split(' ').collect();
            let Some((last, leading)) = words.split_last() else {
                continue;
            };
            let end = i + words.len();
            if end > tokens.len() {
                continue;
            }

            let leading_match = tokens[i..end - 1].iter().zip(leading).all(|(t, w)| t == w);
            let label_token = tokens[end - 1];
            let last_match = label_token.strip_suffix(':') == Some(*last);

            if leading_match && last_match {
                let Some(&value) = tokens.get(end) else {
                    break 'scan;
                };
                let unit = tokens.get(end + 1).copied().filter(|u| UNITS.contains(u));

                fields.push(Field { label, value, unit });
                i = end + 1 + usize::from(unit.is_some());
                continue 'scan;
            }
        }
        i += 1;
    }

    fields
}

fn trim_token(token: &str) -> &str {
    token.trim_matches(|c: char| matches!(c, ',' | ';' | '"' | '\'' | '(' | ')' | '[' | ']'))
}

/// Canonical hyphenated form only (`8-4-4-4-12` hex digits)
fn is_uuid_token(token: &str) -> bool {
    token.len() == 36 && token.as_bytes()[8] == b'-' && uuid::Uuid::try_parse(token).is_ok()
}

/// Stateless parser from raw log lines to extracted facts
#[derive(Debug, Clone, Copy, Default)]
pub struct EventExtractor;

impl EventExtractor {
    /// Create a new extractor
    pub fn new() -> Self {
        Self
    }

    /// Extract the fact carried by `line`, if any
    ///
    /// Unrecognized lines yield `None`; they are not errors.
    pub fn extract(&self, line: &RawLogLine) -> Option<ExtractedFact> {
        let tokenized = TokenizedLine::new(&line.message);

        if tokenized.has_marker(REPORT_MARKER) {
            if let Some(fact) = Self::report_summary(&tokenized) {
                return Some(fact);
            }
            trace!(stream = %line.stream_id, "REPORT line without RequestId/Duration skipped");
        }

        if let Some(duration_ms) = tokenized.number(INIT_DURATION_FIELD) {
            return Some(ExtractedFact::InitDuration {
                request_id: tokenized.request_id(),
                duration_ms,
            });
        }

        if tokenized.has_marker(INIT_START_MARKER) {
            return Some(ExtractedFact::InitStart {
                request_id: tokenized.request_id(),
                timestamp: line.timestamp,
            });
        }

        None
    }

    fn report_summary(line: &TokenizedLine<'_>) -> Option<ExtractedFact> {
        let request_id = line
            .field(REQUEST_ID)
            .map(|f| trim_token(f.value))
            .filter(|id| !id.is_empty())?;
        let total_duration_ms = line.number(DURATION)?;

        Some(ExtractedFact::ReportSummary {
            request_id: request_id.to_string(),
            total_duration_ms,
            billed_duration_ms: line.number(BILLED_DURATION),
            memory_allocated_mb: line.number(MEMORY_SIZE),
            memory_used_mb: line.number(MAX_MEMORY_USED),
            init_duration_ms: line.number(INIT_DURATION),
        })
    }
}
