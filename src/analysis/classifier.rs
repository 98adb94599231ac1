//! Cold start classification
//!
//! A record is a cold start exactly when an INIT_START fact was associated
//! with it during correlation. A large init duration alone does not make an
//! invocation cold: platforms report `Init Duration` on REPORT lines for
//! provisioned environments too.

use super::correlator::InvocationEvidence;
use super::schemas::InvocationRecord;
use tracing::trace;

/// Cold start classifier
#[derive(Debug, Clone, Copy, Default)]
pub struct ColdStartClassifier;

/// Cold and warm records of one window
#[derive(Debug, Clone, Default)]
pub struct Classification<'a> {
    pub cold: Vec<&'a InvocationRecord>,
    pub warm: Vec<&'a InvocationRecord>,
}

impl Classification<'_> {
    /// Timestamps of cold starts, in record order
    pub fn cold_start_timestamps(&self) -> Vec<i64> {
        self.cold.iter().map(|r| r.timestamp).collect()
    }
}

impl ColdStartClassifier {
    /// Create a new classifier
    pub fn new() -> Self {
        Self
    }

    /// Whether the gathered evidence describes a cold start
    pub fn is_cold_start(&self, evidence: &InvocationEvidence) -> bool {
        let cold = evidence.init_started();
        trace!(request_id = evidence.request_id(), cold, "Classified invocation");
        cold
    }

    /// Split materialized records into cold and warm
    pub fn partition<'a>(&self, records: &'a [InvocationRecord]) -> Classification<'a> {
        let (cold, warm) = records.iter().partition(|r| r.is_cold_start);
        Classification { cold, warm }
    }
}
