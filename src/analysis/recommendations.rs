//! Recommendation generation seam
//!
//! Human-readable advice is produced outside this crate. The coordinator
//! hands each finished analysis to a [`RecommendationGenerator`] and passes
//! its output through unchanged.

use super::schemas::ColdStartAnalysis;

/// Produces recommendation text for a finished analysis
pub trait RecommendationGenerator: Send + Sync {
    /// Recommendations for `analysis`, in display order
    fn recommend(&self, analysis: &ColdStartAnalysis) -> Vec<String>;
}

/// Generator that never recommends anything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRecommendations;

impl RecommendationGenerator for NoRecommendations {
    fn recommend(&self, _analysis: &ColdStartAnalysis) -> Vec<String> {
        Vec::new()
    }
}

impl<F> RecommendationGenerator for F
where
    F: Fn(&ColdStartAnalysis) -> Vec<String> + Send + Sync,
{
    fn recommend(&self, analysis: &ColdStartAnalysis) -> Vec<String> {
        self(analysis)
    }
}
