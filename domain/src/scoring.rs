//! Pluggable response-quality scoring.
//!
//! What the scorer measures is deliberately outside the contract; the
//! core only relies on a bounded scalar in `[0, 1]` per response.

/// Scores one response against the prompt that produced it.
pub trait QualityScorer: Send + Sync {
    /// Return a quality score in `[0, 1]`. Implementations returning
    /// values outside the range are clamped by the orchestrator.
    fn score(&self, prompt: &str, response: &str) -> f64;
}

/// Scorer returning a constant value. Useful for tests and for
/// sessions where quality weighting should be neutral.
pub struct FixedScorer(pub f64);

impl QualityScorer for FixedScorer {
    fn score(&self, _prompt: &str, _response: &str) -> f64 {
        self.0
    }
}
