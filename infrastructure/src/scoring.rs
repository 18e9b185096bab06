//! Default quality scorer.
//!
//! The core only requires a bounded scalar per response; this scorer
//! derives one from surface features (length saturation and lexical
//! variety) so sessions have a usable signal without an external
//! judge. Callers wanting model-graded quality plug in their own
//! [`QualityScorer`].

use chorus_domain::QualityScorer;
use std::collections::HashSet;

/// Target word count at which the length component saturates.
const SATURATION_WORDS: usize = 120;

pub struct LengthHeuristicScorer;

impl QualityScorer for LengthHeuristicScorer {
    fn score(&self, _prompt: &str, response: &str) -> f64 {
        let words: Vec<&str> = response.split_whitespace().collect();
        if words.is_empty() {
            return 0.0;
        }

        let length_component = (words.len() as f64 / SATURATION_WORDS as f64).min(1.0);

        let distinct: HashSet<String> = words.iter().map(|w| w.to_lowercase()).collect();
        let variety_component = distinct.len() as f64 / words.len() as f64;

        (0.6 * length_component + 0.4 * variety_component).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_response_scores_zero() {
        assert_eq!(LengthHeuristicScorer.score("p", "   "), 0.0);
    }

    #[test]
    fn test_longer_varied_text_scores_higher() {
        let short = "yes";
        let long = "The tradeoff here hinges on latency tolerance; \
                    batching amortizes the connection cost but delays \
                    the first visible token, which matters for \
                    interactive sessions far more than for bulk runs.";
        let scorer = LengthHeuristicScorer;
        assert!(scorer.score("p", long) > scorer.score("p", short));
    }

    #[test]
    fn test_repetition_penalized_at_equal_length() {
        let repeated = "word ".repeat(150);
        let varied: String = (0..150).map(|n| format!("token{n} ")).collect();
        let scorer = LengthHeuristicScorer;
        assert!(scorer.score("p", &repeated) < scorer.score("p", &varied));
    }

    #[test]
    fn test_score_bounded() {
        let huge = "alpha beta gamma delta ".repeat(500);
        let score = LengthHeuristicScorer.score("p", &huge);
        assert!((0.0..=1.0).contains(&score));
    }
}
