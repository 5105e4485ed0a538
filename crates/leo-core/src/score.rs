use crate::types::Recommendation;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Critical => "CRITICAL",
            Severity::High => "HIGH",
            Severity::Medium => "MEDIUM",
            Severity::Low => "LOW",
        }
    }
}

// ---------------------------------------------------------------------------
// ScoreBand
// ---------------------------------------------------------------------------

/// Fixed bands over a 0–100 score: ≥85 high, ≥70 medium, ≥50 low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScoreBand {
    High,
    Medium,
    Low,
    Failing,
}

impl ScoreBand {
    pub fn from_score(score: f64) -> Self {
        if score >= 85.0 {
            ScoreBand::High
        } else if score >= 70.0 {
            ScoreBand::Medium
        } else if score >= 50.0 {
            ScoreBand::Low
        } else {
            ScoreBand::Failing
        }
    }

    /// Judge verdict for the band. Only the high band approves outright.
    pub fn recommendation(self) -> Recommendation {
        match self {
            ScoreBand::High => Recommendation::Approve,
            ScoreBand::Medium | ScoreBand::Low => Recommendation::NeedsRevision,
            ScoreBand::Failing => Recommendation::Reject,
        }
    }
}

// ---------------------------------------------------------------------------
// Weighted aggregate
// ---------------------------------------------------------------------------

/// Weighted mean of 0–10 criterion scores scaled to 0–100.
///
/// Criteria absent from `scores` (or with no weight) are excluded from both
/// numerator and denominator. Returns `None` when nothing was scored.
pub fn weighted_score(scores: &BTreeMap<String, f64>, weights: &BTreeMap<String, u32>) -> Option<f64> {
    let mut num = 0.0;
    let mut den = 0.0;
    for (name, weight) in weights {
        if let Some(s) = scores.get(name) {
            let w = f64::from(*weight);
            num += s.clamp(0.0, 10.0) * w;
            den += w;
        }
    }
    if den == 0.0 {
        return None;
    }
    Some(num / den * 10.0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_weights;

    fn scores(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn all_tens_is_100() {
        let s = scores(&[
            ("safety", 10.0),
            ("specificity", 10.0),
            ("necessity", 10.0),
            ("evidence", 10.0),
            ("atomicity", 10.0),
        ]);
        assert_eq!(weighted_score(&s, &default_weights()), Some(100.0));
    }

    #[test]
    fn all_zeros_is_0() {
        let s = scores(&[
            ("safety", 0.0),
            ("specificity", 0.0),
            ("necessity", 0.0),
            ("evidence", 0.0),
            ("atomicity", 0.0),
        ]);
        assert_eq!(weighted_score(&s, &default_weights()), Some(0.0));
    }

    #[test]
    fn missing_criterion_is_excluded_not_zero() {
        // safety (25) missing: remaining weights 75, all at 8 → 80.
        let s = scores(&[
            ("specificity", 8.0),
            ("necessity", 8.0),
            ("evidence", 8.0),
            ("atomicity", 8.0),
        ]);
        let v = weighted_score(&s, &default_weights()).unwrap();
        assert!((v - 80.0).abs() < 1e-9);
    }

    #[test]
    fn mixed_weights() {
        // 25*10 + 20*5 + 20*5 + 20*5 + 15*10 = 700 / 100 * 10 = 70
        let s = scores(&[
            ("safety", 10.0),
            ("specificity", 5.0),
            ("necessity", 5.0),
            ("evidence", 5.0),
            ("atomicity", 10.0),
        ]);
        let v = weighted_score(&s, &default_weights()).unwrap();
        assert!((v - 70.0).abs() < 1e-9);
    }

    #[test]
    fn nothing_scored_is_none() {
        assert_eq!(weighted_score(&BTreeMap::new(), &default_weights()), None);
    }

    #[test]
    fn bands_and_recommendations() {
        assert_eq!(ScoreBand::from_score(85.0), ScoreBand::High);
        assert_eq!(ScoreBand::from_score(84.9), ScoreBand::Medium);
        assert_eq!(ScoreBand::from_score(70.0), ScoreBand::Medium);
        assert_eq!(ScoreBand::from_score(50.0), ScoreBand::Low);
        assert_eq!(ScoreBand::from_score(49.0), ScoreBand::Failing);
        assert_eq!(ScoreBand::High.recommendation(), Recommendation::Approve);
        assert_eq!(ScoreBand::Low.recommendation(), Recommendation::NeedsRevision);
        assert_eq!(ScoreBand::Failing.recommendation(), Recommendation::Reject);
    }

    #[test]
    fn severity_serializes_uppercase() {
        assert_eq!(
            serde_json::to_string(&Severity::Critical).unwrap(),
            "\"CRITICAL\""
        );
    }
}
