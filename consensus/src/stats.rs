//! Summary statistics over recorded decisions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::criteria::Criterion;
use crate::engine::ConsensusResult;

/// Aggregate view of a set of decisions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionStats {
    pub total: usize,
    pub mean_overall_score: f64,
    pub mean_confidence: f64,
    pub mean_agreement: f64,
    pub escalations: usize,
    /// Percentage of decisions flagged for escalation
    pub escalation_rate: f64,
    pub reviews_recommended: usize,
    pub per_criterion_means: BTreeMap<Criterion, f64>,
}

impl DecisionStats {
    pub fn from_results(results: &[ConsensusResult]) -> Self {
        if results.is_empty() {
            return Self::default();
        }
        let n = results.len() as f64;
        let mean = |f: fn(&ConsensusResult) -> f64| results.iter().map(f).sum::<f64>() / n;

        let mut sums: BTreeMap<Criterion, (f64, usize)> = BTreeMap::new();
        for result in results {
            for (criterion, score) in &result.composite {
                let entry = sums.entry(*criterion).or_insert((0.0, 0));
                entry.0 += score;
                entry.1 += 1;
            }
        }

        let escalations = results.iter().filter(|r| r.escalation).count();
        Self {
            total: results.len(),
            mean_overall_score: mean(|r| r.overall_score),
            mean_confidence: mean(|r| r.confidence),
            mean_agreement: mean(|r| r.agreement),
            escalations,
            escalation_rate: escalations as f64 / n * 100.0,
            reviews_recommended: results.iter().filter(|r| r.review_recommended).count(),
            per_criterion_means: sums
                .into_iter()
                .map(|(c, (sum, count))| (c, sum / count as f64))
                .collect(),
        }
    }

    /// Get a summary line for logging
    pub fn summary_line(&self) -> String {
        format!(
            "{} decisions: mean score {:.1}, mean confidence {:.2}, mean agreement {:.2}, {} escalations ({:.1}%), {} flagged for review",
            self.total,
            self.mean_overall_score,
            self.mean_confidence,
            self.mean_agreement,
            self.escalations,
            self.escalation_rate,
            self.reviews_recommended,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ConsensusEngine;
    use crate::roster::AgentRoster;
    use crate::score::ScoreVector;
    use crate::submission::{normalize, RawSubmission};

    fn decide(id: &str, scores: &[(&str, f64)]) -> ConsensusResult {
        let roster = AgentRoster::new("v1")
            .with_member("a", 1.0)
            .with_member("b", 1.0)
            .with_member("c", 1.0);
        let engine = ConsensusEngine::new(roster).unwrap();
        let submission =
            normalize(RawSubmission::new(id, "Title", "Synopsis.").runtime(80.0)).unwrap();
        let vectors: Vec<ScoreVector> = scores
            .iter()
            .map(|(agent, score)| {
                Criterion::all()
                    .iter()
                    .fold(ScoreVector::new(*agent, 0.9), |v, c| v.with_score(*c, *score))
            })
            .collect();
        engine.aggregate(&submission, &vectors).unwrap()
    }

    #[test]
    fn test_empty_stats() {
        let stats = DecisionStats::from_results(&[]);
        assert_eq!(stats.total, 0);
        assert_eq!(stats.escalation_rate, 0.0);
    }

    #[test]
    fn test_stats_counts_escalations() {
        let calm = decide("s1", &[("a", 60.0), ("b", 60.0), ("c", 60.0)]);
        let split = decide("s2", &[("a", 10.0), ("b", 90.0)]);
        assert!(!calm.escalation);
        assert!(split.escalation);

        let stats = DecisionStats::from_results(&[calm, split]);
        assert_eq!(stats.total, 2);
        assert_eq!(stats.escalations, 1);
        assert_eq!(stats.escalation_rate, 50.0);
        assert_eq!(stats.mean_overall_score, 55.0);
        assert_eq!(stats.per_criterion_means[&Criterion::Craft], 55.0);
        assert!(stats.summary_line().starts_with("2 decisions"));
    }
}
