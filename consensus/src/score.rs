//! Per-agent score vectors.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::criteria::{CriteriaSet, Criterion};

/// Lowest score an agent may assign.
pub const SCORE_MIN: f64 = 0.0;
/// Highest score an agent may assign.
pub const SCORE_MAX: f64 = 100.0;

/// Stable identity of a scoring agent.
///
/// Ordering is lexicographic; it is the tie-break precedence wherever the
/// consensus engine needs a strict order over agents.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AgentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for AgentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One agent's judgment of one submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreVector {
    /// Producing agent
    pub agent: AgentId,
    /// Score per criterion, each in `[SCORE_MIN, SCORE_MAX]`
    pub scores: BTreeMap<Criterion, f64>,
    /// Self-reported confidence in `[0, 1]`
    pub confidence: f64,
    /// When the agent produced the vector
    pub produced_at: DateTime<Utc>,
    /// Short free-text justification
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

impl ScoreVector {
    pub fn new(agent: impl Into<AgentId>, confidence: f64) -> Self {
        Self {
            agent: agent.into(),
            scores: BTreeMap::new(),
            confidence,
            produced_at: Utc::now(),
            rationale: None,
        }
    }

    pub fn with_score(mut self, criterion: Criterion, score: f64) -> Self {
        self.scores.insert(criterion, score);
        self
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = Some(rationale.into());
        self
    }

    pub fn produced_at(mut self, at: DateTime<Utc>) -> Self {
        self.produced_at = at;
        self
    }

    pub fn score(&self, criterion: Criterion) -> Option<f64> {
        self.scores.get(&criterion).copied()
    }

    /// Check ranges and criterion coverage.
    ///
    /// Returns the first problem found as a human-readable reason.
    pub fn validate(&self, criteria: &CriteriaSet) -> Result<(), String> {
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(format!("confidence {} outside [0, 1]", self.confidence));
        }
        for criterion in criteria.iter() {
            match self.scores.get(&criterion) {
                None => return Err(format!("missing score for {}", criterion)),
                Some(score) if !score.is_finite() || !(SCORE_MIN..=SCORE_MAX).contains(score) => {
                    return Err(format!(
                        "{} score {} outside [{}, {}]",
                        criterion, score, SCORE_MIN, SCORE_MAX
                    ));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Total order used to canonicalize input before aggregation: agent
    /// identity first, then timestamp, then the numeric payload.
    pub fn canonical_cmp(&self, other: &Self) -> Ordering {
        self.agent
            .cmp(&other.agent)
            .then_with(|| self.produced_at.cmp(&other.produced_at))
            .then_with(|| self.confidence.total_cmp(&other.confidence))
            .then_with(|| {
                self.scores
                    .iter()
                    .zip(other.scores.iter())
                    .map(|((ca, sa), (cb, sb))| ca.cmp(cb).then_with(|| sa.total_cmp(sb)))
                    .find(|ord| ord.is_ne())
                    .unwrap_or_else(|| self.scores.len().cmp(&other.scores.len()))
            })
    }
}
