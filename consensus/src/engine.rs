//! Consensus engine: merges per-agent score vectors into one result.
//!
//! Aggregation is a pure function of the submission, the roster and the
//! configuration. Inputs are sorted into canonical order before any
//! floating-point summation so the output does not depend on the order in
//! which agents answered.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::cache::CacheKey;
use crate::criteria::{CriteriaSet, Criterion};
use crate::error::{ConsensusError, JuryResult};
use crate::roster::AgentRoster;
use crate::score::{AgentId, ScoreVector, SCORE_MAX, SCORE_MIN};
use crate::submission::Submission;

/// Slack allowed before a composite outside the observed range is treated as a bug.
const RANGE_TOLERANCE: f64 = 1e-9;

/// Tunable thresholds for disagreement, escalation and review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    /// Spread (max − min) above which a criterion counts as divergent
    pub spread_threshold: f64,
    /// How many divergent criteria are tolerated before the run is high-disagreement
    pub max_divergent_criteria: usize,
    /// Overall confidence below which human review is recommended
    pub min_confidence: f64,
    /// Active criteria
    pub criteria: CriteriaSet,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            spread_threshold: 25.0,
            max_divergent_criteria: 0,
            min_confidence: 0.6,
            criteria: CriteriaSet::default(),
        }
    }
}

impl ConsensusConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !self.spread_threshold.is_finite()
            || !(SCORE_MIN..=SCORE_MAX).contains(&self.spread_threshold)
        {
            return Err(format!(
                "spread_threshold {} outside [{}, {}]",
                self.spread_threshold, SCORE_MIN, SCORE_MAX
            ));
        }
        if !self.min_confidence.is_finite() || !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(format!(
                "min_confidence {} outside [0, 1]",
                self.min_confidence
            ));
        }
        if self.max_divergent_criteria >= self.criteria.len() {
            warn!(
                max_divergent_criteria = self.max_divergent_criteria,
                criteria = self.criteria.len(),
                "Disagreement tolerance covers every criterion; runs can never be high-disagreement"
            );
        }
        Ok(())
    }
}

/// Category of an audit note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    Divergence,
    Escalation,
    LowConfidence,
    WeightFallback,
}

impl std::fmt::Display for AuditKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Divergence => write!(f, "divergence"),
            Self::Escalation => write!(f, "escalation"),
            Self::LowConfidence => write!(f, "low_confidence"),
            Self::WeightFallback => write!(f, "weight_fallback"),
        }
    }
}

/// One deterministic line of the aggregation audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditNote {
    pub kind: AuditKind,
    pub detail: String,
}

impl AuditNote {
    fn new(kind: AuditKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

/// Aggregated outcome for one submission under one agent-set version.
///
/// Created once and never mutated; a different roster or configuration
/// produces a separately keyed result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub submission_id: String,
    /// Roster version plus a digest of members, weights and thresholds
    pub agent_set_version: String,
    /// Composite score per criterion
    pub composite: BTreeMap<Criterion, f64>,
    /// Mean of the composites
    pub overall_score: f64,
    /// Weighted mean self-confidence discounted by agreement
    pub confidence: f64,
    /// 0 = agents fully disagree, 1 = full agreement
    pub agreement: f64,
    /// max − min per criterion
    pub spreads: BTreeMap<Criterion, f64>,
    pub divergent_criteria: Vec<Criterion>,
    pub high_disagreement: bool,
    /// Advisory: more agents should be run before trusting the result
    pub escalation: bool,
    /// Confidence fell below the configured review floor
    pub review_recommended: bool,
    /// Contributing agents, sorted
    pub contributors: Vec<AgentId>,
    /// Full roster size at aggregation time
    pub roster_size: usize,
    pub submission_fingerprint: String,
    /// Latest contributing vector timestamp
    pub as_of: DateTime<Utc>,
    #[serde(default)]
    pub audit: Vec<AuditNote>,
}

impl ConsensusResult {
    pub fn key(&self) -> CacheKey {
        CacheKey::new(&self.submission_id, &self.agent_set_version)
    }

    pub fn composite_for(&self, criterion: Criterion) -> Option<f64> {
        self.composite.get(&criterion).copied()
    }

    /// Get a summary line for logging
    pub fn summary_line(&self) -> String {
        format!(
            "{} [{}]: score {:.1}, confidence {:.2}, agreement {:.2}, {}/{} agents{}{}",
            self.submission_id,
            self.agent_set_version,
            self.overall_score,
            self.confidence,
            self.agreement,
            self.contributors.len(),
            self.roster_size,
            if self.escalation { ", escalation" } else { "" },
            if self.review_recommended {
                ", review"
            } else {
                ""
            },
        )
    }
}

/// Stateless aggregator bound to one roster and one configuration.
#[derive(Debug, Clone)]
pub struct ConsensusEngine {
    roster: AgentRoster,
    config: ConsensusConfig,
    agent_set_version: String,
}

impl ConsensusEngine {
    pub fn new(roster: AgentRoster) -> JuryResult<Self> {
        Self::with_config(roster, ConsensusConfig::default())
    }

    /// Build an engine, rejecting rosters and thresholds that cannot aggregate.
    pub fn with_config(roster: AgentRoster, config: ConsensusConfig) -> JuryResult<Self> {
        roster
            .validate()
            .map_err(|e| ConsensusError::InvalidConfiguration(e.to_string()))?;
        config
            .validate()
            .map_err(ConsensusError::InvalidConfiguration)?;
        Ok(Self::unchecked(roster, config))
    }

    /// Build without validation; callers must already have checked both inputs.
    pub(crate) fn unchecked(roster: AgentRoster, config: ConsensusConfig) -> Self {
        let agent_set_version = agent_set_version(&roster, &config);
        Self {
            roster,
            config,
            agent_set_version,
        }
    }

    pub fn roster(&self) -> &AgentRoster {
        &self.roster
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    /// Version tag used in cache keys: `<roster version>#<digest>`.
    pub fn agent_set_version(&self) -> &str {
        &self.agent_set_version
    }

    pub fn key_for(&self, submission_id: &str) -> CacheKey {
        CacheKey::new(submission_id, &self.agent_set_version)
    }

    /// Check that a vector comes from a roster member and covers the active criteria.
    pub fn check_vector(&self, vector: &ScoreVector) -> JuryResult<()> {
        if !self.roster.contains(&vector.agent) {
            return Err(ConsensusError::InvalidScoreVector {
                agent: vector.agent.clone(),
                reason: format!("agent not in roster {}", self.roster.version),
            });
        }
        vector
            .validate(&self.config.criteria)
            .map_err(|reason| ConsensusError::InvalidScoreVector {
                agent: vector.agent.clone(),
                reason,
            })
    }

    /// Aggregate the vectors produced for one submission.
    pub fn aggregate(
        &self,
        submission: &Submission,
        vectors: &[ScoreVector],
    ) -> JuryResult<ConsensusResult> {
        if vectors.is_empty() {
            return Err(ConsensusError::NoAgentsAvailable {
                submission_id: submission.id().to_string(),
                attempted: 0,
            });
        }

        let mut seen = BTreeSet::new();
        for vector in vectors {
            self.check_vector(vector)?;
            if !seen.insert(&vector.agent) {
                return Err(ConsensusError::InvalidScoreVector {
                    agent: vector.agent.clone(),
                    reason: "more than one vector from the same agent".to_string(),
                });
            }
        }

        let mut ordered: Vec<&ScoreVector> = vectors.iter().collect();
        ordered.sort_by(|a, b| a.canonical_cmp(b));

        let mut audit = Vec::new();
        let reliabilities: Vec<f64> = ordered
            .iter()
            .map(|v| self.roster.weight_of(&v.agent).unwrap_or(0.0))
            .collect();

        let mut weights: Vec<f64> = ordered
            .iter()
            .zip(&reliabilities)
            .map(|(v, r)| r * v.confidence)
            .collect();
        if weights.iter().sum::<f64>() <= 0.0 {
            weights = reliabilities.clone();
            audit.push(AuditNote::new(
                AuditKind::WeightFallback,
                "every agent reported zero confidence; weighting by reliability only",
            ));
        }
        let weight_total: f64 = weights.iter().sum();

        let mut composite = BTreeMap::new();
        let mut spreads = BTreeMap::new();
        for criterion in self.config.criteria.iter() {
            let mut min = f64::INFINITY;
            let mut max = f64::NEG_INFINITY;
            let mut weighted = 0.0;
            for (vector, weight) in ordered.iter().zip(&weights) {
                // Presence was checked by check_vector.
                let score = vector.score(criterion).unwrap_or(0.0);
                min = min.min(score);
                max = max.max(score);
                weighted += weight * score;
            }
            let mean = weighted / weight_total;

            if mean.is_nan() || mean < min - RANGE_TOLERANCE || mean > max + RANGE_TOLERANCE {
                error!(
                    submission_id = submission.id(),
                    criterion = %criterion,
                    composite = mean,
                    min,
                    max,
                    "Composite score escaped observed range"
                );
                return Err(ConsensusError::AggregationInvariantViolation {
                    criterion,
                    composite: mean,
                    min,
                    max,
                });
            }

            composite.insert(criterion, mean.clamp(min, max));
            spreads.insert(criterion, max - min);
        }

        let divergent_criteria: Vec<Criterion> = spreads
            .iter()
            .filter(|(_, spread)| **spread > self.config.spread_threshold)
            .map(|(criterion, _)| *criterion)
            .collect();
        for criterion in &divergent_criteria {
            audit.push(AuditNote::new(
                AuditKind::Divergence,
                format!(
                    "{} spread {:.2} exceeds threshold {:.2}",
                    criterion, spreads[criterion], self.config.spread_threshold
                ),
            ));
        }
        let high_disagreement = divergent_criteria.len() > self.config.max_divergent_criteria;

        let mean_spread = spreads.values().sum::<f64>() / spreads.len() as f64;
        let agreement = (1.0 - mean_spread / SCORE_MAX).clamp(0.0, 1.0);

        let reliability_total: f64 = reliabilities.iter().sum();
        let mean_confidence = ordered
            .iter()
            .zip(&reliabilities)
            .map(|(v, r)| r * v.confidence)
            .sum::<f64>()
            / reliability_total;
        let confidence = (mean_confidence * agreement).clamp(0.0, 1.0);

        let responders = ordered.len();
        let roster_size = self.roster.size();
        let escalation = high_disagreement && responders < roster_size;
        if escalation {
            audit.push(AuditNote::new(
                AuditKind::Escalation,
                format!(
                    "{} divergent criteria with {}/{} agents responding",
                    divergent_criteria.len(),
                    responders,
                    roster_size
                ),
            ));
        }

        let review_recommended = confidence < self.config.min_confidence;
        if review_recommended {
            audit.push(AuditNote::new(
                AuditKind::LowConfidence,
                format!(
                    "confidence {:.3} below review floor {:.2}",
                    confidence, self.config.min_confidence
                ),
            ));
        }

        let overall_score = composite.values().sum::<f64>() / composite.len() as f64;
        let as_of = ordered
            .iter()
            .map(|v| v.produced_at)
            .max()
            .unwrap_or_default();

        let result = ConsensusResult {
            submission_id: submission.id().to_string(),
            agent_set_version: self.agent_set_version.clone(),
            composite,
            overall_score,
            confidence,
            agreement,
            spreads,
            divergent_criteria,
            high_disagreement,
            escalation,
            review_recommended,
            contributors: ordered.iter().map(|v| v.agent.clone()).collect(),
            roster_size,
            submission_fingerprint: submission.fingerprint(),
            as_of,
            audit,
        };

        debug!(
            submission_id = submission.id(),
            divergent = result.divergent_criteria.len(),
            "Aggregation details: {:?}",
            result.spreads
        );
        info!(
            submission_id = submission.id(),
            agents = responders,
            roster = roster_size,
            overall = result.overall_score,
            agreement = result.agreement,
            escalation = result.escalation,
            "Consensus reached"
        );

        Ok(result)
    }
}

fn agent_set_version(roster: &AgentRoster, config: &ConsensusConfig) -> String {
    let mut hasher = blake3::Hasher::new();
    for member in &roster.members {
        let id = member.agent.as_str().as_bytes();
        hasher.update(&(id.len() as u64).to_le_bytes());
        hasher.update(id);
        hasher.update(&member.weight.to_bits().to_le_bytes());
    }
    hasher.update(&config.spread_threshold.to_bits().to_le_bytes());
    hasher.update(&(config.max_divergent_criteria as u64).to_le_bytes());
    hasher.update(&config.min_confidence.to_bits().to_le_bytes());
    for criterion in config.criteria.iter() {
        hasher.update(criterion.key().as_bytes());
        hasher.update(b";");
    }
    let digest = hasher.finalize().to_hex();
    format!("{}#{}", roster.version, &digest.as_str()[..8])
}
