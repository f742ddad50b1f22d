//! Evaluation pipeline: fan-out to agents, fan-in to consensus.
//!
//! ```text
//! Submission ──► JoinSet::spawn(agent_i) × N, each under a timeout
//!                     │
//!                     ▼  join_next_with_id (arrival order irrelevant)
//!               ConsensusEngine::aggregate  (pure, canonical order)
//!                     │
//!                     ▼
//!               ResultCache (single flight) ──► DecisionStore
//! ```
//!
//! Per-agent failures (timeout, model error, panic, malformed vector) are
//! absorbed and reported alongside the result; the run fails only when no
//! agent produced a usable vector. Cancelling the token aborts every agent
//! task and releases the submission's cache key; results already cached are
//! still returned.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use jury_consensus::{
    normalize, AgentId, ConsensusEngine, ConsensusError, ConsensusResult, JuryResult,
    RawSubmission, ResultCache, ScoreVector, SharedDecisionStore, SharedResultCache, StoreError,
    Submission,
};
use serde::Serialize;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agents::{Agent, AgentError};

/// Default per-agent budget.
pub const DEFAULT_AGENT_TIMEOUT: Duration = Duration::from_secs(30);

/// One agent that contributed nothing to a run.
#[derive(Debug, Clone, Serialize)]
pub struct AgentFailure {
    pub agent: AgentId,
    #[serde(skip)]
    pub error: AgentError,
    pub kind: &'static str,
    pub message: String,
    pub retriable: bool,
    pub elapsed_ms: u64,
}

impl AgentFailure {
    fn new(agent: AgentId, error: AgentError, elapsed: Duration) -> Self {
        Self {
            agent,
            kind: error.kind(),
            message: error.to_string(),
            retriable: error.is_retriable(),
            elapsed_ms: elapsed.as_millis() as u64,
            error,
        }
    }
}

/// Result of one [`JuryPipeline::evaluate`] call.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub result: Arc<ConsensusResult>,
    /// Agents that failed during this call's computation. Empty when the
    /// result came from the cache or another caller's computation.
    pub failures: Vec<AgentFailure>,
    /// Whether this call ran the agents itself
    pub fresh: bool,
    pub elapsed: Duration,
}

impl PipelineOutcome {
    pub fn billing_signal(&self) -> BillingSignal {
        BillingSignal {
            submission_id: self.result.submission_id.clone(),
            agent_set_version: self.result.agent_set_version.clone(),
            produced: true,
            emitted_at: Utc::now(),
        }
    }
}

/// Notice for the external credit logic: whether a report-grade result exists.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BillingSignal {
    pub submission_id: String,
    pub agent_set_version: String,
    pub produced: bool,
    pub emitted_at: DateTime<Utc>,
}

impl BillingSignal {
    /// Signal for a run that produced no result.
    pub fn not_produced(submission_id: &str, agent_set_version: &str) -> Self {
        Self {
            submission_id: submission_id.to_string(),
            agent_set_version: agent_set_version.to_string(),
            produced: false,
            emitted_at: Utc::now(),
        }
    }
}

/// What the computing caller observed while running the agents.
#[derive(Default)]
struct RunReport {
    fresh: bool,
    failures: Vec<AgentFailure>,
}

/// Runs the jury for one submission at a time; share it with `Arc` to serve
/// many submissions concurrently.
pub struct JuryPipeline {
    agents: Vec<Agent>,
    engine: Arc<ConsensusEngine>,
    cache: SharedResultCache,
    store: Option<SharedDecisionStore>,
    agent_timeout: Duration,
}

impl JuryPipeline {
    /// Build a pipeline. Agents outside the engine's roster, or repeating an
    /// identity already taken, are dropped with a warning.
    pub fn new(engine: ConsensusEngine, agents: Vec<Agent>) -> Self {
        let mut kept: Vec<Agent> = Vec::with_capacity(agents.len());
        for agent in agents {
            let id = agent.id();
            if !engine.roster().contains(&id) {
                warn!(agent = %id, roster = %engine.roster().version, "Agent not in roster, skipping");
                continue;
            }
            if kept.iter().any(|a| a.id() == id) {
                warn!(agent = %id, "Duplicate agent identity, skipping");
                continue;
            }
            kept.push(agent);
        }
        for member in engine.roster().agents() {
            if !kept.iter().any(|a| &a.id() == member) {
                warn!(agent = %member, "Roster member has no agent and will never respond");
            }
        }

        Self {
            agents: kept,
            engine: Arc::new(engine),
            cache: ResultCache::shared(),
            store: None,
            agent_timeout: DEFAULT_AGENT_TIMEOUT,
        }
    }

    /// Share a cache with other pipelines.
    pub fn with_cache(mut self, cache: SharedResultCache) -> Self {
        self.cache = cache;
        self
    }

    /// Record fresh results into `store`, and seed the cache from it.
    pub fn with_store(mut self, store: SharedDecisionStore) -> Result<Self, StoreError> {
        let seeded = self.cache.warm(store.list()?);
        if seeded > 0 {
            info!(seeded, "Result cache warmed from decision store");
        }
        self.store = Some(store);
        Ok(self)
    }

    pub fn with_timeout(mut self, agent_timeout: Duration) -> Self {
        self.agent_timeout = agent_timeout;
        self
    }

    pub fn engine(&self) -> &ConsensusEngine {
        &self.engine
    }

    pub fn cache(&self) -> &SharedResultCache {
        &self.cache
    }

    pub fn agent_ids(&self) -> Vec<AgentId> {
        self.agents.iter().map(Agent::id).collect()
    }

    /// Normalize a raw record, then evaluate it.
    pub async fn evaluate_raw(
        &self,
        raw: RawSubmission,
        cancel: &CancellationToken,
    ) -> JuryResult<PipelineOutcome> {
        let submission = normalize(raw)?;
        self.evaluate(submission, cancel).await
    }

    /// Evaluate one submission, or join an evaluation already in flight for
    /// the same submission and agent-set version.
    ///
    /// A cached result is returned even if `cancel` has already fired.
    pub async fn evaluate(
        &self,
        submission: Submission,
        cancel: &CancellationToken,
    ) -> JuryResult<PipelineOutcome> {
        let start = Instant::now();
        let submission = Arc::new(submission);
        let submission_id = submission.id().to_string();
        let key = self.engine.key_for(&submission_id);

        if let Some(result) = self.cache.get(&key) {
            debug!(key = %key, "Evaluation served from cache");
            return Ok(PipelineOutcome {
                result,
                failures: Vec::new(),
                fresh: false,
                elapsed: start.elapsed(),
            });
        }

        let mut report = RunReport::default();
        let report_slot = &mut report;
        let compute = move || async move {
            report_slot.fresh = true;
            let (vectors, failures) = self.fan_out(Arc::clone(&submission)).await;
            report_slot.failures = failures;

            if vectors.is_empty() {
                return Err(ConsensusError::NoAgentsAvailable {
                    submission_id: submission.id().to_string(),
                    attempted: self.agents.len(),
                });
            }
            let result = self.engine.aggregate(&submission, &vectors)?;
            self.record(&result)?;
            Ok(result)
        };

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(submission_id = %submission_id, "Evaluation cancelled");
                return Err(ConsensusError::Cancelled { submission_id });
            }
            outcome = self.cache.get_or_compute(key, compute) => outcome?,
        };

        let elapsed = start.elapsed();
        info!(
            submission_id = %submission_id,
            agent_set_version = %result.agent_set_version,
            overall_score = result.overall_score,
            confidence = result.confidence,
            failures = report.failures.len(),
            fresh = report.fresh,
            elapsed_ms = elapsed.as_millis() as u64,
            "Evaluation complete"
        );
        Ok(PipelineOutcome {
            result,
            failures: report.failures,
            fresh: report.fresh,
            elapsed,
        })
    }

    /// Run every agent concurrently and collect usable vectors and failures,
    /// each sorted by agent identity.
    async fn fan_out(&self, submission: Arc<Submission>) -> (Vec<ScoreVector>, Vec<AgentFailure>) {
        let criteria = Arc::new(self.engine.config().criteria.clone());
        let budget = self.agent_timeout;
        let mut join_set = JoinSet::new();
        let mut task_agents = HashMap::new();

        for agent in &self.agents {
            let agent = agent.clone();
            let id = agent.id();
            let submission = Arc::clone(&submission);
            let criteria = Arc::clone(&criteria);
            let task_id = id.clone();

            let handle = join_set.spawn(async move {
                let started = Instant::now();
                let result =
                    match tokio::time::timeout(budget, agent.evaluate(&submission, &criteria)).await
                    {
                        Ok(result) => result,
                        Err(_) => Err(AgentError::Timeout {
                            agent: task_id,
                            budget_ms: budget.as_millis() as u64,
                        }),
                    };
                (result, started.elapsed())
            });
            task_agents.insert(handle.id(), id);
        }

        let mut vectors = Vec::new();
        let mut failures = Vec::new();
        while let Some(res) = join_set.join_next_with_id().await {
            match res {
                Ok((task_id, (result, elapsed))) => {
                    let Some(agent) = task_agents.get(&task_id).cloned() else {
                        continue;
                    };
                    match result.and_then(|vector| self.accept(&agent, vector)) {
                        Ok(vector) => {
                            debug!(
                                agent = %agent,
                                confidence = vector.confidence,
                                elapsed_ms = elapsed.as_millis() as u64,
                                "Agent responded"
                            );
                            vectors.push(vector);
                        }
                        Err(error) => {
                            warn!(
                                submission_id = submission.id(),
                                agent = %agent,
                                error = %error,
                                elapsed_ms = elapsed.as_millis() as u64,
                                "Agent failed"
                            );
                            failures.push(AgentFailure::new(agent, error, elapsed));
                        }
                    }
                }
                Err(join_error) => {
                    let Some(agent) = task_agents.get(&join_error.id()).cloned() else {
                        continue;
                    };
                    let message = if join_error.is_panic() {
                        let payload = join_error.into_panic();
                        payload
                            .downcast_ref::<&str>()
                            .map(|s| s.to_string())
                            .or_else(|| payload.downcast_ref::<String>().cloned())
                            .unwrap_or_else(|| "unknown panic payload".to_string())
                    } else {
                        "task cancelled".to_string()
                    };
                    warn!(
                        submission_id = submission.id(),
                        agent = %agent,
                        message = %message,
                        "Agent task panicked"
                    );
                    let error = AgentError::Panicked {
                        agent: agent.clone(),
                        message,
                    };
                    failures.push(AgentFailure::new(agent, error, Duration::ZERO));
                }
            }
        }

        vectors.sort_by(|a, b| a.canonical_cmp(b));
        failures.sort_by(|a, b| a.agent.cmp(&b.agent));
        (vectors, failures)
    }

    /// Reject vectors that claim another identity or fail range/coverage checks.
    fn accept(&self, agent: &AgentId, vector: ScoreVector) -> Result<ScoreVector, AgentError> {
        if &vector.agent != agent {
            return Err(AgentError::InvalidOutput {
                agent: agent.clone(),
                reason: format!("vector signed by {}", vector.agent),
            });
        }
        match self.engine.check_vector(&vector) {
            Ok(()) => Ok(vector),
            Err(ConsensusError::InvalidScoreVector { reason, .. }) => {
                Err(AgentError::InvalidOutput {
                    agent: agent.clone(),
                    reason,
                })
            }
            Err(other) => Err(AgentError::InvalidOutput {
                agent: agent.clone(),
                reason: other.to_string(),
            }),
        }
    }

    fn record(&self, result: &ConsensusResult) -> JuryResult<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        match store.append(result) {
            Ok(()) => Ok(()),
            Err(StoreError::Duplicate(key)) => {
                warn!(key = %key, "Decision already recorded");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::AgentKind;
    use jury_consensus::AgentRoster;

    fn heuristic_pipeline() -> JuryPipeline {
        let roster = [AgentKind::Quality, AgentKind::Market, AgentKind::Technical]
            .iter()
            .fold(AgentRoster::new("test"), |r, k| r.with_member(k.id(), k.default_weight()));
        let agents = AgentKind::all()
            .iter()
            .filter_map(|k| Agent::heuristic(*k))
            .collect();
        JuryPipeline::new(ConsensusEngine::new(roster).unwrap(), agents)
    }

    #[test]
    fn test_agents_outside_roster_are_dropped() {
        let pipeline = heuristic_pipeline();
        let ids: Vec<String> = pipeline
            .agent_ids()
            .iter()
            .map(|id| id.as_str().to_string())
            .collect();
        assert_eq!(ids, vec!["quality", "market", "technical"]);
    }

    #[tokio::test]
    async fn test_heuristic_run_uses_every_agent() {
        let pipeline = heuristic_pipeline();
        let raw = RawSubmission::new("s1", "Tidewater", "A fisherman's daughter inherits the boat.")
            .genre("Drama")
            .runtime(92.0);
        let outcome = pipeline
            .evaluate_raw(raw, &CancellationToken::new())
            .await
            .unwrap();
        assert!(outcome.fresh);
        assert!(outcome.failures.is_empty());
        assert_eq!(outcome.result.contributors.len(), 3);
        assert!(!outcome.result.escalation);

        let signal = outcome.billing_signal();
        assert!(signal.produced);
        assert_eq!(signal.submission_id, "s1");
    }

    #[test]
    fn test_accept_rejects_foreign_or_incomplete_vectors() {
        let pipeline = heuristic_pipeline();
        let quality = AgentId::from("quality");

        let forged = ScoreVector::new("market", 0.9);
        let err = pipeline.accept(&quality, forged).unwrap_err();
        assert_eq!(err.kind(), "invalid_output");
        assert!(err.to_string().contains("signed by market"));

        let partial = ScoreVector::new("quality", 0.9)
            .with_score(jury_consensus::Criterion::Narrative, 50.0);
        let err = pipeline.accept(&quality, partial).unwrap_err();
        assert!(matches!(err, AgentError::InvalidOutput { ref reason, .. } if reason.contains("missing")));
    }

    #[tokio::test]
    async fn test_invalid_raw_submission_fails_before_agents_run() {
        let pipeline = heuristic_pipeline();
        let err = pipeline
            .evaluate_raw(RawSubmission::new("s2", "", "x").runtime(5.0), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION");
        assert_eq!(pipeline.cache().computations(), 0);
    }
}
