//! Scoring agents.
//!
//! The jury is a closed set of estimators. Four are deterministic heuristics
//! over the normalized submission; the panel agent asks an external model
//! through an injected [`ModelClient`](panel::ModelClient).
//!
//! Heuristics reason on the 1–10 scale festival juries use and convert to
//! the 0–100 score range only when building the [`ScoreVector`].

pub mod festival;
pub mod market;
pub mod panel;
pub mod quality;
pub mod technical;

use std::fmt;

use jury_consensus::{AgentId, CriteriaSet, Criterion, ScoreVector, Submission, Theme};
use thiserror::Error;

pub use festival::{FestivalAgent, FestivalMatch};
pub use market::MarketAgent;
pub use panel::{HttpModelClient, ModelClient, PanelAgent};
pub use quality::QualityAgent;
pub use technical::TechnicalAgent;

/// Highest confidence a heuristic agent will claim.
pub const CONFIDENCE_CAP: f64 = 0.95;

/// Kinds of agent the jury knows how to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentKind {
    Quality,
    Market,
    Festival,
    Technical,
    Panel,
}

impl AgentKind {
    pub fn all() -> &'static [AgentKind] {
        &[
            AgentKind::Quality,
            AgentKind::Market,
            AgentKind::Festival,
            AgentKind::Technical,
            AgentKind::Panel,
        ]
    }

    /// Stable roster identity.
    pub fn id(&self) -> &'static str {
        match self {
            Self::Quality => "quality",
            Self::Market => "market",
            Self::Festival => "festival",
            Self::Technical => "technical",
            Self::Panel => "panel",
        }
    }

    /// Reliability weight used when the roster does not override it.
    pub fn default_weight(&self) -> f64 {
        match self {
            Self::Quality => 1.0,
            Self::Market => 0.85,
            Self::Festival => 0.9,
            Self::Technical => 0.7,
            Self::Panel => 0.8,
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::all().iter().copied().find(|k| k.id() == id)
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Per-agent failure. Absorbed by the pipeline; never fails a submission alone.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AgentError {
    #[error("Agent {agent} exceeded its {budget_ms}ms budget")]
    Timeout { agent: AgentId, budget_ms: u64 },

    #[error("Model call failed: {0}")]
    Model(String),

    #[error("Unparseable model verdict: {0}")]
    Parse(String),

    #[error("Agent {agent} panicked: {message}")]
    Panicked { agent: AgentId, message: String },

    #[error("Agent {agent} produced an invalid score vector: {reason}")]
    InvalidOutput { agent: AgentId, reason: String },
}

impl AgentError {
    /// Returns `true` if re-running the same agent may succeed.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Model(_) | Self::Parse(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::Model(_) => "model",
            Self::Parse(_) => "parse",
            Self::Panicked { .. } => "panicked",
            Self::InvalidOutput { .. } => "invalid_output",
        }
    }
}

/// One jury member.
#[derive(Clone)]
pub enum Agent {
    Quality(QualityAgent),
    Market(MarketAgent),
    Festival(FestivalAgent),
    Technical(TechnicalAgent),
    Panel(PanelAgent),
}

impl Agent {
    /// Build the heuristic agent for `kind`. Returns `None` for `Panel`,
    /// which needs a model client.
    pub fn heuristic(kind: AgentKind) -> Option<Self> {
        match kind {
            AgentKind::Quality => Some(Self::Quality(QualityAgent)),
            AgentKind::Market => Some(Self::Market(MarketAgent)),
            AgentKind::Festival => Some(Self::Festival(FestivalAgent)),
            AgentKind::Technical => Some(Self::Technical(TechnicalAgent)),
            AgentKind::Panel => None,
        }
    }

    pub fn kind(&self) -> AgentKind {
        match self {
            Self::Quality(_) => AgentKind::Quality,
            Self::Market(_) => AgentKind::Market,
            Self::Festival(_) => AgentKind::Festival,
            Self::Technical(_) => AgentKind::Technical,
            Self::Panel(_) => AgentKind::Panel,
        }
    }

    pub fn id(&self) -> AgentId {
        match self {
            Self::Panel(panel) => panel.id().clone(),
            other => AgentId::from(other.kind().id()),
        }
    }

    /// Score one submission. Independent across calls.
    pub async fn evaluate(
        &self,
        submission: &Submission,
        criteria: &CriteriaSet,
    ) -> Result<ScoreVector, AgentError> {
        match self {
            Self::Quality(agent) => Ok(agent.evaluate(submission, criteria)),
            Self::Market(agent) => Ok(agent.evaluate(submission, criteria)),
            Self::Festival(agent) => Ok(agent.evaluate(submission, criteria)),
            Self::Technical(agent) => Ok(agent.evaluate(submission, criteria)),
            Self::Panel(agent) => agent.evaluate(submission, criteria).await,
        }
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Agent").field(&self.id()).finish()
    }
}

// ── Shared heuristics ──────────────────────────────────────────────────────

/// Best festival track record found in the submission metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum AwardRecord {
    None,
    Finalist,
    OfficialSelection,
    Winner,
}

/// Signals every heuristic agent reads from a submission.
#[derive(Debug, Clone)]
pub(crate) struct Signals {
    pub runtime: f64,
    pub awards: AwardRecord,
    pub has_award_metadata: bool,
    pub prior_mean: Option<f64>,
    pub first_time_filmmaker: bool,
    pub country: Option<String>,
    pub rich_synopsis: bool,
    pub themes: Vec<Theme>,
}

impl Signals {
    pub fn read(submission: &Submission) -> Self {
        let award_text = submission
            .metadata("screenings_awards")
            .or_else(|| submission.metadata("awards"))
            .unwrap_or("");
        let awards = if award_text.contains("Winner") || award_text.contains("Award") {
            AwardRecord::Winner
        } else if award_text.contains("Official Selection") {
            AwardRecord::OfficialSelection
        } else if award_text.contains("Finalist") {
            AwardRecord::Finalist
        } else {
            AwardRecord::None
        };

        let first_time_filmmaker = submission
            .metadata("first_time_filmmaker")
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "yes" | "1" | "y"))
            .unwrap_or(false);

        Self {
            runtime: submission.runtime_minutes(),
            awards,
            has_award_metadata: !award_text.trim().is_empty(),
            prior_mean: submission.prior_rating_mean(),
            first_time_filmmaker,
            country: submission
                .metadata("country")
                .filter(|c| !c.is_empty())
                .map(str::to_string),
            rich_synopsis: submission.synopsis().chars().count() > 100,
            themes: submission.themes().to_vec(),
        }
    }

    /// Starting point on the 1–10 scale: prior external ratings if any.
    pub fn baseline(&self) -> f64 {
        self.prior_mean.unwrap_or(5.0)
    }
}

/// Per-criterion judgment on the 1–10 scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Assessment {
    pub narrative: f64,
    pub craft: f64,
    pub originality: f64,
    pub marketability: f64,
    pub technical: f64,
}

impl Assessment {
    pub fn uniform(value: f64) -> Self {
        Self {
            narrative: value,
            craft: value,
            originality: value,
            marketability: value,
            technical: value,
        }
    }

    pub fn get(&self, criterion: Criterion) -> f64 {
        match criterion {
            Criterion::Narrative => self.narrative,
            Criterion::Craft => self.craft,
            Criterion::Originality => self.originality,
            Criterion::Marketability => self.marketability,
            Criterion::TechnicalQuality => self.technical,
        }
    }

    /// Convert to a score vector over the active criteria, clamping each
    /// value to 1–10 and rounding to one decimal on the 0–100 scale.
    pub fn into_vector(
        self,
        agent: AgentKind,
        confidence: f64,
        criteria: &CriteriaSet,
        rationale: String,
    ) -> ScoreVector {
        criteria
            .iter()
            .fold(
                ScoreVector::new(agent.id(), confidence.min(CONFIDENCE_CAP)),
                |vector, criterion| {
                    let score = (self.get(criterion).clamp(1.0, 10.0) * 100.0).round() / 10.0;
                    vector.with_score(criterion, score)
                },
            )
            .with_rationale(rationale)
    }
}
