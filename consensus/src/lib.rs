//! Festival jury consensus core
//!
//! Deterministic half of the jury: everything that turns independent agent
//! judgments into one reproducible decision. No network access and no model
//! calls live here.
//!
//! # Components
//!
//! - [`submission`]: raw record schema and the `normalize` validator
//! - [`criteria`], [`score`]: the judging axes and per-agent score vectors
//! - [`roster`]: agent identities, reliability weights and version tag
//! - [`engine`]: weighted aggregation, disagreement, escalation, confidence
//! - [`cache`]: single-flight memo keyed by (submission, agent-set version)
//! - [`store`]: append-only decision store with explicit open/close
//! - [`stats`]: summary statistics over recorded decisions
//!
//! # Usage
//!
//! ```
//! use jury_consensus::{
//!     normalize, AgentRoster, ConsensusEngine, Criterion, RawSubmission, ScoreVector,
//! };
//!
//! let submission = normalize(
//!     RawSubmission::new("sub-1", "Salt Road", "A caravan crosses the desert.").runtime(92.0),
//! )
//! .unwrap();
//! let engine = ConsensusEngine::new(AgentRoster::new("v1").with_member("quality", 1.0)).unwrap();
//! let vector = Criterion::all()
//!     .iter()
//!     .fold(ScoreVector::new("quality", 0.8), |v, c| v.with_score(*c, 70.0));
//! let result = engine.aggregate(&submission, &[vector]).unwrap();
//! assert_eq!(result.overall_score, 70.0);
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod cache;
pub mod criteria;
pub mod engine;
pub mod error;
pub mod roster;
pub mod score;
pub mod stats;
pub mod store;
pub mod submission;

pub use cache::{CacheKey, ResultCache, SharedResultCache};
pub use criteria::{CriteriaSet, Criterion};
pub use engine::{AuditKind, AuditNote, ConsensusConfig, ConsensusEngine, ConsensusResult};
pub use error::{ConsensusError, JuryResult, ValidationError};
pub use roster::{AgentRoster, RosterEntry, RosterError};
pub use score::{AgentId, ScoreVector, SCORE_MAX, SCORE_MIN};
pub use stats::DecisionStats;
pub use store::{
    DecisionStore, JsonFileStore, MemoryStore, SharedDecisionStore, StoreError, StoreResult,
};
pub use submission::{normalize, Genre, PriorRating, RawSubmission, Submission, Theme};
