//! Festival jury runtime.
//!
//! Builds the scoring agents, runs them concurrently against a submission and
//! hands their score vectors to the consensus engine in `jury-consensus`.
//!
//! - [`agents`]: the closed set of jury members and the injected model client
//! - [`pipeline`]: fan-out with per-agent timeouts, cancellation, fan-in
//! - [`config`]: TOML plus `JURY_*` environment configuration

#![allow(clippy::uninlined_format_args)]

pub mod agents;
pub mod config;
pub mod pipeline;
pub mod telemetry;

pub use agents::{
    Agent, AgentError, AgentKind, FestivalAgent, FestivalMatch, HttpModelClient, MarketAgent,
    ModelClient, PanelAgent, QualityAgent, TechnicalAgent,
};
pub use config::{ConfigError, JuryConfig, ModelEndpoint};
pub use pipeline::{AgentFailure, BillingSignal, JuryPipeline, PipelineOutcome};
