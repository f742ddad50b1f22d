//! Jury configuration: TOML file, then environment overrides.
//!
//! ```toml
//! agent_timeout_ms = 20000
//!
//! [consensus]
//! spread_threshold = 25.0
//! max_divergent_criteria = 0
//! min_confidence = 0.6
//! criteria = ["narrative", "craft", "originality", "marketability", "technical_quality"]
//!
//! [roster]
//! version = "spring-2026"
//! [[roster.members]]
//! agent = "quality"
//! weight = 1.0
//!
//! [model]
//! url = "http://localhost:8080/v1"
//! model = "jury-panel"
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use jury_consensus::{AgentRoster, ConsensusConfig, ConsensusEngine, ConsensusError, RosterError};
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::agents::{Agent, AgentKind, HttpModelClient, ModelClient, PanelAgent};
use crate::pipeline::JuryPipeline;

const DEFAULT_ROSTER_VERSION: &str = "default-v1";
const DEFAULT_AGENT_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Invalid roster: {0}")]
    Roster(#[from] RosterError),

    #[error("Failed to build model client: {0}")]
    Client(String),

    #[error("Failed to build consensus engine: {0}")]
    Engine(#[from] ConsensusError),
}

/// External model endpoint for the panel agent.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModelEndpoint {
    pub url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_model_name")]
    pub model: String,
}

fn default_model_name() -> String {
    "jury-panel".to_string()
}

fn default_timeout_ms() -> u64 {
    DEFAULT_AGENT_TIMEOUT_MS
}

/// Top-level jury configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JuryConfig {
    #[serde(default)]
    pub consensus: ConsensusConfig,
    /// Per-agent evaluation budget
    #[serde(default = "default_timeout_ms")]
    pub agent_timeout_ms: u64,
    /// Explicit roster; `None` means the built-in default
    #[serde(default)]
    pub roster: Option<AgentRoster>,
    #[serde(default)]
    pub model: Option<ModelEndpoint>,
}

impl Default for JuryConfig {
    fn default() -> Self {
        Self {
            consensus: ConsensusConfig::default(),
            agent_timeout_ms: DEFAULT_AGENT_TIMEOUT_MS,
            roster: None,
            model: None,
        }
    }
}

impl JuryConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Load from an optional file, apply `JURY_*` environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_toml_str(&raw)?
            }
            None => Self::default(),
        };
        config.apply_env_from(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from `lookup`, which maps variable names to values.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("JURY_AGENT_TIMEOUT_MS") {
            self.agent_timeout_ms = raw.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("JURY_AGENT_TIMEOUT_MS '{}' is not an integer", raw))
            })?;
        }

        if let Some(url) = lookup("JURY_MODEL_URL") {
            let endpoint = self.model.get_or_insert_with(|| ModelEndpoint {
                url: String::new(),
                api_key: None,
                model: default_model_name(),
            });
            endpoint.url = url;
        }
        if let Some(endpoint) = self.model.as_mut() {
            if let Some(key) = lookup("JURY_MODEL_API_KEY") {
                endpoint.api_key = Some(key);
            }
            if let Some(model) = lookup("JURY_MODEL_NAME") {
                endpoint.model = model;
            }
        }

        if let Some(version) = lookup("JURY_ROSTER_VERSION") {
            let mut roster = self.effective_roster();
            roster.version = version;
            self.roster = Some(roster);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent_timeout_ms == 0 {
            return Err(ConfigError::Invalid("agent_timeout_ms must be > 0".into()));
        }
        self.consensus.validate().map_err(ConfigError::Invalid)?;
        if let Some(model) = &self.model {
            if model.url.trim().is_empty() {
                return Err(ConfigError::Invalid("model.url must not be empty".into()));
            }
        }
        let roster = self.effective_roster();
        roster.validate()?;
        for agent in roster.agents() {
            if AgentKind::from_id(agent.as_str()).is_none() {
                return Err(ConfigError::Invalid(format!("unknown agent '{}' in roster", agent)));
            }
        }
        Ok(())
    }

    pub fn agent_timeout(&self) -> Duration {
        Duration::from_millis(self.agent_timeout_ms)
    }

    /// The configured roster, or the four heuristic agents at their default
    /// weights plus the panel when a model endpoint is configured.
    pub fn effective_roster(&self) -> AgentRoster {
        if let Some(roster) = &self.roster {
            return roster.clone();
        }
        AgentKind::all()
            .iter()
            .filter(|kind| **kind != AgentKind::Panel || self.model.is_some())
            .fold(AgentRoster::new(DEFAULT_ROSTER_VERSION), |roster, kind| {
                roster.with_member(kind.id(), kind.default_weight())
            })
    }

    /// Build one agent per roster member. `client` replaces the HTTP client
    /// the panel agent would otherwise use.
    pub fn build_agents(
        &self,
        mut client: Option<Arc<dyn ModelClient>>,
    ) -> Result<Vec<Agent>, ConfigError> {
        let roster = self.effective_roster();
        let mut agents = Vec::with_capacity(roster.size());
        for member in roster.agents() {
            let kind = AgentKind::from_id(member.as_str())
                .ok_or_else(|| ConfigError::Invalid(format!("unknown agent '{}'", member)))?;
            match Agent::heuristic(kind) {
                Some(agent) => agents.push(agent),
                None => {
                    let panel_client = match client.take() {
                        Some(client) => client,
                        None => self.http_client()?,
                    };
                    agents.push(Agent::Panel(PanelAgent::new(panel_client)));
                }
            }
        }
        Ok(agents)
    }

    fn http_client(&self) -> Result<Arc<dyn ModelClient>, ConfigError> {
        let endpoint = self.model.as_ref().ok_or_else(|| {
            ConfigError::Invalid("roster includes 'panel' but no [model] endpoint is configured".into())
        })?;
        let client = HttpModelClient::new(&endpoint.url, endpoint.api_key.clone(), &endpoint.model)
            .map_err(|e| ConfigError::Client(e.to_string()))?;
        Ok(Arc::new(client))
    }

    pub fn build_pipeline(
        &self,
        client: Option<Arc<dyn ModelClient>>,
    ) -> Result<JuryPipeline, ConfigError> {
        let engine = ConsensusEngine::with_config(self.effective_roster(), self.consensus.clone())?;
        let agents = self.build_agents(client)?;
        info!(
            agent_set_version = engine.agent_set_version(),
            agents = agents.len(),
            timeout_ms = self.agent_timeout_ms,
            "Jury pipeline configured"
        );
        Ok(JuryPipeline::new(engine, agents).with_timeout(self.agent_timeout()))
    }
}
