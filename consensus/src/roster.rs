//! Agent roster: which agents take part and how much each is trusted.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::score::AgentId;

/// Roster configuration problems.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RosterError {
    #[error("roster version must not be empty")]
    EmptyVersion,

    #[error("roster {0} has no members")]
    Empty(String),

    #[error("reliability weight {weight} for {agent} outside (0, 1]")]
    InvalidWeight { agent: AgentId, weight: f64 },

    #[error("agent {0} listed more than once")]
    Duplicate(AgentId),
}

/// One roster member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub agent: AgentId,
    /// Reliability weight in (0, 1]
    pub weight: f64,
}

/// Ordered set of agents with reliability weights and a version tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRoster {
    pub version: String,
    #[serde(default)]
    pub members: Vec<RosterEntry>,
}

impl AgentRoster {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            members: Vec::new(),
        }
    }

    pub fn with_member(mut self, agent: impl Into<AgentId>, weight: f64) -> Self {
        self.members.push(RosterEntry {
            agent: agent.into(),
            weight,
        });
        self
    }

    pub fn validate(&self) -> Result<(), RosterError> {
        if self.version.trim().is_empty() {
            return Err(RosterError::EmptyVersion);
        }
        if self.members.is_empty() {
            return Err(RosterError::Empty(self.version.clone()));
        }
        let mut seen = std::collections::BTreeSet::new();
        for entry in &self.members {
            if !entry.weight.is_finite() || entry.weight <= 0.0 || entry.weight > 1.0 {
                return Err(RosterError::InvalidWeight {
                    agent: entry.agent.clone(),
                    weight: entry.weight,
                });
            }
            if !seen.insert(&entry.agent) {
                return Err(RosterError::Duplicate(entry.agent.clone()));
            }
        }
        Ok(())
    }

    pub fn weight_of(&self, agent: &AgentId) -> Option<f64> {
        self.members
            .iter()
            .find(|m| &m.agent == agent)
            .map(|m| m.weight)
    }

    pub fn contains(&self, agent: &AgentId) -> bool {
        self.weight_of(agent).is_some()
    }

    /// Full roster size, the denominator for escalation decisions.
    pub fn size(&self) -> usize {
        self.members.len()
    }

    pub fn agents(&self) -> impl Iterator<Item = &AgentId> {
        self.members.iter().map(|m| &m.agent)
    }
}
