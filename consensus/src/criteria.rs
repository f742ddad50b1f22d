//! Scoring criteria shared by every agent and the consensus engine.

use serde::{Deserialize, Serialize};

/// A single axis on which a submission is judged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    /// Story, structure and emotional through-line
    Narrative,
    /// Direction, performance and editing
    Craft,
    /// Freshness of subject or approach
    Originality,
    /// Commercial and distribution potential
    Marketability,
    /// Picture, sound and delivery quality
    TechnicalQuality,
}

impl Criterion {
    /// Every known criterion, in canonical order.
    pub fn all() -> &'static [Criterion] {
        &[
            Criterion::Narrative,
            Criterion::Craft,
            Criterion::Originality,
            Criterion::Marketability,
            Criterion::TechnicalQuality,
        ]
    }

    /// Stable snake_case key used in JSON payloads and model prompts.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Narrative => "narrative",
            Self::Craft => "craft",
            Self::Originality => "originality",
            Self::Marketability => "marketability",
            Self::TechnicalQuality => "technical_quality",
        }
    }

    /// Parse a key, accepting a few spellings model output tends to use.
    pub fn from_key(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "narrative" | "story" => Some(Self::Narrative),
            "craft" | "direction" => Some(Self::Craft),
            "originality" => Some(Self::Originality),
            "marketability" | "market" => Some(Self::Marketability),
            "technical_quality" | "technical" | "technicalquality" => {
                Some(Self::TechnicalQuality)
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for Criterion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// The active set of criteria for a deployment.
///
/// Always non-empty, sorted and free of duplicates so that iteration order is
/// canonical regardless of how the set was configured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Criterion>", into = "Vec<Criterion>")]
pub struct CriteriaSet(Vec<Criterion>);

impl CriteriaSet {
    /// Build a set; returns `None` when no criteria are given.
    pub fn new(criteria: impl IntoIterator<Item = Criterion>) -> Option<Self> {
        let mut criteria: Vec<Criterion> = criteria.into_iter().collect();
        criteria.sort();
        criteria.dedup();
        if criteria.is_empty() {
            None
        } else {
            Some(Self(criteria))
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Criterion> + '_ {
        self.0.iter().copied()
    }

    pub fn contains(&self, criterion: Criterion) -> bool {
        self.0.contains(&criterion)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[Criterion] {
        &self.0
    }
}

impl Default for CriteriaSet {
    fn default() -> Self {
        Self(Criterion::all().to_vec())
    }
}

impl TryFrom<Vec<Criterion>> for CriteriaSet {
    type Error = String;

    fn try_from(value: Vec<Criterion>) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| "criteria set must not be empty".to_string())
    }
}

impl From<CriteriaSet> for Vec<Criterion> {
    fn from(value: CriteriaSet) -> Self {
        value.0
    }
}
