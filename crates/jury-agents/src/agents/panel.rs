//! Model-backed panel agent.
//!
//! Sends the normalized submission to an external chat model and parses its
//! JSON verdict into a [`ScoreVector`]. The model is reached through the
//! [`ModelClient`] trait so tests can substitute a deterministic fake.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use jury_consensus::{AgentId, CriteriaSet, Criterion, ScoreVector, Submission, SCORE_MAX, SCORE_MIN};
use serde::Deserialize;
use tracing::debug;

use super::{AgentError, AgentKind, CONFIDENCE_CAP};

/// Request timeout for the HTTP client; the pipeline budget usually fires first.
const HTTP_TIMEOUT: Duration = Duration::from_secs(120);

const SYSTEM_PROMPT: &str = r#"You are a member of a film festival selection jury.
Score the submission on each requested criterion from 0 to 100 and state how
confident you are in your judgment from 0 to 1.

Respond with a single JSON object and nothing else:
{"scores": {"<criterion>": <number>, ...}, "confidence": <number>, "rationale": "<one sentence>"}"#;

/// Chat-completion backend used by the panel agent.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Run one completion and return the raw assistant text.
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, AgentError>;
}

/// OpenAI-compatible `/chat/completions` client.
pub struct HttpModelClient {
    url: String,
    api_key: Option<String>,
    model: String,
    client: reqwest::Client,
}

impl HttpModelClient {
    pub fn new(
        url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
    ) -> Result<Self, AgentError> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| AgentError::Model(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            url: url.into(),
            api_key: api_key.filter(|k| !k.is_empty()),
            model: model.into(),
            client,
        })
    }

    fn endpoint(&self) -> String {
        let base = self.url.trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            base.to_string()
        } else {
            format!("{base}/chat/completions")
        }
    }
}

#[async_trait]
impl ModelClient for HttpModelClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, system: &str, prompt: &str) -> Result<String, AgentError> {
        let request_body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": prompt}
            ],
            "max_tokens": 1024,
            "temperature": 0.0
        });

        let mut request = self.client.post(self.endpoint()).json(&request_body);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }
        let response = request
            .send()
            .await
            .map_err(|e| AgentError::Model(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::Model(format!(
                "model API error ({}): {}",
                status, body
            )));
        }

        let resp_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AgentError::Parse(e.to_string()))?;

        resp_json["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| AgentError::Parse("response has no message content".to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct Verdict {
    scores: BTreeMap<String, f64>,
    confidence: f64,
    #[serde(default)]
    rationale: Option<String>,
}

/// Jury member that delegates judgment to an external model.
#[derive(Clone)]
pub struct PanelAgent {
    id: AgentId,
    client: Arc<dyn ModelClient>,
}

impl PanelAgent {
    pub fn new(client: Arc<dyn ModelClient>) -> Self {
        Self {
            id: AgentId::from(AgentKind::Panel.id()),
            client,
        }
    }

    /// Override the roster identity, for deployments with several panels.
    pub fn with_id(mut self, id: impl Into<AgentId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn id(&self) -> &AgentId {
        &self.id
    }

    pub async fn evaluate(
        &self,
        submission: &Submission,
        criteria: &CriteriaSet,
    ) -> Result<ScoreVector, AgentError> {
        let prompt = build_prompt(submission, criteria);
        debug!(
            agent = %self.id,
            model = self.client.name(),
            submission_id = submission.id(),
            "Requesting panel verdict"
        );
        let raw = self.client.complete(SYSTEM_PROMPT, &prompt).await?;
        parse_verdict(&self.id, &raw, criteria)
    }
}

fn build_prompt(submission: &Submission, criteria: &CriteriaSet) -> String {
    let mut prompt = format!(
        "## Submission\n\nTitle: {}\nGenre: {}\nRuntime: {:.0} minutes\n\n{}\n",
        submission.title(),
        submission.genre(),
        submission.runtime_minutes(),
        submission.synopsis()
    );
    if !submission.technical_metadata().is_empty() {
        prompt.push_str("\n## Technical sheet\n\n");
        for (key, value) in submission.technical_metadata() {
            prompt.push_str(&format!("- {}: {}\n", key, value));
        }
    }
    let keys: Vec<&str> = criteria.iter().map(|c| c.key()).collect();
    prompt.push_str(&format!("\n## Criteria\n\n{}\n", keys.join(", ")));
    prompt
}

/// Extract the JSON object from free text and map it onto the active criteria.
fn parse_verdict(
    agent: &AgentId,
    raw: &str,
    criteria: &CriteriaSet,
) -> Result<ScoreVector, AgentError> {
    let start = raw.find('{');
    let end = raw.rfind('}');
    let json = match (start, end) {
        (Some(start), Some(end)) if start < end => &raw[start..=end],
        _ => return Err(AgentError::Parse("no JSON object in model output".to_string())),
    };
    let verdict: Verdict =
        serde_json::from_str(json).map_err(|e| AgentError::Parse(e.to_string()))?;

    let mut scores = BTreeMap::new();
    for (key, score) in verdict.scores {
        if let Some(criterion) = Criterion::from_key(&key) {
            scores.insert(criterion, score);
        }
    }

    let mut vector = ScoreVector::new(
        agent.clone(),
        verdict.confidence.clamp(0.0, 1.0).min(CONFIDENCE_CAP),
    );
    for criterion in criteria.iter() {
        let score = scores
            .get(&criterion)
            .copied()
            .ok_or_else(|| AgentError::Parse(format!("verdict missing {}", criterion)))?;
        if !score.is_finite() {
            return Err(AgentError::Parse(format!("{} score is not a number", criterion)));
        }
        vector = vector.with_score(criterion, score.clamp(SCORE_MIN, SCORE_MAX));
    }
    if let Some(rationale) = verdict.rationale.filter(|r| !r.trim().is_empty()) {
        vector = vector.with_rationale(rationale);
    }
    Ok(vector)
}
