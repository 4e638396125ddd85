/// Advisory Oracle client — the single point of entry for all generative-AI
/// calls in Squadline.
///
/// ARCHITECTURAL RULE: No other module may call the Anthropic API directly.
/// Every consumer treats every `OracleError` variant identically: fall back to
/// the deterministic path (heuristic assigner, generic portfolio payload).
/// The Oracle is advisory — it must never be able to fail a user-facing request.
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::candidate::CandidateRow;
use crate::models::project::{ModuleSpec, RoleSpec};
use crate::models::squad::SquadDraft;

pub mod prompts;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
/// The model used for all Oracle calls.
/// Intentionally hardcoded to prevent accidental drift.
pub const MODEL: &str = "claude-sonnet-4-5";
const MAX_TOKENS: u32 = 4096;
const MAX_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("Oracle returned empty content")]
    EmptyContent,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct OracleResponse {
    pub content: Vec<ContentBlock>,
    pub usage: Usage,
}

#[derive(Debug, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl OracleResponse {
    /// Extracts the text content from the first text block.
    pub fn text(&self) -> Option<&str> {
        self.content
            .iter()
            .find(|b| b.block_type == "text")
            .and_then(|b| b.text.as_deref())
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorBody,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorBody {
    message: String,
}

// ────────────────────────────────────────────────────────────────────────────
// Brief / suggestion payloads
// ────────────────────────────────────────────────────────────────────────────

/// Input brief for squad proposal requests: project shape plus a pool snapshot.
/// Candidate names are never included — ids and skill summaries only.
#[derive(Debug, Serialize)]
pub struct SquadBrief {
    pub project_title: String,
    pub project_description: String,
    pub roles: Vec<RoleSpec>,
    pub pool: Vec<PoolCandidate>,
}

/// The slice of a candidate profile exposed to the Oracle.
#[derive(Debug, Serialize)]
pub struct PoolCandidate {
    pub candidate_id: Uuid,
    pub skills: Vec<String>,
    pub experience_level: String,
    pub summary: String,
}

impl PoolCandidate {
    pub fn from_row(row: &CandidateRow) -> Self {
        PoolCandidate {
            candidate_id: row.id,
            skills: row.skills.clone(),
            experience_level: row.experience_level.clone(),
            summary: row.summary.clone(),
        }
    }
}

/// Wire shape of the Oracle's squad suggestion. Structural invariants are NOT
/// checked here — the matcher validates every draft before trusting it.
#[derive(Debug, Deserialize)]
pub struct SquadPlan {
    pub proposals: Vec<SquadDraft>,
}

/// Input brief for work summarization. Built from the job description and task
/// list only — no candidate identifiers, so the output is anonymized by
/// construction on top of the prompt instruction.
#[derive(Debug, Serialize)]
pub struct SummaryBrief {
    pub project_description: String,
    pub modules: Vec<SummaryModule>,
}

#[derive(Debug, Serialize)]
pub struct SummaryModule {
    pub title: String,
    pub tasks: Vec<String>,
}

impl SummaryBrief {
    pub fn from_modules(description: &str, modules: &[ModuleSpec]) -> Self {
        SummaryBrief {
            project_description: description.to_string(),
            modules: modules
                .iter()
                .map(|m| SummaryModule {
                    title: m.title.clone(),
                    tasks: m.tasks.iter().map(|t| t.description.clone()).collect(),
                })
                .collect(),
        }
    }
}

/// Structured summarization result for a portfolio entry.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkSummary {
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub breakdown: String,
    pub tags: Vec<String>,
}

// ────────────────────────────────────────────────────────────────────────────
// Client
// ────────────────────────────────────────────────────────────────────────────

/// The single Oracle client used by all services in Squadline.
/// Wraps the Anthropic Messages API with retry logic and structured output
/// helpers. A hit of the request timeout surfaces as `OracleError::Http`,
/// indistinguishable from any other failure by design of the fallback contract.
#[derive(Clone)]
pub struct OracleClient {
    client: Client,
    api_key: String,
}

impl OracleClient {
    pub fn new(api_key: String, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .expect("Failed to build HTTP client"),
            api_key,
        }
    }

    /// Requests exactly 3 ranked squad proposals for the given brief.
    /// The returned drafts are unvalidated wire data.
    pub async fn propose_squads(&self, brief: &SquadBrief) -> Result<Vec<SquadDraft>, OracleError> {
        let brief_json = serde_json::to_string_pretty(brief)?;
        let prompt = prompts::SQUAD_PROPOSAL_TEMPLATE.replace("{brief}", &brief_json);
        let plan: SquadPlan = self.call_json(&prompt, prompts::JSON_ONLY_SYSTEM).await?;
        Ok(plan.proposals)
    }

    /// Produces an anonymized abstract/breakdown/tags for a completed job.
    pub async fn summarize_completed_work(
        &self,
        brief: &SummaryBrief,
    ) -> Result<WorkSummary, OracleError> {
        let brief_json = serde_json::to_string_pretty(brief)?;
        let prompt = prompts::WORK_SUMMARY_TEMPLATE.replace("{brief}", &brief_json);
        self.call_json(&prompt, prompts::JSON_ONLY_SYSTEM).await
    }

    /// Makes a raw call to the API, returning the full response object.
    /// Retries on 429 (rate limit) and 5xx errors with exponential backoff.
    async fn call(&self, prompt: &str, system: &str) -> Result<OracleResponse, OracleError> {
        let request_body = AnthropicRequest {
            model: MODEL,
            max_tokens: MAX_TOKENS,
            system,
            messages: vec![AnthropicMessage {
                role: "user",
                content: prompt,
            }],
        };

        let mut last_error: Option<OracleError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s
                let delay = Duration::from_millis(1000 * (1 << (attempt - 1)));
                warn!(
                    "Oracle call attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = self
                .client
                .post(ANTHROPIC_API_URL)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("content-type", "application/json")
                .json(&request_body)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(OracleError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!("Oracle API returned {}: {}", status, body);
                last_error = Some(OracleError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                // Try to parse error message
                let message = serde_json::from_str::<AnthropicError>(&body)
                    .map(|e| e.error.message)
                    .unwrap_or(body);
                return Err(OracleError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            let oracle_response: OracleResponse = response.json().await?;

            debug!(
                "Oracle call succeeded: input_tokens={}, output_tokens={}",
                oracle_response.usage.input_tokens, oracle_response.usage.output_tokens
            );

            return Ok(oracle_response);
        }

        Err(last_error.unwrap_or(OracleError::RateLimited {
            retries: MAX_RETRIES,
        }))
    }

    /// Convenience method that calls the Oracle and deserializes the text
    /// response as JSON. The prompt must instruct the model to return valid JSON.
    async fn call_json<T: DeserializeOwned>(
        &self,
        prompt: &str,
        system: &str,
    ) -> Result<T, OracleError> {
        let response = self.call(prompt, system).await?;

        let text = response.text().ok_or(OracleError::EmptyContent)?;

        // Strip markdown code fences if the model wraps JSON in them
        let text = strip_json_fences(text);

        serde_json::from_str(text).map_err(OracleError::Parse)
    }
}

/// Strips ```json ... ``` or ``` ... ``` code fences from Oracle output.
fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_json_fences_with_json_tag() {
        let input = "```json\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_without_tag() {
        let input = "```\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_no_fences() {
        let input = "{\"key\": \"value\"}";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_squad_plan_deserializes_wire_shape() {
        let json = r#"{
            "proposals": [
                {
                    "harmony_score": 82,
                    "members": [
                        {
                            "role_name": "Backend",
                            "candidate_id": "7f4df2a9-61a3-4f8e-9a31-0a5e2cf0a111",
                            "match_reason": "Strong database background"
                        }
                    ]
                }
            ]
        }"#;
        let plan: SquadPlan = serde_json::from_str(json).unwrap();
        assert_eq!(plan.proposals.len(), 1);
        assert_eq!(plan.proposals[0].harmony_score, 82);
        assert_eq!(plan.proposals[0].members[0].role_name, "Backend");
    }

    #[test]
    fn test_work_summary_deserializes_abstract_field() {
        let json = r#"{
            "abstract": "Built a payments integration.",
            "breakdown": "Three modules covering API design and rollout.",
            "tags": ["rust", "payments"]
        }"#;
        let summary: WorkSummary = serde_json::from_str(json).unwrap();
        assert_eq!(summary.abstract_text, "Built a payments integration.");
        assert_eq!(summary.tags.len(), 2);
    }

    #[test]
    fn test_malformed_plan_is_a_parse_error() {
        let json = r#"{"proposals": [{"harmony_score": "very high"}]}"#;
        assert!(serde_json::from_str::<SquadPlan>(json).is_err());
    }
}
