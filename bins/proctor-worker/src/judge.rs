// Logic / quality reviewer backed by an LLM
use crate::error::{with_timeout, ExternalError};
use crate::llm::LlmClient;
use proctor_analysis::fusion::extract_first_json_object;
use proctor_common::types::{JudgeVerdict, Language, TestCase};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

const SERVICE: &str = "judge";
pub const DEFAULT_SCORE: f64 = 50.0;

const SYSTEM_PROMPT: &str = r#"You grade a solution to a programming assessment question on two axes, each from 0 to 100.

logicScore: does the approach solve the stated problem, including its edge cases?
qualityScore: readability, naming, structure, efficiency and idiomatic use of the language.

Reply with a single JSON object and nothing else:
{"logicScore": 0-100, "qualityScore": 0-100, "reasoning": "short justification"}"#;

#[derive(Debug, Deserialize)]
struct RawJudgeReply {
    #[serde(rename = "logicScore", alias = "logic_score")]
    logic_score: f64,
    #[serde(rename = "qualityScore", alias = "quality_score")]
    quality_score: f64,
    #[serde(default)]
    reasoning: String,
}

/// Pull the verdict out of a free-form reply, clamping both scores to 0-100
pub fn parse_judge_response(text: &str) -> Result<JudgeVerdict, ExternalError> {
    let malformed = |reason: String| ExternalError::Malformed {
        service: SERVICE,
        reason,
    };
    let object = extract_first_json_object(text)
        .ok_or_else(|| malformed("no JSON object in judge reply".to_string()))?;
    let raw: RawJudgeReply = serde_json::from_value(object).map_err(|e| malformed(e.to_string()))?;

    Ok(JudgeVerdict {
        logic_score: raw.logic_score.clamp(0.0, 100.0),
        quality_score: raw.quality_score.clamp(0.0, 100.0),
        reasoning: raw.reasoning,
    })
}

fn neutral(reasoning: &str) -> JudgeVerdict {
    JudgeVerdict {
        logic_score: DEFAULT_SCORE,
        quality_score: DEFAULT_SCORE,
        reasoning: reasoning.to_string(),
    }
}

pub struct Judge {
    client: Option<Arc<dyn LlmClient>>,
    max_tokens: u32,
    timeout_secs: u64,
}

impl Judge {
    pub fn new(client: Option<Arc<dyn LlmClient>>, max_tokens: u32, timeout_secs: u64) -> Self {
        Self {
            client,
            max_tokens,
            timeout_secs,
        }
    }

    pub fn disabled() -> Self {
        Self::new(None, 0, 0)
    }

    /// Backing model provider, `none` when disabled
    pub fn provider(&self) -> &'static str {
        self.client.as_ref().map_or("none", |c| c.provider_name())
    }

    pub async fn evaluate(
        &self,
        question: &str,
        test_cases: &[TestCase],
        code: &str,
        language: Language,
    ) -> Result<JudgeVerdict, ExternalError> {
        let client = self
            .client
            .as_ref()
            .ok_or(ExternalError::NotConfigured { service: SERVICE })?;

        let cases = serde_json::to_string_pretty(test_cases).unwrap_or_default();
        let prompt = format!(
            "Question:\n{question}\n\nTest cases:\n{cases}\n\nSubmitted code ({language}):\n```{language}\n{code}\n```"
        );

        let reply = with_timeout(
            SERVICE,
            self.timeout_secs,
            client.complete(SYSTEM_PROMPT, &prompt, self.max_tokens),
        )
        .await?;
        parse_judge_response(&reply)
    }

    /// Verdict, or 50/50 with a reasoning string saying why
    pub async fn evaluate_or_default(
        &self,
        submission_id: Uuid,
        question: &str,
        test_cases: &[TestCase],
        code: &str,
        language: Language,
    ) -> JudgeVerdict {
        match self.evaluate(question, test_cases, code, language).await {
            Ok(verdict) => {
                info!(
                    submission_id = %submission_id,
                    provider = self.provider(),
                    logic = verdict.logic_score,
                    quality = verdict.quality_score,
                    "Judge verdict"
                );
                verdict
            }
            Err(ExternalError::NotConfigured { .. }) => {
                neutral("Judge unavailable - using default scores")
            }
            Err(e) => {
                warn!(submission_id = %submission_id, provider = self.provider(), error = %e, "Judge failed, using default scores");
                neutral(&format!("Judge evaluation failed ({}) - using default scores", e))
            }
        }
    }
}
