// Generated-code classifier backed by an LLM
use crate::error::{with_timeout, ExternalError};
use crate::llm::LlmClient;
use proctor_analysis::fusion::parse_classifier_response;
use proctor_common::types::{ClassifierVerdict, Language};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

const SERVICE: &str = "classifier";

const SYSTEM_PROMPT: &str = r#"You review source code submitted in a programming assessment and judge whether it was produced by a code-generation model or written by a person.

Signals of generated code include uniform formatting, long descriptive names, comments that restate the obvious, stock names such as result/data/temp, and an explanatory tone. Typos, shortcuts and uneven style point to a person.

Reply with a single JSON object and nothing else:
{"isGenerated": true or false, "confidence": 0-100, "reasoning": "one or two sentences"}

"confidence" is how sure you are of the label you chose."#;

pub struct Classifier {
    client: Option<Arc<dyn LlmClient>>,
    max_tokens: u32,
    timeout_secs: u64,
}

impl Classifier {
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

    pub async fn classify(&self, code: &str, language: Language) -> Result<ClassifierVerdict, ExternalError> {
        let client = self
            .client
            .as_ref()
            .ok_or(ExternalError::NotConfigured { service: SERVICE })?;

        let prompt = format!("Language: {language}\n\nCode:\n```{language}\n{code}\n```");
        let reply = with_timeout(
            SERVICE,
            self.timeout_secs,
            client.complete(SYSTEM_PROMPT, &prompt, self.max_tokens),
        )
        .await?;

        parse_classifier_response(&reply).map_err(|e| ExternalError::Malformed {
            service: SERVICE,
            reason: e.to_string(),
        })
    }

    /// Verdict, or `None` after logging why the heuristic score stands alone
    pub async fn classify_or_skip(
        &self,
        submission_id: Uuid,
        code: &str,
        language: Language,
    ) -> Option<ClassifierVerdict> {
        match self.classify(code, language).await {
            Ok(verdict) => {
                info!(
                    submission_id = %submission_id,
                    provider = self.provider(),
                    is_generated = verdict.is_generated,
                    confidence = verdict.confidence,
                    likelihood = verdict.likelihood,
                    "Classifier verdict"
                );
                Some(verdict)
            }
            Err(ExternalError::NotConfigured { .. }) => {
                debug!(submission_id = %submission_id, "Classifier disabled");
                None
            }
            Err(e) => {
                warn!(submission_id = %submission_id, provider = self.provider(), error = %e, "Classifier failed, using heuristic score only");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::fake::ScriptedLlm;

    fn classifier(llm: Arc<ScriptedLlm>) -> Classifier {
        Classifier::new(Some(llm), 200, 5)
    }

    #[tokio::test]
    async fn test_parses_fenced_reply() {
        let llm = Arc::new(ScriptedLlm::replying(vec![Ok(
            "```json\n{\"isAI\": false, \"confidence\": 70, \"reasoning\": \"terse\"}\n```",
        )]));
        let verdict = classifier(llm.clone()).classify("x = 1", Language::Python).await.unwrap();
        assert!(!verdict.is_generated);
        assert_eq!(verdict.likelihood, 30.0);
        assert!(llm.last_prompt.lock().unwrap().as_deref().unwrap().contains("```python"));
    }

    #[test]
    fn test_provider_reported() {
        let llm = Arc::new(ScriptedLlm::replying(vec![Ok("{}")]));
        assert_eq!(classifier(llm).provider(), "scripted");
        assert_eq!(Classifier::disabled().provider(), "none");
    }

    #[tokio::test]
    async fn test_disabled_is_not_configured() {
        let result = Classifier::disabled().classify("x", Language::C).await;
        assert!(matches!(result, Err(ExternalError::NotConfigured { .. })));
        assert!(Classifier::disabled()
            .classify_or_skip(Uuid::new_v4(), "x", Language::C)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_prose_reply_is_malformed() {
        let llm = Arc::new(ScriptedLlm::replying(vec![Ok("Looks human to me.")]));
        let result = classifier(llm).classify("x", Language::C).await;
        assert!(matches!(result, Err(ExternalError::Malformed { service: "classifier", .. })));
    }

    #[tokio::test]
    async fn test_http_failure_skips() {
        let llm = Arc::new(ScriptedLlm::replying(vec![Err("rate limited")]));
        let verdict = classifier(llm.clone())
            .classify_or_skip(Uuid::new_v4(), "x", Language::C)
            .await;
        assert!(verdict.is_none());
        assert_eq!(llm.calls(), 1);
    }
}
