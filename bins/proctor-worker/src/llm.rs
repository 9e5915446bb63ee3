use crate::error::ExternalError;
use async_trait::async_trait;
use serde_json::json;

const SERVICE: &str = "llm";
const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// One system + user exchange; returns the assistant's text
    async fn complete(&self, system: &str, prompt: &str, max_tokens: u32) -> Result<String, ExternalError>;
    fn provider_name(&self) -> &'static str;
}

pub struct OpenAIClient {
    pub model: String,
    pub api_key: String,
    pub temperature: f32,
    pub url: String,
    pub client: reqwest::Client,
}

impl OpenAIClient {
    pub fn new(model: String, api_key: String, temperature: f32) -> Self {
        Self {
            model,
            api_key,
            temperature,
            url: OPENAI_CHAT_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl LlmClient for OpenAIClient {
    async fn complete(&self, system: &str, prompt: &str, max_tokens: u32) -> Result<String, ExternalError> {
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": prompt },
            ],
            "temperature": self.temperature,
            "max_tokens": max_tokens,
        });

        let resp = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|source| ExternalError::Transport { service: SERVICE, source })?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let error_text = resp.text().await.unwrap_or_default();
            return Err(ExternalError::Http {
                service: SERVICE,
                status,
                body: error_text,
            });
        }

        let json: serde_json::Value = resp.json().await.map_err(|e| ExternalError::Malformed {
            service: SERVICE,
            reason: e.to_string(),
        })?;

        // choices[0].message.content
        json.pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| ExternalError::Malformed {
                service: SERVICE,
                reason: "response missing content".to_string(),
            })
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}

#[cfg(test)]
pub mod fake {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replays canned replies in order; an exhausted script answers with
    /// the last reply
    pub struct ScriptedLlm {
        replies: Mutex<Vec<Result<String, String>>>,
        pub calls: AtomicUsize,
        pub last_prompt: Mutex<Option<String>>,
    }

    impl ScriptedLlm {
        pub fn replying(replies: Vec<Result<&str, &str>>) -> Self {
            Self {
                replies: Mutex::new(
                    replies
                        .into_iter()
                        .map(|r| r.map(str::to_string).map_err(str::to_string))
                        .collect(),
                ),
                calls: AtomicUsize::new(0),
                last_prompt: Mutex::new(None),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, _system: &str, prompt: &str, _max_tokens: u32) -> Result<String, ExternalError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_prompt.lock().unwrap() = Some(prompt.to_string());
            let mut replies = self.replies.lock().unwrap();
            let reply = if replies.len() > 1 {
                replies.remove(0)
            } else {
                replies
                    .first()
                    .cloned()
                    .unwrap_or_else(|| Err("no scripted reply".to_string()))
            };
            reply.map_err(|body| ExternalError::Http {
                service: SERVICE,
                status: 500,
                body,
            })
        }

        fn provider_name(&self) -> &'static str {
            "scripted"
        }
    }
}
