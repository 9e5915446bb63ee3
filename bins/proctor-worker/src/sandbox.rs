/// Sandbox Client - Remote Code Execution
///
/// Submissions are never run locally. Each test case is one synchronous
/// call to a Judge0-compatible service (`wait=true`), with source and stdin
/// base64-encoded both ways.

use crate::config::LanguageConfigManager;
use crate::error::ExternalError;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use lazy_static::lazy_static;
use proctor_common::types::Language;
use regex::Regex;
use serde::{Deserialize, Serialize};

const SERVICE: &str = "sandbox";

lazy_static! {
    static ref PUBLIC_CLASS: Regex = Regex::new(r"public\s+class\s+\w+").unwrap();
}

#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Run `code` with `stdin` and return the captured output
    async fn run(&self, code: &str, language: Language, stdin: &str) -> Result<String, ExternalError>;
}

/// Stand-in used when no sandbox URL is configured; every run fails
pub struct DisabledSandbox;

#[async_trait]
impl Sandbox for DisabledSandbox {
    async fn run(&self, _code: &str, _language: Language, _stdin: &str) -> Result<String, ExternalError> {
        Err(ExternalError::NotConfigured { service: SERVICE })
    }
}

#[derive(Debug, Serialize)]
struct SubmissionRequest {
    source_code: String,
    stdin: String,
    language_id: u32,
}

#[derive(Debug, Default, Deserialize)]
pub struct SubmissionResponse {
    #[serde(default)]
    pub stdout: Option<String>,
    #[serde(default)]
    pub stderr: Option<String>,
    #[serde(default)]
    pub compile_output: Option<String>,
}

pub struct Judge0Sandbox {
    base_url: String,
    api_key: Option<String>,
    api_host: Option<String>,
    languages: LanguageConfigManager,
    client: reqwest::Client,
}

impl Judge0Sandbox {
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        api_host: Option<String>,
        languages: LanguageConfigManager,
    ) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            api_host,
            languages,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Sandbox for Judge0Sandbox {
    async fn run(&self, code: &str, language: Language, stdin: &str) -> Result<String, ExternalError> {
        let language_id = self
            .languages
            .sandbox_language_id(&language)
            .map_err(|_| ExternalError::NotConfigured { service: SERVICE })?;

        let body = SubmissionRequest {
            source_code: STANDARD.encode(prepare_source(code, language)),
            stdin: STANDARD.encode(stdin),
            language_id,
        };

        let url = format!("{}/submissions?base64_encoded=true&wait=true", self.base_url);
        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("X-RapidAPI-Key", key);
        }
        if let Some(host) = &self.api_host {
            request = request.header("X-RapidAPI-Host", host);
        }

        let resp = request
            .send()
            .await
            .map_err(|source| ExternalError::Transport { service: SERVICE, source })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ExternalError::Http {
                service: SERVICE,
                status: status.as_u16(),
                body,
            });
        }

        let submission: SubmissionResponse = resp.json().await.map_err(|e| ExternalError::Malformed {
            service: SERVICE,
            reason: e.to_string(),
        })?;

        captured_output(&submission)
    }
}

/// Java sources must expose a public `Main` class: rename the first public
/// class, or wrap bare statements in one.
pub fn prepare_source(code: &str, language: Language) -> String {
    if language != Language::Java {
        return code.to_string();
    }
    if code.contains("class") {
        PUBLIC_CLASS.replace(code, "public class Main").into_owned()
    } else {
        format!(
            "public class Main {{\n    public static void main(String[] args) throws Exception {{\n        {}\n    }}\n}}\n",
            code
        )
    }
}

fn decode_field(field: &Option<String>) -> Result<Option<String>, ExternalError> {
    let Some(encoded) = field else {
        return Ok(None);
    };
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD.decode(compact).map_err(|e| ExternalError::Malformed {
        service: SERVICE,
        reason: format!("invalid base64: {}", e),
    })?;
    Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
}

/// Compile output if present, else stderr if present, else stdout
pub fn captured_output(response: &SubmissionResponse) -> Result<String, ExternalError> {
    let compile_output = decode_field(&response.compile_output)?;
    let stderr = decode_field(&response.stderr)?;
    let stdout = decode_field(&response.stdout)?;

    Ok([compile_output, stderr]
        .into_iter()
        .flatten()
        .find(|text| !text.is_empty())
        .or(stdout)
        .unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(text: &str) -> Option<String> {
        Some(STANDARD.encode(text))
    }

    #[test]
    fn test_java_public_class_renamed() {
        let code = "public class Solution {\n  public static void main(String[] a) {}\n}";
        let prepared = prepare_source(code, Language::Java);
        assert!(prepared.starts_with("public class Main {"));
        assert!(!prepared.contains("Solution"));
    }

    #[test]
    fn test_java_statements_wrapped() {
        let prepared = prepare_source("System.out.println(1);", Language::Java);
        assert!(prepared.contains("public class Main"));
        assert!(prepared.contains("System.out.println(1);"));
    }

    #[test]
    fn test_other_languages_untouched() {
        let code = "public class Foo {}";
        assert_eq!(prepare_source(code, Language::Cpp), code);
    }

    #[test]
    fn test_output_precedence() {
        let response = SubmissionResponse {
            stdout: encoded("out"),
            stderr: encoded("err"),
            compile_output: encoded("compile failed"),
        };
        assert_eq!(captured_output(&response).unwrap(), "compile failed");

        let response = SubmissionResponse {
            stdout: encoded("out"),
            stderr: encoded("err"),
            compile_output: None,
        };
        assert_eq!(captured_output(&response).unwrap(), "err");

        let response = SubmissionResponse {
            stdout: encoded("42\n"),
            stderr: Some(String::new()),
            compile_output: None,
        };
        assert_eq!(captured_output(&response).unwrap(), "42\n");
    }

    #[test]
    fn test_output_empty_when_nothing_captured() {
        assert_eq!(captured_output(&SubmissionResponse::default()).unwrap(), "");
    }

    #[test]
    fn test_wrapped_base64_decodes() {
        let response = SubmissionResponse {
            stdout: Some("aGVs\nbG8=\n".to_string()),
            ..SubmissionResponse::default()
        };
        assert_eq!(captured_output(&response).unwrap(), "hello");
    }

    #[test]
    fn test_invalid_base64_is_malformed() {
        let response = SubmissionResponse {
            stdout: Some("!!!".to_string()),
            ..SubmissionResponse::default()
        };
        assert!(matches!(captured_output(&response), Err(ExternalError::Malformed { .. })));
    }

    #[tokio::test]
    async fn test_disabled_sandbox_reports_not_configured() {
        let result = DisabledSandbox.run("print(1)", Language::Python, "").await;
        assert!(matches!(result, Err(ExternalError::NotConfigured { service: "sandbox" })));
    }
}
