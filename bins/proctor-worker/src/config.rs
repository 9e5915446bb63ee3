// Worker configuration: sandbox language ids, tuning knobs, external services
use anyhow::{bail, Context, Result};
use proctor_analysis::{
    ComparatorConfig, FusionWeights, HeuristicPoints, ScoreAllocation, SimilarityWeights,
};
use proctor_analysis::similarity::DEFAULT_MATCH_THRESHOLD;
use proctor_common::types::Language;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_LANGUAGES_PATH: &str = "config/languages.json";
pub const DEFAULT_PROCTOR_PATH: &str = "config/proctor.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageConfig {
    pub name: String,
    #[serde(default)]
    pub version: String,
    /// Judge0 `language_id`
    pub sandbox_language_id: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct LanguagesJson {
    languages: Vec<LanguageConfig>,
}

/// Language configuration manager
#[derive(Debug, Clone)]
pub struct LanguageConfigManager {
    configs: HashMap<String, LanguageConfig>,
}

impl LanguageConfigManager {
    /// Load language configurations from languages.json
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            bail!("Language config file not found: {}", config_path.display());
        }

        let content = fs::read_to_string(config_path)
            .context("Failed to read languages.json")?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let languages_json: LanguagesJson = serde_json::from_str(content)
            .context("Failed to parse languages.json")?;

        let mut configs = HashMap::new();
        for lang in languages_json.languages {
            let Some(language) = Language::from_str(&lang.name) else {
                bail!("Unknown language '{}' in languages.json", lang.name);
            };
            configs.insert(language.to_string(), lang);
        }

        Ok(Self { configs })
    }

    /// Load from `LANGUAGES_CONFIG`, defaulting to config/languages.json
    pub fn load_default() -> Result<Self> {
        let path = std::env::var("LANGUAGES_CONFIG")
            .unwrap_or_else(|_| DEFAULT_LANGUAGES_PATH.to_string());
        Self::load(Path::new(&path))
    }

    /// Get configuration for a specific language
    pub fn get_config(&self, language: &Language) -> Result<&LanguageConfig> {
        let lang_name = language.to_string();
        self.configs
            .get(&lang_name)
            .ok_or_else(|| anyhow::anyhow!("No configuration found for language: {}", lang_name))
    }

    pub fn sandbox_language_id(&self, language: &Language) -> Result<u32> {
        Ok(self.get_config(language)?.sandbox_language_id)
    }

    /// List all supported languages
    pub fn list_languages(&self) -> Vec<String> {
        let mut names: Vec<String> = self.configs.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Retry budget and lock/poll timings for the pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub lock_ttl_secs: u64,
    pub poll_timeout_secs: f64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_base_ms: 2_000,
            backoff_max_ms: 60_000,
            lock_ttl_secs: 120,
            poll_timeout_secs: 5.0,
        }
    }
}

impl PipelineSettings {
    /// Delay before `attempt` (1-based) is retried: base * 2^(attempt-1), capped
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        let delay = self.backoff_base_ms.saturating_mul(1u64 << exponent);
        Duration::from_millis(delay.min(self.backoff_max_ms))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    pub sandbox_secs: u64,
    pub classifier_secs: u64,
    pub judge_secs: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            sandbox_secs: 10,
            classifier_secs: 15,
            judge_secs: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub model: String,
    pub temperature: f32,
    pub classifier_max_tokens: u32,
    pub judge_max_tokens: u32,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.3,
            classifier_max_tokens: 200,
            judge_max_tokens: 500,
        }
    }
}

/// Everything tunable, read from config/proctor.json
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProctorConfig {
    pub similarity: SimilarityWeights,
    pub match_threshold: f64,
    pub authorship: HeuristicPoints,
    pub fusion: FusionWeights,
    pub comparator: ComparatorConfig,
    pub scoring: ScoreAllocation,
    pub pipeline: PipelineSettings,
    pub timeouts: TimeoutSettings,
    pub llm: LlmSettings,
}

impl Default for ProctorConfig {
    fn default() -> Self {
        Self {
            similarity: SimilarityWeights::default(),
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            authorship: HeuristicPoints::default(),
            fusion: FusionWeights::default(),
            comparator: ComparatorConfig::default(),
            scoring: ScoreAllocation::default(),
            pipeline: PipelineSettings::default(),
            timeouts: TimeoutSettings::default(),
            llm: LlmSettings::default(),
        }
    }
}

impl ProctorConfig {
    /// A missing file means defaults; a malformed one is an error
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "Tuning config not found, using defaults");
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Load from `PROCTOR_CONFIG`, defaulting to config/proctor.json
    pub fn load_default() -> Result<Self> {
        let path = std::env::var("PROCTOR_CONFIG")
            .unwrap_or_else(|_| DEFAULT_PROCTOR_PATH.to_string());
        Self::load(Path::new(&path))
    }
}

/// Endpoints and credentials for the outbound services, from the environment
#[derive(Debug, Clone, Default)]
pub struct ServiceSettings {
    pub sandbox_url: Option<String>,
    pub sandbox_api_key: Option<String>,
    pub sandbox_api_host: Option<String>,
    pub openai_api_key: Option<String>,
    pub enable_classifier: bool,
}

impl ServiceSettings {
    pub fn from_env() -> Self {
        let non_empty = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        Self {
            sandbox_url: non_empty("SANDBOX_URL"),
            sandbox_api_key: non_empty("SANDBOX_API_KEY"),
            sandbox_api_host: non_empty("SANDBOX_API_HOST"),
            openai_api_key: non_empty("OPENAI_API_KEY"),
            enable_classifier: non_empty("ENABLE_CLASSIFIER")
                .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
        }
    }
}
