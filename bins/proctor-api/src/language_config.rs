// Language configuration management
// Loads languages.json to decide which submissions the API accepts

use proctor_common::types::Language;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

pub const DEFAULT_LANGUAGES_PATH: &str = "config/languages.json";

#[derive(Debug, Clone, Deserialize)]
struct LanguageEntry {
    name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct LanguagesFile {
    languages: Vec<LanguageEntry>,
}

/// Registry of configured languages
/// This is the authoritative source for which languages are enabled
#[derive(Debug, Clone)]
pub struct LanguageRegistry {
    enabled_languages: HashSet<Language>,
}

impl LanguageRegistry {
    /// Load language configuration from languages.json
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| format!("Failed to read {}: {}", path.as_ref().display(), e))?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, String> {
        let config: LanguagesFile = serde_json::from_str(content)
            .map_err(|e| format!("Failed to parse languages.json: {}", e))?;

        let mut enabled_languages = HashSet::new();
        for entry in &config.languages {
            match Language::from_str(&entry.name) {
                Some(lang) => {
                    enabled_languages.insert(lang);
                }
                None => {
                    return Err(format!("Unknown language '{}' in languages.json", entry.name));
                }
            }
        }

        if enabled_languages.is_empty() {
            return Err("No languages configured in languages.json".to_string());
        }

        Ok(Self { enabled_languages })
    }

    pub fn is_enabled(&self, language: Language) -> bool {
        self.enabled_languages.contains(&language)
    }

    /// Enabled languages, sorted by name
    pub fn enabled_languages(&self) -> Vec<Language> {
        let mut languages: Vec<Language> = self.enabled_languages.iter().copied().collect();
        languages.sort_by_key(|l| l.as_str());
        languages
    }
}
