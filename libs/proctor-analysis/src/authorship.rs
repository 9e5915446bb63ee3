/// Authorship Heuristics - Generated-Code Likelihood
///
/// Additive point rules over statistical and stylistic signals of a single
/// submission. Each rule is a standalone function so it can be tested and
/// tuned on its own; `score` sums the points of every rule that fires and
/// clamps the total at 100.

use crate::normalize::{normalize, tokenize};
use crate::round2;
use lazy_static::lazy_static;
use proctor_common::types::{AuthorshipMetrics, Language};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

pub const ENTROPY_THRESHOLD: f64 = 3.5;
pub const PERPLEXITY_THRESHOLD: f64 = 5.0;
pub const BURSTINESS_THRESHOLD: f64 = 0.3;
pub const MIN_INDENTED_LINES: usize = 10;
pub const COMMENT_RATIO_THRESHOLD: f64 = 0.25;
pub const GENERIC_IDENTIFIER_LIMIT: usize = 5;
pub const VOCABULARY_RICHNESS_THRESHOLD: f64 = 0.65;
pub const MIN_VOCABULARY_TOKENS: usize = 30;
pub const LONG_NAME_LIMIT: usize = 2;
pub const TYPE_ANNOTATION_LIMIT: usize = 3;
pub const BOILERPLATE_LIMIT: usize = 1;

pub const AUTHORSHIP_METHODS: &[&str] = &[
    "entropy",
    "perplexity",
    "burstiness",
    "pattern_analysis",
    "stylometry",
    "vocabulary_analysis",
];

lazy_static! {
    static ref LEADING_WHITESPACE: Regex = Regex::new(r"^\s*").unwrap();
    static ref GENERIC_IDENTIFIERS: Vec<Regex> = vec![
        Regex::new(r"(?i)result\d*").unwrap(),
        Regex::new(r"(?i)temp\d*").unwrap(),
        Regex::new(r"(?i)value\d*").unwrap(),
        Regex::new(r"(?i)data\d*").unwrap(),
        Regex::new(r"(?i)item\d*").unwrap(),
        Regex::new(r"(?i)element\d*").unwrap(),
        Regex::new(r"current[A-Z]\w*").unwrap(),
        Regex::new(r"new[A-Z]\w*").unwrap(),
    ];
    static ref LONG_FUNCTION_DECL: Regex = Regex::new(r"function\s+\w{15,}").unwrap();
    static ref LONG_DEF_DECL: Regex = Regex::new(r"def\s+\w{15,}").unwrap();
    static ref LONG_CALL: Regex = Regex::new(r"\w{15,}\s*\(").unwrap();
    static ref TYPED_ASSIGNMENT: Regex = Regex::new(r":\s*\w+\s*=").unwrap();
    static ref RETURN_ANNOTATION: Regex = Regex::new(r"->\s*\w+:").unwrap();
    static ref BOILERPLATE: Vec<Regex> = vec![
        Regex::new(r"(?i)This\s+(function|method|code)\s+").unwrap(),
        Regex::new(r"(?i)The\s+following\s+").unwrap(),
        Regex::new(r"(?i)Here'?s\s+(how|what|the)").unwrap(),
        Regex::new(r"(?i)As\s+you\s+can\s+see").unwrap(),
        Regex::new(r"(?i)Note\s+that").unwrap(),
        Regex::new(r"(?i)It'?s\s+important\s+to").unwrap(),
    ];
}

/// Points awarded per rule
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicPoints {
    pub low_entropy: f64,
    pub low_perplexity: f64,
    pub low_burstiness: f64,
    pub perfect_indentation: f64,
    pub comment_density: f64,
    pub generic_identifiers: f64,
    pub vocabulary_richness: f64,
    pub long_names: f64,
    pub type_annotations: f64,
    pub modern_declarations: f64,
    pub boilerplate: f64,
}

impl Default for HeuristicPoints {
    fn default() -> Self {
        Self {
            low_entropy: 12.0,
            low_perplexity: 15.0,
            low_burstiness: 13.0,
            perfect_indentation: 10.0,
            comment_density: 12.0,
            generic_identifiers: 11.0,
            vocabulary_richness: 10.0,
            long_names: 9.0,
            type_annotations: 8.0,
            modern_declarations: 7.0,
            boilerplate: 20.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthorshipAnalysis {
    /// 0-100
    pub score: f64,
    pub reasons: Vec<String>,
    pub metrics: AuthorshipMetrics,
}

/// Score with the default point table
pub fn score(code: &str, language: Language) -> AuthorshipAnalysis {
    score_with(code, language, &HeuristicPoints::default())
}

pub fn score_with(code: &str, language: Language, points: &HeuristicPoints) -> AuthorshipAnalysis {
    let mut total = 0.0;
    let mut reasons = Vec::new();

    let entropy = shannon_entropy(code);
    if entropy < ENTROPY_THRESHOLD {
        total += points.low_entropy;
        reasons.push(format!("Low entropy ({:.2})", entropy));
    }

    let perplexity = bigram_perplexity(code);
    if perplexity < PERPLEXITY_THRESHOLD {
        total += points.low_perplexity;
        reasons.push(format!("Low perplexity ({:.2})", perplexity));
    }

    let burstiness = burstiness(code);
    if burstiness < BURSTINESS_THRESHOLD {
        total += points.low_burstiness;
        reasons.push(format!("Low burstiness ({:.2})", burstiness));
    }

    if has_perfect_indentation(code) {
        total += points.perfect_indentation;
        reasons.push("Perfect indentation".to_string());
    }

    let comments = comment_ratio(code);
    if comments > COMMENT_RATIO_THRESHOLD {
        total += points.comment_density;
        reasons.push(format!("High comment density ({:.1}%)", comments * 100.0));
    }

    let generic = generic_identifier_count(code);
    if generic > GENERIC_IDENTIFIER_LIMIT {
        total += points.generic_identifiers;
        reasons.push(format!("Generic identifier names ({})", generic));
    }

    let normalized_tokens = tokenize(&normalize(code, language));
    let richness = vocabulary_richness(&normalized_tokens);
    if richness > VOCABULARY_RICHNESS_THRESHOLD && normalized_tokens.len() > MIN_VOCABULARY_TOKENS {
        total += points.vocabulary_richness;
        reasons.push(format!("High vocabulary diversity ({:.1}%)", richness * 100.0));
    }

    let long_names = long_name_count(code);
    if long_names > LONG_NAME_LIMIT {
        total += points.long_names;
        reasons.push(format!("Overly descriptive names ({})", long_names));
    }

    match language {
        Language::Python => {
            let annotations = type_annotation_count(code);
            if annotations > TYPE_ANNOTATION_LIMIT {
                total += points.type_annotations;
                reasons.push(format!("Consistent type hints ({})", annotations));
            }
        }
        Language::Javascript => {
            if uses_only_modern_declarations(code) {
                total += points.modern_declarations;
                reasons.push("Modern declarations only (no var)".to_string());
            }
        }
        _ => {}
    }

    let boilerplate = boilerplate_count(code);
    if boilerplate > BOILERPLATE_LIMIT {
        total += points.boilerplate;
        reasons.push(format!("Explanatory boilerplate phrasing ({})", boilerplate));
    }

    AuthorshipAnalysis {
        score: f64::min(total, 100.0),
        reasons,
        metrics: AuthorshipMetrics {
            entropy: round2(entropy),
            perplexity: round2(perplexity),
            burstiness: round2(burstiness),
            comment_ratio: round2(comments * 100.0),
            vocabulary_richness: round2(richness * 100.0),
        },
    }
}

/// Shannon entropy (bits) of the token distribution; 0 without tokens
pub fn shannon_entropy(code: &str) -> f64 {
    let tokens = tokenize(code);
    if tokens.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<&str, usize> = HashMap::new();
    for token in &tokens {
        *freq.entry(token.as_str()).or_insert(0) += 1;
    }

    let total = tokens.len() as f64;
    freq.values()
        .map(|&count| {
            let p = count as f64 / total;
            -p * p.log2()
        })
        .sum()
}

/// Perplexity of the token bigram distribution.
///
/// Sums the log probability of each distinct bigram and normalizes by the
/// bigram count. Fewer than two tokens gives 0.
pub fn bigram_perplexity(code: &str) -> f64 {
    let tokens = tokenize(code);
    if tokens.len() < 2 {
        return 0.0;
    }

    let mut freq: HashMap<(&str, &str), usize> = HashMap::new();
    for pair in tokens.windows(2) {
        *freq.entry((pair[0].as_str(), pair[1].as_str())).or_insert(0) += 1;
    }

    let total = (tokens.len() - 1) as f64;
    let log_prob: f64 = freq.values().map(|&count| (count as f64 / total).ln()).sum();
    (-log_prob / total).exp()
}

/// Coefficient of variation (stddev / mean) of non-blank trimmed line lengths
pub fn burstiness(code: &str) -> f64 {
    let lengths: Vec<f64> = code
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| line.chars().count() as f64)
        .collect();

    if lengths.len() < 2 {
        return 0.0;
    }

    let n = lengths.len() as f64;
    let mean = lengths.iter().sum::<f64>() / n;
    if mean <= 0.0 {
        return 0.0;
    }
    let variance = lengths.iter().map(|len| (len - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt() / mean
}

/// Every indented line uses an even number of leading spaces, over more than
/// `MIN_INDENTED_LINES` lines
pub fn has_perfect_indentation(code: &str) -> bool {
    let lines: Vec<&str> = code.split('\n').collect();
    if lines.len() <= MIN_INDENTED_LINES {
        return false;
    }

    lines.iter().all(|line| {
        let indent = LEADING_WHITESPACE
            .find(line)
            .map_or(0, |m| m.as_str().chars().count());
        indent % 2 == 0 || line.trim().is_empty()
    })
}

/// Fraction of lines that are comments (`//`, `#`, or opening `/*`)
pub fn comment_ratio(code: &str) -> f64 {
    let lines: Vec<&str> = code.split('\n').collect();
    let comment_lines = lines
        .iter()
        .filter(|line| {
            let trimmed = line.trim();
            trimmed.starts_with("//") || trimmed.starts_with('#') || line.contains("/*")
        })
        .count();
    comment_lines as f64 / lines.len() as f64
}

/// Occurrences of stock names such as `result`, `temp`, `data`, `currentX`
pub fn generic_identifier_count(code: &str) -> usize {
    GENERIC_IDENTIFIERS
        .iter()
        .map(|pattern| pattern.find_iter(code).count())
        .sum()
}

/// Unique / total tokens; 0 without tokens
pub fn vocabulary_richness(tokens: &[String]) -> f64 {
    if tokens.is_empty() {
        return 0.0;
    }
    let unique: HashSet<&String> = tokens.iter().collect();
    unique.len() as f64 / tokens.len() as f64
}

/// Names of 15+ characters in declaration position.
///
/// Looks at `function` declarations first, then `def`, then anything called;
/// the first form that appears at all is the one counted.
pub fn long_name_count(code: &str) -> usize {
    [&*LONG_FUNCTION_DECL, &*LONG_DEF_DECL, &*LONG_CALL]
        .iter()
        .map(|pattern| pattern.find_iter(code).count())
        .find(|&count| count > 0)
        .unwrap_or(0)
}

/// Python annotated assignments plus return annotations
pub fn type_annotation_count(code: &str) -> usize {
    TYPED_ASSIGNMENT.find_iter(code).count() + RETURN_ANNOTATION.find_iter(code).count()
}

/// JavaScript written with `const`/`let` and never `var`
pub fn uses_only_modern_declarations(code: &str) -> bool {
    !code.contains("var ") && (code.contains("const ") || code.contains("let "))
}

/// Number of distinct explanatory-phrase patterns present
pub fn boilerplate_count(code: &str) -> usize {
    BOILERPLATE.iter().filter(|pattern| pattern.is_match(code)).count()
}
