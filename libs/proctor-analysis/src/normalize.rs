/// Code Normalizer - Cosmetic-Edit Insensitive Views of Source Text
///
/// Two strengths are provided so that similarity is measured against more
/// than one view of the code:
/// - `normalize`: drops comments, literals and whitespace differences
/// - `deep_normalize`: additionally erases identifier names
///
/// Everything here is a free function over compiled-once patterns; there is
/// no state shared between analyses.

use lazy_static::lazy_static;
use proctor_common::types::Language;
use regex::{Captures, Regex};

lazy_static! {
    static ref BLOCK_COMMENT: Regex = Regex::new(r"(?s)/\*.*?\*/").unwrap();
    static ref LINE_COMMENT: Regex = Regex::new(r"//.*").unwrap();
    static ref HASH_COMMENT: Regex = Regex::new(r"#.*").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
    static ref QUOTED: Regex = Regex::new(r#"['"][^'"]*['"]"#).unwrap();
    static ref INTEGER: Regex = Regex::new(r"\b\d+\b").unwrap();
    static ref NUMBER: Regex = Regex::new(r"\b\d+\.?\d*\b").unwrap();
    static ref IDENTIFIER: Regex = Regex::new(r"\b[a-zA-Z_][a-zA-Z0-9_]*\b").unwrap();
    static ref TOKEN_SPLIT: Regex = Regex::new(r"[\s()\[\]{};,.]+").unwrap();
}

/// Words that survive deep normalization (compared case-insensitively)
pub const RESERVED_KEYWORDS: &[&str] = &[
    "function", "var", "let", "const", "if", "else", "for", "while", "return", "class", "def",
    "import", "from", "public", "private", "int", "float", "double", "void", "string", "bool",
    "true", "false",
];

/// Placeholder for quoted literals in the surface view
pub const STRING_PLACEHOLDER: &str = "STRING";
/// Placeholder for quoted literals in the deep view
pub const DEEP_STRING_PLACEHOLDER: &str = "STR";
pub const NUMBER_PLACEHOLDER: &str = "NUM";
pub const IDENTIFIER_PLACEHOLDER: &str = "VAR";

fn strip_comments(text: &str) -> String {
    let text = BLOCK_COMMENT.replace_all(text, "");
    let text = LINE_COMMENT.replace_all(&text, "");
    HASH_COMMENT.replace_all(&text, "").into_owned()
}

/// Surface normalization.
///
/// Strips comments, collapses whitespace, replaces quoted literals with
/// `STRING` and integer literals with `NUM`. Brace-delimited languages get
/// `{` / `}` padded with spaces so they tokenize on their own.
pub fn normalize(text: &str, language: Language) -> String {
    let text = strip_comments(text);
    let text = WHITESPACE.replace_all(&text, " ");
    let text = QUOTED.replace_all(&text, STRING_PLACEHOLDER);
    let text = INTEGER.replace_all(&text, NUMBER_PLACEHOLDER);
    let normalized = text.trim().to_string();

    if language.is_brace_delimited() {
        normalized.replace('{', " { ").replace('}', " } ")
    } else {
        normalized
    }
}

/// Deep normalization: surface rules plus every non-keyword identifier
/// becomes `VAR`, which removes sensitivity to renaming.
pub fn deep_normalize(text: &str, _language: Language) -> String {
    let text = strip_comments(text);
    let text = IDENTIFIER.replace_all(&text, |caps: &Captures| {
        let word = &caps[0];
        if is_reserved(word) {
            word.to_string()
        } else {
            IDENTIFIER_PLACEHOLDER.to_string()
        }
    });
    let text = QUOTED.replace_all(&text, DEEP_STRING_PLACEHOLDER);
    let text = NUMBER.replace_all(&text, NUMBER_PLACEHOLDER);
    let text = WHITESPACE.replace_all(&text, " ");
    text.trim().to_string()
}

fn is_reserved(word: &str) -> bool {
    let lower = word.to_lowercase();
    RESERVED_KEYWORDS.contains(&lower.as_str())
}

/// Split on whitespace and `()[]{};,.`, keeping tokens longer than two
/// characters. Every downstream metric consumes this sequence.
pub fn tokenize(text: &str) -> Vec<String> {
    TOKEN_SPLIT
        .split(text)
        .filter(|token| token.chars().count() > 2)
        .map(str::to_string)
        .collect()
}
