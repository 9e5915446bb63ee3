/// Output Equivalence Comparator
///
/// Decides whether program output matches the expected output while
/// tolerating case, punctuation, spacing, float noise and line order.
/// Strategies are tried in a fixed order and the first one that matches
/// wins.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

lazy_static! {
    static ref HORIZONTAL_WHITESPACE: Regex = Regex::new(r"[^\S\n]+").unwrap();
    static ref PUNCTUATION: Regex = Regex::new(r#"[.,!?;:'"]"#).unwrap();
    static ref BLANK_LINES: Regex = Regex::new(r"\n+").unwrap();
    static ref ANY_WHITESPACE: Regex = Regex::new(r"\s").unwrap();
    static ref LIST_SEPARATOR: Regex = Regex::new(r"[\n,]").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComparatorConfig {
    pub numeric_tolerance: f64,
    /// Minimum shorter/longer length ratio for a containment match
    pub containment_ratio: f64,
}

impl Default for ComparatorConfig {
    fn default() -> Self {
        Self {
            numeric_tolerance: 1e-4,
            containment_ratio: 0.9,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    BothEmpty,
    Normalized,
    Compact,
    Numeric,
    SortedList,
    Containment,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strategy::BothEmpty => "both_empty",
            Strategy::Normalized => "normalized",
            Strategy::Compact => "compact",
            Strategy::Numeric => "numeric",
            Strategy::SortedList => "sorted_list",
            Strategy::Containment => "containment",
        };
        write!(f, "{}", name)
    }
}

/// Trim, lowercase, collapse runs of spaces, strip `.,!?;:'"`, drop blank
/// lines. Line breaks are kept so multi-line output can be compared as a
/// list.
pub fn normalize_output(text: &str) -> String {
    let lowered = text.trim().to_lowercase();
    let lines: Vec<String> = lowered
        .lines()
        .map(|line| {
            let line = HORIZONTAL_WHITESPACE.replace_all(line, " ");
            PUNCTUATION.replace_all(&line, "").trim().to_string()
        })
        .collect();
    BLANK_LINES
        .replace_all(&lines.join("\n"), "\n")
        .trim()
        .to_string()
}

#[derive(Debug, Clone, Default)]
pub struct OutputComparator {
    config: ComparatorConfig,
}

impl OutputComparator {
    pub fn new(config: ComparatorConfig) -> Self {
        Self { config }
    }

    pub fn equivalent(&self, actual: &str, expected: &str) -> bool {
        self.matching_strategy(actual, expected).is_some()
    }

    /// The first strategy under which the outputs match, if any
    pub fn matching_strategy(&self, actual: &str, expected: &str) -> Option<Strategy> {
        match (actual.trim().is_empty(), expected.trim().is_empty()) {
            (true, true) => return Some(Strategy::BothEmpty),
            (true, false) | (false, true) => return None,
            _ => {}
        }

        let norm_actual = normalize_output(actual);
        let norm_expected = normalize_output(expected);
        if norm_actual == norm_expected {
            return Some(Strategy::Normalized);
        }

        let compact_actual = ANY_WHITESPACE.replace_all(&norm_actual, "");
        let compact_expected = ANY_WHITESPACE.replace_all(&norm_expected, "");
        if compact_actual == compact_expected {
            return Some(Strategy::Compact);
        }

        if let (Ok(a), Ok(b)) = (actual.trim().parse::<f64>(), expected.trim().parse::<f64>()) {
            if (a - b).abs() < self.config.numeric_tolerance {
                return Some(Strategy::Numeric);
            }
        }

        if sorted_items(&norm_actual) == sorted_items(&norm_expected) {
            return Some(Strategy::SortedList);
        }

        let (shorter, longer) = if compact_actual.len() <= compact_expected.len() {
            (&compact_actual, &compact_expected)
        } else {
            (&compact_expected, &compact_actual)
        };
        if longer.contains(&**shorter) {
            let ratio = shorter.chars().count() as f64 / longer.chars().count() as f64;
            if ratio >= self.config.containment_ratio {
                return Some(Strategy::Containment);
            }
        }

        None
    }
}

fn sorted_items(text: &str) -> Vec<&str> {
    let mut items: Vec<&str> = LIST_SEPARATOR
        .split(text)
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .collect();
    items.sort_unstable();
    items
}

/// Compare with the default configuration
pub fn equivalent(actual: &str, expected: &str) -> bool {
    OutputComparator::default().equivalent(actual, expected)
}
