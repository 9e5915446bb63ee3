/// Similarity Aggregator - Peer-Pair Plagiarism Score
///
/// Six independent signals, each aimed at a different evasion class, are
/// blended with fixed weights into a single 0-100 score:
///
/// | signal               | view    | default weight |
/// |----------------------|---------|----------------|
/// | surface string (Dice)| surface | 0.20           |
/// | deep string (Dice)   | deep    | 0.20           |
/// | token Jaccard        | surface | 0.20           |
/// | winnowing overlap    | surface | 0.20           |
/// | normalized Levenshtein | deep  | 0.10           |
/// | char-trigram Jaccard | surface | 0.10           |
///
/// Submissions in different languages are never comparable and score 0.

use crate::fingerprint::{fingerprint_similarity, fingerprint_text};
use crate::normalize::{deep_normalize, normalize, tokenize};
use crate::round2;
use proctor_common::types::{Language, Match, Submission};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::hash::Hash;
use tracing::debug;

pub const DEFAULT_MATCH_THRESHOLD: f64 = 15.0;

pub const DETECTION_METHODS: &[&str] = &[
    "string_similarity",
    "deep_normalization",
    "jaccard",
    "winnowing",
    "levenshtein",
    "ngram",
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityWeights {
    pub surface_string: f64,
    pub deep_string: f64,
    pub token_jaccard: f64,
    pub fingerprint: f64,
    pub levenshtein: f64,
    pub trigram: f64,
}

impl Default for SimilarityWeights {
    fn default() -> Self {
        Self {
            surface_string: 0.20,
            deep_string: 0.20,
            token_jaccard: 0.20,
            fingerprint: 0.20,
            levenshtein: 0.10,
            trigram: 0.10,
        }
    }
}

/// Every sub-score in [0, 1] plus the blended 0-100 score
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SimilarityBreakdown {
    pub surface_string: f64,
    pub deep_string: f64,
    pub token_jaccard: f64,
    pub fingerprint: f64,
    pub levenshtein: f64,
    pub trigram: f64,
    pub score: f64,
}

/// Blended similarity of two submissions with the default weights
pub fn similarity(code_a: &str, code_b: &str, lang_a: Language, lang_b: Language) -> f64 {
    similarity_breakdown(code_a, code_b, lang_a, lang_b, &SimilarityWeights::default()).score
}

pub fn similarity_breakdown(
    code_a: &str,
    code_b: &str,
    lang_a: Language,
    lang_b: Language,
    weights: &SimilarityWeights,
) -> SimilarityBreakdown {
    if lang_a != lang_b {
        return SimilarityBreakdown::default();
    }

    let surface_a = normalize(code_a, lang_a);
    let surface_b = normalize(code_b, lang_b);
    let deep_a = deep_normalize(code_a, lang_a);
    let deep_b = deep_normalize(code_b, lang_b);

    let tokens_a: HashSet<String> = tokenize(&surface_a).into_iter().collect();
    let tokens_b: HashSet<String> = tokenize(&surface_b).into_iter().collect();

    let mut breakdown = SimilarityBreakdown {
        surface_string: strsim::sorensen_dice(&surface_a, &surface_b),
        deep_string: strsim::sorensen_dice(&deep_a, &deep_b),
        token_jaccard: jaccard(&tokens_a, &tokens_b),
        fingerprint: fingerprint_similarity(&fingerprint_text(&surface_a), &fingerprint_text(&surface_b))
            / 100.0,
        levenshtein: normalized_levenshtein(&deep_a, &deep_b),
        trigram: jaccard(&char_ngrams(&surface_a, 3), &char_ngrams(&surface_b, 3)),
        score: 0.0,
    };

    breakdown.score = (breakdown.surface_string * weights.surface_string
        + breakdown.deep_string * weights.deep_string
        + breakdown.token_jaccard * weights.token_jaccard
        + breakdown.fingerprint * weights.fingerprint
        + breakdown.levenshtein * weights.levenshtein
        + breakdown.trigram * weights.trigram)
        * 100.0;

    breakdown
}

fn jaccard<T: Eq + Hash>(a: &HashSet<T>, b: &HashSet<T>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// 1 - distance / max length; 0 when both are empty
fn normalized_levenshtein(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 0.0;
    }
    1.0 - strsim::levenshtein(a, b) as f64 / max_len as f64
}

fn char_ngrams(text: &str, n: usize) -> HashSet<String> {
    let chars: Vec<char> = text.chars().collect();
    chars.windows(n).map(|w| w.iter().collect()).collect()
}

/// Result of comparing one submission against its cohort
#[derive(Debug, Clone, PartialEq)]
pub struct CohortComparison {
    /// Matches above the threshold, highest score first
    pub matches: Vec<Match>,
    /// Mean of the unrounded match scores, rounded once; 0 when there are none
    pub overall_score: f64,
    pub total_comparisons: usize,
}

/// Score a submission against every peer of the same assessment.
///
/// The author's own submissions (and the submission itself) are skipped.
/// Peers scoring above `threshold` become matches.
pub fn compare_cohort(
    submission: &Submission,
    peers: &[Submission],
    weights: &SimilarityWeights,
    threshold: f64,
) -> CohortComparison {
    let mut matches = Vec::new();
    let mut raw_total = 0.0;
    let mut total_comparisons = 0;

    for peer in peers.iter().filter(|p| {
        p.id != submission.id
            && p.author_id != submission.author_id
            && p.assessment_id == submission.assessment_id
    }) {
        total_comparisons += 1;
        let breakdown = similarity_breakdown(
            &submission.code,
            &peer.code,
            submission.language,
            peer.language,
            weights,
        );

        debug!(
            submission_id = %submission.id,
            peer_id = %peer.id,
            score = breakdown.score,
            "Peer compared"
        );

        if breakdown.score > threshold {
            raw_total += breakdown.score;
            matches.push(Match {
                peer_submission_id: peer.id,
                peer_author_id: peer.author_id.clone(),
                peer_name: peer.author_name.clone(),
                score: round2(breakdown.score),
                language: peer.language,
                peer_submit_time: peer.submit_time,
            });
        }
    }

    matches.sort_by(|a, b| b.score.total_cmp(&a.score));

    let overall_score = if matches.is_empty() {
        0.0
    } else {
        round2(raw_total / matches.len() as f64)
    };

    CohortComparison {
        matches,
        overall_score,
        total_comparisons,
    }
}
