//! Pure analysis core: normalization, fingerprints, similarity, authorship
//! heuristics, classifier fusion, output comparison and score aggregation.
//!
//! Nothing in this crate performs I/O; the worker feeds it submissions and
//! external verdicts and persists what comes back.

pub mod authorship;
pub mod comparator;
pub mod fingerprint;
pub mod fusion;
pub mod normalize;
pub mod scoring;
pub mod similarity;

pub use authorship::{AuthorshipAnalysis, HeuristicPoints};
pub use comparator::{ComparatorConfig, OutputComparator};
pub use fusion::FusionWeights;
pub use scoring::{ScoreAllocation, ScoringOutcome};
pub use similarity::{compare_cohort, similarity, CohortComparison, SimilarityWeights};

/// Round to two decimal places
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
