/// External Classifier Fusion
///
/// Parses the free-form reply of an external text classifier and blends its
/// likelihood with the heuristic authorship score. A missing verdict leaves
/// the heuristic score untouched.

use proctor_common::types::ClassifierVerdict;
use serde::de::Error as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionWeights {
    pub heuristic: f64,
    pub classifier: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            heuristic: 0.6,
            classifier: 0.4,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawClassifierReply {
    #[serde(rename = "isGenerated", alias = "isAI", alias = "is_generated")]
    is_generated: bool,
    confidence: f64,
    #[serde(default)]
    reasoning: String,
}

/// Find the first well-formed JSON object embedded in `text`.
///
/// Models like to wrap answers in prose or markdown fences, so every `{` is
/// tried as a starting point until one parses as an object.
pub fn extract_first_json_object(text: &str) -> Option<Value> {
    text.match_indices('{').find_map(|(start, _)| {
        serde_json::Deserializer::from_str(&text[start..])
            .into_iter::<Value>()
            .next()
            .and_then(Result::ok)
            .filter(Value::is_object)
    })
}

/// Map a classifier reply onto the generation-likelihood scale.
///
/// Confidence is clamped to [0, 100]; a "human" verdict with confidence `c`
/// means a likelihood of `100 - c`.
pub fn parse_classifier_response(text: &str) -> Result<ClassifierVerdict, serde_json::Error> {
    let object = extract_first_json_object(text)
        .ok_or_else(|| serde_json::Error::custom("no JSON object in classifier reply"))?;
    let raw: RawClassifierReply = serde_json::from_value(object)?;

    let confidence = raw.confidence.clamp(0.0, 100.0);
    let likelihood = if raw.is_generated {
        confidence
    } else {
        100.0 - confidence
    };

    Ok(ClassifierVerdict {
        is_generated: raw.is_generated,
        confidence,
        likelihood,
        reasoning: raw.reasoning,
    })
}

/// Blend the heuristic score with the classifier likelihood, capped at 100
pub fn fuse(heuristic: f64, verdict: Option<&ClassifierVerdict>, weights: &FusionWeights) -> f64 {
    match verdict {
        Some(verdict) => f64::min(
            heuristic * weights.heuristic + verdict.likelihood * weights.classifier,
            100.0,
        ),
        None => heuristic,
    }
}

/// Human-readable line recorded among the authorship reasons
pub fn classifier_reason(verdict: &ClassifierVerdict) -> String {
    format!(
        "Classifier: {} ({:.0}% confident, likelihood {:.1}%): {}",
        if verdict.is_generated { "generated" } else { "human" },
        verdict.confidence,
        verdict.likelihood,
        verdict.reasoning
    )
}
