use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Languages accepted by the submission path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    Javascript,
    Java,
    Cpp,
    C,
}

impl Language {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "python" | "py" => Some(Language::Python),
            "javascript" | "js" => Some(Language::Javascript),
            "java" => Some(Language::Java),
            "cpp" | "c++" => Some(Language::Cpp),
            "c" => Some(Language::C),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Javascript => "javascript",
            Language::Java => "java",
            Language::Cpp => "cpp",
            Language::C => "c",
        }
    }

    /// Languages whose blocks are delimited by `{` / `}`
    pub fn is_brace_delimited(&self) -> bool {
        !matches!(self, Language::Python)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusEventKind {
    Lost,
    Returned,
}

/// One entry of the client-side focus log (tab switch, window blur, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FocusEvent {
    pub kind: FocusEventKind,
    pub at: DateTime<Utc>,
}

/// A submitted answer. Never mutated after the accept path records it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub id: Uuid,
    pub author_id: String,
    pub author_name: String,
    pub assessment_id: String,
    pub code: String,
    pub language: Language,
    pub start_time: DateTime<Utc>,
    pub submit_time: DateTime<Utc>,
    pub elapsed_seconds: i64,
    #[serde(default)]
    pub focus_events: Vec<FocusEvent>,
    #[serde(default)]
    pub focus_event_count: u32,
    #[serde(default)]
    pub is_auto_submitted: bool,
    #[serde(default)]
    pub auto_submit_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub input: String,
    #[serde(alias = "expected_output")]
    pub output: String,
}

/// Assessment definition, authored and stored by an external collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub question: String,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
    pub marks: f64,
    #[serde(default)]
    pub reference_solution: Option<String>,
}

/// A peer whose submission scored above the match threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub peer_submission_id: Uuid,
    pub peer_author_id: String,
    pub peer_name: String,
    pub score: f64,
    pub language: Language,
    pub peer_submit_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthorshipMetrics {
    pub entropy: f64,
    pub perplexity: f64,
    pub burstiness: f64,
    /// Percentage of comment lines, 0-100
    pub comment_ratio: f64,
    /// Unique/total normalized tokens as a percentage, 0-100
    pub vocabulary_richness: f64,
}

/// Verdict returned by the external text classifier, already mapped onto
/// the generation-likelihood scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierVerdict {
    pub is_generated: bool,
    /// Confidence as reported, i.e. in whichever label was chosen
    pub confidence: f64,
    /// Likelihood that the code was generated, 0-100
    pub likelihood: f64,
    pub reasoning: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisMetadata {
    pub total_comparisons: usize,
    pub matches_found: usize,
    pub detection_methods: Vec<String>,
    pub authorship_methods: Vec<String>,
    pub authorship_metrics: AuthorshipMetrics,
    pub classifier: Option<ClassifierVerdict>,
    pub analyzed_at: DateTime<Utc>,
}

/// Stage 1 output. Written at most once per submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub submission_id: Uuid,
    pub overall_similarity_score: f64,
    pub matches: Vec<Match>,
    pub authorship_score: f64,
    pub authorship_reasons: Vec<String>,
    pub analysis_metadata: AnalysisMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCaseResult {
    pub test_case: usize,
    pub input: String,
    pub expected: String,
    pub actual: Option<String>,
    pub passed: bool,
    pub error: Option<String>,
    pub normalized_expected: String,
    pub normalized_actual: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestRunSummary {
    pub results: Vec<TestCaseResult>,
    pub passed_count: usize,
    pub total_count: usize,
    pub pass_percentage: f64,
}

/// Logic/quality judgement from the external reviewer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeVerdict {
    pub logic_score: f64,
    pub quality_score: f64,
    pub reasoning: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentScore {
    pub score: f64,
    pub max_marks: f64,
    pub percentage: f64,
}

/// One integrity slot: the share of marks awarded back as a bonus when the
/// adverse signal is low.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntegrityAllocation {
    pub max_allocation: f64,
    pub signal_percent: f64,
    pub deduction: f64,
    pub bonus: f64,
}

/// Stage 2 output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub submission_id: Uuid,
    pub max_marks: f64,
    pub tests: ComponentScore,
    pub tests_passed: usize,
    pub tests_total: usize,
    pub logic: ComponentScore,
    pub quality: ComponentScore,
    pub performance_score: f64,
    pub plagiarism: IntegrityAllocation,
    pub authorship: IntegrityAllocation,
    pub focus_loss: IntegrityAllocation,
    pub focus_loss_count: u32,
    pub total_bonus: f64,
    pub final_score: f64,
    pub judge_reasoning: String,
    pub evaluated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Integrity,
    Scoring,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Integrity => f.write_str("integrity"),
            Stage::Scoring => f.write_str("scoring"),
        }
    }
}

/// Queue payload for the background pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineJob {
    pub submission_id: Uuid,
    pub stage: Stage,
    #[serde(default)]
    pub attempt: u32,
}

impl PipelineJob {
    pub fn new(submission_id: Uuid, stage: Stage) -> Self {
        Self {
            submission_id,
            stage,
            attempt: 0,
        }
    }

    pub fn next_attempt(&self) -> Self {
        Self {
            attempt: self.attempt + 1,
            ..self.clone()
        }
    }
}

/// Progress of a submission through the pipeline, as seen by pollers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Queued,
    Analyzing,
    Deferred,
    Scoring,
    Completed,
    TimedOut,
    Failed,
}

impl SubmissionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SubmissionStatus::Completed | SubmissionStatus::TimedOut | SubmissionStatus::Failed
        )
    }
}
