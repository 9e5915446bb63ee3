/// Score Aggregator - Bonus, Not Penalty
///
/// Performance (tests, logic, quality) earns marks directly. Integrity
/// signals never subtract from performance: each owns a bonus slot that pays
/// out in proportion to how clean the signal is.
///
/// ```text
/// bonus_i = max_i * (1 - signal_i / 100)
/// final   = min(performance + sum(bonus_i), max_marks)
/// ```

use crate::round2;
use chrono::Utc;
use proctor_common::types::{
    ComponentScore, IntegrityAllocation, IntegrityReport, JudgeVerdict, ScoreBreakdown,
    TestRunSummary,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fractions of the maximum marks per component
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreAllocation {
    pub tests: f64,
    pub logic: f64,
    pub quality: f64,
    pub plagiarism: f64,
    pub authorship: f64,
    pub focus_loss: f64,
    /// Focus-loss events at which the focus signal reaches 100
    pub focus_loss_saturation: u32,
}

impl Default for ScoreAllocation {
    fn default() -> Self {
        Self {
            tests: 0.50,
            logic: 0.10,
            quality: 0.10,
            plagiarism: 0.15,
            authorship: 0.10,
            focus_loss: 0.05,
            focus_loss_saturation: 5,
        }
    }
}

/// Stage 2 may only aggregate once the integrity report exists
#[derive(Debug, Clone, PartialEq)]
pub enum ScoringOutcome {
    Ready(ScoreBreakdown),
    NotReady,
}

/// Focus-loss count mapped onto 0-100
pub fn focus_loss_signal(count: u32, saturation: u32) -> f64 {
    if saturation == 0 {
        return if count > 0 { 100.0 } else { 0.0 };
    }
    f64::min(count as f64 / saturation as f64 * 100.0, 100.0)
}

fn component(max_marks: f64, fraction: f64, percent: f64) -> ComponentScore {
    let percent = percent.clamp(0.0, 100.0);
    let max = max_marks * fraction;
    ComponentScore {
        score: round2(max * percent / 100.0),
        max_marks: round2(max),
        percentage: round2(percent),
    }
}

fn integrity_slot(max_marks: f64, fraction: f64, signal: f64) -> IntegrityAllocation {
    let signal = signal.clamp(0.0, 100.0);
    let max = max_marks * fraction;
    let deduction = max * signal / 100.0;
    IntegrityAllocation {
        max_allocation: round2(max),
        signal_percent: round2(signal),
        deduction: round2(deduction),
        bonus: round2(max - deduction),
    }
}

#[allow(clippy::too_many_arguments)]
pub fn aggregate(
    submission_id: Uuid,
    max_marks: f64,
    tests: &TestRunSummary,
    judge: &JudgeVerdict,
    authorship_score: f64,
    plagiarism_score: f64,
    focus_loss_count: u32,
    allocation: &ScoreAllocation,
) -> ScoreBreakdown {
    let max_marks = max_marks.max(0.0);

    let test_component = component(max_marks, allocation.tests, tests.pass_percentage);
    let logic = component(max_marks, allocation.logic, judge.logic_score);
    let quality = component(max_marks, allocation.quality, judge.quality_score);
    let performance_score = test_component.score + logic.score + quality.score;

    let plagiarism = integrity_slot(max_marks, allocation.plagiarism, plagiarism_score);
    let authorship = integrity_slot(max_marks, allocation.authorship, authorship_score);
    let focus_loss = integrity_slot(
        max_marks,
        allocation.focus_loss,
        focus_loss_signal(focus_loss_count, allocation.focus_loss_saturation),
    );
    let total_bonus = plagiarism.bonus + authorship.bonus + focus_loss.bonus;

    let final_score = (performance_score + total_bonus).clamp(0.0, max_marks);

    ScoreBreakdown {
        submission_id,
        max_marks,
        tests: test_component,
        tests_passed: tests.passed_count,
        tests_total: tests.total_count,
        logic,
        quality,
        performance_score: round2(performance_score),
        plagiarism,
        authorship,
        focus_loss,
        focus_loss_count,
        total_bonus: round2(total_bonus),
        final_score: round2(final_score),
        judge_reasoning: judge.reasoning.clone(),
        evaluated_at: Utc::now(),
    }
}

/// Aggregate against a stored integrity report; `NotReady` without one
pub fn aggregate_for_report(
    report: Option<&IntegrityReport>,
    submission_id: Uuid,
    max_marks: f64,
    tests: &TestRunSummary,
    judge: &JudgeVerdict,
    focus_loss_count: u32,
    allocation: &ScoreAllocation,
) -> ScoringOutcome {
    match report {
        Some(report) => ScoringOutcome::Ready(aggregate(
            submission_id,
            max_marks,
            tests,
            judge,
            report.authorship_score,
            report.overall_similarity_score,
            focus_loss_count,
            allocation,
        )),
        None => ScoringOutcome::NotReady,
    }
}
