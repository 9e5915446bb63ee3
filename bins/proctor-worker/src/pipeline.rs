/// Pipeline - Two Stages Joined by a Durable Precondition
///
/// **Stage 1 (integrity):** cohort similarity, authorship heuristics and the
/// optional classifier produce the Integrity Report, written exactly once.
///
/// **Stage 2 (scoring):** runs only once that report exists. Tests run in the
/// sandbox, the judge reviews the code, and the aggregator writes the Score
/// Breakdown.
///
/// Every job runs under a per-stage lock owned by a per-run token and
/// refreshed while the stage runs. A stage whose output already
/// exists is skipped, so redelivered jobs are harmless. Stage 2 without a
/// report is deferred and retried with exponential backoff until the attempt
/// budget runs out, at which point the submission is marked timed out.

use crate::classifier::Classifier;
use crate::config::ProctorConfig;
use crate::harness::TestHarness;
use crate::judge::Judge;
use crate::sandbox::Sandbox;
use crate::store::PipelineStore;
use anyhow::{anyhow, Result};
use chrono::Utc;
use proctor_analysis::authorship::{self, AUTHORSHIP_METHODS};
use proctor_analysis::fusion::{classifier_reason, fuse};
use proctor_analysis::scoring::{aggregate_for_report, ScoringOutcome};
use proctor_analysis::similarity::{compare_cohort, DETECTION_METHODS};
use proctor_analysis::OutputComparator;
use proctor_common::types::{
    AnalysisMetadata, IntegrityReport, PipelineJob, Stage, SubmissionStatus,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    /// Output written by this run
    Completed,
    /// Output already existed
    Skipped,
    /// Precondition not met yet
    Deferred,
    /// Another worker holds the stage lock
    Busy,
    /// The stage errored; retried or marked failed
    Failed,
}

pub struct Pipeline {
    store: Arc<dyn PipelineStore>,
    sandbox: Arc<dyn Sandbox>,
    classifier: Classifier,
    judge: Judge,
    config: ProctorConfig,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn PipelineStore>,
        sandbox: Arc<dyn Sandbox>,
        classifier: Classifier,
        judge: Judge,
        config: ProctorConfig,
    ) -> Self {
        Self {
            store,
            sandbox,
            classifier,
            judge,
            config,
        }
    }

    /// Run one job under its stage lock and apply the retry policy to the
    /// outcome. Store failures while running are retried like any stage
    /// error; an `Err` means the job could be neither rescheduled nor pushed
    /// back, and the caller still owns it.
    #[instrument(skip(self, job), fields(submission_id = %job.submission_id, stage = %job.stage, attempt = job.attempt))]
    pub async fn handle(&self, job: &PipelineJob) -> Result<StageOutcome> {
        let outcome = self.run_locked(job).await;

        match outcome {
            Ok(StageOutcome::Completed) | Ok(StageOutcome::Skipped) if job.stage == Stage::Integrity => {
                let scoring = PipelineJob::new(job.submission_id, Stage::Scoring);
                if let Err(e) = self.store.enqueue(&scoring).await {
                    // Rerunning integrity is a skip that queues scoring again
                    warn!(error = %e, "Failed to queue scoring stage, retrying integrity job");
                    self.requeue(job, self.config.pipeline.backoff(1)).await?;
                }
            }
            Ok(StageOutcome::Completed) | Ok(StageOutcome::Skipped) | Ok(StageOutcome::Failed) => {}
            Ok(StageOutcome::Busy) => {
                info!("Stage locked by another worker, rescheduling");
                self.requeue(job, self.config.pipeline.backoff(1)).await?;
            }
            Ok(StageOutcome::Deferred) => {
                self.retry_or_give_up(job, Some(SubmissionStatus::Deferred), SubmissionStatus::TimedOut)
                    .await?;
            }
            Err(ref e) => {
                error!(error = %e, "Stage failed");
                self.retry_or_give_up(job, None, SubmissionStatus::Failed)
                    .await?;
            }
        }

        Ok(outcome.unwrap_or(StageOutcome::Failed))
    }

    /// Take the stage lock under a fresh token, keep it alive while the stage
    /// runs and release it afterwards. Losing the lock abandons the stage.
    async fn run_locked(&self, job: &PipelineJob) -> Result<StageOutcome> {
        let token = Uuid::new_v4().to_string();
        let ttl = Duration::from_secs(self.config.pipeline.lock_ttl_secs.max(1));
        if !self
            .store
            .try_lock(job.stage, &job.submission_id, &token, ttl)
            .await?
        {
            return Ok(StageOutcome::Busy);
        }

        let result = tokio::select! {
            result = self.run_stage(job.stage, job.submission_id) => result,
            _ = self.hold_lock(job, &token, ttl) => {
                Err(anyhow!("Stage lock lost before the stage finished"))
            }
        };

        match self.store.unlock(job.stage, &job.submission_id, &token).await {
            Ok(true) => {}
            Ok(false) => warn!("Stage lock was no longer ours at release"),
            Err(e) => warn!(error = %e, "Failed to release stage lock; it will expire"),
        }
        result
    }

    /// Refresh the lock every third of its TTL; returns once it is lost
    async fn hold_lock(&self, job: &PipelineJob, token: &str, ttl: Duration) {
        let period = (ttl / 3).max(Duration::from_millis(100));
        loop {
            tokio::time::sleep(period).await;
            match self
                .store
                .refresh_lock(job.stage, &job.submission_id, token, ttl)
                .await
            {
                Ok(true) => {}
                Ok(false) => {
                    warn!("Stage lock taken over by another holder");
                    return;
                }
                // Transient; the next refresh may still land before expiry
                Err(e) => warn!(error = %e, "Failed to refresh stage lock"),
            }
        }
    }

    /// Delay the job; if the delayed set is unreachable push it straight back
    /// onto its queue
    async fn requeue(&self, job: &PipelineJob, delay: Duration) -> Result<()> {
        match self.store.schedule(job, delay).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(error = %e, "Failed to schedule job, pushing it back onto its queue");
                self.store.enqueue(job).await
            }
        }
    }

    async fn retry_or_give_up(
        &self,
        job: &PipelineJob,
        waiting: Option<SubmissionStatus>,
        exhausted: SubmissionStatus,
    ) -> Result<()> {
        let next = job.next_attempt();
        if next.attempt >= self.config.pipeline.max_attempts {
            warn!(attempts = next.attempt, status = ?exhausted, "Retry budget exhausted");
            return self.store.set_status(&job.submission_id, exhausted).await;
        }

        let delay = self.config.pipeline.backoff(next.attempt);
        info!(next_attempt = next.attempt, delay_ms = delay.as_millis() as u64, "Rescheduling");
        if let Some(status) = waiting {
            if let Err(e) = self.store.set_status(&job.submission_id, status).await {
                warn!(error = %e, "Failed to record waiting status");
            }
        }
        self.requeue(&next, delay).await
    }

    async fn run_stage(&self, stage: Stage, submission_id: Uuid) -> Result<StageOutcome> {
        match stage {
            Stage::Integrity => self.run_integrity(submission_id).await,
            Stage::Scoring => self.run_scoring(submission_id).await,
        }
    }

    /// Stage 1: build and store the integrity report
    pub async fn run_integrity(&self, submission_id: Uuid) -> Result<StageOutcome> {
        if self.store.report(&submission_id).await?.is_some() {
            info!("Integrity report already exists");
            return Ok(StageOutcome::Skipped);
        }

        let submission = self
            .store
            .submission(&submission_id)
            .await?
            .ok_or_else(|| anyhow!("Submission {} not found", submission_id))?;
        self.store
            .set_status(&submission_id, SubmissionStatus::Analyzing)
            .await?;

        let cohort = self.store.cohort(&submission.assessment_id).await?;
        let comparison = compare_cohort(
            &submission,
            &cohort,
            &self.config.similarity,
            self.config.match_threshold,
        );

        let heuristic =
            authorship::score_with(&submission.code, submission.language, &self.config.authorship);
        let verdict = self
            .classifier
            .classify_or_skip(submission_id, &submission.code, submission.language)
            .await;

        let authorship_score =
            (fuse(heuristic.score, verdict.as_ref(), &self.config.fusion) * 100.0).round() / 100.0;
        let mut authorship_reasons = heuristic.reasons;
        if let Some(verdict) = &verdict {
            authorship_reasons.push(classifier_reason(verdict));
        }

        let report = IntegrityReport {
            submission_id,
            overall_similarity_score: comparison.overall_score,
            analysis_metadata: AnalysisMetadata {
                total_comparisons: comparison.total_comparisons,
                matches_found: comparison.matches.len(),
                detection_methods: DETECTION_METHODS.iter().map(|m| m.to_string()).collect(),
                authorship_methods: AUTHORSHIP_METHODS.iter().map(|m| m.to_string()).collect(),
                authorship_metrics: heuristic.metrics,
                classifier: verdict,
                analyzed_at: Utc::now(),
            },
            matches: comparison.matches,
            authorship_score,
            authorship_reasons,
        };

        if !self.store.store_report_once(&report).await? {
            info!("Integrity report written concurrently");
            return Ok(StageOutcome::Skipped);
        }

        info!(
            similarity = report.overall_similarity_score,
            matches = report.matches.len(),
            comparisons = report.analysis_metadata.total_comparisons,
            authorship = report.authorship_score,
            "Integrity report stored"
        );
        Ok(StageOutcome::Completed)
    }

    /// Stage 2: tests, judge and aggregation; deferred without a report
    pub async fn run_scoring(&self, submission_id: Uuid) -> Result<StageOutcome> {
        if self.store.breakdown(&submission_id).await?.is_some() {
            info!("Score breakdown already exists");
            return Ok(StageOutcome::Skipped);
        }

        let Some(report) = self.store.report(&submission_id).await? else {
            info!("Integrity report not ready");
            return Ok(StageOutcome::Deferred);
        };

        let submission = self
            .store
            .submission(&submission_id)
            .await?
            .ok_or_else(|| anyhow!("Submission {} not found", submission_id))?;
        let assessment = self
            .store
            .assessment(&submission.assessment_id)
            .await?
            .ok_or_else(|| anyhow!("Assessment {} not found", submission.assessment_id))?;
        self.store
            .set_status(&submission_id, SubmissionStatus::Scoring)
            .await?;

        let harness = TestHarness::new(
            self.sandbox.as_ref(),
            OutputComparator::new(self.config.comparator),
            self.config.timeouts.sandbox_secs,
        );
        let tests = harness
            .run(
                submission_id,
                &submission.code,
                submission.language,
                &assessment.test_cases,
            )
            .await;

        let verdict = self
            .judge
            .evaluate_or_default(
                submission_id,
                &assessment.question,
                &assessment.test_cases,
                &submission.code,
                submission.language,
            )
            .await;

        let breakdown = match aggregate_for_report(
            Some(&report),
            submission_id,
            assessment.marks,
            &tests,
            &verdict,
            submission.focus_event_count,
            &self.config.scoring,
        ) {
            ScoringOutcome::Ready(breakdown) => breakdown,
            ScoringOutcome::NotReady => return Ok(StageOutcome::Deferred),
        };

        self.store.store_breakdown(&breakdown, &tests).await?;
        self.store
            .set_status(&submission_id, SubmissionStatus::Completed)
            .await?;

        info!(
            passed = tests.passed_count,
            total = tests.total_count,
            performance = breakdown.performance_score,
            bonus = breakdown.total_bonus,
            final_score = breakdown.final_score,
            "Score breakdown stored"
        );
        Ok(StageOutcome::Completed)
    }
}
