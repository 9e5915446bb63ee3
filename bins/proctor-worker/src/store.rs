// Durable state seen by the pipeline. Redis in production, memory in tests.
use anyhow::{Context, Result};
use async_trait::async_trait;
use proctor_common::redis;
use proctor_common::types::{
    Assessment, IntegrityReport, PipelineJob, ScoreBreakdown, Stage, Submission, SubmissionStatus,
    TestRunSummary,
};
use std::time::Duration;
use uuid::Uuid;

#[async_trait]
pub trait PipelineStore: Send + Sync {
    async fn submission(&self, id: &Uuid) -> Result<Option<Submission>>;
    async fn assessment(&self, assessment_id: &str) -> Result<Option<Assessment>>;
    /// Read-only snapshot of every submission to the assessment
    async fn cohort(&self, assessment_id: &str) -> Result<Vec<Submission>>;

    async fn report(&self, id: &Uuid) -> Result<Option<IntegrityReport>>;
    /// False when a report was already stored
    async fn store_report_once(&self, report: &IntegrityReport) -> Result<bool>;

    async fn breakdown(&self, id: &Uuid) -> Result<Option<ScoreBreakdown>>;
    async fn store_breakdown(&self, breakdown: &ScoreBreakdown, tests: &TestRunSummary) -> Result<()>;

    async fn set_status(&self, id: &Uuid, status: SubmissionStatus) -> Result<()>;

    /// Take the stage lock under `token`; false when someone else holds it
    async fn try_lock(&self, stage: Stage, id: &Uuid, token: &str, ttl: Duration) -> Result<bool>;
    /// Extend the lock; false when `token` no longer holds it
    async fn refresh_lock(&self, stage: Stage, id: &Uuid, token: &str, ttl: Duration) -> Result<bool>;
    /// Release the lock if `token` still holds it
    async fn unlock(&self, stage: Stage, id: &Uuid, token: &str) -> Result<bool>;

    async fn enqueue(&self, job: &PipelineJob) -> Result<()>;
    async fn schedule(&self, job: &PipelineJob, delay: Duration) -> Result<()>;
}

/// `PipelineStore` over a shared Redis connection manager
#[derive(Clone)]
pub struct RedisStore {
    conn: ::redis::aio::ConnectionManager,
}

impl RedisStore {
    pub fn new(conn: ::redis::aio::ConnectionManager) -> Self {
        Self { conn }
    }

    // ConnectionManager is a cheap handle onto one multiplexed connection
    fn conn(&self) -> ::redis::aio::ConnectionManager {
        self.conn.clone()
    }
}

#[async_trait]
impl PipelineStore for RedisStore {
    async fn submission(&self, id: &Uuid) -> Result<Option<Submission>> {
        redis::get_submission(&mut self.conn(), id)
            .await
            .context("Failed to load submission")
    }

    async fn assessment(&self, assessment_id: &str) -> Result<Option<Assessment>> {
        redis::get_assessment(&mut self.conn(), assessment_id)
            .await
            .context("Failed to load assessment")
    }

    async fn cohort(&self, assessment_id: &str) -> Result<Vec<Submission>> {
        redis::get_cohort(&mut self.conn(), assessment_id)
            .await
            .context("Failed to load cohort")
    }

    async fn report(&self, id: &Uuid) -> Result<Option<IntegrityReport>> {
        redis::get_report(&mut self.conn(), id)
            .await
            .context("Failed to load integrity report")
    }

    async fn store_report_once(&self, report: &IntegrityReport) -> Result<bool> {
        redis::store_report_once(&mut self.conn(), report)
            .await
            .context("Failed to store integrity report")
    }

    async fn breakdown(&self, id: &Uuid) -> Result<Option<ScoreBreakdown>> {
        redis::get_breakdown(&mut self.conn(), id)
            .await
            .context("Failed to load score breakdown")
    }

    async fn store_breakdown(&self, breakdown: &ScoreBreakdown, tests: &TestRunSummary) -> Result<()> {
        redis::store_breakdown(&mut self.conn(), breakdown, tests)
            .await
            .context("Failed to store score breakdown")
    }

    async fn set_status(&self, id: &Uuid, status: SubmissionStatus) -> Result<()> {
        redis::set_status(&mut self.conn(), id, status)
            .await
            .context("Failed to update status")
    }

    async fn try_lock(&self, stage: Stage, id: &Uuid, token: &str, ttl: Duration) -> Result<bool> {
        redis::acquire_lock(&mut self.conn(), stage, id, token, ttl.as_secs().max(1))
            .await
            .context("Failed to acquire stage lock")
    }

    async fn refresh_lock(&self, stage: Stage, id: &Uuid, token: &str, ttl: Duration) -> Result<bool> {
        redis::refresh_lock(&mut self.conn(), stage, id, token, ttl.as_secs().max(1))
            .await
            .context("Failed to refresh stage lock")
    }

    async fn unlock(&self, stage: Stage, id: &Uuid, token: &str) -> Result<bool> {
        redis::release_lock(&mut self.conn(), stage, id, token)
            .await
            .context("Failed to release stage lock")
    }

    async fn enqueue(&self, job: &PipelineJob) -> Result<()> {
        redis::push_job(&mut self.conn(), job)
            .await
            .context("Failed to enqueue job")
    }

    async fn schedule(&self, job: &PipelineJob, delay: Duration) -> Result<()> {
        let ready_at = chrono::Utc::now().timestamp_millis() + delay.as_millis() as i64;
        redis::schedule_job(&mut self.conn(), job, ready_at)
            .await
            .context("Failed to schedule job")
    }
}

#[cfg(test)]
pub mod memory {
    use super::*;
    use anyhow::bail;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    /// In-process store with the same exactly-once semantics as Redis.
    /// Operations named in `failing` return an error, as Redis would when
    /// the connection drops.
    #[derive(Default)]
    pub struct MemoryStore {
        pub submissions: Mutex<HashMap<Uuid, Submission>>,
        pub assessments: Mutex<HashMap<String, Assessment>>,
        pub reports: Mutex<HashMap<Uuid, IntegrityReport>>,
        pub breakdowns: Mutex<HashMap<Uuid, ScoreBreakdown>>,
        pub tests: Mutex<HashMap<Uuid, TestRunSummary>>,
        pub statuses: Mutex<HashMap<Uuid, Vec<SubmissionStatus>>>,
        pub locks: Mutex<HashMap<(Stage, Uuid), String>>,
        pub failing: Mutex<HashSet<&'static str>>,
        pub queued: Mutex<Vec<PipelineJob>>,
        pub scheduled: Mutex<Vec<(PipelineJob, Duration)>>,
    }

    impl MemoryStore {
        pub fn insert_submission(&self, submission: Submission) {
            self.submissions.lock().unwrap().insert(submission.id, submission);
        }

        pub fn insert_assessment(&self, assessment: Assessment) {
            self.assessments.lock().unwrap().insert(assessment.id.clone(), assessment);
        }

        pub fn status(&self, id: &Uuid) -> Option<SubmissionStatus> {
            self.statuses.lock().unwrap().get(id).and_then(|s| s.last().copied())
        }

        pub fn status_history(&self, id: &Uuid) -> Vec<SubmissionStatus> {
            self.statuses.lock().unwrap().get(id).cloned().unwrap_or_default()
        }

        pub fn fail(&self, op: &'static str) {
            self.failing.lock().unwrap().insert(op);
        }

        pub fn recover(&self, op: &'static str) {
            self.failing.lock().unwrap().remove(op);
        }

        /// Hand the lock to another holder, as after expiry and re-acquisition
        pub fn steal_lock(&self, stage: Stage, id: &Uuid, token: &str) {
            self.locks.lock().unwrap().insert((stage, *id), token.to_string());
        }

        fn check(&self, op: &'static str) -> Result<()> {
            if self.failing.lock().unwrap().contains(op) {
                bail!("redis unavailable during {}", op);
            }
            Ok(())
        }
    }

    #[async_trait]
    impl PipelineStore for MemoryStore {
        async fn submission(&self, id: &Uuid) -> Result<Option<Submission>> {
            Ok(self.submissions.lock().unwrap().get(id).cloned())
        }

        async fn assessment(&self, assessment_id: &str) -> Result<Option<Assessment>> {
            Ok(self.assessments.lock().unwrap().get(assessment_id).cloned())
        }

        async fn cohort(&self, assessment_id: &str) -> Result<Vec<Submission>> {
            Ok(self
                .submissions
                .lock()
                .unwrap()
                .values()
                .filter(|s| s.assessment_id == assessment_id)
                .cloned()
                .collect())
        }

        async fn report(&self, id: &Uuid) -> Result<Option<IntegrityReport>> {
            Ok(self.reports.lock().unwrap().get(id).cloned())
        }

        async fn store_report_once(&self, report: &IntegrityReport) -> Result<bool> {
            let mut reports = self.reports.lock().unwrap();
            if reports.contains_key(&report.submission_id) {
                return Ok(false);
            }
            reports.insert(report.submission_id, report.clone());
            Ok(true)
        }

        async fn breakdown(&self, id: &Uuid) -> Result<Option<ScoreBreakdown>> {
            Ok(self.breakdowns.lock().unwrap().get(id).cloned())
        }

        async fn store_breakdown(&self, breakdown: &ScoreBreakdown, tests: &TestRunSummary) -> Result<()> {
            self.breakdowns
                .lock()
                .unwrap()
                .insert(breakdown.submission_id, breakdown.clone());
            self.tests.lock().unwrap().insert(breakdown.submission_id, tests.clone());
            Ok(())
        }

        async fn set_status(&self, id: &Uuid, status: SubmissionStatus) -> Result<()> {
            self.check("set_status")?;
            self.statuses.lock().unwrap().entry(*id).or_default().push(status);
            Ok(())
        }

        async fn try_lock(&self, stage: Stage, id: &Uuid, token: &str, _ttl: Duration) -> Result<bool> {
            self.check("try_lock")?;
            let mut locks = self.locks.lock().unwrap();
            if locks.contains_key(&(stage, *id)) {
                return Ok(false);
            }
            locks.insert((stage, *id), token.to_string());
            Ok(true)
        }

        async fn refresh_lock(&self, stage: Stage, id: &Uuid, token: &str, _ttl: Duration) -> Result<bool> {
            self.check("refresh_lock")?;
            Ok(self.locks.lock().unwrap().get(&(stage, *id)).map(String::as_str) == Some(token))
        }

        async fn unlock(&self, stage: Stage, id: &Uuid, token: &str) -> Result<bool> {
            let mut locks = self.locks.lock().unwrap();
            if locks.get(&(stage, *id)).map(String::as_str) != Some(token) {
                return Ok(false);
            }
            locks.remove(&(stage, *id));
            Ok(true)
        }

        async fn enqueue(&self, job: &PipelineJob) -> Result<()> {
            self.check("enqueue")?;
            self.queued.lock().unwrap().push(job.clone());
            Ok(())
        }

        async fn schedule(&self, job: &PipelineJob, delay: Duration) -> Result<()> {
            self.check("schedule")?;
            self.scheduled.lock().unwrap().push((job.clone(), delay));
            Ok(())
        }
    }
}
