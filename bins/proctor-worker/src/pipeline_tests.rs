/// Pipeline tests over in-memory fakes
///
/// These cover the two-stage flow end to end:
/// 1. Stage 1 writes the integrity report once and queues Stage 2
/// 2. Stage 2 defers without a report and times out after its budget
/// 3. Stage 2 scores against the stored report
/// 4. Locks, skips and failures follow the retry policy
/// 5. Store outages reschedule or push back the job instead of dropping it

#[cfg(test)]
mod pipeline_flow_tests {
    use crate::classifier::Classifier;
    use crate::config::ProctorConfig;
    use crate::harness::fake::TableSandbox;
    use crate::judge::Judge;
    use crate::llm::fake::ScriptedLlm;
    use crate::pipeline::{Pipeline, StageOutcome};
    use crate::store::memory::MemoryStore;
    use crate::store::PipelineStore;
    use chrono::Utc;
    use proctor_common::types::{
        Assessment, Language, PipelineJob, Stage, Submission, SubmissionStatus, TestCase,
    };
    use std::sync::Arc;
    use std::time::Duration;
    use uuid::Uuid;

    const SOLUTION: &str = r#"
a, b = map(int, input().split())
total = a + b
if total > 100:
    print("big", total)
else:
    print(total)
"#;

    fn submission(author: &str, code: &str) -> Submission {
        Submission {
            id: Uuid::new_v4(),
            author_id: author.to_string(),
            author_name: author.to_uppercase(),
            assessment_id: "sum-two".to_string(),
            code: code.to_string(),
            language: Language::Python,
            start_time: Utc::now(),
            submit_time: Utc::now(),
            elapsed_seconds: 300,
            focus_events: vec![],
            focus_event_count: 0,
            is_auto_submitted: false,
            auto_submit_reason: None,
        }
    }

    fn assessment() -> Assessment {
        Assessment {
            id: "sum-two".to_string(),
            title: "Sum two numbers".to_string(),
            question: "Read two integers and print their sum".to_string(),
            test_cases: vec![
                TestCase {
                    input: "2 3".to_string(),
                    output: "5".to_string(),
                },
                TestCase {
                    input: "10 20".to_string(),
                    output: "30".to_string(),
                },
            ],
            marks: 100.0,
            reference_solution: None,
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        sandbox: Arc<TableSandbox>,
        pipeline: Pipeline,
    }

    fn fixture_with(classifier: Classifier, judge: Judge) -> Fixture {
        fixture_from(classifier, judge, ProctorConfig::default())
    }

    fn fixture_from(classifier: Classifier, judge: Judge, config: ProctorConfig) -> Fixture {
        let store = Arc::new(MemoryStore::default());
        store.insert_assessment(assessment());
        let sandbox = Arc::new(TableSandbox::with(&[("2 3", "5\n"), ("10 20", "30\n")]));
        let pipeline = Pipeline::new(
            store.clone(),
            sandbox.clone(),
            classifier,
            judge,
            config,
        );
        Fixture {
            store,
            sandbox,
            pipeline,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(Classifier::disabled(), Judge::disabled())
    }

    #[tokio::test]
    async fn test_integrity_writes_report_and_queues_scoring() {
        let f = fixture();
        let mine = submission("alice", SOLUTION);
        let copy = submission("bob", SOLUTION);
        f.store.insert_submission(mine.clone());
        f.store.insert_submission(copy.clone());

        let outcome = f
            .pipeline
            .handle(&PipelineJob::new(mine.id, Stage::Integrity))
            .await
            .unwrap();
        assert_eq!(outcome, StageOutcome::Completed);

        let report = f.store.report(&mine.id).await.unwrap().unwrap();
        assert_eq!(report.analysis_metadata.total_comparisons, 1);
        assert_eq!(report.matches.len(), 1);
        assert_eq!(report.matches[0].peer_submission_id, copy.id);
        assert_eq!(report.matches[0].peer_name, "BOB");
        assert!(report.overall_similarity_score > 90.0);
        assert!(report.analysis_metadata.classifier.is_none());
        assert_eq!(report.analysis_metadata.detection_methods.len(), 6);

        let queued = f.store.queued.lock().unwrap().clone();
        assert_eq!(queued, vec![PipelineJob::new(mine.id, Stage::Scoring)]);
        assert_eq!(f.store.status_history(&mine.id), vec![SubmissionStatus::Analyzing]);
        assert!(f.store.locks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_integrity_is_exactly_once() {
        let f = fixture();
        let mine = submission("alice", SOLUTION);
        f.store.insert_submission(mine.clone());
        let job = PipelineJob::new(mine.id, Stage::Integrity);

        f.pipeline.handle(&job).await.unwrap();
        let first = f.store.report(&mine.id).await.unwrap().unwrap();

        let outcome = f.pipeline.handle(&job).await.unwrap();
        assert_eq!(outcome, StageOutcome::Skipped);
        let second = f.store.report(&mine.id).await.unwrap().unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_scoring_defers_without_report() {
        let f = fixture();
        let mine = submission("alice", SOLUTION);
        f.store.insert_submission(mine.clone());

        let outcome = f
            .pipeline
            .handle(&PipelineJob::new(mine.id, Stage::Scoring))
            .await
            .unwrap();
        assert_eq!(outcome, StageOutcome::Deferred);

        let scheduled = f.store.scheduled.lock().unwrap().clone();
        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0].0.attempt, 1);
        assert_eq!(scheduled[0].1, Duration::from_millis(2_000));
        assert_eq!(f.store.status(&mine.id), Some(SubmissionStatus::Deferred));
        assert_eq!(f.sandbox.calls(), 0);
        assert!(f.store.breakdown(&mine.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_deferral_times_out_after_budget() {
        let f = fixture();
        let mine = submission("alice", SOLUTION);
        f.store.insert_submission(mine.clone());

        let mut job = PipelineJob::new(mine.id, Stage::Scoring);
        job.attempt = 4;
        let outcome = f.pipeline.handle(&job).await.unwrap();

        assert_eq!(outcome, StageOutcome::Deferred);
        assert!(f.store.scheduled.lock().unwrap().is_empty());
        assert_eq!(f.store.status(&mine.id), Some(SubmissionStatus::TimedOut));
    }

    #[tokio::test]
    async fn test_full_flow_scores_against_report() {
        let f = fixture();
        let mine = submission("alice", SOLUTION);
        f.store.insert_submission(mine.clone());

        f.pipeline
            .handle(&PipelineJob::new(mine.id, Stage::Integrity))
            .await
            .unwrap();
        let outcome = f
            .pipeline
            .handle(&PipelineJob::new(mine.id, Stage::Scoring))
            .await
            .unwrap();
        assert_eq!(outcome, StageOutcome::Completed);

        let report = f.store.report(&mine.id).await.unwrap().unwrap();
        let breakdown = f.store.breakdown(&mine.id).await.unwrap().unwrap();
        assert_eq!(breakdown.tests_passed, 2);
        assert_eq!(breakdown.tests.score, 50.0);
        assert_eq!(breakdown.logic.score, 5.0);
        assert_eq!(breakdown.quality.score, 5.0);
        assert_eq!(breakdown.plagiarism.signal_percent, report.overall_similarity_score);
        assert_eq!(breakdown.authorship.signal_percent, report.authorship_score);
        assert!(breakdown.judge_reasoning.contains("unavailable"));
        assert!(breakdown.final_score >= 60.0 && breakdown.final_score <= 100.0);
        assert_eq!(f.store.status(&mine.id), Some(SubmissionStatus::Completed));
        assert_eq!(f.sandbox.calls(), 2);

        let again = f
            .pipeline
            .handle(&PipelineJob::new(mine.id, Stage::Scoring))
            .await
            .unwrap();
        assert_eq!(again, StageOutcome::Skipped);
        assert_eq!(f.sandbox.calls(), 2);
    }

    #[tokio::test]
    async fn test_locked_stage_is_rescheduled() {
        let f = fixture();
        let mine = submission("alice", SOLUTION);
        f.store.insert_submission(mine.clone());
        f.store
            .try_lock(Stage::Integrity, &mine.id, "other-worker", Duration::from_secs(60))
            .await
            .unwrap();

        let job = PipelineJob::new(mine.id, Stage::Integrity);
        let outcome = f.pipeline.handle(&job).await.unwrap();

        assert_eq!(outcome, StageOutcome::Busy);
        assert!(f.store.report(&mine.id).await.unwrap().is_none());
        let scheduled = f.store.scheduled.lock().unwrap().clone();
        assert_eq!(scheduled[0].0, job);
    }

    #[tokio::test]
    async fn test_missing_submission_retries_then_fails() {
        let f = fixture();
        let ghost = Uuid::new_v4();

        let outcome = f
            .pipeline
            .handle(&PipelineJob::new(ghost, Stage::Integrity))
            .await
            .unwrap();
        assert_eq!(outcome, StageOutcome::Failed);
        assert_eq!(f.store.scheduled.lock().unwrap().len(), 1);
        assert_eq!(f.store.status(&ghost), None);

        let mut last = PipelineJob::new(ghost, Stage::Integrity);
        last.attempt = 4;
        f.pipeline.handle(&last).await.unwrap();
        assert_eq!(f.store.status(&ghost), Some(SubmissionStatus::Failed));
        assert!(f.store.locks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_classifier_verdict_is_fused() {
        let llm = Arc::new(ScriptedLlm::replying(vec![Ok(
            r#"{"isGenerated": true, "confidence": 100, "reasoning": "too tidy"}"#,
        )]));
        let f = fixture_with(Classifier::new(Some(llm.clone()), 200, 5), Judge::disabled());
        let mine = submission("alice", SOLUTION);
        f.store.insert_submission(mine.clone());

        f.pipeline
            .handle(&PipelineJob::new(mine.id, Stage::Integrity))
            .await
            .unwrap();

        let report = f.store.report(&mine.id).await.unwrap().unwrap();
        let heuristic = proctor_analysis::authorship::score(SOLUTION, Language::Python).score;
        let expected = ((heuristic * 0.6 + 40.0) * 100.0).round() / 100.0;
        assert_eq!(report.authorship_score, expected);
        assert!(report.authorship_reasons.last().unwrap().contains("too tidy"));
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_judge_scores_flow_into_breakdown() {
        let llm = Arc::new(ScriptedLlm::replying(vec![Ok(
            r#"{"logicScore": 90, "qualityScore": 70, "reasoning": "solid"}"#,
        )]));
        let f = fixture_with(Classifier::disabled(), Judge::new(Some(llm), 500, 5));
        let mine = submission("alice", SOLUTION);
        f.store.insert_submission(mine.clone());

        f.pipeline
            .handle(&PipelineJob::new(mine.id, Stage::Integrity))
            .await
            .unwrap();
        f.pipeline
            .handle(&PipelineJob::new(mine.id, Stage::Scoring))
            .await
            .unwrap();

        let breakdown = f.store.breakdown(&mine.id).await.unwrap().unwrap();
        assert_eq!(breakdown.logic.score, 9.0);
        assert_eq!(breakdown.quality.score, 7.0);
        assert_eq!(breakdown.judge_reasoning, "solid");
    }

    #[tokio::test]
    async fn test_lock_error_is_retried() {
        let f = fixture();
        let mine = submission("alice", SOLUTION);
        f.store.insert_submission(mine.clone());
        f.store.fail("try_lock");

        let outcome = f
            .pipeline
            .handle(&PipelineJob::new(mine.id, Stage::Integrity))
            .await
            .unwrap();

        assert_eq!(outcome, StageOutcome::Failed);
        let scheduled = f.store.scheduled.lock().unwrap().clone();
        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0].0.attempt, 1);
        assert_eq!(f.store.status(&mine.id), None);
        assert!(f.store.report(&mine.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_scoring_enqueue_error_retries_integrity_job() {
        let f = fixture();
        let mine = submission("alice", SOLUTION);
        f.store.insert_submission(mine.clone());
        f.store.fail("enqueue");
        let job = PipelineJob::new(mine.id, Stage::Integrity);

        let outcome = f.pipeline.handle(&job).await.unwrap();
        assert_eq!(outcome, StageOutcome::Completed);
        assert!(f.store.report(&mine.id).await.unwrap().is_some());
        assert!(f.store.queued.lock().unwrap().is_empty());
        let scheduled = f.store.scheduled.lock().unwrap().clone();
        assert_eq!(scheduled, vec![(job.clone(), Duration::from_millis(2_000))]);

        // The rescheduled integrity job queues scoring once redis is back
        f.store.recover("enqueue");
        let again = f.pipeline.handle(&scheduled[0].0).await.unwrap();
        assert_eq!(again, StageOutcome::Skipped);
        let queued = f.store.queued.lock().unwrap().clone();
        assert_eq!(queued, vec![PipelineJob::new(mine.id, Stage::Scoring)]);
    }

    #[tokio::test]
    async fn test_busy_job_pushed_back_when_schedule_fails() {
        let f = fixture();
        let mine = submission("alice", SOLUTION);
        f.store.insert_submission(mine.clone());
        f.store.steal_lock(Stage::Integrity, &mine.id, "other-worker");
        f.store.fail("schedule");
        let job = PipelineJob::new(mine.id, Stage::Integrity);

        let outcome = f.pipeline.handle(&job).await.unwrap();

        assert_eq!(outcome, StageOutcome::Busy);
        assert!(f.store.scheduled.lock().unwrap().is_empty());
        assert_eq!(f.store.queued.lock().unwrap().clone(), vec![job]);
    }

    #[tokio::test]
    async fn test_failed_retry_returns_job_to_caller() {
        let f = fixture();
        let mine = submission("alice", SOLUTION);
        f.store.insert_submission(mine.clone());
        f.store.fail("try_lock");
        f.store.fail("schedule");
        f.store.fail("enqueue");

        let result = f
            .pipeline
            .handle(&PipelineJob::new(mine.id, Stage::Integrity))
            .await;

        assert!(result.is_err());
        assert!(f.store.scheduled.lock().unwrap().is_empty());
        assert!(f.store.queued.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_waiting_status_error_still_reschedules() {
        let f = fixture();
        let mine = submission("alice", SOLUTION);
        f.store.insert_submission(mine.clone());
        f.store.fail("set_status");

        let outcome = f
            .pipeline
            .handle(&PipelineJob::new(mine.id, Stage::Scoring))
            .await
            .unwrap();

        assert_eq!(outcome, StageOutcome::Deferred);
        let scheduled = f.store.scheduled.lock().unwrap().clone();
        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0].0.attempt, 1);
    }

    #[tokio::test]
    async fn test_lost_lock_abandons_stage() {
        let mut config = ProctorConfig::default();
        config.pipeline.lock_ttl_secs = 1;
        config.timeouts.sandbox_secs = 3600;
        let f = fixture_from(Classifier::disabled(), Judge::disabled(), config);
        let mut slow = assessment();
        slow.test_cases = vec![TestCase {
            input: "hang".to_string(),
            output: "never".to_string(),
        }];
        f.store.insert_assessment(slow);

        let mine = submission("alice", SOLUTION);
        f.store.insert_submission(mine.clone());
        f.pipeline
            .handle(&PipelineJob::new(mine.id, Stage::Integrity))
            .await
            .unwrap();

        let job = PipelineJob::new(mine.id, Stage::Scoring);
        let (outcome, _) = tokio::join!(f.pipeline.handle(&job), async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            f.store.steal_lock(Stage::Scoring, &mine.id, "other-worker");
        });

        assert_eq!(outcome.unwrap(), StageOutcome::Failed);
        assert!(f.store.breakdown(&mine.id).await.unwrap().is_none());
        let scheduled = f.store.scheduled.lock().unwrap().clone();
        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0].0.attempt, 1);
        // The new holder keeps its lock
        let locks = f.store.locks.lock().unwrap();
        assert_eq!(
            locks.get(&(Stage::Scoring, mine.id)).map(String::as_str),
            Some("other-worker")
        );
    }
}
