use crate::types::{
    Assessment, IntegrityReport, PipelineJob, ScoreBreakdown, Stage, Submission,
    SubmissionStatus, TestRunSummary,
};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

/// Redis key and queue semantics shared by the API and the worker.
/// Keeping every key in one place means both sides never drift.

pub const QUEUE_PREFIX: &str = "proctor:queue";
pub const DELAYED_QUEUE: &str = "proctor:queue:delayed";
pub const SUBMISSION_PREFIX: &str = "proctor:submission";
pub const ASSESSMENT_PREFIX: &str = "proctor:assessment";
pub const REPORT_PREFIX: &str = "proctor:report";
pub const SCORE_PREFIX: &str = "proctor:score";
pub const TESTS_PREFIX: &str = "proctor:tests";
pub const STATUS_PREFIX: &str = "proctor:status";
pub const LOCK_PREFIX: &str = "proctor:lock";

// KEYS: claim, submission, cohort, status, queue
// ARGV: submission id, submission payload, status payload, job payload
const ACCEPT_SCRIPT: &str = r#"
if not redis.call('SET', KEYS[1], ARGV[1], 'NX') then
    return 0
end
redis.call('SET', KEYS[2], ARGV[2])
redis.call('SADD', KEYS[3], ARGV[1])
redis.call('SET', KEYS[4], ARGV[3])
redis.call('RPUSH', KEYS[5], ARGV[4])
return 1
"#;

// KEYS: delayed set, stage queue; ARGV: job payload
const PROMOTE_SCRIPT: &str = r#"
if redis.call('ZREM', KEYS[1], ARGV[1]) == 1 then
    redis.call('RPUSH', KEYS[2], ARGV[1])
    return 1
end
return 0
"#;

const REFRESH_LOCK_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('EXPIRE', KEYS[1], ARGV[2])
end
return 0
"#;

const RELEASE_LOCK_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

/// Queue name for a pipeline stage
pub fn queue_name(stage: Stage) -> String {
    format!("{}:{}", QUEUE_PREFIX, stage)
}

pub fn submission_key(id: &Uuid) -> String {
    format!("{}:{}", SUBMISSION_PREFIX, id)
}

pub fn assessment_key(assessment_id: &str) -> String {
    format!("{}:{}", ASSESSMENT_PREFIX, assessment_id)
}

/// Set of submission ids recorded for an assessment (the peer cohort)
pub fn cohort_key(assessment_id: &str) -> String {
    format!("{}:{}:submissions", ASSESSMENT_PREFIX, assessment_id)
}

/// One submission per author per assessment
pub fn author_claim_key(assessment_id: &str, author_id: &str) -> String {
    format!("{}:{}:author:{}", ASSESSMENT_PREFIX, assessment_id, author_id)
}

pub fn report_key(id: &Uuid) -> String {
    format!("{}:{}", REPORT_PREFIX, id)
}

pub fn score_key(id: &Uuid) -> String {
    format!("{}:{}", SCORE_PREFIX, id)
}

pub fn tests_key(id: &Uuid) -> String {
    format!("{}:{}", TESTS_PREFIX, id)
}

pub fn status_key(id: &Uuid) -> String {
    format!("{}:{}", STATUS_PREFIX, id)
}

pub fn lock_key(stage: Stage, id: &Uuid) -> String {
    format!("{}:{}:{}", LOCK_PREFIX, stage, id)
}

fn to_payload<T: Serialize>(value: &T) -> RedisResult<String> {
    serde_json::to_string(value).map_err(|e| {
        redis::RedisError::from((redis::ErrorKind::TypeError, "serialization error", e.to_string()))
    })
}

fn from_payload<T: DeserializeOwned>(payload: &str) -> RedisResult<T> {
    serde_json::from_str(payload).map_err(|e| {
        redis::RedisError::from((redis::ErrorKind::TypeError, "deserialization error", e.to_string()))
    })
}

async fn get_json<T: DeserializeOwned>(conn: &mut ConnectionManager, key: &str) -> RedisResult<Option<T>> {
    let payload: Option<String> = conn.get(key).await?;
    payload.map(|data| from_payload(&data)).transpose()
}

/// Push a job onto its stage queue (RPUSH, FIFO)
pub async fn push_job(conn: &mut ConnectionManager, job: &PipelineJob) -> RedisResult<()> {
    let payload = to_payload(job)?;
    conn.rpush(queue_name(job.stage), payload).await
}

/// Pop the next job from any of the given stage queues.
/// BLPOP with a timeout so the caller can observe shutdown.
pub async fn pop_job(
    conn: &mut ConnectionManager,
    stages: &[Stage],
    timeout_seconds: f64,
) -> RedisResult<Option<PipelineJob>> {
    let queues: Vec<String> = stages.iter().map(|s| queue_name(*s)).collect();
    let result: Option<(String, String)> = conn.blpop(queues, timeout_seconds).await?;

    match result {
        Some((_key, payload)) => Ok(Some(from_payload(&payload)?)),
        None => Ok(None),
    }
}

/// Park a job until `ready_at_ms` (unix millis)
pub async fn schedule_job(
    conn: &mut ConnectionManager,
    job: &PipelineJob,
    ready_at_ms: i64,
) -> RedisResult<()> {
    let payload = to_payload(job)?;
    conn.zadd(DELAYED_QUEUE, payload, ready_at_ms).await
}

/// Move every delayed job whose time has come back onto its stage queue.
/// ZREM and RPUSH run in one script: the worker that removes the job is the
/// one that pushes it, and a job is never removed without being pushed.
pub async fn promote_due_jobs(conn: &mut ConnectionManager, now_ms: i64) -> RedisResult<usize> {
    let due: Vec<String> = conn.zrangebyscore(DELAYED_QUEUE, "-inf", now_ms).await?;
    let script = redis::Script::new(PROMOTE_SCRIPT);
    let mut promoted = 0;

    for payload in due {
        let job: PipelineJob = from_payload(&payload)?;
        let moved: i64 = script
            .key(DELAYED_QUEUE)
            .key(queue_name(job.stage))
            .arg(&payload)
            .invoke_async(conn)
            .await?;
        promoted += moved as usize;
    }

    Ok(promoted)
}

/// Record a new submission, mark it queued and push its integrity job, all
/// in one script. Returns false (and writes nothing) when the author already
/// submitted for this assessment.
pub async fn accept_submission(conn: &mut ConnectionManager, submission: &Submission) -> RedisResult<bool> {
    let job = PipelineJob::new(submission.id, Stage::Integrity);
    let accepted: i64 = redis::Script::new(ACCEPT_SCRIPT)
        .key(author_claim_key(&submission.assessment_id, &submission.author_id))
        .key(submission_key(&submission.id))
        .key(cohort_key(&submission.assessment_id))
        .key(status_key(&submission.id))
        .key(queue_name(job.stage))
        .arg(submission.id.to_string())
        .arg(to_payload(submission)?)
        .arg(to_payload(&SubmissionStatus::Queued)?)
        .arg(to_payload(&job)?)
        .invoke_async(conn)
        .await?;
    Ok(accepted == 1)
}

pub async fn get_submission(conn: &mut ConnectionManager, id: &Uuid) -> RedisResult<Option<Submission>> {
    get_json(conn, &submission_key(id)).await
}

/// Read-only snapshot of every submission recorded for an assessment
pub async fn get_cohort(conn: &mut ConnectionManager, assessment_id: &str) -> RedisResult<Vec<Submission>> {
    let ids: Vec<String> = conn.smembers(cohort_key(assessment_id)).await?;
    let mut cohort = Vec::with_capacity(ids.len());

    for id in ids {
        let key = format!("{}:{}", SUBMISSION_PREFIX, id);
        if let Some(submission) = get_json(conn, &key).await? {
            cohort.push(submission);
        }
    }

    Ok(cohort)
}

pub async fn put_assessment(conn: &mut ConnectionManager, assessment: &Assessment) -> RedisResult<()> {
    let payload = to_payload(assessment)?;
    conn.set(assessment_key(&assessment.id), payload).await
}

pub async fn get_assessment(conn: &mut ConnectionManager, assessment_id: &str) -> RedisResult<Option<Assessment>> {
    get_json(conn, &assessment_key(assessment_id)).await
}

/// Write the integrity report unless one already exists (SET NX).
/// Returns whether this call wrote it.
pub async fn store_report_once(conn: &mut ConnectionManager, report: &IntegrityReport) -> RedisResult<bool> {
    let payload = to_payload(report)?;
    conn.set_nx(report_key(&report.submission_id), payload).await
}

pub async fn get_report(conn: &mut ConnectionManager, id: &Uuid) -> RedisResult<Option<IntegrityReport>> {
    get_json(conn, &report_key(id)).await
}

/// Persist the score breakdown and the raw test rows behind it.
/// Overwrites, so recomputation is idempotent.
pub async fn store_breakdown(
    conn: &mut ConnectionManager,
    breakdown: &ScoreBreakdown,
    tests: &TestRunSummary,
) -> RedisResult<()> {
    let _: () = conn
        .set(tests_key(&breakdown.submission_id), to_payload(tests)?)
        .await?;
    conn.set(score_key(&breakdown.submission_id), to_payload(breakdown)?)
        .await
}

pub async fn get_breakdown(conn: &mut ConnectionManager, id: &Uuid) -> RedisResult<Option<ScoreBreakdown>> {
    get_json(conn, &score_key(id)).await
}

pub async fn get_test_results(conn: &mut ConnectionManager, id: &Uuid) -> RedisResult<Option<TestRunSummary>> {
    get_json(conn, &tests_key(id)).await
}

pub async fn set_status(conn: &mut ConnectionManager, id: &Uuid, status: SubmissionStatus) -> RedisResult<()> {
    conn.set(status_key(id), to_payload(&status)?).await
}

pub async fn get_status(conn: &mut ConnectionManager, id: &Uuid) -> RedisResult<Option<SubmissionStatus>> {
    get_json(conn, &status_key(id)).await
}

/// Take the per-stage lock for a submission (SET NX EX). `token` identifies
/// this holder; only the same token can refresh or release the lock.
pub async fn acquire_lock(
    conn: &mut ConnectionManager,
    stage: Stage,
    id: &Uuid,
    token: &str,
    ttl_seconds: u64,
) -> RedisResult<bool> {
    let reply: Option<String> = redis::cmd("SET")
        .arg(lock_key(stage, id))
        .arg(token)
        .arg("NX")
        .arg("EX")
        .arg(ttl_seconds)
        .query_async(conn)
        .await?;
    Ok(reply.is_some())
}

/// Push the lock's expiry out again. False when `token` no longer holds it.
pub async fn refresh_lock(
    conn: &mut ConnectionManager,
    stage: Stage,
    id: &Uuid,
    token: &str,
    ttl_seconds: u64,
) -> RedisResult<bool> {
    let refreshed: i64 = redis::Script::new(REFRESH_LOCK_SCRIPT)
        .key(lock_key(stage, id))
        .arg(token)
        .arg(ttl_seconds)
        .invoke_async(conn)
        .await?;
    Ok(refreshed == 1)
}

/// Delete the lock if `token` still holds it. False when it had expired or
/// passed to another holder.
pub async fn release_lock(conn: &mut ConnectionManager, stage: Stage, id: &Uuid, token: &str) -> RedisResult<bool> {
    let released: i64 = redis::Script::new(RELEASE_LOCK_SCRIPT)
        .key(lock_key(stage, id))
        .arg(token)
        .invoke_async(conn)
        .await?;
    Ok(released == 1)
}
