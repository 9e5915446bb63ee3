mod classifier;
mod config;
mod error;
mod harness;
mod judge;
mod llm;
mod pipeline;
mod sandbox;
mod store;

#[cfg(test)]
mod pipeline_tests;

use classifier::Classifier;
use config::{LanguageConfigManager, ProctorConfig, ServiceSettings};
use judge::Judge;
use llm::{LlmClient, OpenAIClient};
use pipeline::Pipeline;
use proctor_common::config::Config;
use proctor_common::redis;
use proctor_common::types::{PipelineJob, Stage};
use sandbox::{DisabledSandbox, Judge0Sandbox, Sandbox};
use std::sync::Arc;
use store::RedisStore;
use tokio::signal;
use tracing::{debug, error, info, instrument, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    info!("Proctor Worker booting...");

    let languages = LanguageConfigManager::load_default()
        .map_err(|e| {
            error!("Failed to load language configurations: {}", e);
            error!("Make sure config/languages.json exists");
            e
        })?;
    info!("Loaded language configurations for: {:?}", languages.list_languages());

    let tuning = ProctorConfig::load_default()?;
    let services = ServiceSettings::from_env();

    let sandbox: Arc<dyn Sandbox> = match &services.sandbox_url {
        Some(url) => {
            info!(url = %url, "Sandbox configured");
            Arc::new(Judge0Sandbox::new(
                url.clone(),
                services.sandbox_api_key.clone(),
                services.sandbox_api_host.clone(),
                languages,
            ))
        }
        None => {
            warn!("SANDBOX_URL not set; every test case will fail");
            Arc::new(DisabledSandbox)
        }
    };

    let llm: Option<Arc<dyn LlmClient>> = services.openai_api_key.as_ref().map(|key| {
        Arc::new(OpenAIClient::new(
            tuning.llm.model.clone(),
            key.clone(),
            tuning.llm.temperature,
        )) as Arc<dyn LlmClient>
    });
    if llm.is_none() {
        warn!("OPENAI_API_KEY not set; judge falls back to default scores");
    }

    let classifier = if services.enable_classifier {
        Classifier::new(llm.clone(), tuning.llm.classifier_max_tokens, tuning.timeouts.classifier_secs)
    } else {
        Classifier::disabled()
    };
    let judge = Judge::new(llm, tuning.llm.judge_max_tokens, tuning.timeouts.judge_secs);
    info!(
        classifier = classifier.provider(),
        judge = judge.provider(),
        "Model providers configured"
    );

    // Connect to Redis
    let config = Config::from_env();
    let client = ::redis::Client::open(config.redis_url.as_str())?;
    let redis_conn = ::redis::aio::ConnectionManager::new(client).await?;
    info!("Connected to Redis: {}", config.redis_url);

    let poll_timeout = tuning.pipeline.poll_timeout_secs;
    let pipeline = Pipeline::new(
        Arc::new(RedisStore::new(redis_conn.clone())),
        sandbox,
        classifier,
        judge,
        tuning,
    );

    // Setup graceful shutdown
    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        warn!("Received shutdown signal, finishing current job...");
    };

    let mut conn = redis_conn;
    tokio::select! {
        _ = worker_loop(&mut conn, &pipeline, poll_timeout) => {},
        _ = shutdown => {},
    }

    info!("Worker shutdown complete");
    Ok(())
}

#[instrument(skip(redis_conn, pipeline))]
async fn worker_loop(
    redis_conn: &mut ::redis::aio::ConnectionManager,
    pipeline: &Pipeline,
    poll_timeout: f64,
) {
    let stages = [Stage::Integrity, Stage::Scoring];

    loop {
        let now_ms = chrono::Utc::now().timestamp_millis();
        match redis::promote_due_jobs(redis_conn, now_ms).await {
            Ok(0) => {}
            Ok(promoted) => debug!(promoted, "Promoted delayed jobs"),
            Err(e) => warn!(error = %e, "Failed to promote delayed jobs"),
        }

        // BLPOP with a timeout so delayed jobs get promoted and shutdown is observed
        match redis::pop_job(redis_conn, &stages, poll_timeout).await {
            Ok(Some(job)) => {
                info!(
                    submission_id = %job.submission_id,
                    stage = %job.stage,
                    attempt = job.attempt,
                    "Received job"
                );

                let start = std::time::Instant::now();
                match pipeline.handle(&job).await {
                    Ok(outcome) => {
                        info!(
                            submission_id = %job.submission_id,
                            stage = %job.stage,
                            outcome = ?outcome,
                            elapsed_ms = start.elapsed().as_millis() as u64,
                            "Job handled"
                        );
                    }
                    Err(e) => {
                        error!(submission_id = %job.submission_id, stage = %job.stage, error = %e, "Failed to reschedule job");
                        redeliver(redis_conn, &job).await;
                    }
                }
            }
            Ok(None) => {
                continue;
            }
            Err(e) => {
                error!(error = %e, "Redis error");
                tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;
            }
        }
    }
}

/// Keep a popped job until it is back on its queue. Only reached when Redis
/// refused both the reschedule and the direct push.
async fn redeliver(redis_conn: &mut ::redis::aio::ConnectionManager, job: &PipelineJob) {
    let mut delay = tokio::time::Duration::from_secs(1);
    loop {
        tokio::time::sleep(delay).await;
        match redis::push_job(redis_conn, job).await {
            Ok(()) => {
                warn!(submission_id = %job.submission_id, stage = %job.stage, "Job pushed back after Redis recovered");
                return;
            }
            Err(e) => {
                warn!(submission_id = %job.submission_id, error = %e, "Still unable to push job back");
                delay = (delay * 2).min(tokio::time::Duration::from_secs(30));
            }
        }
    }
}
