mod error;
mod handlers;
mod language_config;
mod metrics;
mod routes;

use axum::Router;
use language_config::LanguageRegistry;
use proctor_common::config::Config;
use redis::aio::ConnectionManager;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

pub struct AppState {
    pub redis: ConnectionManager,
    pub languages: LanguageRegistry,
}

#[tokio::main]
async fn main() {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
        )
        .with_target(false)
        .init();

    info!("Proctor API booting...");

    let languages_path = std::env::var("LANGUAGES_CONFIG")
        .unwrap_or_else(|_| language_config::DEFAULT_LANGUAGES_PATH.to_string());
    let languages = LanguageRegistry::load_from_file(&languages_path)
        .expect("Failed to load language configuration");
    info!("Accepting languages: {:?}", languages.enabled_languages());

    let config = Config::from_env();

    // Connect to Redis
    let client = redis::Client::open(config.redis_url.as_str())
        .expect("Failed to create Redis client");

    let redis_conn = ConnectionManager::new(client).await
        .expect("Failed to connect to Redis");

    info!("Connected to Redis: {}", config.redis_url);

    let state = Arc::new(AppState {
        redis: redis_conn,
        languages,
    });

    // Build router
    let app = Router::new()
        .merge(routes::routes())
        .with_state(state);

    // Start server
    let listener = TcpListener::bind(&config.api_addr).await
        .expect("Failed to bind to address");

    info!("HTTP server listening on {}", config.api_addr);
    info!("Ready to accept submissions");

    axum::serve(listener, app).await
        .expect("Server error");
}
