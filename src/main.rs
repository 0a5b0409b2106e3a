use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tower::ServiceBuilder;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use flashdeck::{
    api::{build_cors_layer, create_router, AppState},
    cleanup,
    config::{Config, LoggingConfig},
    deck_service::DeckService,
    enrichment::LinkEnricher,
    llm_providers::create_completion_backend,
    log_system_event,
    rate_limit::{KeyedRateLimiter, SystemClock},
    transcription::TranscriptionChain,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let _log_guard = setup_logging(&LoggingConfig::from_env());

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Configuration validation failed")?;

    log_system_event!(startup, component = "server", "Flashdeck server starting");

    let completion = create_completion_backend(
        config.generation.provider,
        config.generation.api_key.clone(),
        config.generation.base_url.clone(),
        config.generation.model.clone(),
        Duration::from_secs(config.generation.timeout_secs),
    );

    let enricher = if config.search.enrichment_enabled {
        Some(Arc::new(LinkEnricher::from_config(&config.search)))
    } else {
        None
    };

    let deck_service = Arc::new(DeckService::new(
        Arc::from(completion),
        enricher,
        config.limits.max_content_length,
        config.limits.max_flashcards,
    ));

    let clock = Arc::new(SystemClock);

    let transcription = Arc::new(TranscriptionChain::from_config(
        &config.transcription,
        config.limits.max_content_length,
        clock.clone(),
    ));

    let rate_limiter = Arc::new(KeyedRateLimiter::new(
        config.limits.rate_limit_max_requests,
        Duration::from_secs(config.limits.rate_limit_window_secs),
        clock,
    ));

    cleanup::spawn_sweeper(
        config.cleanup.upload_temp_dir.clone(),
        config.cleanup.sweep_interval_secs,
        config.cleanup.max_age_secs,
    );

    let state = AppState {
        deck_service,
        transcription,
        rate_limiter,
        upload_dir: config.cleanup.upload_temp_dir.clone(),
        limits: config.limits.clone(),
        include_error_details: config.server.mode.is_development(),
        enrichment_enabled: config.search.enrichment_enabled,
    };

    let app = create_router(state)
        .layer(ServiceBuilder::new().layer(build_cors_layer(&config.server.cors_origins)));

    let address = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind to {}", address))?;

    info!(address = %address, "Flashdeck server listening");

    axum::serve(listener, app)
        .await
        .context("Server error")?;

    Ok(())
}

/// Console logging always; a non-blocking daily rolling file appender when
/// enabled. The returned guard must live for the life of the process or
/// buffered file output is lost.
fn setup_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let env_filter =
        EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));

    let console_layer = fmt::layer().with_target(true);

    if config.file_enabled {
        let file_appender =
            tracing_appender::rolling::daily(&config.log_directory, "flashdeck.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let file_layer = fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .init();

        Some(guard)
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .init();

        None
    }
}
