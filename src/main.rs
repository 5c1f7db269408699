//! Pneumonia Ensemble - Main Entry Point
//!
//! Loads the configured ONNX models once, then serves predictions over HTTP
//! until interrupted.

use anyhow::{Context, Result};
use pneumonia_ensemble::{
    config::{AppConfig, LoggingConfig},
    metrics::{MetricsReporter, ServiceMetrics},
    models::loader::ModelLoader,
    models::registry::ModelRegistry,
    server,
    service::EnsembleService,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = AppConfig::load()?;

    init_logging(&config.logging)?;
    info!("Starting Pneumonia Ensemble service");
    info!(
        "Decision threshold: {:.2}, model vote threshold: {:.2}, model timeout: {} ms",
        config.ensemble.decision_threshold,
        config.ensemble.model_vote_threshold,
        config.ensemble.model_timeout_ms
    );

    // Initialize metrics
    let metrics = Arc::new(ServiceMetrics::new());

    // Load models; a failed runtime leaves the service up but degraded
    let registry = match ModelLoader::with_threads(config.models.onnx_threads) {
        Ok(loader) => ModelRegistry::load(&config.models, &loader),
        Err(e) => {
            error!(error = %format!("{:#}", e), "ONNX Runtime initialization failed");
            ModelRegistry::empty()
        }
    };
    let service = Arc::new(EnsembleService::from_config(
        &config,
        Arc::new(registry),
        Arc::clone(&metrics),
    ));

    // Start metrics reporter
    if config.metrics.report_interval_secs > 0 {
        let reporter =
            MetricsReporter::new(Arc::clone(&metrics), config.metrics.report_interval_secs);
        tokio::spawn(reporter.start());
    }

    let app = server::create_router(service, &config.server);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "Invalid listen address {}:{}",
                config.server.host, config.server.port
            )
        })?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Print final summary
    info!("Service shutting down...");
    metrics.print_summary();

    Ok(())
}

fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| {
        EnvFilter::try_new(format!("pneumonia_ensemble={},tower_http=info", config.level))
    })?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.format.eq_ignore_ascii_case("json") {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
