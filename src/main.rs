use std::sync::Arc;

use anyhow::Context;
use tower_http::timeout::TimeoutLayer;

use mail_triage::api::api_routes;
use mail_triage::config::{LogFormat, ServiceConfig};
use mail_triage::hierarchy::OrgHierarchy;
use mail_triage::orchestrator::{Orchestrator, OrchestratorConfig};
use mail_triage::queue::{HttpPublisher, MemoryPublisher, Publisher};
use mail_triage::store::LibSqlBackend;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServiceConfig::from_env().context("Failed to load configuration")?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init(),
    }

    let store = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("Failed to open database at {}", config.db_path.display()))?,
    );

    let publisher: Arc<dyn Publisher> = match &config.queue.base_url {
        Some(url) => {
            let mut publisher = HttpPublisher::new(url.clone(), config.queue.publish_timeout);
            if let Some(token) = config.queue.auth_token.clone() {
                publisher = publisher.with_auth_token(token);
            }
            tracing::info!(url = %url, "Publishing to broker");
            Arc::new(publisher)
        }
        None => {
            tracing::warn!(
                in_memory = config.queue.in_memory,
                "In-memory queue selected, tasks are not delivered to any worker"
            );
            MemoryPublisher::new()
        }
    };

    let hierarchy = Arc::new(OrgHierarchy::load(&config.hierarchy_path));
    let orchestrator = Arc::new(Orchestrator::new(
        store,
        publisher,
        OrchestratorConfig::from(&config),
        hierarchy,
    ));

    let app = api_routes(orchestrator).layer(TimeoutLayer::new(config.http.timeout));

    let listener = tokio::net::TcpListener::bind(&config.http.address)
        .await
        .with_context(|| format!("Failed to bind {}", config.http.address))?;
    tracing::info!(
        address = %config.http.address,
        input_topic = %config.queue.input_topic,
        output_topic = %config.queue.output_topic,
        dead_letter_topic = %config.queue.dead_letter_topic,
        max_attempts = config.max_attempts,
        "Mail triage server started"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
