use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use order_tracker::api::client::BackendClient;
use order_tracker::api::rest::router;
use order_tracker::config::Config;
use order_tracker::error::AppError;
use order_tracker::routing::RouteEngine;
use order_tracker::routing::osrm::OsrmEngine;
use order_tracker::routing::straight::StraightLineEngine;
use order_tracker::state::AppState;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    let engine: Arc<dyn RouteEngine> = match &config.routing_url {
        Some(url) => Arc::new(
            OsrmEngine::new(url.clone(), config.routing_timeout())
                .map_err(|err| AppError::Internal(format!("invalid routing engine: {err}")))?,
        ),
        None => Arc::new(StraightLineEngine::default()),
    };
    tracing::info!(engine = engine.name(), "route engine selected");

    let backend = match &config.api_base_url {
        Some(url) => Some(BackendClient::new(
            url.clone(),
            config.api_token.clone(),
            config.api_timeout(),
        )?),
        None => {
            tracing::warn!("API_BASE_URL not set; order lookups are disabled");
            None
        }
    };

    let shared_state = Arc::new(
        AppState::new(config.tracking_settings(), engine, backend)
            .with_static_dir(config.static_dir.clone()),
    );

    let app = router(shared_state.clone());

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port = config.http_port, "http server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    shared_state.unmount_all().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
