use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tracing::{error, info};

use crate::broker::Broker;
use crate::config::settings::{MetricsConfig, SettingsConfig};
use crate::observability::metrics::{get_metrics, Metrics};
use crate::observability::routes::MetricsState;
use crate::server::tokens;

#[derive(Clone)]
pub struct AppState {
    pub broker: Arc<Broker>,
    pub api_key: Arc<str>,
    pub metrics_state: MetricsState,
}

impl AppState {
    pub fn new(broker: Arc<Broker>, api_key: &str, metrics: &Metrics) -> Self {
        Self {
            broker,
            api_key: Arc::from(api_key),
            metrics_state: MetricsState::new(metrics.registry.clone()),
        }
    }
}

/// `/tokens` behind the api key check, plus the optional metrics route outside it.
pub fn router(state: AppState, metrics_config: &MetricsConfig) -> Router {
    Router::new()
        .merge(tokens::router(&state))
        .merge(state.metrics_state.router(metrics_config))
        .with_state(state)
}

/// Serve until Ctrl-C or SIGTERM.
pub async fn start(settings_config: &SettingsConfig, broker: Arc<Broker>) -> Result<()> {
    let metrics = get_metrics().await;
    let state = AppState::new(broker, &settings_config.api_key, metrics);
    let app = router(state, &settings_config.metrics);

    let bind_addr = format!(
        "{}:{}",
        settings_config.server.host, settings_config.server.port
    );
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding {}", bind_addr))?;
    info!("listening on {}", bind_addr);

    metrics.up.set(1);
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;
    metrics.up.set(0);
    served.context("http server")?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("ctrl-c received, shutting down"),
        _ = terminate => info!("SIGTERM received, shutting down"),
    }
}
