use anyhow::Result;
use axum::Router;
use tokio_util::sync::CancellationToken;
use tracing::info;
use crate::config::settings::SettingsConfig;
use crate::observability::metrics::{get_metrics, Metrics};
use crate::observability::routes::MetricsState;

#[derive(Clone)]
pub struct AppState {
    pub metrics_state: MetricsState,
}

impl AppState {
    pub fn new(metrics: &Metrics) -> Self {
        Self {
            metrics_state: MetricsState::new(metrics.registry.clone()),
        }
    }
}

/// Serve the metrics route until `cancel` fires. Returns immediately when
/// metrics are disabled.
pub async fn start(settings_config: &SettingsConfig, cancel: CancellationToken) -> Result<()> {
    let metrics = get_metrics().await;
    metrics.up.set(1);
    if !settings_config.metrics.is_enabled {
        return Ok(());
    }

    let state = AppState::new(metrics);
    let app = Router::new()
        .merge(state.metrics_state.router(&settings_config.metrics))
        .with_state(state);

    let bind_addr = format!("{}:{}", settings_config.server.host, settings_config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("metrics served on http://{}{}", bind_addr, settings_config.metrics.path);
    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await?;
    Ok(())
}
