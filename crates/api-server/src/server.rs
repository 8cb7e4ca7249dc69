//! API server — HTTP surface plus Prometheus metrics exporter.

use crate::rest::{self, AppState};
use crate::swagger::ApiDoc;
use axum::routing::{delete, get, post};
use axum::Router;
use outreach_core::config::AppConfig;
use outreach_engine::CampaignEngine;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub struct ApiServer {
    config: AppConfig,
    engine: Arc<CampaignEngine>,
}

impl ApiServer {
    pub fn new(config: AppConfig, engine: Arc<CampaignEngine>) -> Self {
        Self { config, engine }
    }

    /// Start the HTTP REST server.
    pub async fn start_http(&self) -> anyhow::Result<()> {
        let state = AppState {
            engine: self.engine.clone(),
            start_time: Instant::now(),
        };

        let app = Router::new()
            .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
            // Campaign lifecycle
            .route("/v1/campaigns", post(rest::create_campaign))
            .route("/v1/campaigns", get(rest::list_campaigns))
            .route("/v1/campaigns/:id", get(rest::get_campaign))
            .route("/v1/campaigns/:id", delete(rest::delete_campaign))
            .route("/v1/campaigns/:id/pause", post(rest::pause_campaign))
            .route("/v1/campaigns/:id/resume", post(rest::resume_campaign))
            .route(
                "/v1/campaigns/:id/refresh-audience",
                post(rest::refresh_audience),
            )
            // Operational endpoints
            .route("/health", get(rest::health_check))
            .route("/ready", get(rest::readiness))
            .route("/live", get(rest::liveness))
            // Middleware
            .layer(CompressionLayer::new())
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(state);

        let addr = SocketAddr::new(self.config.api.host.parse()?, self.config.api.http_port);

        info!(addr = %addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }

    /// Start the metrics exporter on a separate port.
    pub async fn start_metrics(&self) -> anyhow::Result<()> {
        let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
        let handle = builder
            .with_http_listener(SocketAddr::new(
                self.config.api.host.parse()?,
                self.config.metrics.port,
            ))
            .install_recorder()?;

        info!(port = self.config.metrics.port, "Metrics exporter started");

        // Keep the handle alive
        std::mem::forget(handle);
        Ok(())
    }
}
