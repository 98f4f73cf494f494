//! API server — mounts the campaign control surface and the Prometheus
//! metrics exporter.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use affiliate_core::config::AppConfig;
use affiliate_engine::{CampaignRegistry, WorkflowEngine};

use crate::rest::{self, AppState};

pub struct ApiServer {
    config: AppConfig,
    registry: Arc<CampaignRegistry>,
    engine: Arc<WorkflowEngine>,
}

impl ApiServer {
    pub fn new(
        config: AppConfig,
        registry: Arc<CampaignRegistry>,
        engine: Arc<WorkflowEngine>,
    ) -> Self {
        Self {
            config,
            registry,
            engine,
        }
    }

    /// Builds the application router. Split out so tests can drive the
    /// surface without binding a socket.
    pub fn router(&self) -> Router {
        let state = AppState {
            registry: self.registry.clone(),
            engine: self.engine.clone(),
            node_id: self.config.node_id.clone(),
            start_time: Instant::now(),
        };

        Router::new()
            // Campaign lifecycle
            .route(
                "/campaigns",
                post(rest::create_campaign).get(rest::list_campaigns),
            )
            .route("/campaigns/:id", get(rest::get_campaign))
            .route("/campaigns/:id/run", post(rest::run_campaign))
            // Inspection
            .route("/campaigns/:id/status", get(rest::campaign_status))
            .route("/campaigns/:id/leads", get(rest::list_leads))
            .route("/campaigns/:id/affiliates", get(rest::list_affiliates))
            .route("/campaigns/:id/commissions", get(rest::list_commissions))
            // Outreach targeting
            .route("/campaigns/:id/outreach", post(rest::queue_outreach_targets))
            // Operational endpoints
            .route("/health", get(rest::health_check))
            .route("/ready", get(rest::readiness))
            .route("/live", get(rest::liveness))
            // Middleware
            .layer(CompressionLayer::new())
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Start the HTTP server (blocks until shutdown).
    pub async fn start_http(&self) -> anyhow::Result<()> {
        let app = self.router();

        let addr = SocketAddr::new(self.config.api.host.parse()?, self.config.api.http_port);
        info!(addr = %addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }

    /// Start the metrics exporter on its own port.
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
