//! Affiliate Flow — automated affiliate recruitment and commission pipeline.
//!
//! Main entry point: wires the campaign registry, workflow engine, and mock
//! collaborators, then serves the control surface.

use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use affiliate_agents::mock_handlers;
use affiliate_api::ApiServer;
use affiliate_core::config::AppConfig;
use affiliate_engine::registry::CampaignConfig;
use affiliate_engine::{CampaignRegistry, WorkflowEngine};

#[derive(Parser, Debug)]
#[command(name = "affiliate-flow")]
#[command(about = "Automated affiliate recruitment and commission pipeline")]
#[command(version)]
struct Cli {
    /// Node identifier (overrides config)
    #[arg(long, env = "AFFILIATE_FLOW__NODE_ID")]
    node_id: Option<String>,

    /// HTTP port (overrides config)
    #[arg(long, env = "AFFILIATE_FLOW__API__HTTP_PORT")]
    http_port: Option<u16>,

    /// Register a demo campaign at startup
    #[arg(long, default_value_t = false)]
    seed_demo: bool,

    /// Run the demo campaign for N cycles and exit instead of serving
    #[arg(long)]
    demo_cycles: Option<u32>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "affiliate_flow=info,tower_http=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("Affiliate Flow starting up");

    // Load configuration
    let mut config = AppConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    // Apply CLI overrides
    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(port) = cli.http_port {
        config.api.http_port = port;
    }

    info!(
        node_id = %config.node_id,
        http_port = config.api.http_port,
        max_steps = config.workflow.max_steps_per_run,
        "Configuration loaded"
    );

    // Wire registry, stage handlers, and the workflow engine
    let registry = Arc::new(CampaignRegistry::new(config.scout.clone()));
    let engine = Arc::new(WorkflowEngine::new(
        registry.clone(),
        mock_handlers(&config),
        config.workflow.clone(),
    ));

    if cli.seed_demo || cli.demo_cycles.is_some() {
        registry.create(
            "demo",
            CampaignConfig {
                name: "Demo Campaign".to_string(),
                description: Some("Seeded demo affiliate campaign".to_string()),
                targeting: None,
            },
        )?;
        info!(campaign_id = "demo", "Demo campaign seeded");
    }

    // Demo mode: drive the pipeline for a few cycles and exit.
    if let Some(cycles) = cli.demo_cycles {
        for cycle in 1..=cycles {
            let summary = engine.run("demo", CancellationToken::new()).await?;
            info!(
                cycle,
                status = ?summary.status,
                steps = summary.steps,
                prospects = summary.prospects,
                affiliates = summary.affiliates,
                commissions = summary.commissions,
                "Demo cycle complete"
            );
            if let Some(err) = summary.last_error {
                error!(error = %err, "Demo cycle ended with error");
            }
        }
        return Ok(());
    }

    // Start API server
    let api_server = ApiServer::new(config.clone(), registry, engine);

    // Start metrics exporter
    if let Err(e) = api_server.start_metrics().await {
        error!(error = %e, "Failed to start metrics exporter");
    }

    info!("Affiliate Flow is ready to serve traffic");

    // Start HTTP server (blocks until shutdown)
    api_server.start_http().await?;

    Ok(())
}
