//! Outreach — recurring message campaign engine for a youth program.
//!
//! Main entry point that wires the engine, dispatcher loop, and API server.

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use outreach_api::ApiServer;
use outreach_core::config::AppConfig;
use outreach_core::event_bus;
use outreach_engine::audience::AudienceResolver;
use outreach_engine::directory::demo_directory;
use outreach_engine::dispatcher::Dispatcher;
use outreach_engine::executor::InstanceExecutor;
use outreach_engine::scheduler::InstanceScheduler;
use outreach_engine::stop::StopConditionEvaluator;
use outreach_engine::transport::LoggingTransport;
use outreach_engine::{CampaignEngine, CampaignStore};

#[derive(Parser, Debug)]
#[command(name = "outreach-server")]
#[command(about = "Recurring message campaign engine for a youth program")]
#[command(version)]
struct Cli {
    /// HTTP port (overrides config)
    #[arg(long, env = "OUTREACH__API__HTTP_PORT")]
    http_port: Option<u16>,

    /// Dispatcher poll interval in seconds (overrides config)
    #[arg(long, env = "OUTREACH__DISPATCHER__POLL_INTERVAL_SECS")]
    poll_interval_secs: Option<u64>,

    /// Skip the dispatcher loop (API-only mode)
    #[arg(long, default_value_t = false)]
    api_only: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "outreach=info,tower_http=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("Outreach server starting up");

    // Load configuration
    let mut config = AppConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    // Apply CLI overrides
    if let Some(port) = cli.http_port {
        config.api.http_port = port;
    }
    if let Some(secs) = cli.poll_interval_secs {
        config.dispatcher.poll_interval_secs = secs;
    }

    info!(
        program = %config.program_name,
        http_port = config.api.http_port,
        poll_interval_secs = config.dispatcher.poll_interval_secs,
        api_only = cli.api_only,
        "Configuration loaded"
    );

    // Collaborators. Development mode runs against a seeded in-memory parent
    // directory and a logging transport; production wires real ones here.
    let directory = demo_directory();
    let transport = Arc::new(LoggingTransport);
    let event_sink = event_bus::noop_sink();

    let store = Arc::new(CampaignStore::new());
    let scheduler = Arc::new(InstanceScheduler::new(store.clone(), event_sink.clone()));
    let evaluator = Arc::new(StopConditionEvaluator::new(directory.clone()));
    let executor = Arc::new(InstanceExecutor::new(
        store.clone(),
        transport,
        evaluator,
        scheduler.clone(),
        event_sink.clone(),
        config.program_name.clone(),
        Duration::from_millis(config.dispatcher.dispatch_timeout_ms),
        config.dispatcher.max_parallel_sends,
    ));
    let engine = Arc::new(CampaignEngine::new(
        store.clone(),
        AudienceResolver::new(directory),
        scheduler,
        event_sink,
    ));

    // Dispatcher loop
    if !cli.api_only {
        let dispatcher = Dispatcher::new(
            store,
            executor,
            Duration::from_secs(config.dispatcher.poll_interval_secs),
        );
        tokio::spawn(async move {
            dispatcher.run().await;
        });
    }

    // API + metrics
    let server = ApiServer::new(config, engine);
    if let Err(e) = server.start_metrics().await {
        error!(error = %e, "Failed to start metrics exporter");
    }
    server.start_http().await?;

    Ok(())
}
