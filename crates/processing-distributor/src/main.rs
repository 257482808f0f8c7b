use clap::Parser;
use processing_distributor::{
    create_router, AsyncResourceCleaner, AsyncResourcesMonitor, DistributorConfig,
    DistributorMetrics, HttpStorageClient, HttpWorkerClient, ProcessDistributor, ServerState,
    WorkerManager, WorkerRegistration,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "processing-distributor")]
#[command(about = "Workflow step distributor", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "distributor.yaml")]
    config: String,

    /// HTTP port for metrics and health
    #[arg(long)]
    http_port: Option<u16>,

    /// JSON file of workers to register at startup
    #[arg(long)]
    workers: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = if Path::new(&args.config).exists() {
        DistributorConfig::from_file(&args.config)?
    } else {
        DistributorConfig::default()
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    if !Path::new(&args.config).exists() {
        tracing::warn!("Config file {} not found, using defaults", args.config);
    }

    // Override with CLI args
    if let Some(port) = args.http_port {
        config.http_port = port;
    }
    if let Some(workers) = args.workers {
        config.workers_file = Some(workers);
    }

    tracing::info!("Starting distributor with config: {:?}", config);

    let metrics = Arc::new(DistributorMetrics::new()?);
    let worker_client = Arc::new(HttpWorkerClient::new(config.worker_connect_timeout())?);
    let manager = Arc::new(WorkerManager::new(
        config.regular_queue_capacity,
        worker_client,
        Arc::clone(&metrics),
    )?);

    let storage = Arc::new(HttpStorageClient::new(
        config.storage_url.clone(),
        config.request_timeout(),
    )?);
    let monitor = Arc::new(AsyncResourcesMonitor::new(
        storage.clone(),
        config.status_check_batch_size,
        config.poll_delay_monitor(),
        Arc::clone(&metrics),
    )?);
    let cleaner = Arc::new(AsyncResourceCleaner::new(
        storage,
        config.poll_delay_cleaner(),
        Arc::clone(&metrics),
    ));

    let distributor = Arc::new(ProcessDistributor::new(
        Arc::clone(&manager),
        Arc::clone(&monitor),
        Arc::clone(&cleaner),
        &config,
    )?);

    let shutdown = CancellationToken::new();
    let monitor_handle = monitor.spawn(shutdown.clone());
    let cleaner_handle = cleaner.spawn(shutdown.clone());

    if let Some(path) = &config.workers_file {
        let contents = std::fs::read_to_string(path)?;
        let registrations: Vec<WorkerRegistration> = serde_json::from_str(&contents)?;
        let count = manager.register_all(registrations)?;
        tracing::info!("Registered {} workers from {}", count, path.display());
    }

    // Start HTTP server
    let app = create_router(ServerState {
        distributor,
        metrics,
    });
    let addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("HTTP server listening on {}", addr);

    let server_shutdown = shutdown.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
            .await
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    shutdown.cancel();
    manager.shutdown().await;
    monitor_handle.await?;
    cleaner_handle.await?;
    server.await??;

    tracing::info!("Distributor stopped");
    Ok(())
}
