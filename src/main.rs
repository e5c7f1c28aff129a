use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};
use wyoming_trigger::{
    create_router, AppState, BackendPool, Config, NatsResultPublisher, ResultBoard, ResultSink,
    SessionRegistry, StaticDirectory, TriggerGateway,
};

#[derive(Debug, Parser)]
#[command(name = "wyoming-trigger", about = "Start Wyoming satellite pipelines without a wake word")]
struct Args {
    /// Config file path (extension optional)
    #[arg(long, default_value = "config/wyoming-trigger")]
    config: String,

    /// Override the HTTP bind address
    #[arg(long)]
    bind: Option<String>,

    /// Override the HTTP port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;

    info!("Wyoming Trigger v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);

    let board = Arc::new(ResultBoard::new());
    let mut sinks: Vec<Arc<dyn ResultSink>> = vec![board.clone() as Arc<dyn ResultSink>];
    if let Some(url) = &cfg.publish.nats_url {
        let publisher = NatsResultPublisher::connect(url, cfg.publish.subject_prefix.clone()).await?;
        sinks.push(Arc::new(publisher));
    }

    let registry = SessionRegistry::new(
        cfg.pipeline.to_pipeline_config()?,
        BackendPool::new(cfg.pipeline.pool_size()),
        sinks,
    );

    let directory = StaticDirectory::from_config(&cfg);
    if directory.is_empty() {
        warn!("No devices configured; every trigger will be rejected");
    } else {
        info!("{} device(s) configured", directory.len());
    }

    let gateway = TriggerGateway::new(Arc::new(directory), registry.clone());
    let app = create_router(AppState::new(gateway, board));

    let bind = args.bind.unwrap_or(cfg.service.http.bind);
    let port = args.port.unwrap_or(cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind((bind.as_str(), port))
        .await
        .with_context(|| format!("Failed to bind HTTP server to {}:{}", bind, port))?;

    info!("HTTP server listening on {}:{}", bind, port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    registry.shutdown().await;
    info!("Shut down cleanly");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
