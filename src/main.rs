use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use quality_metrics::config::{CliArgs, Command, MetricsConfig};
use quality_metrics::quality::db::MetricsDb;
use quality_metrics::quality::ingest;
use quality_metrics::quality::service::QualityMetricsService;
use quality_metrics::server;
use quality_metrics::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries the JSON output of the CLI commands.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quality_metrics=info,tower_http=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = CliArgs::parse();
    let config = MetricsConfig::from_args(&args);

    let db = MetricsDb::open(&config.db_path)
        .with_context(|| format!("Failed to open metrics database {:?}", config.db_path))?;
    let service = QualityMetricsService::new(Arc::new(db))
        .with_load_time_policy(config.missing_load_time);

    match args.command {
        Command::Serve { port } => serve(service, port).await,
        Command::Ingest { file } => {
            let record = ingest::ingest_file(service.db(), &file)
                .with_context(|| format!("Failed to ingest {:?}", file))?;
            print_json(&record)
        }
        Command::Overview { branch } => {
            print_json(&service.get_dashboard_overview(branch.as_deref())?)
        }
        Command::Statistics { branch } => {
            print_json(&service.get_statistics(branch.as_deref())?)
        }
    }
}

async fn serve(service: QualityMetricsService, port: u16) -> anyhow::Result<()> {
    info!("Starting quality-metrics v{}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = service.db().path() {
        info!("Database: {:?}", path);
    }

    let state = Arc::new(AppState::new(service));
    let router = server::build_router(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    info!("Listening on http://0.0.0.0:{}", port);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down");
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}
