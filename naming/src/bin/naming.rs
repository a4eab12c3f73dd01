use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, TraceLayer};
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use dfs_naming::commands::HttpStorageCommands;
use dfs_naming::{server, NamingConfig, NamingService};

/// Naming service of the file-system coordinator.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Port answering client service requests.
    service_port: u16,

    /// Port answering storage node registrations.
    registration_port: u16,

    /// Shared accesses of a single-hosted file before it is replicated.
    #[arg(long, env = "REPLICATION_THRESHOLD", default_value_t = 10)]
    replication_threshold: u32,

    /// Background workers applying replication and invalidation.
    #[arg(long, default_value_t = 4)]
    replication_workers: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let service = NamingService::new(
        NamingConfig {
            replication_threshold: cli.replication_threshold,
            replication_workers: cli.replication_workers,
        },
        Arc::new(HttpStorageCommands::new()),
    );

    let trace = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(tracing::Level::INFO));
    let service_app = server::service_router(service.clone()).layer(trace.clone());
    let registration_app = server::registration_router(service).layer(trace);

    let service_listener = TcpListener::bind(("0.0.0.0", cli.service_port))
        .await
        .context("binding the service port")?;
    let registration_listener = TcpListener::bind(("0.0.0.0", cli.registration_port))
        .await
        .context("binding the registration port")?;

    info!(
        service_port = cli.service_port,
        registration_port = cli.registration_port,
        "starting naming service"
    );

    tokio::try_join!(
        async { axum::serve(service_listener, service_app).await },
        async { axum::serve(registration_listener, registration_app).await },
    )?;

    Ok(())
}
