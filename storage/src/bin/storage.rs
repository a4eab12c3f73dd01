use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use dfs_storage::server::{client_router, command_router, AppState};
use dfs_storage::LocalStore;
use dfs_wire::client::HttpClient;
use dfs_wire::RegisterRequest;

/// The naming service is reached on the loopback interface, and this node
/// announces itself there.
const LOCALHOST: &str = "127.0.0.1";

/// Storage node of the file-system coordinator.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Port answering client byte operations.
    client_port: u16,

    /// Port answering naming service commands.
    command_port: u16,

    /// Registration port of the naming service.
    registration_port: u16,

    /// Directory subtree holding this node's files.
    root_dir: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let store = Arc::new(
        LocalStore::open(&cli.root_dir)
            .await
            .context("opening the store root")?,
    );
    let files = store.scan().context("scanning the store root")?;

    info!(files = files.len(), root = %cli.root_dir.display(), "registering");
    let http = HttpClient::new();
    let response = http
        .register(
            LOCALHOST,
            cli.registration_port,
            &RegisterRequest {
                storage_ip: LOCALHOST.to_owned(),
                client_port: cli.client_port,
                command_port: cli.command_port,
                files,
            },
        )
        .await
        .context("registering with the naming service")?;

    // the naming service keeps one authoritative copy of each file; ours are
    // stale duplicates
    for duplicate in &response.files {
        if let Err(e) = store.delete(duplicate).await {
            warn!(file = %duplicate, err = %e, "could not delete duplicate");
        }
    }
    if !response.files.is_empty() {
        info!(deleted = response.files.len(), "dropped duplicate files");
    }

    let state = AppState::new(store);
    let trace = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(tracing::Level::INFO));
    let client_app = client_router(state.clone()).layer(trace.clone());
    let command_app = command_router(state).layer(trace);

    let client_listener = TcpListener::bind(("0.0.0.0", cli.client_port))
        .await
        .context("binding the client port")?;
    let command_listener = TcpListener::bind(("0.0.0.0", cli.command_port))
        .await
        .context("binding the command port")?;

    info!(
        client_port = cli.client_port,
        command_port = cli.command_port,
        "starting storage node"
    );

    tokio::try_join!(
        async { axum::serve(client_listener, client_app).await },
        async { axum::serve(command_listener, command_app).await },
    )?;

    Ok(())
}
