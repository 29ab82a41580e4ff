mod config;
mod error;
mod routes;
mod services;
mod state;

use crate::config::AppConfig;
use crate::services::publisher::{publish, PublishRequest};
use crate::services::release_store::ReleaseStore;
use crate::state::AppState;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the latest manifest and package over HTTP
    Serve {
        /// Bind address (overrides HOST)
        #[arg(long)]
        host: Option<String>,

        /// Port (overrides PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Package a directory and publish it as the latest version
    Publish {
        /// Directory holding the release files
        #[arg(short, long, value_name = "DIR")]
        source: PathBuf,

        /// Application name used for the package filename
        #[arg(long, default_value = "nametag")]
        app_name: String,

        /// Exact version to publish
        #[arg(long, conflicts_with = "bump_from")]
        version: Option<semver::Version>,

        /// Publish the patch release after this version
        #[arg(long)]
        bump_from: Option<semver::Version>,

        /// Changelog text for the manifest
        #[arg(long)]
        changelog: Option<String>,

        /// Agent config inside the source directory; its app.current_version
        /// is set to the published version before packaging
        #[arg(long, value_name = "REL")]
        config_file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::from_env();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .init();

    match cli.command {
        Command::Serve { host, port } => {
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            serve(config).await
        }
        Command::Publish {
            source,
            app_name,
            version,
            bump_from,
            changelog,
            config_file,
        } => {
            let store = ReleaseStore::new(config.updates_dir.clone());
            let request = PublishRequest {
                source,
                app_name,
                version,
                bump_from,
                changelog,
                config_file,
            };
            let manifest = publish(&store, &request).await?;

            println!("Update package created successfully!");
            println!("  File:     {}", store.dir().join(&manifest.filename).display());
            println!("  Version:  {}", manifest.version);
            println!("  Size:     {} bytes", manifest.size);
            println!("  Checksum: {}", manifest.checksum);
            Ok(())
        }
    }
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    std::fs::create_dir_all(&config.updates_dir)?;

    let state = Arc::new(AppState::new(config));
    match state.releases.latest_manifest().await {
        Ok(Some(manifest)) => tracing::info!("Found manifest for version {}", manifest.version),
        Ok(None) => tracing::warn!("No manifest found - run `update-server publish` first"),
        Err(e) => tracing::warn!("Latest manifest is unreadable: {e:#}"),
    }

    let addr = state.config.bind_addr();
    tracing::info!("Updates directory: {}", state.config.updates_dir.display());
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl+c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}
