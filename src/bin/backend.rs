use std::{net::SocketAddr, path::PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use videotube::{
    api::{AppState, router},
    config::{DEFAULT_CONFIG_PATH, EnvConfig, load_server_config_from},
    security::ensure_not_root,
};

const DEFAULT_LOG_FILTER: &str = "info,tower_http=info";

#[derive(Parser, Debug)]
#[command(author, version, about = "Serve the VideoTube REST API.")]
struct Cli {
    #[arg(long = "config", value_name = "PATH", default_value = DEFAULT_CONFIG_PATH, help = "Path to the env-style config file")]
    config: PathBuf,
    #[arg(long = "host", value_name = "ADDR", help = "Address to listen on (overrides VIDEOTUBE_HOST)")]
    host: Option<String>,
    #[arg(long = "port", value_name = "PORT", help = "Port to listen on (overrides VIDEOTUBE_PORT)")]
    port: Option<u16>,
    #[arg(long = "data-root", value_name = "DIR", help = "Directory holding the database and uploads (overrides DATA_ROOT)")]
    data_root: Option<PathBuf>,
}

impl Cli {
    fn overrides(&self) -> EnvConfig {
        EnvConfig {
            host: self.host.clone(),
            port: self.port,
            data_root: self.data_root.clone(),
            ..EnvConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    ensure_not_root("videotube backend")?;

    let cli = Cli::parse();
    let config = load_server_config_from(&cli.config, cli.overrides())?;
    let addr = SocketAddr::new(
        config
            .host
            .parse()
            .with_context(|| format!("parsing listen address {}", config.host))?,
        config.port,
    );
    if config.cors_origins.is_empty() {
        warn!("CORS_ORIGIN is not set; cross-origin browsers will be refused");
    }
    info!(data_root = %config.data_root.display(), "opening data root");

    let state = AppState::new(config).context("initializing application state")?;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {}", addr))?;
    info!("API server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running API server")?;

    info!("API server stopped");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        warn!("Failed to install Ctrl+C handler: {}", err);
    }
}
