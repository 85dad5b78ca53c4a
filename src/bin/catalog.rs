//! Standalone catalog service binary

use chunkvault::catalog::CatalogServer;
use chunkvault::common::Config;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "chunkvault-catalog")]
#[command(about = "chunkvault metadata catalog service")]
struct Cli {
    /// Config file (TOML); defaults to $CHUNKVAULT_CONFIG
    #[arg(long)]
    config: Option<PathBuf>,

    /// Bind address for HTTP
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Database directory
    #[arg(long)]
    db: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load_from(Some(path.as_path()))?,
        None => Config::load()?,
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut catalog_config = config.catalog;
    if let Some(bind) = cli.bind {
        catalog_config.bind_addr = bind;
    }
    if let Some(db) = cli.db {
        catalog_config.db_path = db;
    }

    CatalogServer::new(catalog_config).serve().await?;
    Ok(())
}
