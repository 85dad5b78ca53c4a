//! Storage node binary

use chunkvault::common::Config;
use chunkvault::node::NodeServer;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "chunkvault-node")]
#[command(about = "chunkvault storage node")]
struct Cli {
    /// Config file (TOML); defaults to $CHUNKVAULT_CONFIG
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start storage node server
    Serve {
        /// Node ID
        #[arg(long)]
        id: Option<String>,

        /// Bind address for HTTP
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// Chunk directory
        #[arg(long)]
        data: Option<PathBuf>,

        /// Advertised capacity in bytes
        #[arg(long)]
        capacity: Option<u64>,
    },
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

    match cli.command {
        Commands::Serve {
            id,
            bind,
            data,
            capacity,
        } => {
            let mut node_config = config.node;
            if let Some(id) = id {
                node_config.id = id;
            }
            if let Some(bind) = bind {
                node_config.bind_addr = bind;
            }
            if let Some(data) = data {
                node_config.data_dir = data;
            }
            if let Some(capacity) = capacity {
                node_config.capacity_bytes = capacity;
            }

            NodeServer::new(node_config).serve().await?;
        }
    }

    Ok(())
}
