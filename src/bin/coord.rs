//! Coordinator binary

use chunkvault::common::{CatalogLocation, Config, NodeEndpoint, PlacementKind};
use chunkvault::coordinator::CoordinatorServer;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "chunkvault-coord")]
#[command(about = "chunkvault coordinator: chunking, placement and reassembly")]
struct Cli {
    /// Config file (TOML); defaults to $CHUNKVAULT_CONFIG
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start coordinator server
    Serve {
        /// Bind address for HTTP
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// Embedded catalog directory
        #[arg(long, conflicts_with = "catalog_url")]
        db: Option<PathBuf>,

        /// Standalone catalog service URL
        #[arg(long)]
        catalog_url: Option<String>,

        /// Storage nodes as id=url (comma-separated)
        #[arg(long, value_delimiter = ',')]
        nodes: Vec<String>,

        /// Default chunk size in bytes
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Placement policy: round_robin, least_load or consistent_hash
        #[arg(long)]
        placement: Option<PlacementKind>,
    },
}

fn parse_node(arg: &str) -> anyhow::Result<NodeEndpoint> {
    let (id, url) = arg
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("node must be id=url, got {}", arg))?;
    Ok(NodeEndpoint {
        id: id.trim().to_string(),
        url: url.trim().to_string(),
    })
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
            bind,
            db,
            catalog_url,
            nodes,
            chunk_size,
            placement,
        } => {
            // CLI flags take priority over file and environment
            let mut coord_config = config.coordinator;
            if let Some(bind) = bind {
                coord_config.bind_addr = bind;
            }
            if let Some(db_path) = db {
                coord_config.catalog = CatalogLocation::Local { db_path };
            }
            if let Some(url) = catalog_url {
                coord_config.catalog = CatalogLocation::Remote { url };
            }
            if !nodes.is_empty() {
                coord_config.nodes = nodes
                    .iter()
                    .map(|n| parse_node(n))
                    .collect::<anyhow::Result<_>>()?;
            }
            if let Some(chunk_size) = chunk_size {
                coord_config.chunk_size = chunk_size;
            }
            if let Some(placement) = placement {
                coord_config.placement = placement;
            }
            coord_config.validate()?;

            CoordinatorServer::new(coord_config).serve().await?;
        }
    }

    Ok(())
}
