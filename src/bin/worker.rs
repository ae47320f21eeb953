//! Storage worker binary

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use triblob::common::{Config, HashAlgorithm};
use triblob::WorkerServer;

#[derive(Parser)]
#[command(name = "triblob-worker")]
#[command(about = "triblob chunk storage worker")]
#[command(version)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a worker
    Serve {
        /// Bind address for HTTP
        #[arg(long)]
        bind: Option<String>,

        /// Address registered with the masters
        #[arg(long)]
        advertise: Option<String>,

        /// Blob directory
        #[arg(long)]
        blobs: Option<PathBuf>,

        /// Master shards in shard order (comma-separated)
        #[arg(long, value_delimiter = ',')]
        masters: Vec<String>,

        /// Digest used to verify blobs
        #[arg(long, value_enum)]
        hash: Option<HashAlgorithm>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

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
            advertise,
            blobs,
            masters,
            hash,
        } => {
            let mut worker_config = config.worker;
            if let Some(bind) = bind {
                worker_config.bind_addr = bind.parse()?;
            }
            if let Some(advertise) = advertise {
                worker_config.advertise_addr = advertise;
            }
            if let Some(blobs) = blobs {
                worker_config.blob_root = blobs;
            }
            if !masters.is_empty() {
                worker_config.masters = masters;
            }
            if let Some(hash) = hash {
                worker_config.hash_algorithm = hash;
            }

            WorkerServer::new(worker_config).serve().await?;
        }
    }

    Ok(())
}
