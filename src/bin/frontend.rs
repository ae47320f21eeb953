//! Frontend binary

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use triblob::common::{Config, HashAlgorithm};
use triblob::Frontend;

#[derive(Parser)]
#[command(name = "triblob-frontend")]
#[command(about = "triblob client-facing frontend")]
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
    /// Start the frontend
    Serve {
        /// Bind address for HTTP
        #[arg(long)]
        bind: Option<String>,

        /// Master shards in shard order (comma-separated)
        #[arg(long, value_delimiter = ',')]
        masters: Vec<String>,

        /// Scratch directory for buffered uploads
        #[arg(long)]
        scratch: Option<PathBuf>,

        /// Digest used to name blobs
        #[arg(long, value_enum)]
        hash: Option<HashAlgorithm>,

        /// Remove worker files on delete
        #[arg(long)]
        purge_worker_copies: bool,
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
            masters,
            scratch,
            hash,
            purge_worker_copies,
        } => {
            let mut frontend_config = config.frontend;
            if let Some(bind) = bind {
                frontend_config.bind_addr = bind.parse()?;
            }
            if !masters.is_empty() {
                frontend_config.masters = masters;
            }
            if let Some(scratch) = scratch {
                frontend_config.scratch_root = scratch;
            }
            if let Some(hash) = hash {
                frontend_config.hash_algorithm = hash;
            }
            if purge_worker_copies {
                frontend_config.purge_worker_copies = true;
            }

            Frontend::new(frontend_config).serve().await?;
        }
    }

    Ok(())
}
