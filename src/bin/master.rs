//! Placement master binary

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use triblob::common::{Config, MetadataBackend};
use triblob::Master;

#[derive(Parser)]
#[command(name = "triblob-master")]
#[command(about = "triblob placement master")]
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
    /// Start a master shard
    Serve {
        /// Bind address for HTTP
        #[arg(long)]
        bind: Option<String>,

        /// Metadata directory
        #[arg(long)]
        db: Option<PathBuf>,

        /// Keep metadata in memory only
        #[arg(long)]
        in_memory: bool,
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
            db,
            in_memory,
        } => {
            // CLI flags win over file and environment
            let mut master_config = config.master;
            if let Some(bind) = bind {
                master_config.bind_addr = bind.parse()?;
            }
            if let Some(db) = db {
                master_config.db_path = db;
            }
            if in_memory {
                master_config.backend = MetadataBackend::Memory;
            }

            Master::new(master_config).serve().await?;
        }
    }

    Ok(())
}
