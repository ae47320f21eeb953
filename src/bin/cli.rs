//! CLI for talking to a triblob frontend

use anyhow::{bail, Context};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use triblob::common::{check_response, format_bytes, http_base_url};
use triblob::frontend::http::{UploadResponse, BLOB_SIZE_HEADER};

#[derive(Parser)]
#[command(name = "triblob")]
#[command(about = "triblob distributed blob store CLI")]
#[command(version)]
struct Cli {
    /// Frontend URL
    #[arg(long, default_value = "http://localhost:50041")]
    frontend: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the frontend is up
    Ping,

    /// Upload a file, printing its hash
    Upload {
        /// File path
        file: PathBuf,
    },

    /// Download a blob
    Get {
        /// Blob hash
        hash: String,

        /// Output file
        #[arg(long)]
        output: PathBuf,
    },

    /// Delete a blob
    Delete {
        /// Blob hash
        hash: String,
    },

    /// Upload "ABRAKADABRA", read it back, verify, delete
    Demo,
}

struct FrontendHttp {
    base_url: String,
    http: reqwest::Client,
}

impl FrontendHttp {
    fn new(address: &str) -> Self {
        Self {
            base_url: http_base_url(address),
            http: reqwest::Client::new(),
        }
    }

    async fn ping(&self) -> anyhow::Result<()> {
        let response = self
            .http
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;
        check_response(response).await?;
        Ok(())
    }

    async fn upload(&self, size: u64, body: reqwest::Body) -> anyhow::Result<String> {
        let response = self
            .http
            .post(format!("{}/blob", self.base_url))
            .header(BLOB_SIZE_HEADER, size)
            .body(body)
            .send()
            .await?;
        let uploaded: UploadResponse = check_response(response).await?.json().await?;
        Ok(uploaded.blob_hash)
    }

    async fn get(&self, hash: &str) -> anyhow::Result<reqwest::Response> {
        let response = self
            .http
            .get(format!("{}/blob/{}", self.base_url, hash))
            .send()
            .await?;
        Ok(check_response(response).await?)
    }

    async fn delete(&self, hash: &str) -> anyhow::Result<serde_json::Value> {
        let response = self
            .http
            .delete(format!("{}/blob/{}", self.base_url, hash))
            .send()
            .await?;
        Ok(check_response(response).await?.json().await?)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let frontend = FrontendHttp::new(&cli.frontend);

    match cli.command {
        Commands::Ping => {
            frontend.ping().await?;
            println!("✓ {} is healthy", cli.frontend);
        }

        Commands::Upload { file } => {
            let size = tokio::fs::metadata(&file)
                .await
                .with_context(|| format!("reading {}", file.display()))?
                .len();
            let body = tokio::fs::File::open(&file).await?;
            let hash = frontend.upload(size, body.into()).await?;
            println!("✓ Uploaded {} ({})", file.display(), format_bytes(size));
            println!("{}", hash);
        }

        Commands::Get { hash, output } => {
            let response = frontend.get(&hash).await?;
            let mut out = tokio::fs::File::create(&output)
                .await
                .with_context(|| format!("creating {}", output.display()))?;
            let mut written = 0u64;
            let mut chunks = response.bytes_stream();
            while let Some(chunk) = chunks.next().await {
                let chunk = chunk?;
                out.write_all(&chunk).await?;
                written += chunk.len() as u64;
            }
            out.flush().await?;
            println!("✓ Wrote {} to {}", format_bytes(written), output.display());
        }

        Commands::Delete { hash } => {
            let result = frontend.delete(&hash).await?;
            println!("✓ Deleted {}: {}", hash, result);
        }

        Commands::Demo => {
            let data = Bytes::from_static(b"ABRAKADABRA");
            let chunks = vec![data.slice(..4), data.slice(4..)];
            let body = reqwest::Body::wrap_stream(futures_util::stream::iter(
                chunks.into_iter().map(Ok::<_, std::io::Error>),
            ));

            let hash = frontend.upload(data.len() as u64, body).await?;
            println!("Uploaded ABRAKADABRA as {}", hash);

            let read_back = frontend.get(&hash).await?.bytes().await?;
            if read_back != data {
                bail!(
                    "read back {:?}, expected {:?}",
                    String::from_utf8_lossy(&read_back),
                    "ABRAKADABRA"
                );
            }
            println!("Read back {} bytes, content matches", read_back.len());

            frontend.delete(&hash).await?;
            println!("✓ Demo finished, {} deleted", hash);
        }
    }

    Ok(())
}
