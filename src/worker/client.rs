//! HTTP client for a worker

use crate::common::{
    check_response, http_base_url, ChunkStream, Error, Result, SaveBlobMessage, SaveBlobStream,
};
use crate::worker::api::{FreeStorageResponse, WorkerApi};
use async_trait::async_trait;
use futures_util::StreamExt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const UPLOAD_BUFFER: usize = 4;

#[derive(Debug, Clone)]
pub struct WorkerClient {
    base_url: String,
    http: reqwest::Client,
}

impl WorkerClient {
    pub fn new(address: &str) -> Result<Self> {
        Ok(Self::with_client(address, Self::http_client()?))
    }

    pub fn with_client(address: &str, http: reqwest::Client) -> Self {
        Self {
            base_url: http_base_url(address),
            http,
        }
    }

    /// Blob transfers run as long as they need; only connecting is bounded.
    pub fn http_client() -> Result<reqwest::Client> {
        Ok(reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?)
    }

    fn blob_url(&self, blob_hash: &str) -> String {
        format!("{}/blob/{}", self.base_url, blob_hash)
    }
}

#[async_trait]
impl WorkerApi for WorkerClient {
    async fn healthcheck(&self) -> Result<()> {
        let response = self
            .http
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;
        check_response(response).await?;
        Ok(())
    }

    async fn get_free_storage(&self) -> Result<u64> {
        let response = self
            .http
            .get(format!("{}/free-storage", self.base_url))
            .send()
            .await?;
        let body: FreeStorageResponse = check_response(response).await?.json().await?;
        Ok(body.bytes)
    }

    async fn save_blob(&self, mut stream: SaveBlobStream) -> Result<()> {
        let hash = match stream.next().await {
            Some(Ok(SaveBlobMessage::Hash(hash))) => hash,
            Some(Ok(SaveBlobMessage::Chunk(_))) => {
                return Err(Error::InvalidArgument(
                    "save stream must start with the blob hash".into(),
                ))
            }
            Some(Err(e)) => return Err(e),
            None => return Err(Error::InvalidArgument("empty save stream".into())),
        };

        // reqwest wants a Sync body; pump the rest of the stream through a channel.
        let (tx, rx) = mpsc::channel::<Result<bytes::Bytes>>(UPLOAD_BUFFER);
        tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                let item = match message {
                    Ok(SaveBlobMessage::Chunk(bytes)) => Ok(bytes),
                    Ok(SaveBlobMessage::Hash(_)) => Err(Error::InvalidArgument(
                        "second hash message in save stream".into(),
                    )),
                    Err(e) => Err(e),
                };
                let failed = item.is_err();
                if tx.send(item).await.is_err() || failed {
                    break;
                }
            }
        });

        let response = self
            .http
            .put(self.blob_url(&hash))
            .body(reqwest::Body::wrap_stream(ReceiverStream::new(rx)))
            .send()
            .await?;
        check_response(response).await?;
        Ok(())
    }

    async fn get_blob(&self, blob_hash: &str) -> Result<ChunkStream> {
        let response = self.http.get(self.blob_url(blob_hash)).send().await?;
        let response = check_response(response).await?;
        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(Error::from))
            .boxed())
    }

    async fn delete_blob(&self, blob_hash: &str) -> Result<()> {
        let response = self.http.delete(self.blob_url(blob_hash)).send().await?;
        check_response(response).await?;
        Ok(())
    }
}
