//! HTTP client for a master shard

use crate::common::{check_response, http_base_url, Result};
use crate::master::api::{
    MasterApi, NotifySavedRequest, RegisterRequest, WorkerResponse, WorkersResponse,
    WorkersToSaveRequest,
};
use async_trait::async_trait;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct MasterClient {
    base_url: String,
    http: reqwest::Client,
}

impl MasterClient {
    pub fn new(address: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self::with_client(address, http))
    }

    /// Share one connection pool across several shards.
    pub fn with_client(address: &str, http: reqwest::Client) -> Self {
        Self {
            base_url: http_base_url(address),
            http,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl MasterApi for MasterClient {
    async fn healthcheck(&self) -> Result<()> {
        check_response(self.http.get(self.url("/health")).send().await?).await?;
        Ok(())
    }

    async fn get_workers_to_save_blob(
        &self,
        blob_hash: &str,
        size_mb: u64,
    ) -> Result<Vec<String>> {
        let request = WorkersToSaveRequest {
            blob_hash: blob_hash.to_string(),
            size_mb,
        };
        let response = self
            .http
            .post(self.url("/workers-to-save"))
            .json(&request)
            .send()
            .await?;
        let body: WorkersResponse = check_response(response).await?.json().await?;
        Ok(body.addresses)
    }

    async fn get_worker_with_blob(&self, blob_hash: &str) -> Result<String> {
        let response = self
            .http
            .get(self.url(&format!("/blob/{}/worker", blob_hash)))
            .send()
            .await?;
        let body: WorkerResponse = check_response(response).await?.json().await?;
        Ok(body.address)
    }

    async fn notify_blob_saved(&self, blob_hash: &str, worker_address: &str) -> Result<()> {
        let request = NotifySavedRequest {
            blob_hash: blob_hash.to_string(),
            worker_address: worker_address.to_string(),
        };
        let response = self
            .http
            .post(self.url("/notify-saved"))
            .json(&request)
            .send()
            .await?;
        check_response(response).await?;
        Ok(())
    }

    async fn register_worker(&self, address: &str, space_available_mb: u64) -> Result<()> {
        let request = RegisterRequest {
            address: address.to_string(),
            space_available_mb,
        };
        let response = self
            .http
            .post(self.url("/register"))
            .json(&request)
            .send()
            .await?;
        check_response(response).await?;
        Ok(())
    }

    async fn delete_blob(&self, blob_hash: &str) -> Result<Vec<String>> {
        let response = self
            .http
            .delete(self.url(&format!("/blob/{}", blob_hash)))
            .send()
            .await?;
        let body: WorkersResponse = check_response(response).await?.json().await?;
        Ok(body.addresses)
    }
}
