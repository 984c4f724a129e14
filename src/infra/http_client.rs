use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::app::ports::FetchPort;
use crate::common::error::Result;

/// Reqwest-backed fetch collaborator with a bounded timeout and a fixed
/// retry budget. Every payload is checksummed for the audit trail.
pub struct HttpFetcher {
    client: reqwest::Client,
    retry_budget: u32,
}

impl HttpFetcher {
    pub fn new(timeout_seconds: u64, retry_budget: u32) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            retry_budget,
        })
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let mut attempt = 0;
        loop {
            match self.try_fetch(url).await {
                Ok(bytes) => return Ok(bytes),
                Err(err) if attempt < self.retry_budget => {
                    attempt += 1;
                    warn!(url, attempt, %err, "fetch failed, retrying");
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn try_fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        let bytes = response.bytes().await?.to_vec();
        let checksum = {
            let mut hasher = Sha256::new();
            hasher.update(&bytes);
            hex::encode(hasher.finalize())
        };
        debug!(url, bytes = bytes.len(), %checksum, "fetched payload");
        Ok(bytes)
    }
}

#[async_trait]
impl FetchPort for HttpFetcher {
    async fn fetch_json(&self, url: &str) -> Result<serde_json::Value> {
        let bytes = self.fetch_bytes(url).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn fetch_text(&self, url: &str) -> Result<String> {
        let bytes = self.fetch_bytes(url).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}
