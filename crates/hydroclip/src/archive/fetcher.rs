use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;

use crate::error::{ClipError, Result};

/// Downloads the raw bytes of one segment.
#[async_trait]
pub trait SegmentFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Bytes>;
}

/// Single-attempt HTTP segment download.
#[derive(Debug, Clone)]
pub struct HttpSegmentFetcher {
    client: Client,
    timeout: Option<Duration>,
}

impl HttpSegmentFetcher {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            timeout: None,
        }
    }

    /// Per-request timeout on top of the client's own.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }
}

#[async_trait]
impl SegmentFetcher for HttpSegmentFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes> {
        let mut request = self.client.get(url);
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClipError::http_status(status, url, "segment"));
        }

        response
            .bytes()
            .await
            .map_err(|e| ClipError::segment_fetch(url, format!("body transfer failed: {e}")))
    }
}
