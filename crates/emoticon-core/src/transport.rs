//! Byte transport — fetch a URL with bounded retry.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::TransportError;

/// Base delay between attempts; grows linearly with the attempt number.
const RETRY_BASE_DELAY_MS: u64 = 250;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch the full body at `url`.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, TransportError>;
}

/// reqwest-backed transport used in production.
pub struct HttpTransport {
    client: reqwest::Client,
    attempts: u32,
}

impl HttpTransport {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(Duration::from_secs(config.download_timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            attempts: config.download_attempts.max(1),
        })
    }

    async fn fetch_once(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| TransportError::Request {
                url: url.to_string(),
                source,
            })?;

        if !resp.status().is_success() {
            return Err(TransportError::Status {
                url: url.to_string(),
                status: resp.status().as_u16(),
            });
        }

        let body = resp.bytes().await.map_err(|source| TransportError::Request {
            url: url.to_string(),
            source,
        })?;
        Ok(body.to_vec())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        if reqwest::Url::parse(url).is_err() {
            return Err(TransportError::InvalidUrl(url.to_string()));
        }

        let mut last = String::new();
        for attempt in 1..=self.attempts {
            match self.fetch_once(url).await {
                Ok(body) => {
                    info!("Fetched {} bytes from {} (attempt {})", body.len(), url, attempt);
                    return Ok(body);
                }
                Err(e) => {
                    warn!("Fetch attempt {}/{} for {} failed: {}", attempt, self.attempts, url, e);
                    last = e.to_string();
                    if attempt < self.attempts {
                        tokio::time::sleep(retry_delay(attempt)).await;
                    }
                }
            }
        }

        Err(TransportError::Exhausted {
            url: url.to_string(),
            attempts: self.attempts,
            last,
        })
    }
}

fn retry_delay(attempt: u32) -> Duration {
    let jitter = rand::thread_rng().gen_range(0..RETRY_BASE_DELAY_MS / 2);
    Duration::from_millis(RETRY_BASE_DELAY_MS * attempt as u64 + jitter)
}
