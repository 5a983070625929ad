// src/fetch/client.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;
use url::Url;

use super::ItemSource;
use crate::models::RawItem;
use crate::utils::config::FetchConfig;

/// HTTP client for the Hacker News Firebase API.
#[derive(Debug, Clone)]
pub struct HackerNewsClient {
    http: Client,
    base_url: Url,
    max_retries: u32,
    retry_backoff: Duration,
}

impl HackerNewsClient {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            max_retries: config.max_retries,
            retry_backoff: config.retry_backoff,
        })
    }

    pub fn max_item_url(&self) -> Result<Url> {
        self.base_url
            .join("maxitem.json")
            .context("Failed to build maxitem URL")
    }

    pub fn item_url(&self, id: u64) -> Result<Url> {
        self.base_url
            .join(&format!("item/{}.json", id))
            .with_context(|| format!("Failed to build URL for item {}", id))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        retry_with_backoff(self.max_retries, self.retry_backoff, url.as_str(), || {
            self.get_json_once(&url)
        })
        .await
    }

    async fn get_json_once<T: DeserializeOwned>(&self, url: &Url) -> Result<T> {
        debug!("GET {}", url);
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?
            .error_for_status()
            .with_context(|| format!("Request to {} returned an error status", url))?;

        response
            .json::<T>()
            .await
            .with_context(|| format!("Malformed JSON from {}", url))
    }
}

/// Calls `attempt` until it succeeds or `max_retries` retries are used up,
/// doubling the delay after each failure. Returns the last error.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    backoff: Duration,
    label: &str,
    mut attempt: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut retries = 0;
    loop {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(e) if retries < max_retries => {
                let delay = backoff.saturating_mul(1 << retries.min(16));
                warn!(
                    "GET {} failed (attempt {}/{}): {:#}. Retrying in {:?}",
                    label,
                    retries + 1,
                    max_retries + 1,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
                retries += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[async_trait]
impl ItemSource for HackerNewsClient {
    async fn max_item_id(&self) -> Result<u64> {
        let url = self.max_item_url()?;
        self.get_json(url).await
    }

    async fn fetch_item(&self, id: u64) -> Result<Option<RawItem>> {
        let url = self.item_url(id)?;
        self.get_json(url).await
    }
}
