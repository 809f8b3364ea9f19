//! HTTP implementation of [`ImageFetcher`] for remote image parts.

use super::mime::resolve_image_mime;
use super::{FetchedImage, ImageFetcher};
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::time::Duration;

pub struct HttpImageFetcher {
    client: Client,
    timeout: Duration,
}

impl HttpImageFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self::new_with_client(Client::new(), timeout)
    }

    pub fn new_with_client(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

impl Default for HttpImageFetcher {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedImage> {
        tracing::debug!("Fetching image from {}", url);

        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to get image {}: {}", url, e);
                e
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!("Image fetch error (status {}): {}", status, url);
            return Err(Error::Transport(format!(
                "failed to get image (status {}): {}",
                status, url
            )));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let data = response.bytes().await?.to_vec();
        let mime_type = resolve_image_mime(&data, content_type.as_deref());

        Ok(FetchedImage { data, mime_type })
    }
}
