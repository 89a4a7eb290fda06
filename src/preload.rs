//! Image preloading: resolves remote `<img>` sources to data-embedded
//! payloads before capture.
//!
//! Fetches run concurrently but results come back in request order. Any
//! single failure fails the whole batch.

use crate::rendering::images::EmbeddedImage;
use crate::{Error, ExportConfig, Result};
use futures::future::try_join_all;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::time::Duration;
use url::Url;

const FALLBACK_MIME: &str = "application/octet-stream";

#[derive(Debug, Clone)]
pub struct ImagePreloader {
    client: Client,
    base_url: Option<Url>,
}

impl ImagePreloader {
    pub fn new(config: &ExportConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.fetch_timeout_ms))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::ConfigError(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: None,
        })
    }

    /// Resolve relative sources against `base`
    pub fn with_base_url(mut self, base: &str) -> Result<Self> {
        let url = Url::parse(base).map_err(|e| Error::ConfigError(format!("invalid base URL {}: {}", base, e)))?;
        self.base_url = Some(url);
        Ok(self)
    }

    /// Fetch every source. The result is index-aligned with `sources`.
    pub async fn preload(&self, sources: &[String]) -> Result<Vec<EmbeddedImage>> {
        log::debug!("preloading {} image(s)", sources.len());
        let images = try_join_all(sources.iter().map(|src| self.fetch(src))).await?;
        log::debug!("preloaded {} image(s)", images.len());
        Ok(images)
    }

    async fn fetch(&self, source: &str) -> Result<EmbeddedImage> {
        if source.starts_with("data:") {
            return Ok(EmbeddedImage {
                source: source.to_string(),
                data_url: source.to_string(),
            });
        }

        let url = self.resolve(source)?;
        let resp = self
            .client
            .get(url.clone())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::NetworkError(format!("Failed to fetch {}: {}", url, e)))?;

        let mime = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| FALLBACK_MIME.to_string());

        let body = resp
            .bytes()
            .await
            .map_err(|e| Error::NetworkError(format!("Failed to read body of {}: {}", url, e)))?;

        Ok(EmbeddedImage::new(source, &mime, &body))
    }

    fn resolve(&self, source: &str) -> Result<Url> {
        match (&self.base_url, Url::parse(source)) {
            (_, Ok(url)) => Ok(url),
            (Some(base), Err(_)) => base
                .join(source)
                .map_err(|e| Error::NetworkError(format!("cannot resolve {}: {}", source, e))),
            (None, Err(e)) => Err(Error::NetworkError(format!(
                "relative image source {} without a base URL: {}",
                source, e
            ))),
        }
    }
}
