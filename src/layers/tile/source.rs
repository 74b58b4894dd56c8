//! Where tile bytes come from

use crate::{MapError, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;

/// Shared async HTTP client used by every tile layer
pub(crate) static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .user_agent(concat!("tilegrid/", env!("CARGO_PKG_VERSION")))
        .timeout(std::time::Duration::from_secs(30))
        .tcp_keepalive(std::time::Duration::from_secs(30))
        .pool_idle_timeout(std::time::Duration::from_secs(90))
        .pool_max_idle_per_host(16)
        .build()
        .unwrap_or_else(|e| {
            log::warn!("falling back to a default HTTP client: {}", e);
            reqwest::Client::new()
        })
});

/// Fetches the raw bytes behind a tile URL
#[async_trait]
pub trait TileFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Plain HTTP(S) fetcher
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    timeout: std::time::Duration,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            timeout: std::time::Duration::from_secs(10),
        }
    }

    pub fn with_timeout(timeout: std::time::Duration) -> Self {
        Self { timeout }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TileFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = HTTP_CLIENT.get(url).timeout(self.timeout).send().await?;

        if !response.status().is_success() {
            return Err(MapError::TileFetch(format!(
                "HTTP {} for {}",
                response.status(),
                url
            )));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

/// Host part of a URL, if it has one
pub fn url_host(url: &str) -> Option<String> {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_host() {
        assert_eq!(
            url_host("https://a.tile.example.org/1/2/3.png").as_deref(),
            Some("a.tile.example.org")
        );
        assert_eq!(url_host("not a url"), None);
    }
}
