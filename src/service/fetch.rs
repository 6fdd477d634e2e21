//! Remote archive retrieval.

use std::future::Future;

use log::{debug, warn};
use reqwest::Client;
use thiserror::Error;

use crate::config::ServiceConfig;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Upstream answered with a non-2xx status.  The body is never read.
    #[error("{0}")]
    Status(u16),
    #[error("{0}")]
    Transport(String),
    #[error("HTTP client setup failed: {0}")]
    Client(String),
}

/// Source of raw archive bytes.
pub trait RemoteFetch: Send + Sync + 'static {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<Vec<u8>, FetchError>> + Send;
}

/// [`RemoteFetch`] over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &ServiceConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(config.fetch_timeout())
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;
        Ok(Self { client })
    }
}

impl RemoteFetch for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        debug!("Fetching upstream archive: {url}");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!("Upstream fetch failed for '{url}': HTTP {status}");
            return Err(FetchError::Status(status.as_u16()));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        debug!("Fetched {} B from {url}", bytes.len());
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_displays_code() {
        assert_eq!(FetchError::Status(404).to_string(), "404");
    }

    #[test]
    fn client_builds_from_default_config() {
        assert!(HttpFetcher::new(&ServiceConfig::default()).is_ok());
    }

    #[tokio::test]
    async fn invalid_url_is_a_transport_error() {
        let fetcher = HttpFetcher::new(&ServiceConfig::default()).unwrap();
        let err = fetcher.fetch("not a url").await.unwrap_err();
        assert!(matches!(err, FetchError::Transport(_)));
    }
}
