//! Request orchestration: query → cache → fetch → normalize → response.
//!
//! # Flow
//! 1. Parse the query.  A missing `url` is answered with 400 at once, without
//!    touching the cache or the network.
//! 2. Consult the [`ResponseCache`] under the request's [`CacheKey`].
//! 3. Fetch through [`RemoteFetch`].  A failed fetch is answered with 502
//!    and nothing is decoded.
//! 4. Normalize on the blocking pool.
//! 5. Return the response.  The cache write runs as a spawned task and does
//!    not delay the response; [`PackageService::flush`] awaits pending writes.
//!
//! # Status mapping
//!
//! | Error | Status |
//! |-------|--------|
//! | missing `url` | 400 |
//! | upstream non-2xx / transport | 502 |
//! | fetched bytes are not a ZIP | 422 |
//! | re-encode defect / task failure | 500 |

pub mod cache;
pub mod fetch;
pub mod request;

use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, info, warn};
use thiserror::Error;
use tokio::task::JoinSet;

use crate::config::ServiceConfig;
use crate::package::{normalize, Normalized, NormalizeError};

pub use cache::{MemoryCache, NoCache, ResponseCache};
pub use fetch::{FetchError, HttpFetcher, RemoteFetch};
pub use request::{display_name, CacheKey, PackageRequest};

pub const CONTENT_TYPE_ZIP:  &str = "application/zip";
pub const CONTENT_TYPE_TEXT: &str = "text/plain; charset=utf-8";

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Missing ?url")]
    MissingUrl,
    #[error("Upstream error: {0}")]
    Upstream(#[from] FetchError),
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
    #[error("Normalization task failed: {0}")]
    Join(String),
}

impl ServiceError {
    pub fn status(&self) -> u16 {
        match self {
            ServiceError::MissingUrl                          => 400,
            ServiceError::Upstream(_)                         => 502,
            ServiceError::Normalize(NormalizeError::Decode(_)) => 422,
            ServiceError::Normalize(NormalizeError::Encode(_)) => 500,
            ServiceError::Join(_)                             => 500,
        }
    }

    pub fn to_response(&self) -> PackageResponse {
        PackageResponse::error(self.status(), &self.to_string())
    }
}

// ── PackageResponse ──────────────────────────────────────────────────────────

/// Transport-neutral response: status, headers and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageResponse {
    pub status:    u16,
    pub headers:   Vec<(String, String)>,
    pub body:      Vec<u8>,
    /// Attachment file name, for successful responses.
    pub file_name: Option<String>,
}

impl PackageResponse {
    /// Binary attachment served as `file_name` with the given cache policy.
    pub fn attachment(file_name: &str, body: Vec<u8>, cache_control: &str) -> Self {
        Self {
            status:  200,
            headers: vec![
                ("Content-Type".into(),        CONTENT_TYPE_ZIP.into()),
                ("Content-Disposition".into(), format!("attachment; filename=\"{file_name}\"")),
                ("Cache-Control".into(),       cache_control.into()),
            ],
            body,
            file_name: Some(file_name.to_owned()),
        }
    }

    pub fn error(status: u16, message: &str) -> Self {
        Self {
            status,
            headers:   vec![("Content-Type".into(), CONTENT_TYPE_TEXT.into())],
            body:      message.as_bytes().to_vec(),
            file_name: None,
        }
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

// ── PackageService ───────────────────────────────────────────────────────────

pub struct PackageService<F, C> {
    fetcher: F,
    cache:   Arc<C>,
    config:  ServiceConfig,
    pending: Mutex<JoinSet<()>>,
}

impl PackageService<HttpFetcher, MemoryCache> {
    /// HTTP fetcher and in-memory cache, configured from `config`.
    pub fn http(config: ServiceConfig) -> Result<Self, FetchError> {
        let fetcher = HttpFetcher::new(&config)?;
        Ok(Self::new(fetcher, MemoryCache::new(), config))
    }
}

impl<F: RemoteFetch, C: ResponseCache> PackageService<F, C> {
    pub fn new(fetcher: F, cache: C, config: ServiceConfig) -> Self {
        Self {
            fetcher,
            cache:   Arc::new(cache),
            config,
            pending: Mutex::new(JoinSet::new()),
        }
    }

    pub fn config(&self) -> &ServiceConfig { &self.config }

    pub fn cache(&self) -> &C { &self.cache }

    pub fn fetcher(&self) -> &F { &self.fetcher }

    /// Entry point for a raw query string such as `?url=...&name=...`.
    pub async fn handle(&self, query: &str) -> PackageResponse {
        match PackageRequest::from_query(query, &self.config.default_name) {
            Ok(request) => self.serve(&request).await,
            Err(e) => {
                warn!("Rejected request '{query}': {e}");
                e.to_response()
            }
        }
    }

    /// Serve a parsed request, from cache when possible.
    pub async fn serve(&self, request: &PackageRequest) -> PackageResponse {
        let key = request.cache_key();
        if let Some(hit) = self.cache.get(&key) {
            debug!("Cache hit: {key}");
            return hit;
        }

        match self.package(request).await {
            Ok(out) => {
                let response = PackageResponse::attachment(
                    &out.file_name,
                    out.bytes,
                    &self.config.cache_control,
                );
                self.defer_put(key, response.clone());
                response
            }
            Err(e) => {
                warn!("Request for '{}' failed: {e}", request.url);
                e.to_response()
            }
        }
    }

    /// Fetch and normalize without consulting or populating the cache.
    pub async fn package(&self, request: &PackageRequest) -> Result<Normalized, ServiceError> {
        let raw = self.fetcher.fetch(&request.url).await?;

        let name = request.name.clone();
        let opts = self.config.normalize.clone();
        let out = tokio::task::spawn_blocking(move || normalize(&raw, &name, &opts))
            .await
            .map_err(|e| ServiceError::Join(e.to_string()))??;

        info!("Packaged {} as {} ({})", request.url, out.file_name, out.format.name());
        Ok(out)
    }

    /// Wait for every deferred cache write issued so far.
    pub async fn flush(&self) {
        let mut pending = std::mem::take(&mut *self.lock_pending());
        while let Some(res) = pending.join_next().await {
            if let Err(e) = res {
                warn!("Deferred cache write failed: {e}");
            }
        }
    }

    fn defer_put(&self, key: CacheKey, response: PackageResponse) {
        let cache = Arc::clone(&self.cache);
        let mut pending = self.lock_pending();
        while pending.try_join_next().is_some() {}
        pending.spawn(async move {
            cache.put(key, response);
        });
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, JoinSet<()>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ContainerError;

    #[test]
    fn statuses() {
        assert_eq!(ServiceError::MissingUrl.status(), 400);
        assert_eq!(ServiceError::Upstream(FetchError::Status(404)).status(), 502);
        assert_eq!(
            ServiceError::Normalize(NormalizeError::Decode(ContainerError::Empty)).status(),
            422
        );
        assert_eq!(
            ServiceError::Normalize(NormalizeError::Encode(ContainerError::Empty)).status(),
            500
        );
    }

    #[test]
    fn upstream_message_carries_status() {
        let resp = ServiceError::Upstream(FetchError::Status(503)).to_response();
        assert_eq!(resp.status, 502);
        assert_eq!(resp.body, b"Upstream error: 503");
    }

    #[test]
    fn attachment_headers() {
        let resp = PackageResponse::attachment("X.zip", vec![1, 2], "public, max-age=1");
        assert!(resp.is_success());
        assert_eq!(resp.header("content-type"), Some(CONTENT_TYPE_ZIP));
        assert_eq!(resp.header("Content-Disposition"), Some("attachment; filename=\"X.zip\""));
        assert_eq!(resp.header("cache-control"), Some("public, max-age=1"));
        assert_eq!(resp.file_name.as_deref(), Some("X.zip"));
    }

    #[test]
    fn error_response_is_text() {
        let resp = PackageResponse::error(400, "Missing ?url");
        assert!(!resp.is_success());
        assert_eq!(resp.header("Content-Type"), Some(CONTENT_TYPE_TEXT));
        assert!(resp.file_name.is_none());
    }
}
