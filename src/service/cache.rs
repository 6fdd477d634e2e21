//! Response cache contract and in-process implementations.
//!
//! Entries are written once and never invalidated: a response is a pure
//! function of its [`CacheKey`].

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use super::request::CacheKey;
use super::PackageResponse;

pub trait ResponseCache: Send + Sync + 'static {
    fn get(&self, key: &CacheKey) -> Option<PackageResponse>;
    fn put(&self, key: CacheKey, response: PackageResponse);
}

/// Unbounded in-memory cache.
///
/// Nothing is ever evicted, so memory grows with the number of distinct
/// keys served.  Suited to one-shot CLI runs and short-lived hosts; a
/// long-running host should supply its own [`ResponseCache`].
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<CacheKey, PackageResponse>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResponseCache for MemoryCache {
    fn get(&self, key: &CacheKey) -> Option<PackageResponse> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn put(&self, key: CacheKey, response: PackageResponse) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_insert(response);
    }
}

/// Cache that stores nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCache;

impl ResponseCache for NoCache {
    fn get(&self, _: &CacheKey) -> Option<PackageResponse> { None }
    fn put(&self, _: CacheKey, _: PackageResponse) {}
}
