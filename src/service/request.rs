//! Query-string parsing and cache identity.

use std::borrow::Cow;
use std::fmt;

use super::ServiceError;

/// One inbound package request: where to fetch from and what to call it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRequest {
    pub url:  String,
    /// Output base name, already sanitised for use in a file name.
    pub name: String,
}

impl PackageRequest {
    /// Build a request, falling back to `default_name` when `name` is blank.
    pub fn new(url: impl Into<String>, name: Option<&str>, default_name: &str) -> Result<Self, ServiceError> {
        let url: String = url.into();
        let url = url.trim().to_owned();
        if url.is_empty() {
            return Err(ServiceError::MissingUrl);
        }
        Ok(Self { url, name: display_name(name, default_name) })
    }

    /// Parse `url=<source>&name=<display>` (a leading `?` is allowed).
    /// Only the first occurrence of each key counts; unknown keys are ignored.
    pub fn from_query(query: &str, default_name: &str) -> Result<Self, ServiceError> {
        let query = query.strip_prefix('?').unwrap_or(query);
        let mut url:  Option<String> = None;
        let mut name: Option<String> = None;

        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            match decode(k).as_str() {
                "url"  if url.is_none()  => url  = Some(decode(v)),
                "name" if name.is_none() => name = Some(decode(v)),
                _ => {}
            }
        }

        Self::new(url.ok_or(ServiceError::MissingUrl)?, name.as_deref(), default_name)
    }

    /// Identity used for response caching.
    pub fn cache_key(&self) -> CacheKey {
        CacheKey(format!(
            "url={}&name={}",
            urlencoding::encode(&self.url),
            urlencoding::encode(&self.name),
        ))
    }
}

/// Sanitise `name` for use as an output file stem, falling back to
/// `default_name` when nothing usable is left.
pub fn display_name(name: Option<&str>, default_name: &str) -> String {
    name.map(sanitize_filename::sanitize)
        .map(|n| n.trim().to_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| default_name.to_owned())
}

/// Form-style decoding: `+` is a space, then percent escapes.
fn decode(s: &str) -> String {
    let s = s.replace('+', " ");
    urlencoding::decode(&s)
        .map(Cow::into_owned)
        .unwrap_or_else(|_| s.clone())
}

/// Canonical request identity.  Two requests with the same key always
/// produce the same response bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
