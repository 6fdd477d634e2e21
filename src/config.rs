//! Service configuration, loaded from a JSON file.
//!
//! Every field has a default, so `{}` is a valid configuration:
//!
//! ```json
//! {
//!   "default_name": "Package",
//!   "cache_control": "public, max-age=31536000, immutable",
//!   "fetch_timeout_secs": 30,
//!   "user_agent": "repackr/1.0.0",
//!   "normalize": { "compression": "deflated", "passthrough_unchanged": false }
//! }
//! ```

use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::package::NormalizeOptions;

/// Base name used when the request carries no `name`.
pub const DEFAULT_NAME:          &str = "Package";
/// Far-future, immutable: output is a pure function of the request.
pub const DEFAULT_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] io::Error),
    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub default_name:       String,
    pub cache_control:      String,
    pub fetch_timeout_secs: u64,
    pub user_agent:         String,
    pub normalize:          NormalizeOptions,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            default_name:       DEFAULT_NAME.to_owned(),
            cache_control:      DEFAULT_CACHE_CONTROL.to_owned(),
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            user_agent:         concat!("repackr/", env!("CARGO_PKG_VERSION")).to_owned(),
            normalize:          NormalizeOptions::default(),
        }
    }
}

impl ServiceConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs.max(1))
    }
}
