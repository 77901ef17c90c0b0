//! Engine-wide configuration: tunables for the scheduler and the
//! refreshing client pool, plus the fixed constants pinned by spec.

pub mod constants;
mod error;

pub use self::error::{Error, ErrorKind, Result};

use url::Url;

/// Tunable parameters for the engine. Constructed once at `Initialize` time
/// and shared (read-only, by value) with the worker and the client pool.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineConfig {
    pub region: String,
    pub refresh_margin_secs: i64,
    pub max_cache_size: usize,
    pub max_pool_connections: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            region: String::from("us-east-1"),
            refresh_margin_secs: constants::DEFAULT_REFRESH_MARGIN_SECS,
            max_cache_size: constants::DEFAULT_MAX_CACHE_SIZE,
            max_pool_connections: constants::DEFAULT_MAX_POOL_CONNECTIONS,
        }
    }
}

impl EngineConfig {
    pub fn with_region<S: Into<String>>(mut self, region: S) -> Self {
        self.region = region.into();
        self
    }
}

/// Validates the clinical backend endpoint supplied to `Initialize`.
/// Returns the parsed `Url` on success so callers can reuse the scheme and
/// host without re-parsing.
pub fn validate_api_endpoint(endpoint: &str) -> Result<Url> {
    if endpoint.trim().is_empty() {
        return Err(Error::invalid_endpoint(endpoint));
    }
    Url::parse(endpoint).map_err(Into::into)
}
