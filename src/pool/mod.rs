//! The Refreshing Client Pool: a cache of object-store clients keyed by
//! tenant, refreshed on an expiration margin and bounded by an
//! evict-earliest-expiration LRU policy.

mod error;

pub use self::error::{Error, ErrorKind, Result};

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

#[cfg(test)]
use chrono::DateTime;
use chrono::{Duration, Utc};
use rusoto_core::{HttpClient, Region};
use rusoto_credential::StaticProvider;
use rusoto_s3::S3Client;

use crate::config::EngineConfig;
use crate::credentials::CredentialsSource;
use crate::model::Credential;

#[derive(Clone)]
struct ClientEntry {
    client: S3Client,
    credential: Credential,
}

struct Inner {
    cache: HashMap<String, ClientEntry>,
}

/// Owns the object-store clients for every tenant seen so far. A single
/// mutex protects the cache; credential fetches happen while the lock is
/// held, which serializes first-time fetches for distinct tenants arriving
/// concurrently. That is a deliberate simplification carried over from the
/// source system, not an oversight.
pub struct Pool {
    config: EngineConfig,
    credentials_source: Arc<dyn CredentialsSource>,
    inner: Mutex<Inner>,
}

impl Pool {
    pub fn new(config: EngineConfig, credentials_source: Arc<dyn CredentialsSource>) -> Self {
        Pool {
            config,
            credentials_source,
            inner: Mutex::new(Inner {
                cache: HashMap::new(),
            }),
        }
    }

    /// Returns a cloned client handle for `tenant_id`, refreshing first if
    /// the cached entry is missing or within `refresh_margin_secs` of
    /// expiring.
    pub fn get_client(&self, tenant_id: &str) -> Result<S3Client> {
        let mut inner = self.lock();

        let needs_refresh = match inner.cache.get(tenant_id) {
            Some(entry) => {
                Utc::now() + Duration::seconds(self.config.refresh_margin_secs)
                    > entry.credential.expiration
            }
            None => true,
        };

        if needs_refresh {
            let entry = self.build_entry(tenant_id)?;
            inner.cache.insert(tenant_id.to_owned(), entry);
            self.evict(&mut inner, tenant_id);
        }

        Ok(inner
            .cache
            .get(tenant_id)
            .expect("entry inserted above")
            .client
            .clone())
    }

    /// Returns a proxy that fetches a fresh client (subject to the same
    /// refresh policy) on each call to `with_auto_refresh`.
    pub fn refreshing_handle<'p>(&'p self, tenant_id: &str) -> RefreshingHandle<'p> {
        RefreshingHandle {
            pool: self,
            tenant_id: tenant_id.to_owned(),
        }
    }

    fn build_entry(&self, tenant_id: &str) -> Result<ClientEntry> {
        let credential = self.credentials_source.fetch(tenant_id)?;
        let region = Region::from_str(&self.config.region)
            .map_err(|e| Error::client_build_failed(e.to_string()))?;
        let provider = StaticProvider::new(
            credential.access_key.clone(),
            credential.secret_key.clone(),
            credential.session_token.clone(),
            None,
        );
        let http_client =
            HttpClient::new().map_err(|e| Error::client_build_failed(e.to_string()))?;
        let client = S3Client::new_with(http_client, provider, region);
        Ok(ClientEntry { client, credential })
    }

    /// Drops expired entries unconditionally, then evicts entries with the
    /// earliest expiration (excluding `keep`) until the cache is within
    /// `max_cache_size`.
    fn evict(&self, inner: &mut Inner, keep: &str) {
        let now = Utc::now();
        inner
            .cache
            .retain(|tenant, entry| tenant == keep || entry.credential.expiration > now);

        while inner.cache.len() > self.config.max_cache_size {
            let earliest = inner
                .cache
                .iter()
                .filter(|(tenant, _)| tenant.as_str() != keep)
                .min_by_key(|(_, entry)| entry.credential.expiration)
                .map(|(tenant, _)| tenant.clone());

            match earliest {
                Some(tenant) => {
                    inner.cache.remove(&tenant);
                }
                None => break,
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    #[cfg(test)]
    fn cached_expiration(&self, tenant_id: &str) -> Option<DateTime<Utc>> {
        self.lock()
            .cache
            .get(tenant_id)
            .map(|e| e.credential.expiration)
    }

    #[cfg(test)]
    fn cache_len(&self) -> usize {
        self.lock().cache.len()
    }
}

/// A handle that re-fetches a (possibly cached, possibly refreshed) client
/// for one tenant on every invocation, so a caller retrying after a
/// credential failure transparently picks up a fresh client.
pub struct RefreshingHandle<'p> {
    pool: &'p Pool,
    tenant_id: String,
}

impl<'p> RefreshingHandle<'p> {
    pub fn with_auto_refresh<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&S3Client) -> Result<T>,
    {
        let client = self.pool.get_client(&self.tenant_id)?;
        op(&client)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::credentials::test_support::FixedCredentialsSource;

    fn pool_with(expires_in: Duration) -> (Pool, Arc<FixedCredentialsSource>) {
        let source = Arc::new(FixedCredentialsSource::new(expires_in));
        let config = EngineConfig::default();
        (Pool::new(config, source.clone()), source)
    }

    #[test]
    fn first_fetch_populates_cache() {
        let (pool, source) = pool_with(Duration::seconds(3600));
        pool.get_client("tenant-a").unwrap();
        assert_eq!(source.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert!(pool.cached_expiration("tenant-a").is_some());
    }

    #[test]
    fn reuses_client_within_refresh_margin() {
        let (pool, source) = pool_with(Duration::seconds(3600));
        pool.get_client("tenant-a").unwrap();
        pool.get_client("tenant-a").unwrap();
        assert_eq!(source.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn refreshes_when_within_margin_of_expiry() {
        let (pool, source) = pool_with(Duration::seconds(10));
        pool.get_client("tenant-a").unwrap();
        pool.get_client("tenant-a").unwrap();
        assert_eq!(source.calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[test]
    fn evicts_earliest_expiration_when_over_capacity() {
        let source = Arc::new(FixedCredentialsSource::new(Duration::seconds(3600)));
        let mut config = EngineConfig::default();
        config.max_cache_size = 2;
        let pool = Pool::new(config, source);

        pool.get_client("tenant-a").unwrap();
        pool.get_client("tenant-b").unwrap();
        pool.get_client("tenant-c").unwrap();

        assert_eq!(pool.cache_len(), 2);
        assert!(pool.cached_expiration("tenant-a").is_none());
    }

    #[test]
    fn refreshing_handle_executes_op_with_a_live_client() {
        let (pool, _source) = pool_with(Duration::seconds(3600));
        let handle = pool.refreshing_handle("tenant-a");
        let ran = handle.with_auto_refresh(|_client| Ok(42)).unwrap();
        assert_eq!(ran, 42);
    }
}
