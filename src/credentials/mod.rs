//! `CredentialsSource`: the pluggable boundary through which the core
//! obtains short-lived object-store credentials for a tenant. Concrete
//! implementations (talking to the clinical backend's auth/JWT layer) are
//! out of core scope; the core only consumes this trait.

mod error;

pub use self::error::{Error, ErrorKind, Result};

use crate::model::Credential;

pub trait CredentialsSource: Send + Sync {
    fn fetch(&self, tenant_id: &str) -> Result<Credential>;
}

/// A `CredentialsSource` that always fails. Used as the engine's default
/// before `Initialize` wires up a real implementation, and in tests.
pub struct UnconfiguredCredentialsSource;

impl CredentialsSource for UnconfiguredCredentialsSource {
    fn fetch(&self, _tenant_id: &str) -> Result<Credential> {
        Err(Error::not_configured())
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use chrono::{Duration, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Hands back a fixed credential with a configurable expiration,
    /// counting how many times `fetch` was called.
    pub struct FixedCredentialsSource {
        pub expires_in: Duration,
        pub calls: AtomicUsize,
    }

    impl FixedCredentialsSource {
        pub fn new(expires_in: Duration) -> Self {
            Self {
                expires_in,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl CredentialsSource for FixedCredentialsSource {
        fn fetch(&self, tenant_id: &str) -> Result<Credential> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Credential {
                access_key: format!("AKIA-{}", tenant_id),
                secret_key: "secret".into(),
                session_token: Some("token".into()),
                expiration: Utc::now() + self.expires_in,
            })
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn unconfigured_source_fails() {
        let source = UnconfiguredCredentialsSource;
        assert!(source.fetch("tenant").is_err());
    }
}
