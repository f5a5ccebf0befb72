//! Secret store abstraction used by the fetch engine.

use async_trait::async_trait;

use super::types::ApiKey;
use crate::errors::{AuthError, FetchError};

/// Read access to a remote secret store, bound to one endpoint and credential.
///
/// A store handle lives for a single mount call.
///
/// # Security Considerations
///
/// - Implementations MUST NOT log secret values
/// - Network communication SHOULD use TLS
#[async_trait]
pub trait SecretStore: Send + Sync + std::fmt::Debug {
    /// Fetch the raw value of the named object.
    ///
    /// # Errors
    ///
    /// - [`FetchError::NotFound`] if the object does not exist or has no value
    /// - [`FetchError::Unauthorized`] if the credential is rejected
    /// - [`FetchError::Transport`] for network and protocol failures
    async fn fetch_by_name(&self, name: &str) -> Result<Vec<u8>, FetchError>;
}

/// Builds a [`SecretStore`] for each mount call.
///
/// Construction must fail fast, without network I/O, when the endpoint or the
/// credential is missing.
pub trait SecretStoreConnector: Send + Sync + std::fmt::Debug {
    type Store: SecretStore;

    fn connect(&self, endpoint: &str, api_key: &ApiKey) -> Result<Self::Store, AuthError>;
}
