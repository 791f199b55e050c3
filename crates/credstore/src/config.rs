//! Store configuration: local directories, remote endpoints, and the
//! bootstrap authentication pair.
//!
//! One `StoreConfig` is built at process entry and threaded through to
//! every collaborator; there is no process-wide global.

use std::path::{Path, PathBuf};

use crate::remote::AuthBearer;

/// Default public endpoint serving `{fqdn}/metadata.json` and `{fqdn}/x509`.
pub const DEFAULT_CERT_ENDPOINT: &str = "https://certs.credstore.net";

/// Default provisioning API base URL.
pub const DEFAULT_API_ENDPOINT: &str = "https://api.credstore.net";

/// Configuration for a [`TrustStore`](crate::store::TrustStore) and the
/// enrollment collaborators built around it.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Root directory of the local persisted store; one sub-directory
    /// per fqdn.
    pub base_dir: PathBuf,
    /// Base URL for public credential documents.
    pub cert_endpoint: String,
    /// Base URL for the provisioning API.
    pub api_endpoint: String,
    /// Default bootstrap identity used when an enrollment has no parent
    /// with local credentials.
    pub bootstrap: Option<AuthBearer>,
}

impl StoreConfig {
    /// Create a configuration rooted at `base_dir` with default endpoints.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            cert_endpoint: DEFAULT_CERT_ENDPOINT.to_string(),
            api_endpoint: DEFAULT_API_ENDPOINT.to_string(),
            bootstrap: None,
        }
    }

    /// Override the public credential endpoint.
    #[must_use]
    pub fn with_cert_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.cert_endpoint = endpoint.into();
        self
    }

    /// Override the provisioning API endpoint.
    #[must_use]
    pub fn with_api_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.api_endpoint = endpoint.into();
        self
    }

    /// Set the bootstrap authentication pair.
    #[must_use]
    pub fn with_bootstrap(mut self, bootstrap: AuthBearer) -> Self {
        self.bootstrap = Some(bootstrap);
        self
    }

    /// The per-fqdn directory under the store root.
    pub fn entity_dir(&self, fqdn: &str) -> PathBuf {
        self.base_dir.join(fqdn)
    }

    /// Borrow the store root.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}
