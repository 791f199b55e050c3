//! Credstore — fqdn-keyed credential store with a parent/child trust
//! hierarchy.
//!
//! Provides a persisted trust forest of credential records, remote
//! resolution of unknown identities, a linear enrollment protocol
//! against a provisioning service, and fqdn-addressed encryption,
//! signing, and verification on top of it.

pub mod config;
pub mod crypto;
pub mod enroll;
pub mod error;
pub mod ops;
pub mod record;
pub mod remote;
pub mod store;

// Re-export primary types
pub use config::{StoreConfig, DEFAULT_API_ENDPOINT, DEFAULT_CERT_ENDPOINT};
pub use error::{Result, StoreError};
pub use record::{CertificateBundle, CredentialMetadata, CredentialRecord};
pub use store::{ListFilter, TrustStore};

// Re-export enrollment types
pub use enroll::{
    DefaultKeyMaterialProvider, EnrollmentProtocol, EnrollmentRequest, EnrollmentStage,
    KeyMaterialProvider,
};

// Re-export remote types
pub use remote::{
    AuthBearer, CredentialFetcher, ProvisioningClient, RegistrationResponse, UpdateRequest,
};

// Re-export operation types
pub use ops::{Envelope, SignatureToken, TrustOperations};

// Re-export key material
pub use crypto::IdentityKeyPair;
