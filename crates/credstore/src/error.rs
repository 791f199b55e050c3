//! Error types for credstore.
//!
//! All errors are strongly typed and propagated without panicking.
//! Private key material is never included in error messages.

use crate::enroll::EnrollmentStage;

/// Store error types covering all operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("credential not found: {0}")]
    NotFound(String),

    #[error("credential already present: {0}")]
    Duplicate(String),

    #[error("signature mismatch: {0}")]
    SignatureMismatch(String),

    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("provisioning service rejected request ({code}): {message}")]
    RemoteService { code: u16, message: String },

    #[error("key material generation failed: {0}")]
    KeyMaterial(String),

    #[error("remote fetch incomplete: {0}")]
    PartialFetch(String),

    #[error("no local private key for: {0}")]
    KeyUnavailable(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("invalid fqdn: {0}")]
    InvalidFqdn(String),

    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("key derivation failed: {0}")]
    DerivationFailed(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("invalid file format: {0}")]
    InvalidFileFormat(String),

    #[error("http transport error: {0}")]
    Http(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("enrollment of {fqdn} failed at {stage}: {source}")]
    Enrollment {
        fqdn: String,
        stage: EnrollmentStage,
        #[source]
        source: Box<StoreError>,
    },
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, StoreError>;
