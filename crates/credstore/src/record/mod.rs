//! Credential records — the data entity bundling key material,
//! certificates, and metadata for one identity.
//!
//! A record never owns its children; parent/child relationships live in
//! the [`TrustStore`](crate::store::TrustStore) arena as fqdn references,
//! so no reference cycles exist.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use x25519_dalek::PublicKey as X25519PublicKey;

use crate::crypto::keys::{self, IdentityKeyPair};
use crate::error::{Result, StoreError};

// ── Metadata ─────────────────────────────────────────────────────────────────

/// Metadata persisted alongside an identity's key material, and published
/// remotely as `metadata.json`.
///
/// All fields are optional named fields rather than an open-ended map;
/// unknown fields round-trip through `extra` unexamined.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CredentialMetadata {
    /// The identity's own fqdn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fqdn: Option<String>,

    /// The fqdn of the parent authority, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_fqdn: Option<String>,

    /// Human-readable name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Contact email.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Local IP recorded at registration time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_ip: Option<String>,

    /// Issuance level assigned by the provisioning service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Base64 Ed25519 verifying key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,

    /// Base64 X25519 public key used for sealed-box encryption.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_key: Option<String>,

    /// Forward-compatible extra fields, preserved verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

// ── Certificates ─────────────────────────────────────────────────────────────

/// The issued X.509 certificate plus optional CA/PKCS7 chain material.
///
/// Remote-fetched identities carry only the `x509` document; locally
/// enrolled identities carry all three.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CertificateBundle {
    /// PEM-encoded end-entity certificate.
    pub x509: String,
    /// PEM-encoded CA chain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca: Option<String>,
    /// PKCS7 bundle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pkcs7: Option<String>,
}

impl CertificateBundle {
    /// Bundle holding only an end-entity certificate.
    pub fn x509_only(x509: impl Into<String>) -> Self {
        Self {
            x509: x509.into(),
            ca: None,
            pkcs7: None,
        }
    }
}

// ── CredentialRecord ─────────────────────────────────────────────────────────

/// One identity's credentials: key material, certificate chain, and
/// metadata linking it to a parent authority.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialRecord {
    /// Globally unique identity name; primary key.
    pub fqdn: String,
    /// Parent authority fqdn; `None` for root identities.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_fqdn: Option<String>,
    /// Base64 Ed25519 verifying key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    /// Base64 seed; present only for identities this process owns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
    /// Issued certificate material, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificates: Option<CertificateBundle>,
    /// Persisted metadata.
    #[serde(default)]
    pub metadata: CredentialMetadata,
}

impl CredentialRecord {
    /// Build a record from its persisted parts. Public keys missing from
    /// the metadata are recovered from the private key when present.
    pub fn from_parts(
        fqdn: impl Into<String>,
        mut metadata: CredentialMetadata,
        private_key: Option<String>,
        certificates: Option<CertificateBundle>,
    ) -> Result<Self> {
        let fqdn = fqdn.into();
        if let Some(seed_b64) = &private_key {
            let pair = IdentityKeyPair::from_seed_b64(seed_b64)?;
            metadata
                .public_key
                .get_or_insert_with(|| pair.verifying_key_b64());
            metadata
                .encryption_key
                .get_or_insert_with(|| pair.encryption_public_b64());
        }
        Ok(Self {
            parent_fqdn: metadata.parent_fqdn.clone(),
            public_key: metadata.public_key.clone(),
            private_key,
            certificates,
            metadata,
            fqdn,
        })
    }

    /// Build a record for a remote identity known only by its published
    /// metadata and certificate.
    pub fn from_remote(
        fqdn: impl Into<String>,
        metadata: CredentialMetadata,
        x509: String,
    ) -> Result<Self> {
        Self::from_parts(fqdn, metadata, None, Some(CertificateBundle::x509_only(x509)))
    }

    /// Whether this process owns the identity's private key.
    pub fn has_private_key(&self) -> bool {
        self.private_key.is_some()
    }

    /// Reconstruct the full key pair from the stored seed.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::KeyUnavailable` when the record holds no
    /// private key.
    pub fn key_pair(&self) -> Result<IdentityKeyPair> {
        let seed_b64 = self
            .private_key
            .as_ref()
            .ok_or_else(|| StoreError::KeyUnavailable(self.fqdn.clone()))?;
        IdentityKeyPair::from_seed_b64(seed_b64)
    }

    /// The Ed25519 verifying key for signature checks.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidKey` when the record carries no public
    /// key at all.
    pub fn verifying_key(&self) -> Result<ed25519_dalek::VerifyingKey> {
        let key_b64 = self
            .public_key
            .as_ref()
            .or(self.metadata.public_key.as_ref())
            .ok_or_else(|| {
                StoreError::InvalidKey(format!("{} has no published public key", self.fqdn))
            })?;
        keys::verifying_key_from_b64(key_b64)
    }

    /// The X25519 public key others use to encrypt for this identity.
    pub fn encryption_public(&self) -> Result<X25519PublicKey> {
        if let Some(key_b64) = &self.metadata.encryption_key {
            return keys::encryption_public_from_b64(key_b64);
        }
        // Owned identities can always derive it from the seed.
        Ok(self.key_pair()?.encryption_public())
    }
}
