//! Trust operations: encryption, decryption, signing, and signature
//! verification keyed by fqdn, built on `TrustStore` resolution.
//!
//! Verifying a signature trusts whichever single identity is named in
//! `signed_by`; establishing that the named signer chains to a
//! recognized root is a policy decision left to the caller.

use std::path::Path;

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::crypto::{encryption, signing};
use crate::error::{Result, StoreError};
use crate::record::CredentialRecord;
use crate::store::TrustStore;

// ── Envelope ─────────────────────────────────────────────────────────────────

/// The structured payload produced by [`TrustOperations::encrypt`], also
/// the export/import bundle format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Fqdn of the intended recipient. Required for decryption.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_for: Option<String>,
    /// Base64 ephemeral X25519 public key of the sender.
    pub ephemeral_key: String,
    /// Base64 AEAD nonce.
    pub nonce: String,
    /// Base64 ciphertext.
    pub payload: String,
    /// Fqdn of the signer, when the envelope is signed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_by: Option<String>,
    /// Base64 Ed25519 signature over [`signing_bytes`](Self::signing_bytes).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl Envelope {
    /// Canonical bytes covered by the envelope signature.
    pub fn signing_bytes(&self) -> Vec<u8> {
        format!(
            "{}|{}|{}|{}|{}",
            self.encrypted_for.as_deref().unwrap_or(""),
            self.ephemeral_key,
            self.nonce,
            self.payload,
            self.signed_by.as_deref().unwrap_or(""),
        )
        .into_bytes()
    }
}

/// A signature token binding data to a signer identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureToken {
    /// Base64 of the signed data.
    pub signed_data: String,
    /// Fqdn of the signer.
    pub signed_by: String,
    /// Base64 Ed25519 signature.
    pub signature: String,
}

// ── TrustOperations ──────────────────────────────────────────────────────────

/// Cryptographic operations over store-resolved credential records.
pub struct TrustOperations<'a> {
    store: &'a mut TrustStore,
}

impl<'a> TrustOperations<'a> {
    pub fn new(store: &'a mut TrustStore) -> Self {
        Self { store }
    }

    /// Encrypt `plaintext` for `target_fqdn`, resolving the target
    /// locally or remotely. With `signing_fqdn` set, the envelope also
    /// carries a signature computed with that identity's private key.
    pub async fn encrypt(
        &mut self,
        plaintext: &[u8],
        target_fqdn: &str,
        signing_fqdn: Option<&str>,
    ) -> Result<Envelope> {
        let target_key = {
            let target = self.store.find(target_fqdn).await?;
            target.encryption_public()?
        };
        let sealed = encryption::seal(&target_key, plaintext)?;

        let mut envelope = Envelope {
            encrypted_for: Some(target_fqdn.to_string()),
            ephemeral_key: B64.encode(sealed.ephemeral_public),
            nonce: B64.encode(&sealed.nonce),
            payload: B64.encode(&sealed.ciphertext),
            signed_by: None,
            signature: None,
        };

        if let Some(signer) = signing_fqdn {
            let pair = {
                let record = self.store.find(signer).await?;
                record.key_pair()?
            };
            envelope.signed_by = Some(signer.to_string());
            envelope.signature = Some(signing::sign_to_base64(
                pair.signing_key(),
                &envelope.signing_bytes(),
            ));
        }

        Ok(envelope)
    }

    /// Decrypt an envelope. The recipient named in `encrypted_for` must
    /// already hold a local private key; no network I/O happens here.
    pub fn decrypt(&self, envelope: &Envelope) -> Result<Vec<u8>> {
        let target = envelope
            .encrypted_for
            .as_deref()
            .ok_or_else(|| StoreError::MalformedEnvelope("missing encrypted_for".into()))?;

        let record = self.store.resolve(target)?;
        let pair = record.key_pair()?;

        let ephemeral: [u8; 32] = decode_b64(&envelope.ephemeral_key)?
            .try_into()
            .map_err(|_| StoreError::MalformedEnvelope("ephemeral key must be 32 bytes".into()))?;
        let nonce = decode_b64(&envelope.nonce)?;
        let ciphertext = decode_b64(&envelope.payload)?;

        encryption::open(pair.encryption_secret(), &ephemeral, &nonce, &ciphertext)
    }

    /// Sign data as `fqdn`. Requires the identity's local private key.
    pub fn sign(&self, data: &[u8], fqdn: &str) -> Result<SignatureToken> {
        let record = self.store.resolve(fqdn)?;
        let pair = record.key_pair()?;
        Ok(SignatureToken {
            signed_data: B64.encode(data),
            signed_by: fqdn.to_string(),
            signature: signing::sign_to_base64(pair.signing_key(), data),
        })
    }

    /// Verify a signature token against the public key of the identity
    /// named in `signed_by`, resolving it locally or remotely.
    ///
    /// A legitimately-bad signature yields `Ok(false)`; only resolution
    /// failures are errors.
    pub async fn check_signature(&mut self, token: &SignatureToken) -> Result<bool> {
        let verifying_key = {
            let signer = self.store.find(&token.signed_by).await?;
            signer.verifying_key()?
        };
        let data = match B64.decode(&token.signed_data) {
            Ok(data) => data,
            Err(_) => return Ok(false),
        };
        Ok(signing::verify_from_base64(&verifying_key, &data, &token.signature).is_ok())
    }

    // ── Export / import ──────────────────────────────────────────────────────

    /// Export an identity's full record, encrypted for `target_fqdn` and
    /// optionally signed, to a bundle file.
    pub async fn export_credentials(
        &mut self,
        fqdn: &str,
        target_fqdn: &str,
        signing_fqdn: Option<&str>,
        path: &Path,
    ) -> Result<()> {
        let record_json = {
            let record = self.store.resolve(fqdn)?;
            serde_json::to_vec(record).map_err(|e| StoreError::SerializationError(e.to_string()))?
        };
        let envelope = self.encrypt(&record_json, target_fqdn, signing_fqdn).await?;
        let body = serde_json::to_string_pretty(&envelope)
            .map_err(|e| StoreError::SerializationError(e.to_string()))?;
        std::fs::write(path, body)?;
        Ok(())
    }

    /// Import a bundle written by [`export_credentials`](Self::export_credentials).
    ///
    /// When the bundle claims a signer, the signature is verified against
    /// that identity before the payload is trusted; a mismatch rejects
    /// the import. The decrypted record is persisted and added to the
    /// store.
    pub async fn import_credentials(&mut self, path: &Path) -> Result<CredentialRecord> {
        let bytes = std::fs::read(path)?;
        let envelope: Envelope = serde_json::from_slice(&bytes).map_err(|e| {
            StoreError::InvalidFileFormat(format!("failed to parse bundle {}: {e}", path.display()))
        })?;

        if let Some(signer) = envelope.signed_by.clone() {
            let signature = envelope.signature.clone().ok_or_else(|| {
                StoreError::MalformedEnvelope("signed_by present without signature".into())
            })?;
            let verifying_key = {
                let record = self.store.find(&signer).await?;
                record.verifying_key()?
            };
            if signing::verify_from_base64(&verifying_key, &envelope.signing_bytes(), &signature)
                .is_err()
            {
                return Err(StoreError::SignatureMismatch(format!(
                    "import bundle claims signer {signer}"
                )));
            }
        }

        let plaintext = self.decrypt(&envelope)?;
        let record: CredentialRecord = serde_json::from_slice(&plaintext).map_err(|e| {
            StoreError::InvalidFileFormat(format!("bundle payload is not a record: {e}"))
        })?;

        // Insert first: a duplicate fqdn must not overwrite the live
        // identity's persisted directory.
        self.store.add(record.clone())?;
        self.store.directory().save_record(&record)?;
        Ok(record)
    }
}

fn decode_b64(value: &str) -> Result<Vec<u8>> {
    B64.decode(value)
        .map_err(|e| StoreError::MalformedEnvelope(format!("invalid base64 field: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::crypto::IdentityKeyPair;
    use crate::record::CredentialMetadata;

    const DEAD_ENDPOINT: &str = "http://127.0.0.1:9";

    fn test_store() -> (tempfile::TempDir, TrustStore) {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::new(dir.path()).with_cert_endpoint(DEAD_ENDPOINT);
        let store = TrustStore::open(&config).unwrap();
        (dir, store)
    }

    fn owned_record(fqdn: &str) -> CredentialRecord {
        let pair = IdentityKeyPair::generate().unwrap();
        let metadata = CredentialMetadata {
            fqdn: Some(fqdn.to_string()),
            ..Default::default()
        };
        CredentialRecord::from_parts(fqdn, metadata, Some(pair.seed_b64()), None).unwrap()
    }

    /// A record whose public keys are known but whose private key is not
    /// held locally.
    fn certificate_only_record(fqdn: &str) -> CredentialRecord {
        let mut record = owned_record(fqdn);
        record.private_key = None;
        record
    }

    #[tokio::test]
    async fn test_encrypt_decrypt_roundtrip() {
        let (_tmp, mut store) = test_store();
        store.add(owned_record("target.example")).unwrap();
        let mut ops = TrustOperations::new(&mut store);

        let plaintext = b"attack at dawn";
        let envelope = ops.encrypt(plaintext, "target.example", None).await.unwrap();
        assert_eq!(envelope.encrypted_for.as_deref(), Some("target.example"));
        assert!(envelope.signed_by.is_none());

        let decrypted = ops.decrypt(&envelope).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[tokio::test]
    async fn test_encrypt_with_signature() {
        let (_tmp, mut store) = test_store();
        store.add(owned_record("target.example")).unwrap();
        store.add(owned_record("signer.example")).unwrap();
        let mut ops = TrustOperations::new(&mut store);

        let envelope = ops
            .encrypt(b"payload", "target.example", Some("signer.example"))
            .await
            .unwrap();
        assert_eq!(envelope.signed_by.as_deref(), Some("signer.example"));
        assert!(envelope.signature.is_some());
    }

    #[tokio::test]
    async fn test_decrypt_requires_local_private_key() {
        let (_tmp, mut store) = test_store();
        store.add(certificate_only_record("target.example")).unwrap();
        let mut ops = TrustOperations::new(&mut store);

        let envelope = ops.encrypt(b"secret", "target.example", None).await.unwrap();
        let result = ops.decrypt(&envelope);
        assert!(matches!(result, Err(StoreError::KeyUnavailable(_))));
    }

    #[tokio::test]
    async fn test_decrypt_rejects_missing_recipient() {
        let (_tmp, mut store) = test_store();
        store.add(owned_record("target.example")).unwrap();
        let mut ops = TrustOperations::new(&mut store);

        let mut envelope = ops.encrypt(b"secret", "target.example", None).await.unwrap();
        envelope.encrypted_for = None;
        assert!(matches!(
            ops.decrypt(&envelope),
            Err(StoreError::MalformedEnvelope(_))
        ));
    }

    #[tokio::test]
    async fn test_sign_and_check_signature() {
        let (_tmp, mut store) = test_store();
        store.add(owned_record("signer.example")).unwrap();
        let mut ops = TrustOperations::new(&mut store);

        let token = ops.sign(b"release v1.0", "signer.example").unwrap();
        assert!(ops.check_signature(&token).await.unwrap());
    }

    #[tokio::test]
    async fn test_check_signature_tampered_data_is_false_not_error() {
        let (_tmp, mut store) = test_store();
        store.add(owned_record("signer.example")).unwrap();
        let mut ops = TrustOperations::new(&mut store);

        let mut token = ops.sign(b"release v1.0", "signer.example").unwrap();
        let mut data = B64.decode(&token.signed_data).unwrap();
        data[0] ^= 0x01;
        token.signed_data = B64.encode(&data);

        assert!(!ops.check_signature(&token).await.unwrap());
    }

    #[tokio::test]
    async fn test_sign_requires_private_key() {
        let (_tmp, mut store) = test_store();
        store.add(certificate_only_record("signer.example")).unwrap();
        let ops = TrustOperations::new(&mut store);

        assert!(matches!(
            ops.sign(b"data", "signer.example"),
            Err(StoreError::KeyUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_export_import_roundtrip() {
        let (tmp, mut store) = test_store();
        store.add(owned_record("subject.example")).unwrap();
        store.add(owned_record("vaultkeeper.example")).unwrap();
        store.add(owned_record("signer.example")).unwrap();

        let bundle_path = tmp.path().join("subject.bundle.json");
        let original_key = store.resolve("subject.example").unwrap().private_key.clone();

        {
            let mut ops = TrustOperations::new(&mut store);
            ops.export_credentials(
                "subject.example",
                "vaultkeeper.example",
                Some("signer.example"),
                &bundle_path,
            )
            .await
            .unwrap();
        }

        store.shred("subject.example").unwrap();
        assert!(store.resolve("subject.example").is_err());

        let mut ops = TrustOperations::new(&mut store);
        let imported = ops.import_credentials(&bundle_path).await.unwrap();
        assert_eq!(imported.fqdn, "subject.example");
        assert_eq!(imported.private_key, original_key);
        assert!(store.resolve("subject.example").is_ok());
    }

    #[tokio::test]
    async fn test_import_duplicate_leaves_disk_untouched() {
        let (tmp, mut store) = test_store();
        store.add(owned_record("subject.example")).unwrap();
        store.add(owned_record("vaultkeeper.example")).unwrap();

        let bundle_path = tmp.path().join("subject.bundle.json");
        {
            let mut ops = TrustOperations::new(&mut store);
            ops.export_credentials("subject.example", "vaultkeeper.example", None, &bundle_path)
                .await
                .unwrap();
        }

        // The fqdn is re-issued with a fresh key; the exported bundle is
        // now stale.
        store.shred("subject.example").unwrap();
        let live = owned_record("subject.example");
        let live_key = live.private_key.clone();
        store.directory().save_record(&live).unwrap();
        store.add(live).unwrap();

        let mut ops = TrustOperations::new(&mut store);
        let result = ops.import_credentials(&bundle_path).await;
        assert!(matches!(result, Err(StoreError::Duplicate(_))));

        // Disk still holds the live identity, not the stale bundle.
        let on_disk = store.directory().load_record("subject.example").unwrap();
        assert_eq!(on_disk.private_key, live_key);
        assert_eq!(
            store.resolve("subject.example").unwrap().private_key,
            live_key
        );
    }

    #[tokio::test]
    async fn test_import_rejects_tampered_bundle() {
        let (tmp, mut store) = test_store();
        store.add(owned_record("subject.example")).unwrap();
        store.add(owned_record("vaultkeeper.example")).unwrap();
        store.add(owned_record("signer.example")).unwrap();

        let bundle_path = tmp.path().join("subject.bundle.json");
        {
            let mut ops = TrustOperations::new(&mut store);
            ops.export_credentials(
                "subject.example",
                "vaultkeeper.example",
                Some("signer.example"),
                &bundle_path,
            )
            .await
            .unwrap();
        }
        store.shred("subject.example").unwrap();

        // Flip the payload: the signature check must fail closed.
        let mut envelope: Envelope =
            serde_json::from_slice(&std::fs::read(&bundle_path).unwrap()).unwrap();
        let mut payload = B64.decode(&envelope.payload).unwrap();
        payload[0] ^= 0x01;
        envelope.payload = B64.encode(&payload);
        std::fs::write(&bundle_path, serde_json::to_vec(&envelope).unwrap()).unwrap();

        let mut ops = TrustOperations::new(&mut store);
        let result = ops.import_credentials(&bundle_path).await;
        assert!(matches!(result, Err(StoreError::SignatureMismatch(_))));
        assert!(store.resolve("subject.example").is_err());
    }
}
