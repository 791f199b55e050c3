//! The enrollment protocol: drives a bare registration intent to a
//! fully certified, persisted credential record.
//!
//! A linear state machine with no backward transitions and no automatic
//! retry. Any stage failure aborts the whole run and is reported with
//! the fqdn and the failing stage attached, so an operator can re-invoke
//! the enrollment from the start.

use std::fmt;

use log::info;
use serde_json::json;

use crate::crypto::{signing, IdentityKeyPair};
use crate::error::{Result, StoreError};
use crate::record::{CertificateBundle, CredentialMetadata, CredentialRecord};
use crate::remote::{
    AuthBearer, CompletionRequest, ProvisioningClient, RegistrationRequest, RegistrationResponse,
    UpdateRequest,
};
use crate::store::disk::DirectoryServices;
use crate::store::TrustStore;

// ── Stages ───────────────────────────────────────────────────────────────────

/// The stage of the enrollment pipeline in which a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollmentStage {
    /// Creating the local persistence directory.
    PrepareDirectory,
    /// Writing initial metadata and generating key material and a CSR.
    GenerateCsr,
    /// Submitting the CSR to the provisioning service.
    CompleteRegistration,
    /// Persisting the issued certificate material.
    PersistCertificates,
    /// Fetching and persisting authoritative metadata.
    PersistMetadata,
    /// Reconstructing the final record and inserting it into the store.
    Finalize,
}

impl fmt::Display for EnrollmentStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PrepareDirectory => "prepare-directory",
            Self::GenerateCsr => "generate-csr",
            Self::CompleteRegistration => "complete-registration",
            Self::PersistCertificates => "persist-certificates",
            Self::PersistMetadata => "persist-metadata",
            Self::Finalize => "finalize",
        };
        f.write_str(name)
    }
}

/// A bare registration intent.
#[derive(Debug, Clone)]
pub struct EnrollmentRequest {
    /// The fqdn to enroll.
    pub fqdn: String,
    /// Parent authority whose local credentials authenticate the run;
    /// `None` uses the bootstrap identity.
    pub parent_fqdn: Option<String>,
    /// Caller-supplied metadata (name, email, local IP, ...).
    pub metadata: CredentialMetadata,
}

// ── Key material ─────────────────────────────────────────────────────────────

/// Opaque producer of private keys and certificate signing requests.
///
/// The core only calls it and consumes its output or failure; failures
/// surface as `StoreError::KeyMaterial`.
pub trait KeyMaterialProvider {
    /// Generate a fresh private key.
    fn generate_key(&self) -> Result<IdentityKeyPair>;

    /// Build a CSR binding `fqdn` to the key's public material.
    fn generate_csr(&self, fqdn: &str, key: &IdentityKeyPair) -> Result<String>;
}

/// Default provider: Ed25519 key generation and a self-signed JSON CSR
/// carrying the fqdn and both public keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultKeyMaterialProvider;

impl KeyMaterialProvider for DefaultKeyMaterialProvider {
    fn generate_key(&self) -> Result<IdentityKeyPair> {
        IdentityKeyPair::generate().map_err(|e| StoreError::KeyMaterial(e.to_string()))
    }

    fn generate_csr(&self, fqdn: &str, key: &IdentityKeyPair) -> Result<String> {
        let body = json!({
            "fqdn": fqdn,
            "public_key": key.verifying_key_b64(),
            "encryption_key": key.encryption_public_b64(),
        });
        let body_bytes =
            serde_json::to_vec(&body).map_err(|e| StoreError::KeyMaterial(e.to_string()))?;
        let signature = signing::sign_to_base64(key.signing_key(), &body_bytes);

        let csr = json!({
            "request": body,
            "signature": signature,
        });
        serde_json::to_string(&csr).map_err(|e| StoreError::KeyMaterial(e.to_string()))
    }
}

// ── EnrollmentProtocol ───────────────────────────────────────────────────────

/// Orchestrates the stages between a registration intent and a certified
/// record in the store.
pub struct EnrollmentProtocol<'a, P: KeyMaterialProvider> {
    client: &'a ProvisioningClient,
    dirs: DirectoryServices,
    provider: &'a P,
    bootstrap: Option<AuthBearer>,
}

impl<'a, P: KeyMaterialProvider> EnrollmentProtocol<'a, P> {
    pub fn new(
        client: &'a ProvisioningClient,
        dirs: DirectoryServices,
        provider: &'a P,
        bootstrap: Option<AuthBearer>,
    ) -> Self {
        Self {
            client,
            dirs,
            provider,
            bootstrap,
        }
    }

    /// Run the full pipeline for one registration intent.
    ///
    /// On success the finished record has been persisted, inserted into
    /// `store`, and is returned. On failure the error names the fqdn and
    /// the failing stage; partially-written disk state is left for
    /// operator mitigation.
    pub async fn enroll(
        &self,
        store: &mut TrustStore,
        request: EnrollmentRequest,
    ) -> Result<CredentialRecord> {
        let fqdn = request.fqdn.clone();
        info!("enrolling {fqdn}");

        // Stage 1: local persistence directory.
        self.dirs
            .create_entity_dir(&fqdn)
            .map_err(|e| stage_error(&fqdn, EnrollmentStage::PrepareDirectory, e))?;

        // Stage 2: initial metadata, key material, CSR.
        let (csr, metadata) = self
            .prepare_key_material(&request)
            .map_err(|e| stage_error(&fqdn, EnrollmentStage::GenerateCsr, e))?;

        // Stage 3: certificate issuance, authenticated by the parent or
        // the bootstrap identity. Remote rejections propagate verbatim.
        let auth = self
            .auth_for(store, request.parent_fqdn.as_deref())
            .map_err(|e| stage_error(&fqdn, EnrollmentStage::CompleteRegistration, e))?;
        info!("requesting certificates for {fqdn}");
        let issued = self
            .client
            .complete_registration(
                &CompletionRequest {
                    csr,
                    fqdn: fqdn.clone(),
                },
                &auth,
            )
            .await
            .map_err(|e| stage_error(&fqdn, EnrollmentStage::CompleteRegistration, e))?;
        info!("received certificates for {fqdn}");

        // Stage 4: persist all certificate material as one unit.
        let bundle = CertificateBundle {
            x509: issued.x509,
            ca: Some(issued.ca),
            pkcs7: Some(issued.pkcs7),
        };
        self.dirs
            .write_certificates(&fqdn, &bundle)
            .map_err(|e| stage_error(&fqdn, EnrollmentStage::PersistCertificates, e))?;

        // Stage 5: authoritative metadata.
        let authoritative = self
            .client
            .get_metadata(&fqdn, &auth)
            .await
            .map_err(|e| stage_error(&fqdn, EnrollmentStage::PersistMetadata, e))?;
        self.dirs
            .write_metadata(&fqdn, &merge_metadata(authoritative, &metadata))
            .map_err(|e| stage_error(&fqdn, EnrollmentStage::PersistMetadata, e))?;

        // Stage 6: reconstruct from persisted state and insert.
        let record = self
            .dirs
            .load_record(&fqdn)
            .and_then(|record| {
                store.add(record.clone())?;
                Ok(record)
            })
            .map_err(|e| stage_error(&fqdn, EnrollmentStage::Finalize, e))?;

        info!("enrollment of {fqdn} complete");
        Ok(record)
    }

    /// CreateEntity: ask the authority to mint a brand-new entity, then
    /// persist the returned metadata locally.
    pub async fn create_entity(
        &self,
        metadata: &CredentialMetadata,
    ) -> Result<RegistrationResponse> {
        let auth = self.bootstrap_auth()?;
        let response = self
            .client
            .create_entity(&RegistrationRequest::from_metadata(metadata), &auth)
            .await?;

        self.dirs.create_entity_dir(&response.fqdn)?;
        let mut persisted = metadata.clone();
        persisted.fqdn = Some(response.fqdn.clone());
        persisted.parent_fqdn = response
            .parent_fqdn
            .clone()
            .or_else(|| metadata.parent_fqdn.clone());
        persisted.level = response.level.clone().or_else(|| metadata.level.clone());
        self.dirs.write_metadata(&response.fqdn, &persisted)?;

        info!("created entity {}", response.fqdn);
        Ok(response)
    }

    /// RegisterEntity: announce a registration intent, authenticated by
    /// the parent named in the metadata or by the bootstrap identity.
    pub async fn register_entity(
        &self,
        store: &TrustStore,
        metadata: &CredentialMetadata,
    ) -> Result<RegistrationResponse> {
        let auth = self.auth_for(store, metadata.parent_fqdn.as_deref())?;
        self.client
            .register_entity(&RegistrationRequest::from_metadata(metadata), &auth)
            .await
    }

    /// UpdateEntity: push changed name/email to the authority,
    /// authenticated with the entity's own credentials, then persist the
    /// returned document and refresh the in-memory record.
    pub async fn update_metadata(
        &self,
        store: &mut TrustStore,
        fqdn: &str,
        update: UpdateRequest,
    ) -> Result<CredentialMetadata> {
        let auth = self.auth_for(store, Some(fqdn))?;
        let authoritative = self.client.update_entity(fqdn, &update, &auth).await?;

        let local = self.dirs.read_metadata(fqdn)?;
        let merged = merge_metadata(authoritative, &local);
        self.dirs.write_metadata(fqdn, &merged)?;
        store.update_metadata(fqdn, merged.clone())?;

        info!("updated metadata for {fqdn}");
        Ok(merged)
    }

    // ── Internals ────────────────────────────────────────────────────────────

    /// Write initial metadata, generate the key pair and CSR, and persist
    /// the private key. Returns the CSR and the metadata as written.
    fn prepare_key_material(
        &self,
        request: &EnrollmentRequest,
    ) -> Result<(String, CredentialMetadata)> {
        let mut metadata = request.metadata.clone();
        metadata.fqdn = Some(request.fqdn.clone());
        metadata.parent_fqdn = request
            .parent_fqdn
            .clone()
            .or_else(|| metadata.parent_fqdn.clone());

        let key = self.provider.generate_key()?;
        let csr = self.provider.generate_csr(&request.fqdn, &key)?;

        metadata.public_key = Some(key.verifying_key_b64());
        metadata.encryption_key = Some(key.encryption_public_b64());

        self.dirs.write_private_key(&request.fqdn, &key.seed_b64())?;
        self.dirs.write_metadata(&request.fqdn, &metadata)?;

        Ok((csr, metadata))
    }

    /// Resolve the authenticating bearer pair: the parent's local
    /// credentials when a parent is named, otherwise the bootstrap
    /// identity.
    fn auth_for(&self, store: &TrustStore, parent_fqdn: Option<&str>) -> Result<AuthBearer> {
        match parent_fqdn {
            Some(parent) => {
                let record = store.resolve(parent)?;
                let private_key = record
                    .private_key
                    .clone()
                    .ok_or_else(|| StoreError::KeyUnavailable(parent.to_string()))?;
                let certificate = record
                    .certificates
                    .as_ref()
                    .map(|bundle| bundle.x509.clone())
                    .ok_or_else(|| {
                        StoreError::KeyUnavailable(format!("{parent} has no certificate"))
                    })?;
                Ok(AuthBearer::new(private_key, certificate))
            }
            None => self.bootstrap_auth(),
        }
    }

    fn bootstrap_auth(&self) -> Result<AuthBearer> {
        self.bootstrap
            .clone()
            .ok_or_else(|| StoreError::KeyUnavailable("bootstrap identity not configured".into()))
    }
}

/// Prefer the authority's view of the metadata, filling identity fields
/// it omitted from what was written at CSR time.
fn merge_metadata(mut remote: CredentialMetadata, local: &CredentialMetadata) -> CredentialMetadata {
    remote.fqdn = remote.fqdn.or_else(|| local.fqdn.clone());
    remote.parent_fqdn = remote.parent_fqdn.or_else(|| local.parent_fqdn.clone());
    remote.public_key = remote.public_key.or_else(|| local.public_key.clone());
    remote.encryption_key = remote
        .encryption_key
        .or_else(|| local.encryption_key.clone());
    remote.name = remote.name.or_else(|| local.name.clone());
    remote.email = remote.email.or_else(|| local.email.clone());
    remote.local_ip = remote.local_ip.or_else(|| local.local_ip.clone());
    remote
}

fn stage_error(fqdn: &str, stage: EnrollmentStage, source: StoreError) -> StoreError {
    StoreError::Enrollment {
        fqdn: fqdn.to_string(),
        stage,
        source: Box::new(source),
    }
}
