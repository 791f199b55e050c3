//! The trust store: process-wide authority for identity resolution and
//! the structural integrity of the trust forest.
//!
//! Records live in an arena keyed by fqdn; parent/child relationships
//! are fqdn references maintained by the store, so no record owns
//! another and no reference cycles exist. One `TrustStore` instance is
//! constructed at process entry and passed by reference to every
//! collaborator.

pub mod disk;

use std::collections::{BTreeSet, HashMap, HashSet};

use log::{debug, info};

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::record::{CredentialMetadata, CredentialRecord};
use crate::remote::CredentialFetcher;
use disk::DirectoryServices;

// ── List filtering ───────────────────────────────────────────────────────────

/// Options for [`TrustStore::list`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ListFilter {
    /// When set, keep only records that do (`true`) or do not (`false`)
    /// hold a local private key.
    pub has_private_key: Option<bool>,
}

// ── TrustStore ───────────────────────────────────────────────────────────────

/// In-memory forest of [`CredentialRecord`]s keyed by fqdn, persisted to
/// local disk.
pub struct TrustStore {
    dirs: DirectoryServices,
    fetcher: CredentialFetcher,
    /// Arena: every record reachable from the forest, keyed by fqdn.
    records: HashMap<String, CredentialRecord>,
    /// Child fqdns per parent fqdn, in attachment order.
    children: HashMap<String, Vec<String>>,
    /// Fqdns with no attached parent (true roots and orphans awaiting
    /// late adoption).
    roots: BTreeSet<String>,
}

impl TrustStore {
    /// Construct an empty store over the configured directory and
    /// endpoints. Does not touch disk contents; call [`load`](Self::load)
    /// to rehydrate persisted identities.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        Ok(Self {
            dirs: DirectoryServices::new(&config.base_dir)?,
            fetcher: CredentialFetcher::new(config.cert_endpoint.clone()),
            records: HashMap::new(),
            children: HashMap::new(),
            roots: BTreeSet::new(),
        })
    }

    /// Borrow the directory services this store persists through.
    pub fn directory(&self) -> &DirectoryServices {
        &self.dirs
    }

    /// Scan the persisted store and insert every found identity.
    ///
    /// Runs once at process start. Calling it again with records already
    /// present fails loudly with `Duplicate`.
    pub fn load(&mut self) -> Result<()> {
        let fqdns = self.dirs.scan()?;
        for fqdn in &fqdns {
            let record = self.dirs.load_record(fqdn)?;
            self.add(record)?;
        }
        info!("loaded {} identities from {}", fqdns.len(), self.dirs.base_dir().display());
        Ok(())
    }

    /// Insert a record into the forest.
    ///
    /// Attaches under its parent when the parent is already present,
    /// otherwise at the forest root. Afterwards runs late adoption:
    /// any root whose `parent_fqdn` names the new record is re-parented
    /// under it.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Duplicate` when the fqdn is already present.
    pub fn add(&mut self, record: CredentialRecord) -> Result<()> {
        let fqdn = record.fqdn.clone();
        disk::validate_fqdn(&fqdn)?;
        if self.records.contains_key(&fqdn) {
            return Err(StoreError::Duplicate(fqdn));
        }

        let attached_parent = record
            .parent_fqdn
            .as_ref()
            .filter(|parent| self.records.contains_key(*parent))
            .cloned();

        self.records.insert(fqdn.clone(), record);
        match attached_parent {
            Some(parent) => {
                debug!("attached {fqdn} under {parent}");
                self.children.entry(parent).or_default().push(fqdn.clone());
            }
            None => {
                self.roots.insert(fqdn.clone());
            }
        }

        // Late adoption: a child may have been loaded or fetched before
        // its parent.
        let adopted: Vec<String> = self
            .roots
            .iter()
            .filter(|root| *root != &fqdn)
            .filter(|root| {
                self.records
                    .get(*root)
                    .and_then(|r| r.parent_fqdn.as_deref())
                    == Some(fqdn.as_str())
            })
            .cloned()
            .collect();
        for child in adopted {
            self.roots.remove(&child);
            self.children
                .entry(fqdn.clone())
                .or_default()
                .push(child.clone());
            debug!("late adoption: {child} re-parented under {fqdn}");
        }

        Ok(())
    }

    /// Return the record with the given fqdn, from memory only.
    ///
    /// Never triggers network I/O.
    pub fn resolve(&self, fqdn: &str) -> Result<&CredentialRecord> {
        self.records
            .get(fqdn)
            .ok_or_else(|| StoreError::NotFound(fqdn.to_string()))
    }

    /// Return the local record, or fetch it from the remote endpoint,
    /// persist it, insert it, and return it.
    ///
    /// The remote fetch retrieves the metadata document and the
    /// certificate concurrently; if either sub-fetch fails the whole
    /// operation fails and nothing is added or persisted.
    pub async fn find(&mut self, fqdn: &str) -> Result<&CredentialRecord> {
        if !self.records.contains_key(fqdn) {
            debug!("{fqdn} absent locally, fetching remote credentials");
            let remote = self.fetcher.fetch(fqdn).await?;
            let record = CredentialRecord::from_remote(fqdn, remote.metadata, remote.x509)?;
            self.dirs.save_record(&record)?;
            self.add(record)?;
        }
        self.resolve(fqdn)
    }

    /// Return all records matching the fqdn exactly.
    ///
    /// The arena holds at most one record per fqdn, but the result is a
    /// collection to support non-unique lookups during transition states.
    pub fn search(&self, fqdn: &str) -> Vec<&CredentialRecord> {
        self.records.get(fqdn).into_iter().collect()
    }

    /// Return every record whose fqdn contains `pattern`, optionally
    /// filtered by private-key presence. An empty pattern matches all.
    pub fn list(&self, pattern: &str, filter: ListFilter) -> Vec<&CredentialRecord> {
        self.records
            .values()
            .filter(|record| record.fqdn.contains(pattern))
            .filter(|record| match filter.has_private_key {
                Some(wanted) => record.has_private_key() == wanted,
                None => true,
            })
            .collect()
    }

    /// Remove an identity and its whole subtree, from disk and memory.
    ///
    /// Shredding cascades to children: an orphan pointing at a destroyed
    /// parent would violate the chain-of-trust model. Returns the fqdns
    /// removed.
    pub fn shred(&mut self, fqdn: &str) -> Result<Vec<String>> {
        if !self.records.contains_key(fqdn) {
            return Err(StoreError::NotFound(fqdn.to_string()));
        }

        // Remote metadata can declare arbitrary parents, so the children
        // graph may contain cycles; each fqdn is visited once.
        let mut queue = vec![fqdn.to_string()];
        let mut seen: HashSet<String> = queue.iter().cloned().collect();
        let mut doomed = Vec::new();
        while let Some(current) = queue.pop() {
            if let Some(children) = self.children.get(&current) {
                for child in children {
                    if seen.insert(child.clone()) {
                        queue.push(child.clone());
                    }
                }
            }
            doomed.push(current);
        }

        for victim in &doomed {
            self.dirs.shred(victim)?;
            self.records.remove(victim);
            self.children.remove(victim);
            self.roots.remove(victim);
        }
        for children in self.children.values_mut() {
            children.retain(|child| child != fqdn);
        }

        info!("shredded {fqdn} and {} descendants", doomed.len() - 1);
        Ok(doomed)
    }

    /// Replace a present record's metadata document. Forest structure is
    /// unaffected; parent links stay as they were at insertion time.
    pub fn update_metadata(&mut self, fqdn: &str, metadata: CredentialMetadata) -> Result<()> {
        let record = self
            .records
            .get_mut(fqdn)
            .ok_or_else(|| StoreError::NotFound(fqdn.to_string()))?;
        record.metadata = metadata;
        Ok(())
    }

    // ── Forest structure ─────────────────────────────────────────────────────

    /// Fqdns currently at the forest root, in lexical order.
    pub fn roots(&self) -> impl Iterator<Item = &str> {
        self.roots.iter().map(String::as_str)
    }

    /// Child fqdns attached under `fqdn`, in attachment order.
    pub fn children_of(&self, fqdn: &str) -> &[String] {
        self.children.get(fqdn).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The attached parent record of `fqdn`, if its parent is present in
    /// the forest.
    pub fn parent_of(&self, fqdn: &str) -> Option<&CredentialRecord> {
        let parent = self.records.get(fqdn)?.parent_fqdn.as_deref()?;
        self.records.get(parent)
    }

    /// Walk the parent chain from `fqdn` to its highest locally-present
    /// ancestor. The first element is the record itself. A parent cycle
    /// ends the walk at the last unseen ancestor.
    pub fn chain_of_trust(&self, fqdn: &str) -> Result<Vec<&CredentialRecord>> {
        let mut chain = vec![self.resolve(fqdn)?];
        let mut seen: HashSet<&str> = HashSet::from([fqdn]);
        loop {
            let current = chain[chain.len() - 1];
            match current.parent_fqdn.as_deref().and_then(|p| self.records.get(p)) {
                Some(parent) if seen.insert(parent.fqdn.as_str()) => chain.push(parent),
                _ => break,
            }
        }
        Ok(chain)
    }

    /// Number of records in the forest.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the forest is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
