//! Leaf + CA chain assembly and archival.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::authority::{CertificateAuthority, CERT_LABEL};
use crate::identity::CommonName;
use crate::storage::{join_key, Storage};
use crate::{encode_pem, CaError, CertificateInfo};

/// Builds chains and archives them under the issued directory.
#[derive(Clone)]
pub struct ChainPersister {
    ca: Arc<CertificateAuthority>,
    storage: Arc<dyn Storage>,
    issued_dir: String,
}

impl ChainPersister {
    pub fn new(
        ca: Arc<CertificateAuthority>,
        storage: Arc<dyn Storage>,
        issued_dir: impl Into<String>,
    ) -> Self {
        Self {
            ca,
            storage,
            issued_dir: issued_dir.into(),
        }
    }

    /// Leaf PEM followed by the CA certificate exactly as stored.
    pub fn chain_pem(&self, leaf_der: &[u8]) -> String {
        let mut chain = encode_pem(CERT_LABEL, leaf_der.to_vec());
        chain.push_str(self.ca.cert_pem());
        chain
    }

    /// Storage key for an issued certificate.
    pub fn key_for(&self, common_name: &CommonName) -> String {
        join_key(&self.issued_dir, &format!("{common_name}.pem"))
    }

    /// Write an already assembled chain.
    pub fn archive(&self, common_name: &CommonName, chain_pem: &str) -> crate::Result<()> {
        let key = self.key_for(common_name);
        self.storage
            .put(&key, chain_pem.as_bytes())
            .map_err(|e| CaError::persistence(key.as_str(), e))?;
        debug!(%key, "Archived certificate chain");
        Ok(())
    }

    /// Assemble and write the chain for a leaf, returning it.
    pub fn persist(&self, leaf_der: &[u8], common_name: &CommonName) -> crate::Result<String> {
        let chain = self.chain_pem(leaf_der);
        self.archive(common_name, &chain)?;
        Ok(chain)
    }

    /// Summaries of every archived certificate, sorted by storage key.
    ///
    /// Entries that cannot be read or parsed are skipped with a warning.
    pub fn issued(&self) -> crate::Result<Vec<CertificateInfo>> {
        let keys = self
            .storage
            .list(&self.issued_dir)
            .map_err(|e| CaError::persistence(self.issued_dir.as_str(), e))?;

        let mut issued = Vec::with_capacity(keys.len());
        for key in keys.iter().filter(|k| k.ends_with(".pem")) {
            let bytes = match self.storage.get(key) {
                Ok(Some(bytes)) => bytes,
                Ok(None) => continue,
                Err(e) => {
                    warn!(%key, error = %e, "Skipping unreadable certificate");
                    continue;
                }
            };
            match CertificateInfo::from_pem(&bytes) {
                Ok(info) => issued.push(info),
                Err(e) => warn!(%key, error = %e, "Skipping malformed certificate"),
            }
        }
        Ok(issued)
    }
}

impl std::fmt::Debug for ChainPersister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainPersister")
            .field("issued_dir", &self.issued_dir)
            .finish_non_exhaustive()
    }
}
