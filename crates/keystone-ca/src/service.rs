//! Bootstrap and the request-facing issuance entry point.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::authority::{CaOrigin, CertificateAuthority, CERT_LABEL};
use crate::chain::ChainPersister;
use crate::config::{host_keys, CaConfig, OutputMode};
use crate::csr::CertificateSigningRequest;
use crate::identity::CommonName;
use crate::issuer::{IssuancePolicy, Issuer};
use crate::storage::{FileStorage, Storage};
use crate::{encode_pem, CaError, CertificateInfo};

/// Result of one issuance.
#[derive(Debug, Clone, Serialize)]
pub struct Issuance {
    pub common_name: CommonName,
    /// Serial number (hex)
    pub serial: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    /// Leaf followed by the CA certificate
    pub chain_pem: String,
    pub leaf_pem: String,
    /// Whether the chain reached storage
    pub archived: bool,
}

impl Issuance {
    /// PEM to hand back to the requester.
    pub fn output(&self, mode: OutputMode) -> &str {
        match mode {
            OutputMode::Chain => &self.chain_pem,
            OutputMode::Leaf => &self.leaf_pem,
        }
    }
}

/// A bootstrapped CA ready to serve concurrent issuance requests.
#[derive(Debug, Clone)]
pub struct CertificateService {
    ca: Arc<CertificateAuthority>,
    issuer: Issuer,
    persister: ChainPersister,
    output_mode: OutputMode,
}

impl CertificateService {
    /// Load or create the CA in `storage` and wire up issuance.
    pub fn bootstrap(config: &CaConfig, storage: Arc<dyn Storage>) -> crate::Result<Self> {
        config.validate()?;

        let ca = Arc::new(CertificateAuthority::load_or_create(storage.as_ref(), config)?);
        let issuer = Issuer::new(Arc::clone(&ca), IssuancePolicy::from_config(config));
        let persister =
            ChainPersister::new(Arc::clone(&ca), Arc::clone(&storage), &config.issued_dir);

        let service = Self {
            ca,
            issuer,
            persister,
            output_mode: config.output_mode,
        };
        if service.ca.origin() == CaOrigin::Created {
            service.issue_internal_hosts(config, storage.as_ref())?;
        }
        Ok(service)
    }

    /// Bootstrap against the configured data directory.
    pub fn open(config: &CaConfig) -> crate::Result<Self> {
        Self::bootstrap(config, Arc::new(FileStorage::new(&config.data_dir)))
    }

    /// Decode, sign and archive one request.
    ///
    /// Archival is best effort: the chain is returned even if it could
    /// not be written, with `archived` set to false.
    pub fn issue(&self, raw_csr: &[u8]) -> crate::Result<Issuance> {
        let csr = CertificateSigningRequest::decode(raw_csr)?;
        let leaf = self.issuer.sign(csr)?;
        let chain_pem = self.persister.chain_pem(&leaf.der);

        let archived = match self.persister.archive(&leaf.common_name, &chain_pem) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    common_name = %leaf.common_name,
                    error = %e,
                    "Failed to archive certificate chain"
                );
                false
            }
        };

        Ok(Issuance {
            serial: leaf.serial.to_hex(),
            not_before: leaf.not_before,
            not_after: leaf.not_after,
            leaf_pem: encode_pem(CERT_LABEL, leaf.der),
            common_name: leaf.common_name,
            chain_pem,
            archived,
        })
    }

    /// Certificates archived so far.
    pub fn issued(&self) -> crate::Result<Vec<CertificateInfo>> {
        self.persister.issued()
    }

    pub fn ca(&self) -> &Arc<CertificateAuthority> {
        &self.ca
    }

    pub fn ca_certificate_pem(&self) -> &str {
        self.ca.cert_pem()
    }

    pub fn ca_info(&self) -> &CertificateInfo {
        self.ca.info()
    }

    /// Output mode from the configuration this service was built with.
    pub fn output_mode(&self) -> OutputMode {
        self.output_mode
    }

    fn issue_internal_hosts(&self, config: &CaConfig, storage: &dyn Storage) -> crate::Result<()> {
        for host in &config.internal_hosts {
            let server = self.issuer.server_certificate(host, &config.subject)?;
            let chain = self.persister.chain_pem(&server.cert_der);
            let (cert_key, key_key) = host_keys(host);

            storage
                .put(&key_key, server.key_pem.as_bytes())
                .map_err(|e| CaError::persistence(key_key.as_str(), e))?;
            storage
                .put(&cert_key, chain.as_bytes())
                .map_err(|e| CaError::persistence(cert_key.as_str(), e))?;
            info!(host = %server.host, "Issued internal server certificate");
        }
        Ok(())
    }
}
