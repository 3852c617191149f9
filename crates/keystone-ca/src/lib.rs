//! # keystone-ca
//!
//! A minimal certificate authority: one self-signed ECDSA P-256 root that
//! signs short-lived client certificates from PKCS#10 requests.
//!
//! ## Flow
//!
//! ```text
//! raw CSR bytes ──► CertificateSigningRequest::decode
//!                          │
//!                          ▼
//!                   Issuer::sign ◄── CertificateAuthority (load-or-create once)
//!                          │
//!                          ▼
//!                ChainPersister (leaf PEM + CA PEM ──► clients/<cn>.pem)
//! ```
//!
//! ## Guarantees
//!
//! - The CA is created once; later runs load it and never regenerate
//! - Issued CommonNames are fresh 256-bit random identifiers
//! - Serial numbers are 20 random bytes from the OS CSPRNG
//! - CA private key material never leaves [`CertificateAuthority`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use keystone_ca::{CaConfig, CertificateService, FileStorage};
//!
//! let config = CaConfig::default();
//! let storage = Arc::new(FileStorage::new(&config.data_dir));
//! let service = CertificateService::bootstrap(&config, storage)?;
//!
//! let issued = service.issue(csr_pem.as_bytes())?;
//! println!("{}", issued.output());
//! ```

mod authority;
mod chain;
mod config;
mod csr;
mod error;
mod identity;
mod issuer;
mod service;
mod tbs;
pub mod storage;

pub use authority::{CaOrigin, CertificateAuthority, CERT_LABEL, EC_KEY_LABEL};
pub use chain::ChainPersister;
pub use config::{CaConfig, OutputMode, SubjectConfig};
pub use csr::{CertificateSigningRequest, Subject, CSR_LABEL};
pub use error::{CaError, ErrorKind};
pub use identity::{serial_hex, CommonName, Serial};
pub use issuer::{IssuancePolicy, Issuer, ServerCertificate, SignedLeaf};
pub use service::{CertificateService, Issuance};
pub use storage::{FileStorage, MemoryStorage, Storage};

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use x509_parser::certificate::X509Certificate;

/// Result type for keystone CA operations.
pub type Result<T> = std::result::Result<T, CaError>;

/// Certificate metadata for listing and logging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateInfo {
    /// Serial number (hex)
    pub serial: String,
    /// Full subject distinguished name
    pub subject: String,
    /// Subject common name, if present
    pub common_name: Option<String>,
    /// Issuer distinguished name
    pub issuer: String,
    /// Not valid before
    pub not_before: DateTime<Utc>,
    /// Not valid after
    pub not_after: DateTime<Utc>,
    /// Certificate type
    pub cert_type: CertificateType,
}

/// Type of certificate in the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CertificateType {
    /// Self-signed root CA
    Root,
    /// Leaf certificate signed by the root
    EndEntity,
}

impl CertificateInfo {
    /// Summarize a DER-encoded certificate.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let (_, cert) = x509_parser::parse_x509_certificate(der)
            .map_err(|e| CaError::Parse(format!("malformed certificate: {e}")))?;
        Self::from_x509(&cert)
    }

    /// Summarize the first `CERTIFICATE` block of a PEM document.
    pub fn from_pem(pem_bytes: &[u8]) -> Result<Self> {
        let blocks =
            pem::parse_many(pem_bytes).map_err(|e| CaError::Decode(format!("bad PEM: {e}")))?;
        let block = blocks
            .iter()
            .find(|b| b.tag() == CERT_LABEL)
            .ok_or_else(|| CaError::Decode("no CERTIFICATE block".into()))?;
        Self::from_der(block.contents())
    }

    pub(crate) fn from_x509(cert: &X509Certificate<'_>) -> Result<Self> {
        let subject = cert.subject().to_string();
        let issuer = cert.issuer().to_string();
        let common_name = cert
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .map(ToString::to_string);

        let cert_type = if cert.is_ca() && subject == issuer {
            CertificateType::Root
        } else {
            CertificateType::EndEntity
        };

        let validity = cert.validity();
        Ok(Self {
            serial: serial_hex(cert.raw_serial()),
            subject,
            common_name,
            issuer,
            not_before: utc_timestamp(validity.not_before.timestamp())?,
            not_after: utc_timestamp(validity.not_after.timestamp())?,
            cert_type,
        })
    }

    /// Is the certificate outside its validity window at `at`?
    pub fn is_expired_at(&self, at: DateTime<Utc>) -> bool {
        at < self.not_before || at > self.not_after
    }
}

fn utc_timestamp(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| CaError::Parse(format!("timestamp out of range: {secs}")))
}

/// Current time truncated to whole seconds, as encoded in certificates.
pub(crate) fn now_utc() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

/// Convert a validity bound into the form rcgen expects.
pub(crate) fn offset_datetime(at: DateTime<Utc>) -> Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp(at.timestamp())
        .map_err(|e| CaError::Signing(format!("validity bound out of range: {e}")))
}

/// PEM-encode DER with LF line endings.
pub(crate) fn encode_pem(label: &str, der: Vec<u8>) -> String {
    pem::encode_config(
        &pem::Pem::new(label, der),
        pem::EncodeConfig::new().set_line_ending(pem::LineEnding::LF),
    )
}
