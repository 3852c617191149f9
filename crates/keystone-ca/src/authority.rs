//! Root Certificate Authority - load once, or create on first run.
//!
//! The CA key is stored as SEC1 (`EC PRIVATE KEY`) next to the
//! self-signed certificate. A CA is only generated when both files are
//! absent; any partial or malformed state is an error.

use std::fmt;

use chrono::{DateTime, Months, Utc};
use p256::ecdsa::SigningKey;
use p256::pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair,
    KeyUsagePurpose, PKCS_ECDSA_P256_SHA256,
};
use rustls_pki_types::CertificateDer;
use tracing::{info, warn};

use crate::config::SubjectConfig;
use crate::identity::Serial;
use crate::storage::Storage;
use crate::{encode_pem, now_utc, offset_datetime, CaConfig, CaError, CertificateInfo};

/// PEM label of a certificate.
pub const CERT_LABEL: &str = "CERTIFICATE";

/// PEM label of a SEC1 elliptic-curve private key.
pub const EC_KEY_LABEL: &str = "EC PRIVATE KEY";

/// How the CA came to be in this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaOrigin {
    /// Read back from storage
    Loaded,
    /// Generated during this bootstrap
    Created,
}

/// The root CA: signing key plus self-signed certificate.
///
/// Immutable once constructed and safe to share across threads.
pub struct CertificateAuthority {
    /// Key pair for signing
    key_pair: KeyPair,
    /// Same key, for re-signing finished leaves
    signing_key: SigningKey,
    /// Issuer handle rcgen signs against
    issuer: rcgen::Certificate,
    /// CA certificate exactly as stored
    cert_pem: String,
    cert_der: Vec<u8>,
    /// Metadata
    info: CertificateInfo,
    origin: CaOrigin,
}

impl CertificateAuthority {
    /// Load the CA from storage, creating it if neither file exists.
    pub fn load_or_create(storage: &dyn Storage, config: &CaConfig) -> crate::Result<Self> {
        let cert = read(storage, &config.ca_cert)?;
        let key = read(storage, &config.ca_key)?;

        match (cert, key) {
            (Some(cert), Some(key)) => Self::load(&cert, &key),
            (None, None) => Self::create(storage, config),
            (Some(_), None) => Err(CaError::Load(format!(
                "CA certificate {} exists but private key {} is missing",
                config.ca_cert, config.ca_key
            ))),
            (None, Some(_)) => Err(CaError::Load(format!(
                "CA private key {} exists but certificate {} is missing",
                config.ca_key, config.ca_cert
            ))),
        }
    }

    /// Rebuild the CA from its stored PEM certificate and SEC1 key.
    pub fn load(cert_pem: &[u8], key_pem: &[u8]) -> crate::Result<Self> {
        let cert_block = decode_block(cert_pem, CERT_LABEL, "CA certificate")?;
        let key_block = decode_block(key_pem, EC_KEY_LABEL, "CA private key")?;

        let secret = p256::SecretKey::from_sec1_der(key_block.contents())
            .map_err(|e| CaError::Parse(format!("CA private key: {e}")))?;
        let key_pair = rcgen_key_pair(&secret)?;
        let signing_key = SigningKey::from(&secret);

        let cert_der = cert_block.into_contents();
        let (_, x509) = x509_parser::parse_x509_certificate(&cert_der)
            .map_err(|e| CaError::Parse(format!("CA certificate: {e}")))?;

        if !x509.is_ca() {
            return Err(CaError::Load("stored certificate is not a CA certificate".into()));
        }
        let cert_public_key = x509
            .tbs_certificate
            .subject_pki
            .subject_public_key
            .data
            .as_ref();
        if cert_public_key != key_pair.public_key_raw() {
            return Err(CaError::Load(
                "CA certificate and private key do not match".into(),
            ));
        }
        let info = CertificateInfo::from_x509(&x509)?;

        let params = CertificateParams::from_ca_cert_der(&CertificateDer::from(cert_der.as_slice()))
            .map_err(|e| CaError::Parse(format!("CA certificate: {e}")))?;
        let issuer = params
            .self_signed(&key_pair)
            .map_err(|e| CaError::Load(format!("rebuild CA issuer: {e}")))?;

        let cert_pem = String::from_utf8(cert_pem.to_vec())
            .map_err(|_| CaError::Decode("CA certificate is not valid UTF-8".into()))?;

        if info.is_expired_at(Utc::now()) {
            warn!(not_after = %info.not_after, "CA certificate is outside its validity window");
        }
        info!(subject = %info.subject, serial = %info.serial, "Loaded CA certificate");

        Ok(Self {
            key_pair,
            signing_key,
            issuer,
            cert_pem,
            cert_der,
            info,
            origin: CaOrigin::Loaded,
        })
    }

    /// Generate a new key pair and self-signed certificate, and persist both.
    pub fn create(storage: &dyn Storage, config: &CaConfig) -> crate::Result<Self> {
        let key_pair = KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256)
            .map_err(|e| CaError::Generation(format!("CA key pair: {e}")))?;
        let secret = secret_key(&key_pair)?;
        let key_pem = encode_sec1(&secret)?;
        let signing_key = SigningKey::from(&secret);
        let serial = Serial::generate()?;

        let mut params = CertificateParams::default();
        params.distinguished_name =
            distinguished_name(&config.subject, &config.subject.common_name);
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyCertSign,
        ];
        params.serial_number = Some((&serial).into());

        let (not_before, not_after) = ca_validity(now_utc(), config.ca_validity_years)?;
        params.not_before = offset_datetime(not_before)?;
        params.not_after = offset_datetime(not_after)?;

        let issuer = params
            .self_signed(&key_pair)
            .map_err(|e| CaError::Signing(format!("self-sign CA certificate: {e}")))?;
        let cert_der = issuer.der().to_vec();
        let cert_pem = issuer.pem();
        let info = CertificateInfo::from_der(&cert_der)?;

        // Key before certificate.
        storage
            .put(&config.ca_key, key_pem.as_bytes())
            .map_err(|e| CaError::persistence(config.ca_key.as_str(), e))?;
        storage
            .put(&config.ca_cert, cert_pem.as_bytes())
            .map_err(|e| CaError::persistence(config.ca_cert.as_str(), e))?;

        info!(
            subject = %info.subject,
            serial = %info.serial,
            not_after = %info.not_after,
            "Created CA certificate"
        );

        Ok(Self {
            key_pair,
            signing_key,
            issuer,
            cert_pem,
            cert_der,
            info,
            origin: CaOrigin::Created,
        })
    }

    /// CA certificate in PEM format, byte-for-byte as stored.
    pub fn cert_pem(&self) -> &str {
        &self.cert_pem
    }

    /// CA certificate in DER format.
    pub fn cert_der(&self) -> &[u8] {
        &self.cert_der
    }

    pub fn info(&self) -> &CertificateInfo {
        &self.info
    }

    pub fn origin(&self) -> CaOrigin {
        self.origin
    }

    /// Raw public key bytes (uncompressed P-256 point).
    pub fn public_key_raw(&self) -> &[u8] {
        self.key_pair.public_key_raw()
    }

    pub(crate) fn issuer(&self) -> &rcgen::Certificate {
        &self.issuer
    }

    pub(crate) fn key_pair(&self) -> &KeyPair {
        &self.key_pair
    }

    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }
}

impl fmt::Debug for CertificateAuthority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateAuthority")
            .field("info", &self.info)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

/// Build a subject from config, with the given CommonName.
pub(crate) fn distinguished_name(subject: &SubjectConfig, common_name: &str) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    let attrs = [
        (DnType::CommonName, common_name),
        (DnType::OrganizationName, subject.organization.as_str()),
        (DnType::CountryName, subject.country.as_str()),
        (DnType::StateOrProvinceName, subject.province.as_str()),
        (DnType::LocalityName, subject.locality.as_str()),
        (DnType::CustomDnType(vec![2, 5, 4, 9]), subject.street_address.as_str()),
        (DnType::CustomDnType(vec![2, 5, 4, 17]), subject.postal_code.as_str()),
    ];
    for (ty, value) in attrs {
        if !value.is_empty() {
            dn.push(ty, value);
        }
    }
    dn
}

/// SEC1 PEM encoding of a P-256 key pair.
pub(crate) fn sec1_pem(key_pair: &KeyPair) -> crate::Result<String> {
    encode_sec1(&secret_key(key_pair)?)
}

fn secret_key(key_pair: &KeyPair) -> crate::Result<p256::SecretKey> {
    p256::SecretKey::from_pkcs8_der(&key_pair.serialize_der())
        .map_err(|e| CaError::Generation(format!("decode generated key: {e}")))
}

fn encode_sec1(secret: &p256::SecretKey) -> crate::Result<String> {
    let der = secret
        .to_sec1_der()
        .map_err(|e| CaError::Generation(format!("encode SEC1 key: {e}")))?;
    Ok(encode_pem(EC_KEY_LABEL, der.to_vec()))
}

fn rcgen_key_pair(secret: &p256::SecretKey) -> crate::Result<KeyPair> {
    let pkcs8 = secret
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| CaError::Parse(format!("CA private key: {e}")))?;
    KeyPair::from_pem(&pkcs8).map_err(|e| CaError::Parse(format!("CA private key: {e}")))
}

fn ca_validity(
    now: DateTime<Utc>,
    years: u32,
) -> crate::Result<(DateTime<Utc>, DateTime<Utc>)> {
    let not_after = years
        .checked_mul(12)
        .and_then(|months| now.checked_add_months(Months::new(months)))
        .ok_or_else(|| CaError::Config(format!("CA validity of {years} years is out of range")))?;
    Ok((now, not_after))
}

fn decode_block(bytes: &[u8], label: &str, what: &str) -> crate::Result<pem::Pem> {
    let block = pem::parse(bytes).map_err(|e| CaError::Decode(format!("{what}: {e}")))?;
    if block.tag() != label {
        return Err(CaError::Decode(format!(
            "{what}: expected {label:?} block, found {:?}",
            block.tag()
        )));
    }
    Ok(block)
}

fn read(storage: &dyn Storage, key: &str) -> crate::Result<Option<Vec<u8>>> {
    storage
        .get(key)
        .map_err(|e| CaError::Load(format!("read {key}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FileStorage, MemoryStorage};

    #[test]
    fn test_create_then_load_is_identical() {
        let storage = MemoryStorage::new();
        let config = CaConfig::default();

        let created = CertificateAuthority::load_or_create(&storage, &config).unwrap();
        assert_eq!(created.origin(), CaOrigin::Created);
        assert_eq!(storage.len(), 2);

        let loaded = CertificateAuthority::load_or_create(&storage, &config).unwrap();
        assert_eq!(loaded.origin(), CaOrigin::Loaded);
        assert_eq!(loaded.info().serial, created.info().serial);
        assert_eq!(loaded.public_key_raw(), created.public_key_raw());
        assert_eq!(loaded.cert_der(), created.cert_der());
        assert_eq!(loaded.cert_pem(), created.cert_pem());
    }

    #[test]
    fn test_created_certificate_shape() {
        let storage = MemoryStorage::new();
        let config = CaConfig::default();
        let ca = CertificateAuthority::create(&storage, &config).unwrap();

        let (_, cert) = x509_parser::parse_x509_certificate(ca.cert_der()).unwrap();
        assert!(cert.is_ca());
        assert_eq!(cert.subject().to_string(), cert.issuer().to_string());
        assert_eq!(ca.info().common_name.as_deref(), Some("CA"));
        assert_eq!(ca.info().cert_type, crate::CertificateType::Root);

        let usage = cert.key_usage().unwrap().unwrap().value;
        assert!(usage.digital_signature());
        assert!(usage.key_cert_sign());

        let years = ca.info().not_after.years_since(ca.info().not_before);
        assert_eq!(years, Some(10));

        let raw = cert.raw_serial();
        assert!(raw.len() >= 19 && raw.len() <= 21, "serial length {}", raw.len());
        cert.verify_signature(None).unwrap();
    }

    #[test]
    fn test_key_is_stored_as_sec1() {
        let storage = MemoryStorage::new();
        let config = CaConfig::default();
        CertificateAuthority::create(&storage, &config).unwrap();

        let key = storage.get("ca.key").unwrap().unwrap();
        let block = pem::parse(&key).unwrap();
        assert_eq!(block.tag(), EC_KEY_LABEL);
        assert!(p256::SecretKey::from_sec1_der(block.contents()).is_ok());
    }

    #[test]
    fn test_file_storage_reload() {
        let dir = tempfile::tempdir().unwrap();
        let config = CaConfig::default();

        let first = {
            let storage = FileStorage::new(dir.path());
            CertificateAuthority::load_or_create(&storage, &config).unwrap()
        };
        let storage = FileStorage::new(dir.path());
        let second = CertificateAuthority::load_or_create(&storage, &config).unwrap();

        assert_eq!(second.origin(), CaOrigin::Loaded);
        assert_eq!(first.info().serial, second.info().serial);
        assert_eq!(first.public_key_raw(), second.public_key_raw());
    }

    #[test]
    fn test_missing_key_is_fatal_not_regenerated() {
        let storage = MemoryStorage::new();
        let config = CaConfig::default();
        let ca = CertificateAuthority::create(&storage, &config).unwrap();

        let only_cert = MemoryStorage::new();
        only_cert.put("ca.pem", ca.cert_pem().as_bytes()).unwrap();
        let err = CertificateAuthority::load_or_create(&only_cert, &config).unwrap_err();
        assert!(matches!(err, CaError::Load(_)), "{err}");
        assert_eq!(only_cert.len(), 1);
    }

    #[test]
    fn test_wrong_labels_are_decode_errors() {
        let storage = MemoryStorage::new();
        let config = CaConfig::default();
        CertificateAuthority::create(&storage, &config).unwrap();
        let cert = storage.get("ca.pem").unwrap().unwrap();
        let key = storage.get("ca.key").unwrap().unwrap();

        let err = CertificateAuthority::load(&key, &key).unwrap_err();
        assert!(matches!(err, CaError::Decode(_)), "{err}");

        let err = CertificateAuthority::load(&cert, &cert).unwrap_err();
        assert!(matches!(err, CaError::Decode(_)), "{err}");

        let err = CertificateAuthority::load(b"garbage", &key).unwrap_err();
        assert!(matches!(err, CaError::Decode(_)), "{err}");
    }

    #[test]
    fn test_malformed_der_is_parse_error() {
        let storage = MemoryStorage::new();
        let config = CaConfig::default();
        CertificateAuthority::create(&storage, &config).unwrap();
        let cert = storage.get("ca.pem").unwrap().unwrap();
        let key = storage.get("ca.key").unwrap().unwrap();

        let bad_cert = encode_pem(CERT_LABEL, vec![0x30, 0x05, 0x01]);
        let err = CertificateAuthority::load(bad_cert.as_bytes(), &key).unwrap_err();
        assert!(matches!(err, CaError::Parse(_)), "{err}");

        let bad_key = encode_pem(EC_KEY_LABEL, vec![0x30, 0x01]);
        let err = CertificateAuthority::load(&cert, bad_key.as_bytes()).unwrap_err();
        assert!(matches!(err, CaError::Parse(_)), "{err}");
    }

    #[test]
    fn test_mismatched_key_is_rejected() {
        let config = CaConfig::default();
        let first = MemoryStorage::new();
        let second = MemoryStorage::new();
        CertificateAuthority::create(&first, &config).unwrap();
        CertificateAuthority::create(&second, &config).unwrap();

        let cert = first.get("ca.pem").unwrap().unwrap();
        let other_key = second.get("ca.key").unwrap().unwrap();
        let err = CertificateAuthority::load(&cert, &other_key).unwrap_err();
        assert!(matches!(err, CaError::Load(_)), "{err}");
    }

    #[test]
    fn test_debug_hides_key_material() {
        let storage = MemoryStorage::new();
        let ca = CertificateAuthority::create(&storage, &CaConfig::default()).unwrap();
        let key = String::from_utf8(storage.get("ca.key").unwrap().unwrap()).unwrap();
        let debug = format!("{ca:?}");
        assert!(debug.contains("CertificateAuthority"));
        assert!(!debug.contains("PRIVATE KEY"));
        assert!(!debug.contains(key.lines().nth(1).unwrap()));
    }
}
