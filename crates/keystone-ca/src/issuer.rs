//! Leaf certificate signing.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rcgen::{
    CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, Ia5String, IsCa,
    KeyPair, KeyUsagePurpose, SanType, PKCS_ECDSA_P256_SHA256,
};
use tracing::{debug, info};

use crate::authority::{distinguished_name, sec1_pem, CertificateAuthority};
use crate::config::SubjectConfig;
use crate::csr::CertificateSigningRequest;
use crate::identity::{CommonName, Serial};
use crate::tbs;
use crate::{now_utc, offset_datetime, CaConfig, CaError};

/// Validity and usage applied to every leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IssuancePolicy {
    /// Lifetime of an issued leaf in days
    pub validity_days: u32,
    /// Also assert server authentication
    pub server_auth: bool,
}

impl IssuancePolicy {
    pub fn from_config(config: &CaConfig) -> Self {
        Self {
            validity_days: config.leaf_validity_days,
            server_auth: config.leaf_server_auth,
        }
    }

    fn extended_key_usages(self) -> Vec<ExtendedKeyUsagePurpose> {
        let mut usages = vec![ExtendedKeyUsagePurpose::ClientAuth];
        if self.server_auth {
            usages.push(ExtendedKeyUsagePurpose::ServerAuth);
        }
        usages
    }
}

impl Default for IssuancePolicy {
    fn default() -> Self {
        Self::from_config(&CaConfig::default())
    }
}

/// A freshly signed leaf certificate.
#[derive(Debug, Clone)]
pub struct SignedLeaf {
    pub der: Vec<u8>,
    pub common_name: CommonName,
    pub serial: Serial,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

/// Server certificate for one of the deployment's own hostnames.
pub struct ServerCertificate {
    pub host: String,
    /// SEC1 PEM of the generated key
    pub key_pem: String,
    pub cert_der: Vec<u8>,
}

/// Signs requests with the shared CA.
#[derive(Debug, Clone)]
pub struct Issuer {
    ca: Arc<CertificateAuthority>,
    policy: IssuancePolicy,
}

impl Issuer {
    pub fn new(ca: Arc<CertificateAuthority>, policy: IssuancePolicy) -> Self {
        Self { ca, policy }
    }

    pub fn policy(&self) -> IssuancePolicy {
        self.policy
    }

    /// Sign a decoded request.
    ///
    /// The request's CommonName is replaced by a fresh random identifier;
    /// every other subject attribute is copied verbatim, repeated and
    /// multi-valued ones included. The certificate binds the request's
    /// public key. Requested SANs and extensions are ignored.
    pub fn sign(&self, csr: CertificateSigningRequest) -> crate::Result<SignedLeaf> {
        let serial = Serial::generate()?;
        let common_name = CommonName::generate()?;
        let not_before = now_utc();
        let not_after = not_before
            .checked_add_signed(Duration::days(i64::from(self.policy.validity_days)))
            .ok_or_else(|| CaError::Signing("leaf validity out of range".into()))?;

        let mut params = CertificateParams::default();
        params.distinguished_name = DistinguishedName::new();
        params
            .distinguished_name
            .push(DnType::CommonName, common_name.as_str());
        params.serial_number = Some((&serial).into());
        params.not_before = offset_datetime(not_before)?;
        params.not_after = offset_datetime(not_after)?;
        params.is_ca = IsCa::NoCa;
        params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
        params.extended_key_usages = self.policy.extended_key_usages();
        params.use_authority_key_identifier_extension = true;

        let template = params
            .signed_by(csr.public_key(), self.ca.issuer(), self.ca.key_pair())
            .map_err(|e| CaError::Signing(format!("sign leaf certificate: {e}")))?;
        let der = self.with_requested_subject(template.der(), csr.subject_der())?;

        info!(
            common_name = %common_name,
            serial = %serial.to_hex(),
            %not_after,
            "Issued client certificate"
        );

        Ok(SignedLeaf {
            der,
            common_name,
            serial,
            not_before,
            not_after,
        })
    }

    /// Swap the generated subject (CN only) for the requested one with
    /// that CN in place of the requested CN, then sign again.
    fn with_requested_subject(&self, template: &[u8], requested: &[u8]) -> crate::Result<Vec<u8>> {
        let (_, cert) = x509_parser::parse_x509_certificate(template)
            .map_err(|e| CaError::Signing(format!("read back leaf certificate: {e}")))?;
        let subject = tbs::replace_common_name(requested, cert.subject().as_raw())
            .map_err(|e| CaError::Signing(format!("leaf subject: {e}")))?;
        tbs::replace_and_sign(template, tbs::CERT_SUBJECT, &subject, self.ca.signing_key())
    }

    /// Generate a key pair and a server certificate for `host`, valid
    /// until the CA itself expires.
    pub fn server_certificate(
        &self,
        host: &str,
        subject: &SubjectConfig,
    ) -> crate::Result<ServerCertificate> {
        let key_pair = KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256)
            .map_err(|e| CaError::Generation(format!("key pair for {host}: {e}")))?;
        let key_pem = sec1_pem(&key_pair)?;
        let serial = Serial::generate()?;

        let mut params = CertificateParams::default();
        params.distinguished_name = distinguished_name(subject, host);
        let dns_name = Ia5String::try_from(host)
            .map_err(|e| CaError::Config(format!("invalid host {host:?}: {e}")))?;
        params.subject_alt_names = vec![SanType::DnsName(dns_name)];
        params.serial_number = Some((&serial).into());
        params.not_before = offset_datetime(now_utc())?;
        params.not_after = offset_datetime(self.ca.info().not_after)?;
        params.is_ca = IsCa::NoCa;
        params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
        params.use_authority_key_identifier_extension = true;

        let cert = params
            .signed_by(&key_pair, self.ca.issuer(), self.ca.key_pair())
            .map_err(|e| CaError::Signing(format!("sign certificate for {host}: {e}")))?;
        debug!(host, serial = %serial.to_hex(), "Signed server certificate");

        Ok(ServerCertificate {
            host: host.to_string(),
            key_pem,
            cert_der: cert.der().to_vec(),
        })
    }
}
