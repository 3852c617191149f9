//! PKCS#10 certificate signing request decoding.
//!
//! Input must be exactly one PEM block labelled `CERTIFICATE REQUEST`.
//! Only structure is checked here; subject contents are accepted as-is
//! and requested extensions are ignored. The key must be one rcgen can
//! place in a certificate (ECDSA P-256/P-384, RSA, Ed25519).

use std::fmt;

use rcgen::SubjectPublicKeyInfo;
use serde::{Deserialize, Serialize};
use x509_parser::certification_request::X509CertificationRequest;
use x509_parser::prelude::FromDer;
use x509_parser::x509::X509Name;

use crate::CaError;

/// PEM label of a certificate signing request.
pub const CSR_LABEL: &str = "CERTIFICATE REQUEST";

const OID_COMMON_NAME: &str = "2.5.4.3";
const OID_COUNTRY: &str = "2.5.4.6";
const OID_LOCALITY: &str = "2.5.4.7";
const OID_PROVINCE: &str = "2.5.4.8";
const OID_STREET_ADDRESS: &str = "2.5.4.9";
const OID_ORGANIZATION: &str = "2.5.4.10";
const OID_ORGANIZATIONAL_UNIT: &str = "2.5.4.11";
const OID_POSTAL_CODE: &str = "2.5.4.17";

/// Subject attributes of a request or certificate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub common_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub organization: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub organizational_unit: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub country: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub province: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locality: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub street_address: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub postal_code: Vec<String>,
    /// Any other string attributes as (dotted OID, value).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra: Vec<(String, String)>,
}

impl Subject {
    /// Collect string-valued attributes from an X.509 name.
    pub fn from_x509_name(name: &X509Name<'_>) -> Self {
        let mut subject = Self::default();
        for attr in name.iter_attributes() {
            // Non-string attribute values carry nothing we can copy by name.
            let Ok(value) = attr.as_str() else { continue };
            let value = value.to_string();
            match attr.attr_type().to_id_string().as_str() {
                OID_COMMON_NAME => subject.common_name = Some(value),
                OID_COUNTRY => subject.country.push(value),
                OID_LOCALITY => subject.locality.push(value),
                OID_PROVINCE => subject.province.push(value),
                OID_STREET_ADDRESS => subject.street_address.push(value),
                OID_ORGANIZATION => subject.organization.push(value),
                OID_ORGANIZATIONAL_UNIT => subject.organizational_unit.push(value),
                OID_POSTAL_CODE => subject.postal_code.push(value),
                oid => subject.extra.push((oid.to_string(), value)),
            }
        }
        subject
    }
}

/// A decoded PKCS#10 request, consumed once by the issuer.
pub struct CertificateSigningRequest {
    der: Vec<u8>,
    subject: Subject,
    /// Subject `Name` exactly as encoded in the request
    subject_der: Vec<u8>,
    public_key_algorithm: String,
    public_key: SubjectPublicKeyInfo,
}

impl CertificateSigningRequest {
    /// Decode raw request bytes (PEM text).
    pub fn decode(raw: &[u8]) -> crate::Result<Self> {
        let block = pem::parse(raw).map_err(|e| CaError::Decode(format!("no PEM block: {e}")))?;
        if block.tag() != CSR_LABEL {
            return Err(CaError::Decode(format!(
                "expected {CSR_LABEL:?} block, found {:?}",
                block.tag()
            )));
        }
        Self::from_der(block.into_contents())
    }

    /// Parse a DER-encoded PKCS#10 structure.
    pub fn from_der(der: Vec<u8>) -> crate::Result<Self> {
        let (rest, request) = X509CertificationRequest::from_der(&der)
            .map_err(|e| CaError::Parse(format!("malformed certificate request: {e}")))?;
        if !rest.is_empty() {
            return Err(CaError::Parse(format!(
                "{} trailing bytes after certificate request",
                rest.len()
            )));
        }

        let info = &request.certification_request_info;
        let subject = Subject::from_x509_name(&info.subject);
        let public_key_algorithm =
            algorithm_name(&info.subject_pki.algorithm.algorithm.to_id_string());

        let public_key = SubjectPublicKeyInfo::from_der(info.subject_pki.raw).map_err(|e| {
            CaError::Parse(format!(
                "unsupported {public_key_algorithm} public key in request: {e}"
            ))
        })?;
        let subject_der = info.subject.as_raw().to_vec();

        Ok(Self {
            der,
            subject,
            subject_der,
            public_key_algorithm,
            public_key,
        })
    }

    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    /// Public key algorithm, e.g. `ECDSA` or `RSA`.
    pub fn public_key_algorithm(&self) -> &str {
        &self.public_key_algorithm
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Re-encode the request as PEM.
    pub fn to_pem(&self) -> String {
        crate::encode_pem(CSR_LABEL, self.der.clone())
    }

    pub(crate) fn subject_der(&self) -> &[u8] {
        &self.subject_der
    }

    pub(crate) fn public_key(&self) -> &SubjectPublicKeyInfo {
        &self.public_key
    }
}

impl fmt::Debug for CertificateSigningRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateSigningRequest")
            .field("subject", &self.subject)
            .field("public_key_algorithm", &self.public_key_algorithm)
            .finish_non_exhaustive()
    }
}

fn algorithm_name(oid: &str) -> String {
    match oid {
        "1.2.840.10045.2.1" => "ECDSA".to_string(),
        "1.2.840.113549.1.1.1" => "RSA".to_string(),
        "1.3.101.112" => "Ed25519".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::tbs;
    use crate::tbs::tests::{name, printable, rdn, utf8};
    use p256::ecdsa::SigningKey;
    use p256::pkcs8::der::asn1::{AnyRef, BitStringRef, ObjectIdentifier};
    use p256::pkcs8::der::{Encode, Tag};
    use p256::pkcs8::DecodePrivateKey;
    use rcgen::{
        CertificateParams, CustomExtension, DistinguishedName, DnType, KeyPair,
        PKCS_ECDSA_P256_SHA256, PKCS_ECDSA_P384_SHA384,
    };

    /// Index of `subject` and `subjectPKInfo` inside `CertificationRequestInfo`.
    const REQUEST_SUBJECT: usize = 1;
    const REQUEST_PUBLIC_KEY: usize = 2;

    /// Build a PEM CSR with the given subject attributes.
    pub(crate) fn csr_pem(attrs: &[(DnType, &str)]) -> String {
        let key = KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256).unwrap();
        let mut params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        for (ty, value) in attrs {
            dn.push(ty.clone(), *value);
        }
        params.distinguished_name = dn;
        params.serialize_request(&key).unwrap().pem().unwrap()
    }

    /// A PEM CSR for `O=Acme` carrying the given extension requests.
    pub(crate) fn csr_with_extensions(extensions: Vec<CustomExtension>) -> String {
        let key = KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256).unwrap();
        let mut params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::OrganizationName, "Acme");
        params.distinguished_name = dn;
        params.custom_extensions = extensions;
        params.serialize_request(&key).unwrap().pem().unwrap()
    }

    /// `basicConstraints` with `cA = TRUE`.
    pub(crate) fn ca_basic_constraints() -> CustomExtension {
        let mut ext =
            CustomExtension::from_oid_content(&[2, 5, 29, 19], vec![0x30, 0x03, 0x01, 0x01, 0xff]);
        ext.set_criticality(true);
        ext
    }

    /// A private-enterprise extension rcgen has no model for.
    pub(crate) fn private_extension() -> CustomExtension {
        CustomExtension::from_oid_content(&[1, 3, 6, 1, 4, 1, 55_555, 7], vec![0x04, 0x02, 0x68, 0x69])
    }

    /// Re-sign a request with field `index` of its info replaced.
    fn with_field(key: &KeyPair, index: usize, field: &[u8]) -> String {
        let template = CertificateParams::default().serialize_request(key).unwrap();
        let secret = p256::SecretKey::from_pkcs8_der(&key.serialize_der()).unwrap();
        let der =
            tbs::replace_and_sign(template.der(), index, field, &SigningKey::from(&secret)).unwrap();
        crate::encode_pem(CSR_LABEL, der)
    }

    /// A PEM CSR whose subject is exactly the given DER `Name`.
    pub(crate) fn csr_with_subject(subject: &[u8]) -> String {
        let key = KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256).unwrap();
        with_field(&key, REQUEST_SUBJECT, subject)
    }

    pub(crate) fn street() -> DnType {
        DnType::CustomDnType(vec![2, 5, 4, 9])
    }

    pub(crate) fn postal() -> DnType {
        DnType::CustomDnType(vec![2, 5, 4, 17])
    }

    #[test]
    fn test_decode_subject_fields() {
        let pem = csr_pem(&[
            (DnType::CommonName, "alice"),
            (DnType::OrganizationName, "Acme"),
            (DnType::CountryName, "US"),
            (DnType::StateOrProvinceName, "Oregon"),
            (DnType::LocalityName, "Portland"),
            (street(), "1 Main St"),
            (postal(), "97201"),
        ]);

        let csr = CertificateSigningRequest::decode(pem.as_bytes()).unwrap();
        let subject = csr.subject();
        assert_eq!(subject.common_name.as_deref(), Some("alice"));
        assert_eq!(subject.organization, vec!["Acme"]);
        assert_eq!(subject.country, vec!["US"]);
        assert_eq!(subject.province, vec!["Oregon"]);
        assert_eq!(subject.locality, vec!["Portland"]);
        assert_eq!(subject.street_address, vec!["1 Main St"]);
        assert_eq!(subject.postal_code, vec!["97201"]);
        assert!(subject.extra.is_empty());
        assert_eq!(csr.public_key_algorithm(), "ECDSA");
    }

    #[test]
    fn test_pem_round_trip_keeps_subject() {
        let pem = csr_pem(&[
            (DnType::OrganizationName, "Acme"),
            (DnType::CountryName, "US"),
            (DnType::CustomDnType(vec![0, 9, 2342, 19_200_300, 100, 1, 1]), "uid-7"),
        ]);
        let first = CertificateSigningRequest::decode(pem.as_bytes()).unwrap();
        let second = CertificateSigningRequest::decode(first.to_pem().as_bytes()).unwrap();
        assert_eq!(first.subject(), second.subject());
        assert_eq!(first.der(), second.der());
        assert_eq!(
            second.subject().extra,
            vec![("0.9.2342.19200300.100.1.1".to_string(), "uid-7".to_string())]
        );
    }

    #[test]
    fn test_rejects_non_pem() {
        let err = CertificateSigningRequest::decode(b"definitely not pem").unwrap_err();
        assert!(matches!(err, CaError::Decode(_)), "{err}");
    }

    #[test]
    fn test_rejects_wrong_label() {
        let pem = crate::encode_pem("CERTIFICATE", vec![0x30, 0x00]);
        let err = CertificateSigningRequest::decode(pem.as_bytes()).unwrap_err();
        assert!(matches!(err, CaError::Decode(_)), "{err}");
    }

    #[test]
    fn test_rejects_malformed_der() {
        let pem = crate::encode_pem(CSR_LABEL, vec![0x30, 0x03, 0x02, 0x01]);
        let err = CertificateSigningRequest::decode(pem.as_bytes()).unwrap_err();
        assert!(matches!(err, CaError::Parse(_)), "{err}");
    }

    #[test]
    fn test_rejects_truncated_request() {
        let pem = csr_pem(&[(DnType::OrganizationName, "Acme")]);
        let der = CertificateSigningRequest::decode(pem.as_bytes())
            .unwrap()
            .der()
            .to_vec();
        let truncated = crate::encode_pem(CSR_LABEL, der[..der.len() / 2].to_vec());
        let err = CertificateSigningRequest::decode(truncated.as_bytes()).unwrap_err();
        assert!(err.is_input_error(), "{err}");
        assert!(matches!(err, CaError::Parse(_)), "{err}");
    }

    #[test]
    fn test_requested_extensions_do_not_block_decoding() {
        let pem = csr_with_extensions(vec![ca_basic_constraints(), private_extension()]);
        let csr = CertificateSigningRequest::decode(pem.as_bytes()).unwrap();
        assert_eq!(csr.subject().organization, vec!["Acme"]);
    }

    #[test]
    fn test_repeated_attributes_are_all_collected() {
        let subject = name(&[
            rdn(vec![printable("2.5.4.6", "US")]),
            rdn(vec![utf8("2.5.4.10", "Acme")]),
            rdn(vec![utf8("2.5.4.10", "Beta")]),
            rdn(vec![utf8("2.5.4.3", "alice"), utf8("2.5.4.11", "Lab")]),
        ]);
        let csr = CertificateSigningRequest::decode(csr_with_subject(&subject).as_bytes()).unwrap();

        assert_eq!(csr.subject().organization, vec!["Acme", "Beta"]);
        assert_eq!(csr.subject().organizational_unit, vec!["Lab"]);
        assert_eq!(csr.subject().common_name.as_deref(), Some("alice"));
        assert_eq!(csr.subject_der(), subject.as_slice());
    }

    #[test]
    fn test_p384_key_is_accepted() {
        let key = KeyPair::generate_for(&PKCS_ECDSA_P384_SHA384).unwrap();
        let pem = CertificateParams::default()
            .serialize_request(&key)
            .unwrap()
            .pem()
            .unwrap();
        let csr = CertificateSigningRequest::decode(pem.as_bytes()).unwrap();
        assert_eq!(csr.public_key_algorithm(), "ECDSA");
    }

    #[test]
    fn test_unknown_key_algorithm_is_parse_error() {
        let algorithm = ObjectIdentifier::new_unwrap("1.2.3.4").to_der().unwrap();
        let algorithm = AnyRef::new(Tag::Sequence, &algorithm).unwrap().to_der().unwrap();
        let mut spki = algorithm;
        spki.extend(BitStringRef::from_bytes(&[1, 2, 3]).unwrap().to_der().unwrap());
        let spki = AnyRef::new(Tag::Sequence, &spki).unwrap().to_der().unwrap();

        let key = KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256).unwrap();
        let pem = with_field(&key, REQUEST_PUBLIC_KEY, &spki);
        let err = CertificateSigningRequest::decode(pem.as_bytes()).unwrap_err();
        assert!(matches!(err, CaError::Parse(_)), "{err}");
        assert!(err.is_input_error());
    }
}
