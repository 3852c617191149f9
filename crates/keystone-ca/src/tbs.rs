//! Field-level edits of signed DER structures.
//!
//! Certificates and PKCS#10 requests share one outer shape:
//! `SEQUENCE { body SEQUENCE, AlgorithmIdentifier, BIT STRING }`.
//! rcgen keeps one value per attribute type, so a leaf subject with
//! repeated or multi-valued attributes is spliced in here after rcgen
//! has produced everything else, and the body is signed again.

use p256::ecdsa::signature::Signer;
use p256::ecdsa::{DerSignature, SigningKey};
use p256::pkcs8::der::asn1::{AnyRef, BitStringRef};
use p256::pkcs8::der::{self, Decode, Encode, Reader, SliceReader, Tag};

use crate::CaError;

/// Index of `subject` inside a v3 `TBSCertificate`.
pub(crate) const CERT_SUBJECT: usize = 5;

/// Encoded `id-at-commonName` OID, the head of every CN attribute.
const COMMON_NAME_OID: &[u8] = &[0x06, 0x03, 0x55, 0x04, 0x03];

/// Requested subject with every CommonName attribute removed and the
/// RDNs of `common_name` appended. Everything else is kept byte for byte,
/// including attribute order, repeated types and string encodings. An
/// RDN left empty by the removal is dropped.
pub(crate) fn replace_common_name(requested: &[u8], common_name: &[u8]) -> der::Result<Vec<u8>> {
    let mut body = Vec::new();
    for rdn in elements(AnyRef::from_der(requested)?.value())? {
        let mut kept = Vec::new();
        for attr in elements(rdn.value())? {
            if !attr.value().starts_with(COMMON_NAME_OID) {
                kept.extend(attr.to_der()?);
            }
        }
        // SET OF stays sorted when members are only removed
        if !kept.is_empty() {
            body.extend(AnyRef::new(Tag::Set, &kept)?.to_der()?);
        }
    }
    body.extend_from_slice(AnyRef::from_der(common_name)?.value());
    AnyRef::new(Tag::Sequence, &body)?.to_der()
}

/// Replace field `index` of the signed body with `field` and sign the
/// result again with `key`, keeping the original algorithm identifier.
pub(crate) fn replace_and_sign(
    signed: &[u8],
    index: usize,
    field: &[u8],
    key: &SigningKey,
) -> crate::Result<Vec<u8>> {
    let (body, algorithm) = rebuild_body(signed, index, field)
        .map_err(|e| CaError::Signing(format!("rebuild signed body: {e}")))?;
    let signature: DerSignature = key
        .try_sign(&body)
        .map_err(|e| CaError::Signing(format!("sign body: {e}")))?;
    encode_signed(&body, &algorithm, signature.as_bytes())
        .map_err(|e| CaError::Signing(format!("encode signed structure: {e}")))
}

fn rebuild_body(signed: &[u8], index: usize, field: &[u8]) -> der::Result<(Vec<u8>, Vec<u8>)> {
    let outer = elements(AnyRef::from_der(signed)?.value())?;
    let [body, algorithm, _signature] = outer.as_slice() else {
        return Err(Tag::Sequence.length_error());
    };

    let fields = elements(body.value())?;
    if index >= fields.len() {
        return Err(Tag::Sequence.length_error());
    }
    let mut rebuilt = Vec::new();
    for (i, current) in fields.iter().enumerate() {
        if i == index {
            AnyRef::from_der(field)?;
            rebuilt.extend_from_slice(field);
        } else {
            rebuilt.extend(current.to_der()?);
        }
    }
    Ok((
        AnyRef::new(Tag::Sequence, &rebuilt)?.to_der()?,
        algorithm.to_der()?,
    ))
}

fn encode_signed(body: &[u8], algorithm: &[u8], signature: &[u8]) -> der::Result<Vec<u8>> {
    let mut contents = Vec::with_capacity(body.len() + algorithm.len() + signature.len() + 8);
    contents.extend_from_slice(body);
    contents.extend_from_slice(algorithm);
    contents.extend(BitStringRef::from_bytes(signature)?.to_der()?);
    AnyRef::new(Tag::Sequence, &contents)?.to_der()
}

/// Top-level TLVs inside a constructed value.
fn elements(contents: &[u8]) -> der::Result<Vec<AnyRef<'_>>> {
    let mut reader = SliceReader::new(contents)?;
    let mut out = Vec::new();
    while !reader.is_finished() {
        out.push(AnyRef::decode(&mut reader)?);
    }
    Ok(out)
}
