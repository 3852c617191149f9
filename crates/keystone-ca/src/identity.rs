//! Random serial numbers and subject identifiers.
//!
//! Every draw goes straight to the OS CSPRNG; there is no shared
//! generator state between concurrent issuances.

use std::fmt;

use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};

use crate::CaError;

/// Serial number length in bytes.
pub const SERIAL_LEN: usize = 20;

/// Random bytes behind a generated CommonName.
pub const COMMON_NAME_BYTES: usize = 32;

/// Fill a fixed-size buffer from the OS CSPRNG.
pub(crate) fn random_bytes<const N: usize>() -> crate::Result<[u8; N]> {
    let mut buf = [0u8; N];
    SystemRandom::new()
        .fill(&mut buf)
        .map_err(|_| CaError::Generation("system random source unavailable".into()))?;
    Ok(buf)
}

/// A certificate serial number drawn as 20 random bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Serial([u8; SERIAL_LEN]);

impl Serial {
    pub fn generate() -> crate::Result<Self> {
        random_bytes().map(Self)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Big-endian unsigned integer in hex, without leading zero bytes.
    pub fn to_hex(&self) -> String {
        serial_hex(&self.0)
    }
}

impl From<&Serial> for rcgen::SerialNumber {
    fn from(serial: &Serial) -> Self {
        Self::from(serial.as_bytes().to_vec())
    }
}

/// Hex form of a big-endian serial with leading zero bytes removed.
pub fn serial_hex(bytes: &[u8]) -> String {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    let trimmed = &bytes[start..];
    if trimmed.is_empty() {
        String::from("00")
    } else {
        hex::encode(trimmed)
    }
}

/// Subject CommonName assigned to an issued certificate.
///
/// Always lower-case hex, so it is safe to use as a file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CommonName(String);

impl CommonName {
    /// Draw a fresh 256-bit identifier.
    pub fn generate() -> crate::Result<Self> {
        let bytes: [u8; COMMON_NAME_BYTES] = random_bytes()?;
        Ok(Self(hex::encode(bytes)))
    }

    /// Accept an existing identifier, e.g. a file stem read back from storage.
    pub fn parse(value: &str) -> Option<Self> {
        let valid = value.len() == COMMON_NAME_BYTES * 2
            && value
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        valid.then(|| Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommonName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CommonName {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("not a generated common name: {value:?}"))
    }
}

impl From<CommonName> for String {
    fn from(cn: CommonName) -> Self {
        cn.0
    }
}
