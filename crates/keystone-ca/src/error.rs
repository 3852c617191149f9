//! Error types for CA bootstrap and certificate issuance.

use thiserror::Error;

/// Errors that can occur in keystone CA operations.
#[derive(Error, Debug)]
pub enum CaError {
    /// Input is not PEM, or the PEM block carries the wrong label.
    #[error("decode error: {0}")]
    Decode(String),

    /// A correctly labelled PEM block holds malformed DER, or a request
    /// carries a public key type that cannot be certified.
    #[error("parse error: {0}")]
    Parse(String),

    /// CA material in storage is unreadable or inconsistent.
    #[error("load error: {0}")]
    Load(String),

    /// Key pair, serial or identifier generation failed.
    #[error("generation error: {0}")]
    Generation(String),

    /// Certificate construction or signing failed.
    #[error("signing error: {0}")]
    Signing(String),

    /// Writing issued material to storage failed.
    #[error("persistence error ({key}): {source}")]
    Persistence {
        /// Storage key that could not be written
        key: String,
        /// Underlying IO failure
        #[source]
        source: std::io::Error,
    },

    /// Configuration is invalid or could not be read.
    #[error("config error: {0}")]
    Config(String),
}

/// Coarse classification of a [`CaError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Not PEM, or the wrong PEM label
    Decode,
    /// Malformed DER or an unsupported request key
    Parse,
    /// Stored CA material is missing, unreadable or inconsistent
    Load,
    /// Key, serial or identifier generation
    Generation,
    /// Certificate construction or signing
    Signing,
    /// Storage write failure
    Persistence,
    /// Invalid or unreadable configuration
    Config,
}

impl CaError {
    pub(crate) fn persistence(key: impl Into<String>, source: std::io::Error) -> Self {
        Self::Persistence {
            key: key.into(),
            source,
        }
    }

    /// Returns the kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Decode(_) => ErrorKind::Decode,
            Self::Parse(_) => ErrorKind::Parse,
            Self::Load(_) => ErrorKind::Load,
            Self::Generation(_) => ErrorKind::Generation,
            Self::Signing(_) => ErrorKind::Signing,
            Self::Persistence { .. } => ErrorKind::Persistence,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    /// Returns true if the caller supplied a malformed request.
    #[must_use]
    pub const fn is_input_error(&self) -> bool {
        matches!(self, Self::Decode(_) | Self::Parse(_))
    }
}
