use std::string::String;

pub type Result<T> = core::result::Result<T, Error>;

/// Error types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Unknown OID, unsupported cipher or PRF, or a multi-prime key offered
    /// to a format that only carries two primes.
    UnsupportedAlgorithm { what: String },
    /// Any padding-check or password failure while decrypting. Deliberately
    /// carries no detail: the message must not reveal which check failed.
    Decryption,
    /// Signature did not verify, or the signature bytes had the wrong length.
    InvalidSignature,
    /// Primitive input outside `[0, n)`.
    OutOfRange,
    /// Message too long for the padding scheme, or modulus too short for it.
    Length,
    /// ASN.1/XML decode failure or a missing required field.
    MalformedKey,
    /// Operation requires the private part of the key.
    MissingPrivateKey,
    /// Operation requires the public exponent, which this key does not carry.
    MissingPublicExponent,
    /// Internal consistency failure (e.g. the CRT fault check tripped).
    Internal,
}

impl std::error::Error for Error {}
impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            Error::UnsupportedAlgorithm { what } => write!(f, "unsupported algorithm: {}", what),
            Error::Decryption => write!(f, "decryption error"),
            Error::InvalidSignature => write!(f, "invalid signature"),
            Error::OutOfRange => write!(f, "input out of range"),
            Error::Length => write!(f, "length error"),
            Error::MalformedKey => write!(f, "malformed key"),
            Error::MissingPrivateKey => write!(f, "private key required"),
            Error::MissingPublicExponent => write!(f, "public exponent required"),
            Error::Internal => write!(f, "internal error"),
        }
    }
}

impl Error {
    pub(crate) fn unsupported(what: impl Into<String>) -> Error {
        Error::UnsupportedAlgorithm { what: what.into() }
    }
}
