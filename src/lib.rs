//! Pure-Rust RSA per PKCS#1 v2.1 (RFC 3447), with the full key-serialization
//! surface: PKCS#1 and PKCS#8 containers (including PBES1/PBES2 encrypted
//! envelopes), XML key values and raw component maps.
//!
//! A single [`RsaKey`] type carries both roles. Encryption defaults to OAEP,
//! signatures to PSS; the hash, MGF hash, salt length and padding modes are
//! all selectable at run time.
//!
//! ```
//! use rand::rngs::OsRng;
//! use rsakit::RsaKey;
//!
//! let key = RsaKey::generate(&mut OsRng, 2048).expect("key generation");
//! let ciphertext = key.encrypt(&mut OsRng, b"hello").expect("encrypt");
//! let plaintext = key.decrypt(&mut OsRng, &ciphertext).expect("decrypt");
//! assert_eq!(plaintext, b"hello");
//!
//! let signature = key.sign(&mut OsRng, b"signed message").expect("sign");
//! key.verify(b"signed message", &signature).expect("verify");
//! ```
//!
//! Private operations run through the Chinese Remainder Theorem whenever the
//! factorization is available and are blinded against timing side-channels
//! whenever the public exponent is known. All comparisons over secret-derived
//! bytes are constant time.

mod algorithms;
mod consttime;
mod dummy_rng;
pub mod errors;
mod formats;
mod hash;
mod key;

pub(crate) use dummy_rng::NoRng;

pub use crate::algorithms::generate::{KeyGenConfig, PartialKey};
pub use crate::errors::{Error, Result};
pub use crate::formats::envelope::{
    EncryptionAlgorithm, Pbes1Scheme, Pbes2Cipher, Pbes2Prf, Pkcs8WriteConfig,
};
pub use crate::formats::{KeyComponents, KeyFormat};
pub use crate::hash::HashAlg;
pub use crate::key::{EncryptionMode, FingerprintAlg, KeyGenOutcome, RsaKey, SignatureMode};
