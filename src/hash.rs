//! Runtime-selectable hash functions for padding schemes and fingerprints.

use digest::{Digest, DynDigest};
use md5::Md5;
use sha1::Sha1;
use sha2::{Sha224, Sha256, Sha384, Sha512};

/// The hash functions a key can be configured with.
///
/// The selection drives OAEP label/mask hashing, the PSS message hash, the
/// EMSA-PKCS1-v1_5 DigestInfo prefix and the PBES1 key derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlg {
    Md2,
    Md5,
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl Default for HashAlg {
    fn default() -> Self {
        HashAlg::Sha1
    }
}

impl HashAlg {
    /// Looks an algorithm up by name, case-insensitively. Dashes and
    /// underscores are ignored so that `"SHA-256"` and `"sha256"` agree.
    pub fn from_name(name: &str) -> Option<HashAlg> {
        let normalized: String = name
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "md2" => Some(HashAlg::Md2),
            "md5" => Some(HashAlg::Md5),
            "sha1" => Some(HashAlg::Sha1),
            "sha224" => Some(HashAlg::Sha224),
            "sha256" => Some(HashAlg::Sha256),
            "sha384" => Some(HashAlg::Sha384),
            "sha512" => Some(HashAlg::Sha512),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            HashAlg::Md2 => "md2",
            HashAlg::Md5 => "md5",
            HashAlg::Sha1 => "sha1",
            HashAlg::Sha224 => "sha224",
            HashAlg::Sha256 => "sha256",
            HashAlg::Sha384 => "sha384",
            HashAlg::Sha512 => "sha512",
        }
    }

    /// Digest length in bytes.
    pub fn output_size(&self) -> usize {
        match self {
            HashAlg::Md2 | HashAlg::Md5 => 16,
            HashAlg::Sha1 => 20,
            HashAlg::Sha224 => 28,
            HashAlg::Sha256 => 32,
            HashAlg::Sha384 => 48,
            HashAlg::Sha512 => 64,
        }
    }

    /// Internal block length in bytes, needed by the PKCS#12 derivation.
    pub(crate) fn block_size(&self) -> usize {
        match self {
            HashAlg::Md2 => 16,
            HashAlg::Md5 | HashAlg::Sha1 | HashAlg::Sha224 | HashAlg::Sha256 => 64,
            HashAlg::Sha384 | HashAlg::Sha512 => 128,
        }
    }

    /// Returns a fresh hasher as a trait object, for code paths where the
    /// algorithm is chosen at run time.
    pub fn new_digest(&self) -> Box<dyn DynDigest> {
        match self {
            HashAlg::Md2 => Box::new(md2::Md2::new()),
            HashAlg::Md5 => Box::new(Md5::new()),
            HashAlg::Sha1 => Box::new(Sha1::new()),
            HashAlg::Sha224 => Box::new(Sha224::new()),
            HashAlg::Sha256 => Box::new(Sha256::new()),
            HashAlg::Sha384 => Box::new(Sha384::new()),
            HashAlg::Sha512 => Box::new(Sha512::new()),
        }
    }

    /// One-shot digest.
    pub fn digest(&self, msg: &[u8]) -> Vec<u8> {
        let mut hasher = self.new_digest();
        hasher.update(msg);
        hasher.finalize().to_vec()
    }

    /// The fixed DER prefix of the `DigestInfo` structure for this algorithm,
    /// as listed in RFC 3447 §9.2. The digest itself follows the prefix.
    pub(crate) fn digest_info_prefix(&self) -> &'static [u8] {
        match self {
            HashAlg::Md2 => &[
                0x30, 0x20, 0x30, 0x0c, 0x06, 0x08, 0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x02, 0x02,
                0x05, 0x00, 0x04, 0x10,
            ],
            HashAlg::Md5 => &[
                0x30, 0x20, 0x30, 0x0c, 0x06, 0x08, 0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x02, 0x05,
                0x05, 0x00, 0x04, 0x10,
            ],
            HashAlg::Sha1 => &[
                0x30, 0x21, 0x30, 0x09, 0x06, 0x05, 0x2b, 0x0e, 0x03, 0x02, 0x1a, 0x05, 0x00, 0x04,
                0x14,
            ],
            HashAlg::Sha224 => &[
                0x30, 0x2d, 0x30, 0x0d, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02,
                0x04, 0x05, 0x00, 0x04, 0x1c,
            ],
            HashAlg::Sha256 => &[
                0x30, 0x31, 0x30, 0x0d, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02,
                0x01, 0x05, 0x00, 0x04, 0x20,
            ],
            HashAlg::Sha384 => &[
                0x30, 0x41, 0x30, 0x0d, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02,
                0x02, 0x05, 0x00, 0x04, 0x30,
            ],
            HashAlg::Sha512 => &[
                0x30, 0x51, 0x30, 0x0d, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02,
                0x03, 0x05, 0x00, 0x04, 0x40,
            ],
        }
    }
}
