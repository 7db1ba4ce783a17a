//! The PKCS#8 encryption envelope: PBES1 and PBES2 parameter parsing, key
//! derivation (PBKDF1, PBKDF2, PKCS#12) and the symmetric-cipher dispatch.

use cipher::block_padding::Pkcs7;
use cipher::consts::{U16, U5};
use cipher::{
    BlockCipher, BlockDecryptMut, BlockEncryptMut, InnerIvInit, KeyInit, KeyIvInit, StreamCipher,
};
use lazy_static::lazy_static;
use pbkdf2::pbkdf2_hmac;
use rand_core::CryptoRngCore;
use rc4::Rc4;
use simple_asn1::{ASN1Block, OID};
use zeroize::Zeroizing;

use super::asn1::{block_to_usize, oid, uint_block};
use crate::errors::{Error, Result};
use crate::hash::HashAlg;

lazy_static! {
    static ref OID_PBES2: OID = oid(&[1, 2, 840, 113549, 1, 5, 13]);
    static ref OID_PBKDF2: OID = oid(&[1, 2, 840, 113549, 1, 5, 12]);
    static ref OID_PBMAC1: OID = oid(&[1, 2, 840, 113549, 1, 5, 14]);
    static ref OID_HMAC_SHA1: OID = oid(&[1, 2, 840, 113549, 2, 7]);
    static ref OID_HMAC_SHA224: OID = oid(&[1, 2, 840, 113549, 2, 8]);
    static ref OID_HMAC_SHA256: OID = oid(&[1, 2, 840, 113549, 2, 9]);
    static ref OID_HMAC_SHA384: OID = oid(&[1, 2, 840, 113549, 2, 10]);
    static ref OID_HMAC_SHA512: OID = oid(&[1, 2, 840, 113549, 2, 11]);
    static ref OID_DES_CBC: OID = oid(&[1, 3, 14, 3, 2, 7]);
    static ref OID_DES_EDE3_CBC: OID = oid(&[1, 2, 840, 113549, 3, 7]);
    static ref OID_RC2_CBC: OID = oid(&[1, 2, 840, 113549, 3, 2]);
    static ref OID_AES128_CBC: OID = oid(&[2, 16, 840, 1, 101, 3, 4, 1, 2]);
    static ref OID_AES192_CBC: OID = oid(&[2, 16, 840, 1, 101, 3, 4, 1, 22]);
    static ref OID_AES256_CBC: OID = oid(&[2, 16, 840, 1, 101, 3, 4, 1, 42]);
}

/// The PBES1 algorithm family: PKCS#5 §6.1 plus the PKCS#12 PBE variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pbes1Scheme {
    Md2AndDesCbc,
    Md2AndRc2Cbc,
    Md5AndDesCbc,
    Md5AndRc2Cbc,
    Sha1AndDesCbc,
    Sha1AndRc2Cbc,
    Sha1And128BitRc4,
    Sha1And40BitRc4,
    Sha1And3KeyTripleDesCbc,
    Sha1And2KeyTripleDesCbc,
    Sha1And128BitRc2Cbc,
    Sha1And40BitRc2Cbc,
}

impl Pbes1Scheme {
    fn oid_parts(&self) -> &'static [u64] {
        match self {
            Pbes1Scheme::Md2AndDesCbc => &[1, 2, 840, 113549, 1, 5, 1],
            Pbes1Scheme::Md2AndRc2Cbc => &[1, 2, 840, 113549, 1, 5, 4],
            Pbes1Scheme::Md5AndDesCbc => &[1, 2, 840, 113549, 1, 5, 3],
            Pbes1Scheme::Md5AndRc2Cbc => &[1, 2, 840, 113549, 1, 5, 6],
            Pbes1Scheme::Sha1AndDesCbc => &[1, 2, 840, 113549, 1, 5, 10],
            Pbes1Scheme::Sha1AndRc2Cbc => &[1, 2, 840, 113549, 1, 5, 11],
            Pbes1Scheme::Sha1And128BitRc4 => &[1, 2, 840, 113549, 1, 12, 1, 1],
            Pbes1Scheme::Sha1And40BitRc4 => &[1, 2, 840, 113549, 1, 12, 1, 2],
            Pbes1Scheme::Sha1And3KeyTripleDesCbc => &[1, 2, 840, 113549, 1, 12, 1, 3],
            Pbes1Scheme::Sha1And2KeyTripleDesCbc => &[1, 2, 840, 113549, 1, 12, 1, 4],
            Pbes1Scheme::Sha1And128BitRc2Cbc => &[1, 2, 840, 113549, 1, 12, 1, 5],
            Pbes1Scheme::Sha1And40BitRc2Cbc => &[1, 2, 840, 113549, 1, 12, 1, 6],
        }
    }

    fn from_oid(candidate: &OID) -> Option<Pbes1Scheme> {
        const ALL: [Pbes1Scheme; 12] = [
            Pbes1Scheme::Md2AndDesCbc,
            Pbes1Scheme::Md2AndRc2Cbc,
            Pbes1Scheme::Md5AndDesCbc,
            Pbes1Scheme::Md5AndRc2Cbc,
            Pbes1Scheme::Sha1AndDesCbc,
            Pbes1Scheme::Sha1AndRc2Cbc,
            Pbes1Scheme::Sha1And128BitRc4,
            Pbes1Scheme::Sha1And40BitRc4,
            Pbes1Scheme::Sha1And3KeyTripleDesCbc,
            Pbes1Scheme::Sha1And2KeyTripleDesCbc,
            Pbes1Scheme::Sha1And128BitRc2Cbc,
            Pbes1Scheme::Sha1And40BitRc2Cbc,
        ];
        ALL.iter()
            .find(|s| &oid(s.oid_parts()) == candidate)
            .copied()
    }

    fn hash(&self) -> HashAlg {
        match self {
            Pbes1Scheme::Md2AndDesCbc | Pbes1Scheme::Md2AndRc2Cbc => HashAlg::Md2,
            Pbes1Scheme::Md5AndDesCbc | Pbes1Scheme::Md5AndRc2Cbc => HashAlg::Md5,
            _ => HashAlg::Sha1,
        }
    }

    /// The PKCS#12 OID arc uses the PKCS#12 derivation; the PKCS#5 arc uses
    /// PBKDF1.
    fn is_pkcs12(&self) -> bool {
        self.oid_parts()[5] == 12
    }

    fn cipher(&self) -> CipherSpec {
        match self {
            Pbes1Scheme::Md2AndDesCbc | Pbes1Scheme::Md5AndDesCbc | Pbes1Scheme::Sha1AndDesCbc => {
                CipherSpec::DesCbc
            }
            // PBES1 proper pins RC2 to a 64-bit effective key.
            Pbes1Scheme::Md2AndRc2Cbc | Pbes1Scheme::Md5AndRc2Cbc | Pbes1Scheme::Sha1AndRc2Cbc => {
                CipherSpec::Rc2Cbc {
                    eff_bits: 64,
                    key_len: 8,
                }
            }
            Pbes1Scheme::Sha1And128BitRc4 => CipherSpec::Rc4 { key_len: 16 },
            Pbes1Scheme::Sha1And40BitRc4 => CipherSpec::Rc4 { key_len: 5 },
            Pbes1Scheme::Sha1And3KeyTripleDesCbc => CipherSpec::TdesEde3Cbc,
            Pbes1Scheme::Sha1And2KeyTripleDesCbc => CipherSpec::TdesEde2Cbc,
            Pbes1Scheme::Sha1And128BitRc2Cbc => CipherSpec::Rc2Cbc {
                eff_bits: 128,
                key_len: 16,
            },
            Pbes1Scheme::Sha1And40BitRc2Cbc => CipherSpec::Rc2Cbc {
                eff_bits: 40,
                key_len: 5,
            },
        }
    }
}

/// Ciphers selectable for the PBES2 write side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pbes2Cipher {
    Aes128Cbc,
    Aes192Cbc,
    Aes256Cbc,
    DesEde3Cbc,
    DesCbc,
}

impl Pbes2Cipher {
    fn spec(&self) -> CipherSpec {
        match self {
            Pbes2Cipher::Aes128Cbc => CipherSpec::Aes128Cbc,
            Pbes2Cipher::Aes192Cbc => CipherSpec::Aes192Cbc,
            Pbes2Cipher::Aes256Cbc => CipherSpec::Aes256Cbc,
            Pbes2Cipher::DesEde3Cbc => CipherSpec::TdesEde3Cbc,
            Pbes2Cipher::DesCbc => CipherSpec::DesCbc,
        }
    }

    fn oid_ref(&self) -> &'static OID {
        match self {
            Pbes2Cipher::Aes128Cbc => &OID_AES128_CBC,
            Pbes2Cipher::Aes192Cbc => &OID_AES192_CBC,
            Pbes2Cipher::Aes256Cbc => &OID_AES256_CBC,
            Pbes2Cipher::DesEde3Cbc => &OID_DES_EDE3_CBC,
            Pbes2Cipher::DesCbc => &OID_DES_CBC,
        }
    }
}

/// PBKDF2 pseudo-random functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pbes2Prf {
    HmacSha1,
    HmacSha224,
    HmacSha256,
    HmacSha384,
    HmacSha512,
}

impl Pbes2Prf {
    fn from_oid(candidate: &OID) -> Option<Pbes2Prf> {
        if candidate == &*OID_HMAC_SHA1 {
            Some(Pbes2Prf::HmacSha1)
        } else if candidate == &*OID_HMAC_SHA224 {
            Some(Pbes2Prf::HmacSha224)
        } else if candidate == &*OID_HMAC_SHA256 {
            Some(Pbes2Prf::HmacSha256)
        } else if candidate == &*OID_HMAC_SHA384 {
            Some(Pbes2Prf::HmacSha384)
        } else if candidate == &*OID_HMAC_SHA512 {
            Some(Pbes2Prf::HmacSha512)
        } else {
            None
        }
    }

    fn oid_ref(&self) -> &'static OID {
        match self {
            Pbes2Prf::HmacSha1 => &OID_HMAC_SHA1,
            Pbes2Prf::HmacSha224 => &OID_HMAC_SHA224,
            Pbes2Prf::HmacSha256 => &OID_HMAC_SHA256,
            Pbes2Prf::HmacSha384 => &OID_HMAC_SHA384,
            Pbes2Prf::HmacSha512 => &OID_HMAC_SHA512,
        }
    }

    fn derive(&self, password: &[u8], salt: &[u8], rounds: u32, out: &mut [u8]) {
        match self {
            Pbes2Prf::HmacSha1 => pbkdf2_hmac::<sha1::Sha1>(password, salt, rounds, out),
            Pbes2Prf::HmacSha224 => pbkdf2_hmac::<sha2::Sha224>(password, salt, rounds, out),
            Pbes2Prf::HmacSha256 => pbkdf2_hmac::<sha2::Sha256>(password, salt, rounds, out),
            Pbes2Prf::HmacSha384 => pbkdf2_hmac::<sha2::Sha384>(password, salt, rounds, out),
            Pbes2Prf::HmacSha512 => pbkdf2_hmac::<sha2::Sha512>(password, salt, rounds, out),
        }
    }
}

/// Outer algorithm chosen when writing an encrypted PKCS#8 container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionAlgorithm {
    Pbes2,
    Pbes1(Pbes1Scheme),
}

/// Write-side defaults for encrypted PKCS#8 containers. Held by the key, not
/// in process globals, so two keys can serialize with different settings.
#[derive(Debug, Clone)]
pub struct Pkcs8WriteConfig {
    pub algorithm: EncryptionAlgorithm,
    /// Cipher used when `algorithm` is PBES2.
    pub cipher: Pbes2Cipher,
    /// PRF used when `algorithm` is PBES2.
    pub prf: Pbes2Prf,
    pub iteration_count: usize,
}

impl Default for Pkcs8WriteConfig {
    fn default() -> Self {
        Pkcs8WriteConfig {
            algorithm: EncryptionAlgorithm::Pbes2,
            cipher: Pbes2Cipher::Aes128Cbc,
            prf: Pbes2Prf::HmacSha256,
            iteration_count: 2048,
        }
    }
}

const SALT_LEN: usize = 8;

/// The concrete symmetric transform an envelope resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CipherSpec {
    DesCbc,
    TdesEde3Cbc,
    TdesEde2Cbc,
    Rc2Cbc { eff_bits: usize, key_len: usize },
    Rc4 { key_len: usize },
    Aes128Cbc,
    Aes192Cbc,
    Aes256Cbc,
}

impl CipherSpec {
    fn key_len(&self) -> usize {
        match self {
            CipherSpec::DesCbc => 8,
            CipherSpec::TdesEde3Cbc => 24,
            CipherSpec::TdesEde2Cbc => 16,
            CipherSpec::Rc2Cbc { key_len, .. } => *key_len,
            CipherSpec::Rc4 { key_len } => *key_len,
            CipherSpec::Aes128Cbc => 16,
            CipherSpec::Aes192Cbc => 24,
            CipherSpec::Aes256Cbc => 32,
        }
    }

    fn iv_len(&self) -> usize {
        match self {
            CipherSpec::Rc4 { .. } => 0,
            CipherSpec::Aes128Cbc | CipherSpec::Aes192Cbc | CipherSpec::Aes256Cbc => 16,
            _ => 8,
        }
    }

    fn decrypt(&self, key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
        if key.len() != self.key_len() || iv.len() != self.iv_len() {
            return Err(Error::Decryption);
        }
        match self {
            CipherSpec::DesCbc => cbc_decrypt::<des::Des>(key, iv, data),
            CipherSpec::TdesEde3Cbc => cbc_decrypt::<des::TdesEde3>(key, iv, data),
            CipherSpec::TdesEde2Cbc => cbc_decrypt::<des::TdesEde2>(key, iv, data),
            CipherSpec::Rc2Cbc { eff_bits, .. } => {
                let rc2 = rc2::Rc2::new_with_eff_key_len(key, *eff_bits);
                cbc::Decryptor::<rc2::Rc2>::inner_iv_slice_init(rc2, iv)
                    .map_err(|_| Error::Decryption)?
                    .decrypt_padded_vec_mut::<Pkcs7>(data)
                    .map_err(|_| Error::Decryption)
            }
            CipherSpec::Rc4 { .. } => rc4_apply(key, data).ok_or(Error::Decryption),
            CipherSpec::Aes128Cbc => cbc_decrypt::<aes::Aes128>(key, iv, data),
            CipherSpec::Aes192Cbc => cbc_decrypt::<aes::Aes192>(key, iv, data),
            CipherSpec::Aes256Cbc => cbc_decrypt::<aes::Aes256>(key, iv, data),
        }
    }

    fn encrypt(&self, key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
        if key.len() != self.key_len() || iv.len() != self.iv_len() {
            return Err(Error::Internal);
        }
        match self {
            CipherSpec::DesCbc => cbc_encrypt::<des::Des>(key, iv, data),
            CipherSpec::TdesEde3Cbc => cbc_encrypt::<des::TdesEde3>(key, iv, data),
            CipherSpec::TdesEde2Cbc => cbc_encrypt::<des::TdesEde2>(key, iv, data),
            CipherSpec::Rc2Cbc { eff_bits, .. } => {
                let rc2 = rc2::Rc2::new_with_eff_key_len(key, *eff_bits);
                Ok(cbc::Encryptor::<rc2::Rc2>::inner_iv_slice_init(rc2, iv)
                    .map_err(|_| Error::Internal)?
                    .encrypt_padded_vec_mut::<Pkcs7>(data))
            }
            CipherSpec::Rc4 { .. } => rc4_apply(key, data).ok_or(Error::Internal),
            CipherSpec::Aes128Cbc => cbc_encrypt::<aes::Aes128>(key, iv, data),
            CipherSpec::Aes192Cbc => cbc_encrypt::<aes::Aes192>(key, iv, data),
            CipherSpec::Aes256Cbc => cbc_encrypt::<aes::Aes256>(key, iv, data),
        }
    }
}

fn cbc_decrypt<C>(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>>
where
    C: BlockDecryptMut + BlockCipher + KeyInit,
{
    cbc::Decryptor::<C>::new_from_slices(key, iv)
        .map_err(|_| Error::Decryption)?
        .decrypt_padded_vec_mut::<Pkcs7>(data)
        .map_err(|_| Error::Decryption)
}

fn cbc_encrypt<C>(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>>
where
    C: BlockEncryptMut + BlockCipher + KeyInit,
{
    Ok(cbc::Encryptor::<C>::new_from_slices(key, iv)
        .map_err(|_| Error::Internal)?
        .encrypt_padded_vec_mut::<Pkcs7>(data))
}

/// RC4 is its own inverse; `None` only on an unsupported key size.
fn rc4_apply(key: &[u8], data: &[u8]) -> Option<Vec<u8>> {
    let mut out = data.to_vec();
    match key.len() {
        5 => Rc4::<U5>::new_from_slice(key).ok()?.apply_keystream(&mut out),
        16 => Rc4::<U16>::new_from_slice(key).ok()?.apply_keystream(&mut out),
        _ => return None,
    }
    Some(out)
}

// --- key derivation --------------------------------------------------------

/// PBKDF1 (RFC 8018 §5.1). The derived key cannot exceed the hash length.
fn pbkdf1(
    hash: HashAlg,
    password: &[u8],
    salt: &[u8],
    rounds: usize,
    dk_len: usize,
) -> Result<Zeroizing<Vec<u8>>> {
    if dk_len > hash.output_size() || rounds == 0 {
        return Err(Error::unsupported("PBKDF1 parameters"));
    }

    let mut hasher = hash.new_digest();
    hasher.update(password);
    hasher.update(salt);
    let mut t = hasher.finalize_reset().to_vec();
    for _ in 1..rounds {
        t = hash.digest(&t);
    }
    t.truncate(dk_len);
    Ok(Zeroizing::new(t))
}

/// The PKCS#12 password transformation: UTF-16BE code units with a trailing
/// NUL terminator (RFC 7292 Appendix B.1).
fn pkcs12_password(password: &[u8]) -> Zeroizing<Vec<u8>> {
    if password.is_empty() {
        return Zeroizing::new(Vec::new());
    }
    let text = String::from_utf8_lossy(password);
    let mut out = Vec::with_capacity((password.len() + 1) * 2);
    for unit in text.encode_utf16() {
        out.extend_from_slice(&unit.to_be_bytes());
    }
    out.extend_from_slice(&[0, 0]);
    Zeroizing::new(out)
}

/// The PKCS#12 derivation (RFC 7292 Appendix B.2). `id` is 1 for key
/// material, 2 for IVs.
fn pkcs12_kdf(
    hash: HashAlg,
    password: &[u8],
    salt: &[u8],
    id: u8,
    rounds: usize,
    out_len: usize,
) -> Zeroizing<Vec<u8>> {
    let u = hash.output_size();
    let v = hash.block_size();

    let diversifier = vec![id; v];
    let extend = |data: &[u8]| -> Vec<u8> {
        if data.is_empty() {
            return Vec::new();
        }
        let len = v * ((data.len() + v - 1) / v);
        (0..len).map(|i| data[i % data.len()]).collect()
    };

    let mut work = extend(salt);
    work.extend(extend(password));

    let mut out = Zeroizing::new(Vec::with_capacity(out_len + u));
    while out.len() < out_len {
        let mut a = {
            let mut hasher = hash.new_digest();
            hasher.update(&diversifier);
            hasher.update(&work);
            hasher.finalize_reset().to_vec()
        };
        for _ in 1..rounds {
            a = hash.digest(&a);
        }

        // B is A repeated out to one hash block; each block of the working
        // buffer is incremented by B + 1 with big-endian carry.
        let b: Vec<u8> = (0..v).map(|i| a[i % u]).collect();
        for chunk in work.chunks_mut(v) {
            let mut carry = 1u16;
            for (w, add) in chunk.iter_mut().rev().zip(b.iter().rev()) {
                let sum = *w as u16 + *add as u16 + carry;
                *w = sum as u8;
                carry = sum >> 8;
            }
        }

        out.extend_from_slice(&a);
    }
    out.truncate(out_len);
    out
}

/// Derives (key, iv) for a PBES1 scheme.
fn pbes1_key_iv(
    scheme: Pbes1Scheme,
    password: &[u8],
    salt: &[u8],
    rounds: usize,
) -> Result<(Zeroizing<Vec<u8>>, Vec<u8>)> {
    let cipher = scheme.cipher();
    if scheme.is_pkcs12() {
        let transformed = pkcs12_password(password);
        let key = pkcs12_kdf(scheme.hash(), &transformed, salt, 1, rounds, cipher.key_len());
        let iv = if cipher.iv_len() > 0 {
            pkcs12_kdf(scheme.hash(), &transformed, salt, 2, rounds, cipher.iv_len()).to_vec()
        } else {
            Vec::new()
        };
        Ok((key, iv))
    } else {
        // PBKDF1 yields one 16-byte block: 8 bytes of key, 8 of IV.
        let derived = pbkdf1(scheme.hash(), password, salt, rounds, 16)?;
        let key = Zeroizing::new(derived[..8].to_vec());
        let iv = derived[8..].to_vec();
        Ok((key, iv))
    }
}

// --- envelope parsing ------------------------------------------------------

fn oid_string(candidate: &OID) -> String {
    candidate
        .as_vec::<u64>()
        .map(|parts| {
            parts
                .iter()
                .map(|p| p.to_string())
                .collect::<Vec<_>>()
                .join(".")
        })
        .unwrap_or_else(|_| "oid".into())
}

fn as_octet_string(block: &ASN1Block) -> Option<&[u8]> {
    match block {
        ASN1Block::OctetString(_, data) => Some(data),
        _ => None,
    }
}

/// `PBEParameter ::= SEQUENCE { salt OCTET STRING, iterationCount INTEGER }`
fn parse_pbe_parameter(block: &ASN1Block) -> Result<(&[u8], usize)> {
    let fields = match block {
        ASN1Block::Sequence(_, fields) if fields.len() == 2 => fields,
        _ => return Err(Error::MalformedKey),
    };
    let salt = as_octet_string(&fields[0]).ok_or(Error::MalformedKey)?;
    let rounds = block_to_usize(&fields[1]).ok_or(Error::MalformedKey)?;
    Ok((salt, rounds))
}

struct Pbkdf2Params<'a> {
    salt: &'a [u8],
    rounds: usize,
    key_len: Option<usize>,
    prf: Pbes2Prf,
}

/// `PBKDF2-params ::= SEQUENCE { salt, iterationCount, keyLength OPTIONAL,
/// prf DEFAULT hmacWithSHA1 }`
fn parse_pbkdf2_params(block: &ASN1Block) -> Result<Pbkdf2Params<'_>> {
    let fields = match block {
        ASN1Block::Sequence(_, fields) if (2..=4).contains(&fields.len()) => fields,
        _ => return Err(Error::MalformedKey),
    };
    let salt = as_octet_string(&fields[0]).ok_or(Error::MalformedKey)?;
    let rounds = block_to_usize(&fields[1]).ok_or(Error::MalformedKey)?;

    let mut key_len = None;
    let mut prf = Pbes2Prf::HmacSha1;
    for field in &fields[2..] {
        match field {
            ASN1Block::Integer(..) => {
                key_len = Some(block_to_usize(field).ok_or(Error::MalformedKey)?);
            }
            ASN1Block::Sequence(_, alg) => {
                let prf_oid = match alg.first() {
                    Some(ASN1Block::ObjectIdentifier(_, o)) => o,
                    _ => return Err(Error::MalformedKey),
                };
                prf = Pbes2Prf::from_oid(prf_oid)
                    .ok_or_else(|| Error::unsupported(oid_string(prf_oid)))?;
            }
            _ => return Err(Error::MalformedKey),
        }
    }

    Ok(Pbkdf2Params {
        salt,
        rounds,
        key_len,
        prf,
    })
}

/// Resolves a PBES2 `encryptionScheme` AlgorithmIdentifier to a cipher and
/// its IV.
fn parse_pbes2_scheme(block: &ASN1Block) -> Result<(CipherSpec, Vec<u8>)> {
    let fields = match block {
        ASN1Block::Sequence(_, fields) if fields.len() == 2 => fields,
        _ => return Err(Error::MalformedKey),
    };
    let scheme_oid = match &fields[0] {
        ASN1Block::ObjectIdentifier(_, o) => o,
        _ => return Err(Error::MalformedKey),
    };

    if scheme_oid == &*OID_RC2_CBC {
        // RC2-CBC-Parameter ::= SEQUENCE { rc2ParameterVersion INTEGER
        // OPTIONAL, iv OCTET STRING }. Without a version the effective key
        // length stays at 128 bits; the version table is 160 -> 40,
        // 120 -> 64, 58 -> 128, anything else -> 256.
        let params = match &fields[1] {
            ASN1Block::Sequence(_, params) if (1..=2).contains(&params.len()) => params,
            _ => return Err(Error::MalformedKey),
        };
        let (version, iv_block) = if params.len() == 2 {
            (
                Some(block_to_usize(&params[0]).ok_or(Error::MalformedKey)?),
                &params[1],
            )
        } else {
            (None, &params[0])
        };
        let iv = as_octet_string(iv_block).ok_or(Error::MalformedKey)?;
        let eff_bits = match version {
            None => 128,
            Some(160) => 40,
            Some(120) => 64,
            Some(58) => 128,
            Some(_) => 256,
        };
        return Ok((
            CipherSpec::Rc2Cbc {
                eff_bits,
                key_len: eff_bits / 8,
            },
            iv.to_vec(),
        ));
    }

    let spec = if scheme_oid == &*OID_DES_CBC {
        CipherSpec::DesCbc
    } else if scheme_oid == &*OID_DES_EDE3_CBC {
        CipherSpec::TdesEde3Cbc
    } else if scheme_oid == &*OID_AES128_CBC {
        CipherSpec::Aes128Cbc
    } else if scheme_oid == &*OID_AES192_CBC {
        CipherSpec::Aes192Cbc
    } else if scheme_oid == &*OID_AES256_CBC {
        CipherSpec::Aes256Cbc
    } else {
        // rc5-CBC-PAD lands here deliberately.
        return Err(Error::unsupported(oid_string(scheme_oid)));
    };

    let iv = as_octet_string(&fields[1]).ok_or(Error::MalformedKey)?;
    Ok((spec, iv.to_vec()))
}

/// Decrypts the `encryptedData` of an `EncryptedPrivateKeyInfo` whose
/// `encryptionAlgorithm` children are `alg`.
pub(crate) fn decrypt(alg: &[ASN1Block], data: &[u8], password: &[u8]) -> Result<Vec<u8>> {
    let alg_oid = match alg.first() {
        Some(ASN1Block::ObjectIdentifier(_, o)) => o,
        _ => return Err(Error::MalformedKey),
    };
    let params = alg.get(1).ok_or(Error::MalformedKey)?;

    if alg_oid == &*OID_PBES2 {
        let fields = match params {
            ASN1Block::Sequence(_, fields) if fields.len() == 2 => fields,
            _ => return Err(Error::MalformedKey),
        };

        // keyDerivationFunc must be id-PBKDF2.
        let kdf_fields = match &fields[0] {
            ASN1Block::Sequence(_, kdf) if kdf.len() == 2 => kdf,
            _ => return Err(Error::MalformedKey),
        };
        let kdf_oid = match &kdf_fields[0] {
            ASN1Block::ObjectIdentifier(_, o) => o,
            _ => return Err(Error::MalformedKey),
        };
        if kdf_oid != &*OID_PBKDF2 {
            return Err(Error::unsupported(oid_string(kdf_oid)));
        }
        let kdf = parse_pbkdf2_params(&kdf_fields[1])?;

        let (mut cipher, iv) = parse_pbes2_scheme(&fields[1])?;
        let key_len = kdf.key_len.unwrap_or_else(|| cipher.key_len());
        // RC2 is the one scheme whose key size is genuinely variable; an
        // explicit PBKDF2 keyLength overrides the version-derived size.
        if let CipherSpec::Rc2Cbc { eff_bits, .. } = cipher {
            cipher = CipherSpec::Rc2Cbc { eff_bits, key_len };
        }

        let mut key = Zeroizing::new(vec![0u8; key_len]);
        kdf.prf
            .derive(password, kdf.salt, kdf.rounds as u32, &mut key);
        return cipher.decrypt(&key, &iv, data);
    }

    if alg_oid == &*OID_PBMAC1 {
        return Err(Error::unsupported(oid_string(alg_oid)));
    }

    if let Some(scheme) = Pbes1Scheme::from_oid(alg_oid) {
        let (salt, rounds) = parse_pbe_parameter(params)?;
        let (key, iv) = pbes1_key_iv(scheme, password, salt, rounds)?;
        return scheme.cipher().decrypt(&key, &iv, data);
    }

    Err(Error::unsupported(oid_string(alg_oid)))
}

/// Encrypts `plaintext` under `config`, returning the
/// `encryptionAlgorithm` AlgorithmIdentifier block and the ciphertext.
pub(crate) fn encrypt<R: CryptoRngCore + ?Sized>(
    rng: &mut R,
    config: &Pkcs8WriteConfig,
    plaintext: &[u8],
    password: &[u8],
) -> Result<(ASN1Block, Vec<u8>)> {
    let mut salt = vec![0u8; SALT_LEN];
    rng.fill_bytes(&mut salt);
    let rounds = config.iteration_count.max(1);

    match config.algorithm {
        EncryptionAlgorithm::Pbes2 => {
            let cipher = config.cipher.spec();
            let mut iv = vec![0u8; cipher.iv_len()];
            rng.fill_bytes(&mut iv);

            let mut key = Zeroizing::new(vec![0u8; cipher.key_len()]);
            config.prf.derive(password, &salt, rounds as u32, &mut key);
            let data = cipher.encrypt(&key, &iv, plaintext)?;

            let kdf_alg = ASN1Block::Sequence(
                0,
                vec![
                    ASN1Block::ObjectIdentifier(0, OID_PBKDF2.clone()),
                    ASN1Block::Sequence(
                        0,
                        vec![
                            ASN1Block::OctetString(0, salt),
                            uint_block(&rounds.into()),
                            ASN1Block::Sequence(
                                0,
                                vec![
                                    ASN1Block::ObjectIdentifier(0, config.prf.oid_ref().clone()),
                                    ASN1Block::Null(0),
                                ],
                            ),
                        ],
                    ),
                ],
            );
            let scheme_alg = ASN1Block::Sequence(
                0,
                vec![
                    ASN1Block::ObjectIdentifier(0, config.cipher.oid_ref().clone()),
                    ASN1Block::OctetString(0, iv),
                ],
            );
            let alg = ASN1Block::Sequence(
                0,
                vec![
                    ASN1Block::ObjectIdentifier(0, OID_PBES2.clone()),
                    ASN1Block::Sequence(0, vec![kdf_alg, scheme_alg]),
                ],
            );
            Ok((alg, data))
        }
        EncryptionAlgorithm::Pbes1(scheme) => {
            let (key, iv) = pbes1_key_iv(scheme, password, &salt, rounds)?;
            let data = scheme.cipher().encrypt(&key, &iv, plaintext)?;

            let alg = ASN1Block::Sequence(
                0,
                vec![
                    ASN1Block::ObjectIdentifier(0, oid(scheme.oid_parts())),
                    ASN1Block::Sequence(
                        0,
                        vec![ASN1Block::OctetString(0, salt), uint_block(&rounds.into())],
                    ),
                ],
            );
            Ok((alg, data))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::ChaCha8Rng;
    use rand_core::SeedableRng;

    const SALT: [u8; 8] = [0, 1, 2, 3, 4, 5, 6, 7];

    #[test]
    fn test_pbkdf1_md5() {
        let dk = pbkdf1(HashAlg::Md5, b"password", &SALT, 1000, 16).unwrap();
        assert_eq!(hex::encode(&*dk), "37393a7dccec61c97ff50e194cca8940");
    }

    #[test]
    fn test_pbkdf1_sha1() {
        let dk = pbkdf1(HashAlg::Sha1, b"password", &SALT, 2048, 16).unwrap();
        assert_eq!(hex::encode(&*dk), "b49ebd09fa49c05d3cb1530a961871ed");
    }

    #[test]
    fn test_pbkdf1_output_bounded_by_hash() {
        assert!(pbkdf1(HashAlg::Md5, b"pw", &SALT, 10, 17).is_err());
    }

    #[test]
    fn test_pkcs12_kdf_sha1() {
        let pw = pkcs12_password(b"password");
        let key = pkcs12_kdf(HashAlg::Sha1, &pw, &SALT, 1, 2048, 24);
        assert_eq!(
            hex::encode(&*key),
            "d0fced80aa6413a0b14c5c21d5869a78e3bbf36d4fd2a7fa"
        );
        let iv = pkcs12_kdf(HashAlg::Sha1, &pw, &SALT, 2, 2048, 8);
        assert_eq!(hex::encode(&*iv), "ea35854d10fc84f3");
    }

    #[test]
    fn test_cipher_roundtrips() {
        let specs = [
            CipherSpec::DesCbc,
            CipherSpec::TdesEde3Cbc,
            CipherSpec::TdesEde2Cbc,
            CipherSpec::Rc2Cbc {
                eff_bits: 128,
                key_len: 16,
            },
            CipherSpec::Rc4 { key_len: 16 },
            CipherSpec::Aes128Cbc,
            CipherSpec::Aes192Cbc,
            CipherSpec::Aes256Cbc,
        ];
        for spec in specs {
            let key = vec![0x5A; spec.key_len()];
            let iv = vec![0xA5; spec.iv_len()];
            let ct = spec.encrypt(&key, &iv, b"attack at dawn").unwrap();
            assert_ne!(&ct[..], b"attack at dawn");
            let pt = spec.decrypt(&key, &iv, &ct).unwrap();
            assert_eq!(pt, b"attack at dawn");
        }
    }

    #[test]
    fn test_envelope_roundtrip_all_algorithms() {
        let mut rng = ChaCha8Rng::from_seed([21; 32]);
        let plaintext = b"-- rsa private key bytes --";

        let mut configs = vec![Pkcs8WriteConfig::default()];
        for cipher in [
            Pbes2Cipher::Aes256Cbc,
            Pbes2Cipher::DesEde3Cbc,
            Pbes2Cipher::DesCbc,
        ] {
            configs.push(Pkcs8WriteConfig {
                cipher,
                prf: Pbes2Prf::HmacSha1,
                iteration_count: 100,
                ..Pkcs8WriteConfig::default()
            });
        }
        for scheme in [
            Pbes1Scheme::Md5AndDesCbc,
            Pbes1Scheme::Sha1AndRc2Cbc,
            Pbes1Scheme::Sha1And3KeyTripleDesCbc,
            Pbes1Scheme::Sha1And128BitRc4,
            Pbes1Scheme::Sha1And40BitRc2Cbc,
        ] {
            configs.push(Pkcs8WriteConfig {
                algorithm: EncryptionAlgorithm::Pbes1(scheme),
                iteration_count: 100,
                ..Pkcs8WriteConfig::default()
            });
        }

        for config in configs {
            let (alg, data) = encrypt(&mut rng, &config, plaintext, b"hunter2").unwrap();
            let alg_children = match alg {
                ASN1Block::Sequence(_, children) => children,
                _ => panic!("algorithm identifier must be a sequence"),
            };
            let plain = decrypt(&alg_children, &data, b"hunter2").unwrap();
            assert_eq!(plain, plaintext);

            // CBC modes notice a wrong password at unpadding time.
            if !matches!(
                config.algorithm,
                EncryptionAlgorithm::Pbes1(
                    Pbes1Scheme::Sha1And128BitRc4 | Pbes1Scheme::Sha1And40BitRc4
                )
            ) {
                match decrypt(&alg_children, &data, b"wrong") {
                    Err(Error::Decryption) => {}
                    Ok(other) => assert_ne!(other, plaintext),
                    Err(e) => panic!("unexpected error: {e}"),
                }
            }
        }
    }

    #[test]
    fn test_unknown_outer_oid() {
        let alg = vec![
            ASN1Block::ObjectIdentifier(0, oid(&[1, 2, 3, 4])),
            ASN1Block::Null(0),
        ];
        match decrypt(&alg, b"", b"pw") {
            Err(Error::UnsupportedAlgorithm { what }) => assert_eq!(what, "1.2.3.4"),
            other => panic!("expected UnsupportedAlgorithm, got {other:?}"),
        }
    }

    #[test]
    fn test_pbmac1_rejected() {
        let alg = vec![
            ASN1Block::ObjectIdentifier(0, OID_PBMAC1.clone()),
            ASN1Block::Null(0),
        ];
        assert!(matches!(
            decrypt(&alg, b"", b"pw"),
            Err(Error::UnsupportedAlgorithm { .. })
        ));
    }
}
