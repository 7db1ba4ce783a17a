//! The `RsaKey` type: key state, the integer primitives and the public API.

use num_bigint::{BigUint, IntoBigUint, ModInverse};
use num_traits::{One, Zero};
use rand_core::CryptoRngCore;
use zeroize::{Zeroize, Zeroizing};

use crate::algorithms::generate::{generate_components, GenOutcome, KeyGenConfig, PartialKey};
use crate::algorithms::oaep::{oaep_decode, oaep_encode};
use crate::algorithms::pkcs1v15::{
    pkcs1v15_encrypt_pad, pkcs1v15_encrypt_unpad, pkcs1v15_sign_pad,
};
use crate::algorithms::pss::{emsa_pss_encode, emsa_pss_verify};
use crate::algorithms::rsa::{rsa_decrypt_and_check, rsa_encrypt, PrivateParts};
use crate::consttime;
use crate::errors::{Error, Result};
use crate::formats::envelope::Pkcs8WriteConfig;
use crate::formats::{self, KeyComponents, KeyFormat};
use crate::hash::HashAlg;

/// Padding used by `encrypt`/`decrypt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionMode {
    Oaep,
    Pkcs1,
    /// No padding at all: each block is interpreted as an integer and run
    /// straight through the exponentiation primitive.
    None,
}

/// Padding used by `sign`/`verify`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureMode {
    Pss,
    Pkcs1,
}

/// Hash used by `get_public_key_fingerprint`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FingerprintAlg {
    /// Colon-separated lowercase hex, the classic OpenSSH presentation.
    Md5,
    /// Base64 without trailing padding, as `ssh-keygen -l` prints it.
    Sha256,
}

/// Result of [`RsaKey::generate_with`]: either a finished key pair or the
/// state to resume from after the wall-clock budget expired.
pub enum KeyGenOutcome {
    Complete { private: RsaKey, public: RsaKey },
    Partial(PartialKey),
}

/// An RSA key, public or private, together with its padding configuration.
///
/// The same type serves both roles: `exponent` holds `d` for a private key
/// and `e` for a public one. Private keys additionally carry the prime
/// factorization and the precomputed CRT exponents and coefficients when
/// they are available.
#[derive(Debug, Clone)]
pub struct RsaKey {
    n: BigUint,
    /// `d` for private keys, `e` for public keys.
    exponent: BigUint,
    /// Known public exponent of a private key. Absent for keys loaded from
    /// encodings that do not carry it; blinding is skipped in that case.
    public_exponent: Option<BigUint>,
    /// Prime factors of n; empty, or >= 2 elements.
    primes: Vec<BigUint>,
    /// d mod (p_i - 1), aligned with `primes`.
    exponents: Vec<BigUint>,
    /// CRT coefficients; see `PrivateParts` for the layout.
    coefficients: Vec<BigUint>,
    private: bool,

    hash: HashAlg,
    mgf_hash: HashAlg,
    /// PSS salt length; defaults to the hash length when unset.
    salt_len: Option<usize>,
    enc_mode: EncryptionMode,
    sig_mode: SignatureMode,
    password: Option<Zeroizing<Vec<u8>>>,
    pkcs8_config: Pkcs8WriteConfig,
}

impl PartialEq for RsaKey {
    fn eq(&self, other: &RsaKey) -> bool {
        self.n == other.n
            && self.exponent == other.exponent
            && self.public_exponent == other.public_exponent
            && self.primes == other.primes
            && self.private == other.private
    }
}

impl Eq for RsaKey {}

impl Zeroize for RsaKey {
    fn zeroize(&mut self) {
        self.exponent.zeroize();
        for prime in self.primes.iter_mut() {
            prime.zeroize();
        }
        self.primes.clear();
        for exp in self.exponents.iter_mut() {
            exp.zeroize();
        }
        self.exponents.clear();
        for coeff in self.coefficients.iter_mut() {
            coeff.zeroize();
        }
        self.coefficients.clear();
    }
}

impl Drop for RsaKey {
    fn drop(&mut self) {
        self.zeroize();
    }
}

impl RsaKey {
    /// Generates a fresh private key of `bits` bits with the default
    /// configuration (e = 65537, two primes).
    pub fn generate<R: CryptoRngCore + ?Sized>(rng: &mut R, bits: usize) -> Result<RsaKey> {
        let config = KeyGenConfig {
            bits,
            ..KeyGenConfig::default()
        };
        match Self::generate_with(rng, &config, None)? {
            KeyGenOutcome::Complete { private, .. } => Ok(private),
            KeyGenOutcome::Partial(_) => unreachable!("no timeout was configured"),
        }
    }

    /// Generates a key pair under `config`, optionally resuming an earlier
    /// run from its [`PartialKey`]. With a timeout configured the outcome may
    /// be another partial state instead of a finished pair.
    pub fn generate_with<R: CryptoRngCore + ?Sized>(
        rng: &mut R,
        config: &KeyGenConfig,
        partial: Option<PartialKey>,
    ) -> Result<KeyGenOutcome> {
        match generate_components(rng, config, partial)? {
            GenOutcome::Partial(p) => Ok(KeyGenOutcome::Partial(p)),
            GenOutcome::Complete(c) => {
                let public = RsaKey::public_from_parts(c.n.clone(), c.e.clone());
                let private = RsaKey {
                    n: c.n,
                    exponent: c.d,
                    public_exponent: Some(c.e),
                    primes: c.primes,
                    exponents: c.exponents,
                    coefficients: c.coefficients,
                    private: true,
                    hash: HashAlg::default(),
                    mgf_hash: HashAlg::default(),
                    salt_len: None,
                    enc_mode: EncryptionMode::Oaep,
                    sig_mode: SignatureMode::Pss,
                    password: None,
                    pkcs8_config: Pkcs8WriteConfig::default(),
                };
                Ok(KeyGenOutcome::Complete { private, public })
            }
        }
    }

    /// Loads a key from DER, PEM or XML, trying every registered format in
    /// order and accepting the first that succeeds.
    pub fn load(input: &[u8]) -> Result<RsaKey> {
        Self::from_detected(formats::load_auto(input, None))
    }

    /// Like [`RsaKey::load`], decrypting password-protected containers.
    pub fn load_with_password(input: &[u8], password: &[u8]) -> Result<RsaKey> {
        Self::from_detected(formats::load_auto(input, Some(password)))
    }

    /// Loads a key from one specific format.
    pub fn load_as(input: &[u8], format: KeyFormat) -> Result<RsaKey> {
        Self::from_detected(formats::load(format, input, None))
    }

    /// Loads a key from one specific format, with a password.
    pub fn load_as_with_password(
        input: &[u8],
        format: KeyFormat,
        password: &[u8],
    ) -> Result<RsaKey> {
        Self::from_detected(formats::load(format, input, Some(password)))
    }

    /// Loads a raw public key from `(name, big-endian value)` pairs. Accepted
    /// names are `e`/`exponent`/`publicExponent`/`0` for the exponent and
    /// `n`/`modulo`/`modulus`/`1` for the modulus, case-insensitively.
    pub fn load_raw(pairs: &[(&str, &[u8])]) -> Result<RsaKey> {
        Self::from_detected(Ok(formats::raw::load_pairs(pairs)))
    }

    fn from_detected(outcome: formats::LoadOutcome) -> Result<RsaKey> {
        outcome?
            .ok_or(Error::MalformedKey)
            .and_then(RsaKey::from_components)
    }

    /// Builds a key directly from its numeric components, deriving any
    /// missing CRT values when the factorization is present.
    pub fn from_components(c: KeyComponents) -> Result<RsaKey> {
        if c.modulus.is_zero() {
            return Err(Error::MalformedKey);
        }

        if c.is_public {
            if c.public_exponent.is_zero() {
                return Err(Error::MalformedKey);
            }
            return Ok(RsaKey::public_from_parts(c.modulus, c.public_exponent));
        }

        let d = c.private_exponent.ok_or(Error::MalformedKey)?;
        if c.primes.len() == 1 {
            return Err(Error::MalformedKey);
        }

        let mut key = RsaKey {
            n: c.modulus,
            exponent: d,
            public_exponent: if c.public_exponent.is_zero() {
                None
            } else {
                Some(c.public_exponent)
            },
            primes: c.primes,
            exponents: c.exponents,
            coefficients: c.coefficients,
            private: true,
            hash: HashAlg::default(),
            mgf_hash: HashAlg::default(),
            salt_len: None,
            enc_mode: EncryptionMode::Oaep,
            sig_mode: SignatureMode::Pss,
            password: None,
            pkcs8_config: Pkcs8WriteConfig::default(),
        };
        key.precompute()?;
        Ok(key)
    }

    fn public_from_parts(n: BigUint, e: BigUint) -> RsaKey {
        RsaKey {
            n,
            exponent: e,
            public_exponent: None,
            primes: Vec::new(),
            exponents: Vec::new(),
            coefficients: Vec::new(),
            private: false,
            hash: HashAlg::default(),
            mgf_hash: HashAlg::default(),
            salt_len: None,
            enc_mode: EncryptionMode::Oaep,
            sig_mode: SignatureMode::Pss,
            password: None,
            pkcs8_config: Pkcs8WriteConfig::default(),
        }
    }

    fn blank() -> RsaKey {
        RsaKey {
            n: BigUint::zero(),
            exponent: BigUint::zero(),
            public_exponent: None,
            primes: Vec::new(),
            exponents: Vec::new(),
            coefficients: Vec::new(),
            private: false,
            hash: HashAlg::default(),
            mgf_hash: HashAlg::default(),
            salt_len: None,
            enc_mode: EncryptionMode::Oaep,
            sig_mode: SignatureMode::Pss,
            password: None,
            pkcs8_config: Pkcs8WriteConfig::default(),
        }
    }

    /// Fills in `exponents`/`coefficients` from `primes` and `d` when a
    /// format did not carry them.
    fn precompute(&mut self) -> Result<()> {
        if self.primes.len() < 2 {
            self.exponents.clear();
            self.coefficients.clear();
            return Ok(());
        }

        if self.exponents.len() != self.primes.len() {
            self.exponents = self
                .primes
                .iter()
                .map(|p| &self.exponent % (p - BigUint::one()))
                .collect();
        }

        if self.coefficients.len() != self.primes.len() - 1 {
            let mut coefficients = Vec::with_capacity(self.primes.len() - 1);
            coefficients.push(
                self.primes[1]
                    .clone()
                    .mod_inverse(&self.primes[0])
                    .and_then(|c| c.into_biguint())
                    .ok_or(Error::MalformedKey)?,
            );
            let mut r = &self.primes[0] * &self.primes[1];
            for prime in &self.primes[2..] {
                coefficients.push(
                    r.clone()
                        .mod_inverse(prime)
                        .and_then(|c| c.into_biguint())
                        .ok_or(Error::MalformedKey)?,
                );
                r *= prime;
            }
            self.coefficients = coefficients;
        }

        Ok(())
    }

    /// Redefines the public half of this key.
    ///
    /// On an empty key this simply loads a public key. On a private key whose
    /// modulus matches the input, the public exponent is recorded so that the
    /// private operations can blind and fault-check; a mismatched modulus is
    /// rejected.
    pub fn set_public_key(&mut self, input: &[u8]) -> Result<()> {
        let c = formats::load_auto(input, None)?.ok_or(Error::MalformedKey)?;
        if c.public_exponent.is_zero() {
            return Err(Error::MalformedKey);
        }

        if self.n.is_zero() {
            *self = RsaKey::public_from_parts(c.modulus, c.public_exponent);
            return Ok(());
        }

        if self.n != c.modulus {
            return Err(Error::MalformedKey);
        }

        if self.private {
            self.public_exponent = Some(c.public_exponent);
        } else {
            self.exponent = c.public_exponent;
        }
        Ok(())
    }

    /// Replaces this key with the private key parsed from `input`, copying
    /// the primes, exponents and coefficients from the parsed components.
    /// The public exponent is dropped: a key defined this way exposes no
    /// public half (and therefore runs its private operations unblinded).
    pub fn set_private_key(&mut self, input: &[u8], password: Option<&[u8]>) -> Result<()> {
        let c = formats::load_auto(input, password)?.ok_or(Error::MalformedKey)?;
        if c.is_public || c.private_exponent.is_none() {
            return Err(Error::MissingPrivateKey);
        }

        let mut loaded = RsaKey::from_components(c)?;
        loaded.public_exponent = None;
        loaded.hash = self.hash;
        loaded.mgf_hash = self.mgf_hash;
        loaded.salt_len = self.salt_len;
        loaded.enc_mode = self.enc_mode;
        loaded.sig_mode = self.sig_mode;
        loaded.password = self.password.clone();
        loaded.pkcs8_config = self.pkcs8_config.clone();
        *self = loaded;
        Ok(())
    }

    // --- configuration -----------------------------------------------------

    /// Selects the hash used by OAEP, PSS and EMSA-PKCS1-v1_5.
    pub fn set_hash(&mut self, hash: HashAlg) {
        self.hash = hash;
    }

    /// Selects the hash driving MGF1, independently of [`RsaKey::set_hash`].
    pub fn set_mgf_hash(&mut self, hash: HashAlg) {
        self.mgf_hash = hash;
    }

    /// Sets the PSS salt length in bytes. Unset, the hash length is used.
    pub fn set_salt_length(&mut self, len: usize) {
        self.salt_len = Some(len);
    }

    pub fn set_encryption_mode(&mut self, mode: EncryptionMode) {
        self.enc_mode = mode;
    }

    pub fn set_signature_mode(&mut self, mode: SignatureMode) {
        self.sig_mode = mode;
    }

    /// Sets (or clears) the password used when serializing the private key.
    pub fn set_password(&mut self, password: Option<&[u8]>) {
        self.password = password.map(|p| Zeroizing::new(p.to_vec()));
    }

    /// Replaces the PKCS#8 write-side defaults (encryption scheme, PRF,
    /// iteration count) used for password-protected serialization.
    pub fn set_pkcs8_config(&mut self, config: Pkcs8WriteConfig) {
        self.pkcs8_config = config;
    }

    // --- accessors ---------------------------------------------------------

    /// Bit length of the modulus.
    pub fn get_size(&self) -> usize {
        self.n.bits()
    }

    /// Modulus length in bytes; every ciphertext and signature block is this
    /// long.
    pub(crate) fn k(&self) -> usize {
        (self.n.bits() + 7) / 8
    }

    pub fn is_private(&self) -> bool {
        self.private
    }

    pub fn n(&self) -> &BigUint {
        &self.n
    }

    /// The public exponent, however this key came to know it.
    fn public_exponent_ref(&self) -> Result<&BigUint> {
        if self.private {
            self.public_exponent
                .as_ref()
                .ok_or(Error::MissingPublicExponent)
        } else if self.exponent.is_zero() {
            Err(Error::MissingPublicExponent)
        } else {
            Ok(&self.exponent)
        }
    }

    /// The numeric components of this key, as a format-neutral bundle.
    pub fn components(&self) -> Result<KeyComponents> {
        if self.private {
            Ok(KeyComponents {
                is_public: false,
                modulus: self.n.clone(),
                public_exponent: self
                    .public_exponent
                    .clone()
                    .unwrap_or_else(BigUint::zero),
                private_exponent: Some(self.exponent.clone()),
                primes: self.primes.clone(),
                exponents: self.exponents.clone(),
                coefficients: self.coefficients.clone(),
            })
        } else {
            Ok(KeyComponents::public(
                self.n.clone(),
                self.public_exponent_ref()?.clone(),
            ))
        }
    }

    /// Serializes the public half in the requested format.
    pub fn get_public_key(&self, format: KeyFormat) -> Result<String> {
        let c = KeyComponents::public(self.n.clone(), self.public_exponent_ref()?.clone());
        formats::save_public(format, &c)
    }

    /// Serializes the private key in the requested format. When a password
    /// has been set and the format supports encryption (PKCS#8), the output
    /// is an encrypted container built with this key's
    /// [`Pkcs8WriteConfig`].
    pub fn get_private_key<R: CryptoRngCore + ?Sized>(
        &self,
        rng: &mut R,
        format: KeyFormat,
    ) -> Result<String> {
        if !self.private {
            return Err(Error::MissingPrivateKey);
        }
        let c = self.components()?;
        formats::save_private(
            format,
            &c,
            self.password.as_ref().map(|p| p.as_slice()),
            rng,
            &self.pkcs8_config,
        )
    }

    /// Fingerprint of the public key over its `ssh-rsa` wire encoding.
    pub fn get_public_key_fingerprint(&self, alg: FingerprintAlg) -> Result<String> {
        let blob = self.ssh_public_blob()?;
        match alg {
            FingerprintAlg::Md5 => {
                let digest = HashAlg::Md5.digest(&blob);
                let hex: Vec<String> = digest.iter().map(|b| format!("{:02x}", b)).collect();
                Ok(hex.join(":"))
            }
            FingerprintAlg::Sha256 => {
                let digest = HashAlg::Sha256.digest(&blob);
                Ok(base64::encode_config(digest, base64::STANDARD_NO_PAD))
            }
        }
    }

    /// `string "ssh-rsa" || mpint e || mpint n` per RFC 4253 §6.6.
    fn ssh_public_blob(&self) -> Result<Vec<u8>> {
        fn push_chunk(out: &mut Vec<u8>, chunk: &[u8]) {
            out.extend_from_slice(&(chunk.len() as u32).to_be_bytes());
            out.extend_from_slice(chunk);
        }
        fn mpint(x: &BigUint) -> Vec<u8> {
            let bytes = x.to_bytes_be();
            if bytes[0] & 0x80 != 0 {
                let mut padded = Vec::with_capacity(bytes.len() + 1);
                padded.push(0);
                padded.extend_from_slice(&bytes);
                padded
            } else {
                bytes
            }
        }

        let e = self.public_exponent_ref()?;
        let mut blob = Vec::new();
        push_chunk(&mut blob, b"ssh-rsa");
        push_chunk(&mut blob, &mpint(e));
        push_chunk(&mut blob, &mpint(&self.n));
        Ok(blob)
    }

    // --- integer primitives ------------------------------------------------

    /// I2OSP: big-endian encoding of `x` into exactly `len` bytes.
    pub(crate) fn i2osp(x: &BigUint, len: usize) -> Result<Vec<u8>> {
        let bytes = x.to_bytes_be();
        if bytes.len() > len {
            return Err(Error::OutOfRange);
        }
        let mut out = vec![0u8; len];
        out[len - bytes.len()..].copy_from_slice(&bytes);
        Ok(out)
    }

    /// OS2IP: big-endian decoding to a non-negative integer.
    pub(crate) fn os2ip(bytes: &[u8]) -> BigUint {
        BigUint::from_bytes_be(bytes)
    }

    /// RSAEP / RSAVP1: `m^e mod n` under the key's public exponent.
    pub(crate) fn rsaep(&self, m: &BigUint) -> Result<BigUint> {
        if m >= &self.n {
            return Err(Error::OutOfRange);
        }
        let e = self.public_exponent_ref()?;
        Ok(rsa_encrypt(&self.n, e, m))
    }

    /// RSADP / RSASP1: `c^d mod n`, via the CRT when the factorization is
    /// present, blinded when an RNG is supplied and the public exponent is
    /// known.
    pub(crate) fn rsadp<R: CryptoRngCore + ?Sized>(
        &self,
        rng: Option<&mut R>,
        c: &BigUint,
    ) -> Result<BigUint> {
        if c >= &self.n {
            return Err(Error::OutOfRange);
        }
        let parts = PrivateParts {
            n: &self.n,
            d: &self.exponent,
            e: self.public_exponent.as_ref(),
            primes: &self.primes,
            exponents: &self.exponents,
            coefficients: &self.coefficients,
        };
        rsa_decrypt_and_check(rng, &parts, c)
    }

    /// True when `encrypt` runs the forward (public-exponent) operation.
    /// Only a private key that does not know its public exponent falls back
    /// to the legacy "private encryption" direction (block type 1).
    fn encrypts_forward(&self) -> bool {
        !self.private || self.public_exponent.is_some()
    }

    // --- public data-path API ----------------------------------------------

    /// Encrypts `plaintext` under the configured mode, splitting it into as
    /// many blocks as the modulus requires and concatenating the results.
    pub fn encrypt<R: CryptoRngCore + ?Sized>(
        &self,
        rng: &mut R,
        plaintext: &[u8],
    ) -> Result<Vec<u8>> {
        let k = self.k();
        let h_len = self.hash.output_size();

        let block_len = match self.enc_mode {
            EncryptionMode::Oaep => {
                if k < 2 * h_len + 2 {
                    return Err(Error::Length);
                }
                k - 2 * h_len - 2
            }
            EncryptionMode::Pkcs1 => {
                if k < 11 {
                    return Err(Error::Length);
                }
                k - 11
            }
            EncryptionMode::None => k,
        };

        let blocks: Vec<&[u8]> = if plaintext.is_empty() {
            // An empty message still yields one (padded) block.
            vec![&plaintext[0..0]]
        } else {
            plaintext.chunks(block_len.max(1)).collect()
        };

        let forward = self.encrypts_forward();
        let mut out = Vec::with_capacity(blocks.len() * k);
        for block in blocks {
            let m = match self.enc_mode {
                EncryptionMode::Oaep => {
                    let em = oaep_encode(
                        rng,
                        block,
                        None,
                        &mut *self.hash.new_digest(),
                        &mut *self.mgf_hash.new_digest(),
                        k,
                    )?;
                    Self::os2ip(&em)
                }
                EncryptionMode::Pkcs1 => {
                    let em = pkcs1v15_encrypt_pad(rng, block, k, forward)?;
                    Self::os2ip(&em)
                }
                EncryptionMode::None => {
                    let m = Self::os2ip(block);
                    if m >= self.n {
                        return Err(Error::OutOfRange);
                    }
                    m
                }
            };
            let c = if forward {
                self.rsaep(&m)?
            } else {
                self.rsadp(Some(rng), &m)?
            };
            out.extend_from_slice(&Self::i2osp(&c, k)?);
        }
        Ok(out)
    }

    /// Decrypts `ciphertext`, blinding the private exponentiation with `rng`.
    pub fn decrypt<R: CryptoRngCore + ?Sized>(
        &self,
        rng: &mut R,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>> {
        self.decrypt_inner(Some(rng), ciphertext)
    }

    /// Decrypts without blinding. Only for environments where the doubled
    /// exponentiation cost matters more than the timing side-channel.
    pub fn decrypt_unblinded(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        self.decrypt_inner::<crate::NoRng>(None, ciphertext)
    }

    fn decrypt_inner<R: CryptoRngCore + ?Sized>(
        &self,
        mut rng: Option<&mut R>,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>> {
        let k = self.k();
        if ciphertext.is_empty() || k == 0 {
            return Err(Error::Decryption);
        }

        let mut out = Vec::new();
        for block in ciphertext.chunks(k) {
            // A short trailing block is left-padded with zeros up to k.
            let mut padded;
            let block = if block.len() < k {
                padded = vec![0u8; k];
                padded[k - block.len()..].copy_from_slice(block);
                &padded[..]
            } else {
                block
            };

            let c = Self::os2ip(block);
            let m = if self.private {
                match rng {
                    Some(ref mut r) => self.rsadp(Some(&mut **r), &c),
                    None => self.rsadp::<R>(None, &c),
                }
            } else {
                self.rsaep(&c)
            }
            .map_err(|_| Error::Decryption)?;
            let mut em = Self::i2osp(&m, k).map_err(|_| Error::Decryption)?;

            match self.enc_mode {
                EncryptionMode::Oaep => {
                    let plain = oaep_decode(
                        &mut em,
                        None,
                        &mut *self.hash.new_digest(),
                        &mut *self.mgf_hash.new_digest(),
                        k,
                    )?;
                    out.extend_from_slice(&plain);
                }
                EncryptionMode::Pkcs1 => {
                    let plain = pkcs1v15_encrypt_unpad(em, k)?;
                    out.extend_from_slice(&plain);
                }
                EncryptionMode::None => {
                    out.extend_from_slice(&em);
                }
            }
        }
        Ok(out)
    }

    /// Signs the full message (no chunking) under the configured signature
    /// mode. The RNG provides the PSS salt and the blinding factor.
    pub fn sign<R: CryptoRngCore + ?Sized>(&self, rng: &mut R, message: &[u8]) -> Result<Vec<u8>> {
        if !self.private || self.n.is_zero() {
            return Err(Error::MissingPrivateKey);
        }

        let k = self.k();
        let m_hash = self.hash.digest(message);

        let em = match self.sig_mode {
            SignatureMode::Pss => {
                let s_len = self.salt_len.unwrap_or_else(|| self.hash.output_size());
                emsa_pss_encode(
                    rng,
                    &m_hash,
                    8 * k - 1,
                    s_len,
                    &mut *self.hash.new_digest(),
                    &mut *self.mgf_hash.new_digest(),
                )?
            }
            SignatureMode::Pkcs1 => pkcs1v15_sign_pad(self.hash, &m_hash, k)?,
        };

        let s = self.rsadp(Some(rng), &Self::os2ip(&em))?;
        Self::i2osp(&s, k)
    }

    /// Verifies `signature` over `message`. Returns `Ok(())` when consistent
    /// and [`Error::InvalidSignature`] otherwise.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<()> {
        let k = self.k();
        if signature.len() != k {
            return Err(Error::InvalidSignature);
        }

        let s = Self::os2ip(signature);
        let m = self.rsaep(&s).map_err(|e| match e {
            Error::MissingPublicExponent => e,
            _ => Error::InvalidSignature,
        })?;
        let mut em = Self::i2osp(&m, k).map_err(|_| Error::InvalidSignature)?;

        let m_hash = self.hash.digest(message);

        match self.sig_mode {
            SignatureMode::Pss => {
                let s_len = self.salt_len.unwrap_or_else(|| self.hash.output_size());
                emsa_pss_verify(
                    &m_hash,
                    &mut em,
                    8 * k - 1,
                    s_len,
                    &mut *self.hash.new_digest(),
                    &mut *self.mgf_hash.new_digest(),
                )
            }
            SignatureMode::Pkcs1 => {
                let expected = pkcs1v15_sign_pad(self.hash, &m_hash, k)
                    .map_err(|_| Error::InvalidSignature)?;
                if consttime::eq(&em, &expected) {
                    Ok(())
                } else {
                    Err(Error::InvalidSignature)
                }
            }
        }
    }

    /// Sanity-checks a private key: the primes must multiply to the modulus
    /// and `e d == 1` must hold modulo every `p_i - 1`.
    pub fn validate(&self) -> Result<()> {
        if !self.private || self.primes.len() < 2 {
            return Ok(());
        }

        let mut m = BigUint::one();
        for prime in &self.primes {
            if prime <= &BigUint::one() {
                return Err(Error::MalformedKey);
            }
            m *= prime;
        }
        if m != self.n {
            return Err(Error::MalformedKey);
        }

        if let Some(e) = &self.public_exponent {
            let de = e * &self.exponent;
            for prime in &self.primes {
                if !(&de % (prime - BigUint::one())).is_one() {
                    return Err(Error::MalformedKey);
                }
            }
        }

        Ok(())
    }
}
