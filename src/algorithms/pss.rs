//! EMSA-PSS encoding and verification ([RFC 3447 §9.1]).
//!
//! [RFC 3447 §9.1]: https://datatracker.ietf.org/doc/html/rfc3447#section-9.1

use digest::DynDigest;
use rand_core::CryptoRngCore;
use subtle::ConstantTimeEq;

use super::mgf::mgf1_xor;
use crate::errors::{Error, Result};

/// EMSA-PSS-Encode over an already-hashed message.
///
/// `em_bits` is the intended bit length of the encoded message (the callers
/// here always pass `8k - 1`); the masks come from `mgf_digest`, which may
/// differ from the message hash.
pub(crate) fn emsa_pss_encode<R: CryptoRngCore + ?Sized>(
    rng: &mut R,
    m_hash: &[u8],
    em_bits: usize,
    s_len: usize,
    hash: &mut dyn DynDigest,
    mgf_digest: &mut dyn DynDigest,
) -> Result<Vec<u8>> {
    let h_len = hash.output_size();
    let em_len = (em_bits + 7) / 8;

    // 2. Let mHash = Hash(M), an octet string of length hLen.
    if m_hash.len() != h_len {
        return Err(Error::Length);
    }

    // 3. If emLen < hLen + sLen + 2, output "encoding error" and stop.
    if em_len < h_len + s_len + 2 {
        return Err(Error::Length);
    }

    // 4. Generate a random octet string salt of length sLen; if sLen = 0,
    //    then salt is the empty string.
    let mut salt = vec![0u8; s_len];
    rng.fill_bytes(&mut salt);

    let mut em = vec![0u8; em_len];
    let (db, h) = em.split_at_mut(em_len - h_len - 1);
    let h = &mut h[..h_len];

    // 5. Let M' = (0x)00 00 00 00 00 00 00 00 || mHash || salt;
    // 6. Let H = Hash(M'), an octet string of length hLen.
    let prefix = [0u8; 8];

    hash.update(&prefix);
    hash.update(m_hash);
    hash.update(&salt);
    let hashed = hash.finalize_reset();
    h.copy_from_slice(&hashed);

    // 7. Generate an octet string PS consisting of emLen - sLen - hLen - 2
    //    zero octets.
    // 8. Let DB = PS || 0x01 || salt.
    db[em_len - s_len - h_len - 2] = 0x01;
    db[em_len - s_len - h_len - 1..].copy_from_slice(&salt);

    // 9.  Let dbMask = MGF(H, emLen - hLen - 1).
    // 10. Let maskedDB = DB \xor dbMask.
    mgf1_xor(db, mgf_digest, h);

    // 11. Set the leftmost 8 emLen - emBits bits of the leftmost octet in
    //     maskedDB to zero.
    db[0] &= 0xFF >> (8 * em_len - em_bits);

    // 12. Let EM = maskedDB || H || 0xbc.
    em[em_len - 1] = 0xBC;

    Ok(em)
}

/// EMSA-PSS-Verify with a fixed, configured salt length.
pub(crate) fn emsa_pss_verify(
    m_hash: &[u8],
    em: &mut [u8],
    em_bits: usize,
    s_len: usize,
    hash: &mut dyn DynDigest,
    mgf_digest: &mut dyn DynDigest,
) -> Result<()> {
    let h_len = hash.output_size();
    let em_len = (em_bits + 7) / 8;

    if m_hash.len() != h_len || em.len() != em_len {
        return Err(Error::InvalidSignature);
    }

    // 3. If emLen < hLen + sLen + 2, output "inconsistent" and stop.
    if em_len < h_len + s_len + 2 {
        return Err(Error::InvalidSignature);
    }

    // 4. If the rightmost octet of EM does not have hexadecimal value
    //    0xbc, output "inconsistent" and stop.
    if em[em_len - 1] != 0xBC {
        return Err(Error::InvalidSignature);
    }

    // 5. Let maskedDB be the leftmost emLen - hLen - 1 octets of EM, and
    //    let H be the next hLen octets.
    let (db, rest) = em.split_at_mut(em_len - h_len - 1);
    let h = &mut rest[..h_len];

    // 6. If the leftmost 8 emLen - emBits bits of the leftmost octet in
    //    maskedDB are not all equal to zero, output "inconsistent" and stop.
    let top_mask = 0xFF_u8
        .checked_shl(8 - (8 * em_len - em_bits) as u32)
        .unwrap_or(0);
    if db[0] & top_mask != 0 {
        return Err(Error::InvalidSignature);
    }

    // 7. Let dbMask = MGF(H, emLen - hLen - 1).
    // 8. Let DB = maskedDB \xor dbMask.
    mgf1_xor(db, mgf_digest, h);

    // 9. Set the leftmost 8 emLen - emBits bits of the leftmost octet in DB
    //    to zero.
    db[0] &= 0xFF >> (8 * em_len - em_bits);

    // 10. The emLen - hLen - sLen - 2 leftmost octets of DB must be zero and
    //     the octet at position emLen - hLen - sLen - 1 must be 0x01.
    let (zeroes, rest) = db.split_at(em_len - h_len - s_len - 2);
    let mut valid = zeroes
        .iter()
        .fold(subtle::Choice::from(1u8), |a, e| a & e.ct_eq(&0x00));
    valid &= rest[0].ct_eq(&0x01);

    // 11. Let salt be the last sLen octets of DB.
    let salt = &db[db.len() - s_len..];

    // 12. Let M' = (0x)00 00 00 00 00 00 00 00 || mHash || salt;
    // 13. Let H' = Hash(M'), an octet string of length hLen.
    let prefix = [0u8; 8];

    hash.update(&prefix[..]);
    hash.update(m_hash);
    hash.update(salt);
    let h0 = hash.finalize_reset();

    // 14. If H = H', output "consistent." Otherwise, output "inconsistent."
    if (valid & h0.ct_eq(h)).into() {
        Ok(())
    } else {
        Err(Error::InvalidSignature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::HashAlg;
    use rand_chacha::ChaCha8Rng;
    use rand_core::SeedableRng;

    fn encode(m_hash: &[u8], em_bits: usize, s_len: usize, hash: HashAlg) -> Result<Vec<u8>> {
        let mut rng = ChaCha8Rng::from_seed([42; 32]);
        emsa_pss_encode(
            &mut rng,
            m_hash,
            em_bits,
            s_len,
            &mut *hash.new_digest(),
            &mut *hash.new_digest(),
        )
    }

    fn verify(m_hash: &[u8], em: &mut [u8], em_bits: usize, s_len: usize, hash: HashAlg) -> Result<()> {
        emsa_pss_verify(
            m_hash,
            em,
            em_bits,
            s_len,
            &mut *hash.new_digest(),
            &mut *hash.new_digest(),
        )
    }

    #[test]
    fn test_roundtrip() {
        let hash = HashAlg::Sha256;
        let m_hash = hash.digest(b"some message");
        let em_bits = 8 * 128 - 1;
        let mut em = encode(&m_hash, em_bits, 32, hash).unwrap();
        assert_eq!(em.len(), 128);
        verify(&m_hash, &mut em, em_bits, 32, hash).unwrap();
    }

    #[test]
    fn test_top_bit_clear() {
        let hash = HashAlg::Sha1;
        let m_hash = hash.digest(b"x");
        let em = encode(&m_hash, 8 * 64 - 1, 20, hash).unwrap();
        assert_eq!(em[0] & 0x80, 0);
    }

    #[test]
    fn test_trailer_byte_checked() {
        let hash = HashAlg::Sha1;
        let m_hash = hash.digest(b"x");
        let em_bits = 8 * 64 - 1;
        let mut em = encode(&m_hash, em_bits, 20, hash).unwrap();
        let last = em.len() - 1;
        em[last] = 0xCC;
        assert_eq!(
            verify(&m_hash, &mut em, em_bits, 20, hash).unwrap_err(),
            Error::InvalidSignature
        );
    }

    #[test]
    fn test_wrong_hash_rejected() {
        let hash = HashAlg::Sha256;
        let m_hash = hash.digest(b"original");
        let em_bits = 8 * 128 - 1;
        let mut em = encode(&m_hash, em_bits, 32, hash).unwrap();
        let other = hash.digest(b"forgery");
        assert_eq!(
            verify(&other, &mut em, em_bits, 32, hash).unwrap_err(),
            Error::InvalidSignature
        );
    }

    #[test]
    fn test_salt_too_large_for_modulus() {
        let hash = HashAlg::Sha512;
        let m_hash = hash.digest(b"x");
        // 64-byte hash + 64-byte salt + 2 > 64-byte em
        assert_eq!(
            encode(&m_hash, 8 * 64 - 1, 64, hash).unwrap_err(),
            Error::Length
        );
    }
}
