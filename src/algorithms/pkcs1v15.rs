//! EME-PKCS1-v1_5 and EMSA-PKCS1-v1_5 ([RFC 3447 §7.2, §9.2]).
//!
//! [RFC 3447 §7.2, §9.2]: https://datatracker.ietf.org/doc/html/rfc3447

use rand_core::CryptoRngCore;
use subtle::{Choice, ConditionallySelectable, ConstantTimeEq};
use zeroize::Zeroizing;

use crate::errors::{Error, Result};
use crate::hash::HashAlg;

/// Fills the provided slice with random values, which are guaranteed
/// to not be zero.
#[inline]
fn non_zero_random_bytes<R: CryptoRngCore + ?Sized>(rng: &mut R, data: &mut [u8]) {
    rng.fill_bytes(data);

    for el in data {
        while *el == 0u8 {
            rng.fill_bytes(core::slice::from_mut(el));
        }
    }
}

/// Applies the encryption padding scheme from PKCS#1 v1.5.
///
/// Block type 2 (`public = true`) uses non-zero random padding; block type 1
/// is the legacy private-key form with `0xFF` padding. The message must be
/// no longer than `k - 11` bytes.
pub(crate) fn pkcs1v15_encrypt_pad<R>(
    rng: &mut R,
    msg: &[u8],
    k: usize,
    public: bool,
) -> Result<Zeroizing<Vec<u8>>>
where
    R: CryptoRngCore + ?Sized,
{
    if msg.len() + 11 > k {
        return Err(Error::Length);
    }

    // EM = 0x00 || BT || PS || 0x00 || M
    let mut em = Zeroizing::new(vec![0u8; k]);
    if public {
        em[1] = 2;
        non_zero_random_bytes(rng, &mut em[2..k - msg.len() - 1]);
    } else {
        em[1] = 1;
        for el in em[2..k - msg.len() - 1].iter_mut() {
            *el = 0xff;
        }
    }
    em[k - msg.len() - 1] = 0;
    em[k - msg.len()..].copy_from_slice(msg);
    Ok(em)
}

/// Removes the encryption padding scheme from PKCS#1 v1.5.
///
/// Block types 0, 1 and 2 are all accepted for interoperability. The padding
/// string must be at least 8 bytes. The scan runs over the whole block and
/// folds every check into one flag before the single branch at the end.
#[inline]
pub(crate) fn pkcs1v15_encrypt_unpad(em: Vec<u8>, k: usize) -> Result<Vec<u8>> {
    let (valid, out, index) = unpad_inner(em, k)?;
    if valid == 0 {
        return Err(Error::Decryption);
    }

    Ok(out[index as usize..].to_vec())
}

/// Returns one or zero in valid to indicate whether the plaintext was
/// correctly structured. In either case the plaintext is returned in em so
/// that it may be read independently of whether it was valid, to maintain
/// constant memory access patterns. If the plaintext was valid then index
/// contains the offset of the original message in em.
#[inline]
fn unpad_inner(em: Vec<u8>, k: usize) -> Result<(u8, Vec<u8>, u32)> {
    if k < 11 || em.len() != k {
        return Err(Error::Decryption);
    }

    let first_byte_is_zero = em[0].ct_eq(&0u8);
    let block_type_ok = em[1].ct_eq(&0u8) | em[1].ct_eq(&1u8) | em[1].ct_eq(&2u8);

    // The padding must be followed by a 0, followed by the message.
    //   looking_for_index: 1 iff we are still looking for the zero.
    //   index: the offset of the first zero byte.
    let mut looking_for_index = Choice::from(1u8);
    let mut index = 0u32;

    for (i, el) in em.iter().enumerate().skip(2) {
        let equals0 = el.ct_eq(&0u8);
        index.conditional_assign(&(i as u32), looking_for_index & equals0);
        looking_for_index &= !equals0;
    }

    // The PS padding must be at least 8 bytes long, and it starts two
    // bytes into em: the separator has to sit at offset >= 10.
    let valid_ps = Choice::from((((2i32 + 8i32 - index as i32 - 1i32) >> 31) & 1) as u8);
    let valid = first_byte_is_zero & block_type_ok & !looking_for_index & valid_ps;
    index = u32::conditional_select(&0, &(index + 1), valid);

    Ok((valid.unwrap_u8(), em, index))
}

/// EMSA-PKCS1-v1_5: hashes are framed as
/// `0x00 || 0x01 || PS || 0x00 || DigestInfo || H` with `0xFF` padding.
///
/// `hashed` must already be the digest of the message under `hash`.
#[inline]
pub(crate) fn pkcs1v15_sign_pad(hash: HashAlg, hashed: &[u8], em_len: usize) -> Result<Vec<u8>> {
    let prefix = hash.digest_info_prefix();
    let hash_len = hashed.len();
    if hash_len != hash.output_size() {
        return Err(Error::Length);
    }

    let t_len = prefix.len() + hash_len;
    if em_len < t_len + 11 {
        return Err(Error::Length);
    }

    // EM = 0x00 || 0x01 || PS || 0x00 || T
    let mut em = vec![0xff; em_len];
    em[0] = 0;
    em[1] = 1;
    em[em_len - t_len - 1] = 0;
    em[em_len - t_len..em_len - hash_len].copy_from_slice(prefix);
    em[em_len - hash_len..em_len].copy_from_slice(hashed);

    Ok(em)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::ChaCha8Rng;
    use rand_core::SeedableRng;

    #[test]
    fn test_non_zero_bytes() {
        for _ in 0..10 {
            let mut rng = ChaCha8Rng::from_seed([42; 32]);
            let mut b = vec![0u8; 512];
            non_zero_random_bytes(&mut rng, &mut b);
            for el in &b {
                assert_ne!(*el, 0u8);
            }
        }
    }

    #[test]
    fn test_roundtrip_both_block_types() {
        let mut rng = ChaCha8Rng::from_seed([42; 32]);
        for public in [true, false] {
            let em = pkcs1v15_encrypt_pad(&mut rng, b"it's a trap", 64, public).unwrap();
            assert_eq!(em[1], if public { 2 } else { 1 });
            let out = pkcs1v15_encrypt_unpad(em.to_vec(), 64).unwrap();
            assert_eq!(out, b"it's a trap");
        }
    }

    #[test]
    fn test_boundary_length() {
        let mut rng = ChaCha8Rng::from_seed([42; 32]);
        let k = 64;
        assert!(pkcs1v15_encrypt_pad(&mut rng, &vec![1u8; k - 11], k, true).is_ok());
        assert_eq!(
            pkcs1v15_encrypt_pad(&mut rng, &vec![1u8; k - 10], k, true).unwrap_err(),
            Error::Length
        );
    }

    #[test]
    fn test_short_padding_string_rejected() {
        // |PS| = 7: separator at offset 9.
        let mut em = vec![0xffu8; 32];
        em[0] = 0;
        em[1] = 2;
        em[9] = 0;
        assert_eq!(
            pkcs1v15_encrypt_unpad(em.clone(), 32).unwrap_err(),
            Error::Decryption
        );

        // |PS| = 8: separator at offset 10.
        em[9] = 0xff;
        em[10] = 0;
        let out = pkcs1v15_encrypt_unpad(em, 32).unwrap();
        assert_eq!(out.len(), 32 - 11);
    }

    #[test]
    fn test_missing_separator_rejected() {
        let mut em = vec![0xffu8; 32];
        em[0] = 0;
        em[1] = 1;
        assert_eq!(
            pkcs1v15_encrypt_unpad(em, 32).unwrap_err(),
            Error::Decryption
        );
    }

    #[test]
    fn test_sign_pad_layout() {
        let hashed = HashAlg::Sha256.digest(b"");
        let em = pkcs1v15_sign_pad(HashAlg::Sha256, &hashed, 128).unwrap();
        assert_eq!(&em[..2], &[0x00, 0x01]);
        let t_len = HashAlg::Sha256.digest_info_prefix().len() + 32;
        assert!(em[2..128 - t_len - 1].iter().all(|b| *b == 0xff));
        assert_eq!(em[128 - t_len - 1], 0x00);
        assert_eq!(&em[128 - 32..], &hashed[..]);
    }

    #[test]
    fn test_sign_pad_modulus_too_short() {
        let hashed = HashAlg::Sha512.digest(b"x");
        // DigestInfo(19) + 64-byte digest + 11 > 64
        assert_eq!(
            pkcs1v15_sign_pad(HashAlg::Sha512, &hashed, 64).unwrap_err(),
            Error::Length
        );
    }
}
