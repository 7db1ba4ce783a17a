//! EME-OAEP encoding and decoding ([RFC 3447 §7.1]).
//!
//! [RFC 3447 §7.1]: https://datatracker.ietf.org/doc/html/rfc3447#section-7.1

use digest::DynDigest;
use rand_core::CryptoRngCore;
use subtle::{Choice, ConditionallySelectable, ConstantTimeEq, CtOption};
use zeroize::Zeroizing;

use super::mgf::mgf1_xor;
use crate::errors::{Error, Result};

// 2**61 - 1, the SHA-1 input limit. Labels anywhere near this size are
// rejected before hashing.
const MAX_LABEL_LEN: u64 = 2_305_843_009_213_693_951;

/// Applies EME-OAEP to `msg`, producing an encoded message of `k` bytes.
///
/// The message must be no longer than `k - 2 * hLen - 2` where `hLen` is the
/// output size of `digest`. The label hash uses `digest`; the masks use
/// `mgf_digest`, which may be a different algorithm.
pub(crate) fn oaep_encode<R: CryptoRngCore + ?Sized>(
    rng: &mut R,
    msg: &[u8],
    label: Option<&[u8]>,
    digest: &mut dyn DynDigest,
    mgf_digest: &mut dyn DynDigest,
    k: usize,
) -> Result<Zeroizing<Vec<u8>>> {
    let h_size = digest.output_size();

    let label = label.unwrap_or_default();
    if label.len() as u64 > MAX_LABEL_LEN {
        return Err(Error::Length);
    }

    if msg.len() + 2 * h_size + 2 > k {
        return Err(Error::Length);
    }

    digest.update(label);
    let l_hash = digest.finalize_reset();

    let mut em = Zeroizing::new(vec![0u8; k]);

    let (_, payload) = em.split_at_mut(1);
    let (seed, db) = payload.split_at_mut(h_size);
    rng.fill_bytes(seed);

    // DB = lHash || PS || 01 || M
    let db_len = k - h_size - 1;

    db[0..h_size].copy_from_slice(&l_hash);
    db[db_len - msg.len() - 1] = 1;
    db[db_len - msg.len()..].copy_from_slice(msg);

    mgf1_xor(db, mgf_digest, seed);
    mgf1_xor(seed, mgf_digest, db);

    Ok(em)
}

/// Strips EME-OAEP from an encoded message.
///
/// The `Y == 0x00`, `lHash` and `0x01`-separator checks are folded into a
/// single validity flag so that nothing about which of them failed escapes
/// through the error value or the memory access pattern.
pub(crate) fn oaep_decode(
    em: &mut [u8],
    label: Option<&[u8]>,
    digest: &mut dyn DynDigest,
    mgf_digest: &mut dyn DynDigest,
    k: usize,
) -> Result<Vec<u8>> {
    let h_size = digest.output_size();

    let label = label.unwrap_or_default();
    if label.len() as u64 > MAX_LABEL_LEN {
        return Err(Error::Decryption);
    }

    digest.update(label);
    let expected_l_hash = digest.finalize_reset();

    let res = decode_inner(em, h_size, &expected_l_hash, mgf_digest, k)?;
    if res.is_none().into() {
        return Err(Error::Decryption);
    }

    let (out, index) = res.unwrap();
    Ok(out[index as usize..].to_vec())
}

fn decode_inner(
    em: &mut [u8],
    h_size: usize,
    expected_l_hash: &[u8],
    mgf_digest: &mut dyn DynDigest,
    k: usize,
) -> Result<CtOption<(Vec<u8>, u32)>> {
    if k < 11 || k < h_size * 2 + 2 || em.len() != k {
        return Err(Error::Decryption);
    }

    let first_byte_is_zero = em[0].ct_eq(&0u8);

    let (_, payload) = em.split_at_mut(1);
    let (seed, db) = payload.split_at_mut(h_size);

    mgf1_xor(seed, mgf_digest, db);
    mgf1_xor(db, mgf_digest, seed);

    let hashes_are_equal = db[0..h_size].ct_eq(expected_l_hash);

    // The remainder of DB must be zero or more 0x00, followed by 0x01,
    // followed by the message.
    //   looking_for_index: 1 if we are still looking for the 0x01
    //   index: the offset of the first 0x01 byte
    //   nonzero_before_one: 1 if we saw a non-zero byte before the 1
    let mut looking_for_index = Choice::from(1u8);
    let mut index = 0u32;
    let mut nonzero_before_one = Choice::from(0u8);

    for (i, el) in db.iter().skip(h_size).enumerate() {
        let equals0 = el.ct_eq(&0u8);
        let equals1 = el.ct_eq(&1u8);
        index.conditional_assign(&(i as u32), looking_for_index & equals1);
        looking_for_index &= !equals1;
        nonzero_before_one |= looking_for_index & !equals0;
    }

    let valid = first_byte_is_zero & hashes_are_equal & !nonzero_before_one & !looking_for_index;

    let mut out = Vec::with_capacity(seed.len() + db.len());
    out.extend_from_slice(seed);
    out.extend_from_slice(db);

    Ok(CtOption::new((out, index + 1 + (h_size * 2) as u32), valid))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::HashAlg;
    use rand_chacha::ChaCha8Rng;
    use rand_core::SeedableRng;

    fn roundtrip(msg: &[u8], label: Option<&[u8]>, hash: HashAlg, k: usize) -> Result<Vec<u8>> {
        let mut rng = ChaCha8Rng::from_seed([42; 32]);
        let mut em = oaep_encode(
            &mut rng,
            msg,
            label,
            &mut *hash.new_digest(),
            &mut *hash.new_digest(),
            k,
        )?;
        oaep_decode(
            &mut em,
            label,
            &mut *hash.new_digest(),
            &mut *hash.new_digest(),
            k,
        )
    }

    #[test]
    fn test_roundtrip() {
        let msg = b"attack at dawn";
        assert_eq!(roundtrip(msg, None, HashAlg::Sha1, 128).unwrap(), msg);
        assert_eq!(roundtrip(msg, None, HashAlg::Sha256, 128).unwrap(), msg);
        assert_eq!(
            roundtrip(msg, Some(b"label"), HashAlg::Sha256, 256).unwrap(),
            msg
        );
    }

    #[test]
    fn test_boundary_length() {
        // |M| = k - 2 hLen - 2 fits; one more byte does not.
        let k = 128;
        let max = k - 2 * 20 - 2;
        assert!(roundtrip(&vec![0xAB; max], None, HashAlg::Sha1, k).is_ok());
        assert_eq!(
            roundtrip(&vec![0xAB; max + 1], None, HashAlg::Sha1, k).unwrap_err(),
            Error::Length
        );
    }

    #[test]
    fn test_label_mismatch() {
        let mut rng = ChaCha8Rng::from_seed([7; 32]);
        let hash = HashAlg::Sha1;
        let mut em = oaep_encode(
            &mut rng,
            b"msg",
            Some(b"left"),
            &mut *hash.new_digest(),
            &mut *hash.new_digest(),
            96,
        )
        .unwrap();
        let err = oaep_decode(
            &mut em,
            Some(b"right"),
            &mut *hash.new_digest(),
            &mut *hash.new_digest(),
            96,
        )
        .unwrap_err();
        assert_eq!(err, Error::Decryption);
    }

    #[test]
    fn test_corrupt_leading_byte() {
        let mut rng = ChaCha8Rng::from_seed([9; 32]);
        let hash = HashAlg::Sha1;
        let mut em = oaep_encode(
            &mut rng,
            b"msg",
            None,
            &mut *hash.new_digest(),
            &mut *hash.new_digest(),
            96,
        )
        .unwrap();
        em[0] = 0x01;
        let err = oaep_decode(
            &mut em,
            None,
            &mut *hash.new_digest(),
            &mut *hash.new_digest(),
            96,
        )
        .unwrap_err();
        assert_eq!(err, Error::Decryption);
    }
}
