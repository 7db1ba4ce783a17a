//! Mask generation function common to both PSS and OAEP padding

use digest::DynDigest;

/// MGF1: XORs `out` with the mask generated from `seed`.
///
/// Panics if out is larger than 2**32 blocks. This is in accordance with
/// RFC 3447 - PKCS #1 B.2.1.
pub(crate) fn mgf1_xor(out: &mut [u8], digest: &mut dyn DynDigest, seed: &[u8]) {
    let mut counter = [0u8; 4];
    let mut i = 0;

    const MAX_LEN: u64 = u32::MAX as u64 + 1;
    assert!(out.len() as u64 <= MAX_LEN * digest.output_size() as u64);

    while i < out.len() {
        digest.update(seed);
        digest.update(&counter);

        let digest_output = digest.finalize_reset();
        let mut j = 0;
        loop {
            if j >= digest_output.len() || i >= out.len() {
                break;
            }

            out[i] ^= digest_output[j];
            j += 1;
            i += 1;
        }
        inc_counter(&mut counter);
    }
}

fn inc_counter(counter: &mut [u8; 4]) {
    for i in (0..4).rev() {
        counter[i] = counter[i].wrapping_add(1);
        if counter[i] != 0 {
            // No overflow
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mgf1_xor;
    use crate::hash::HashAlg;

    fn mgf1(seed: &[u8], len: usize, hash: HashAlg) -> Vec<u8> {
        let mut out = vec![0u8; len];
        mgf1_xor(&mut out, &mut *hash.new_digest(), seed);
        out
    }

    #[test]
    fn test_mgf1_sha1_zero_seed() {
        // Seed of hLen zero bytes, mask length hLen.
        let out = mgf1(&[0u8; 20], 20, HashAlg::Sha1);
        assert_eq!(
            hex::encode(out),
            "d3399b7262fb56cb9ed053d68db9291c410839c4"
        );
    }

    #[test]
    fn test_mgf1_sha1_multi_block() {
        let out = mgf1(b"bar", 50, HashAlg::Sha1);
        assert_eq!(
            hex::encode(out),
            "bc0c655e016bc2931d85a2e675181adcef7f581f76df2739da74faac41627be2f7f415c89e983fd0ce80ced9878641cb4876"
        );
    }

    #[test]
    fn test_mgf1_sha256_multi_block() {
        let out = mgf1(b"bar", 50, HashAlg::Sha256);
        assert_eq!(
            hex::encode(out),
            "382576a7841021cc28fc4c0948753fb8312090cea942ea4c4e735d10dc724b155f9f6069f289d61daca0cb814502ef04eae1"
        );
    }
}
