//! Property-based tests.

mod common;

use common::fixture_key;
use proptest::prelude::*;
use rand_chacha::ChaCha8Rng;
use rand_core::SeedableRng;
use rsakit::{EncryptionMode, SignatureMode};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn oaep_roundtrip(seed in any::<[u8; 32]>(), msg in proptest::collection::vec(any::<u8>(), 0..600)) {
        let mut rng = ChaCha8Rng::from_seed(seed);
        let key = fixture_key();
        let ciphertext = key.encrypt(&mut rng, &msg).unwrap();
        prop_assert_eq!(key.decrypt(&mut rng, &ciphertext).unwrap(), msg);
    }

    #[test]
    fn pkcs1v15_roundtrip(seed in any::<[u8; 32]>(), msg in proptest::collection::vec(any::<u8>(), 0..600)) {
        let mut rng = ChaCha8Rng::from_seed(seed);
        let mut key = fixture_key();
        key.set_encryption_mode(EncryptionMode::Pkcs1);
        let ciphertext = key.encrypt(&mut rng, &msg).unwrap();
        prop_assert_eq!(key.decrypt(&mut rng, &ciphertext).unwrap(), msg);
    }

    #[test]
    fn pss_sign_roundtrip(seed in any::<[u8; 32]>(), msg in any::<Vec<u8>>()) {
        let mut rng = ChaCha8Rng::from_seed(seed);
        let key = fixture_key();
        let signature = key.sign(&mut rng, &msg).unwrap();
        prop_assert!(key.verify(&msg, &signature).is_ok());
    }

    #[test]
    fn pkcs1v15_sign_roundtrip(seed in any::<[u8; 32]>(), msg in any::<Vec<u8>>()) {
        let mut rng = ChaCha8Rng::from_seed(seed);
        let mut key = fixture_key();
        key.set_signature_mode(SignatureMode::Pkcs1);
        let signature = key.sign(&mut rng, &msg).unwrap();
        prop_assert!(key.verify(&msg, &signature).is_ok());
    }

    #[test]
    fn verify_rejects_bit_flips(byte in 0usize..256, bit in 0u8..8) {
        let mut rng = ChaCha8Rng::from_seed([33; 32]);
        let key = fixture_key();
        let mut signature = key.sign(&mut rng, b"flip resistance").unwrap();
        let idx = byte % signature.len();
        signature[idx] ^= 1 << bit;
        prop_assert!(key.verify(b"flip resistance", &signature).is_err());
    }
}
