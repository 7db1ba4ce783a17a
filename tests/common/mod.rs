//! Shared fixture helpers: a fixed RSA-2048 key generated with OpenSSL, with
//! its components mirrored in `data/components.txt`.
#![allow(dead_code)]

use num_bigint::BigUint;
use rsakit::{KeyComponents, RsaKey};

pub const COMPONENTS: &str = include_str!("../data/components.txt");

fn component(name: &str) -> BigUint {
    let line = COMPONENTS
        .lines()
        .find(|l| l.starts_with(&format!("{}=", name)))
        .unwrap_or_else(|| panic!("missing component {name}"));
    let hex_str = line.split_once('=').unwrap().1.trim();
    BigUint::parse_bytes(hex_str.as_bytes(), 16).expect("bad hex in components.txt")
}

pub fn fixture_components() -> KeyComponents {
    KeyComponents {
        is_public: false,
        modulus: component("N"),
        public_exponent: component("E"),
        private_exponent: Some(component("D")),
        primes: vec![component("P"), component("Q")],
        exponents: vec![],
        coefficients: vec![],
    }
}

/// The fixture private key, CRT parameters derived from P and Q.
pub fn fixture_key() -> RsaKey {
    RsaKey::from_components(fixture_components()).expect("fixture key")
}

/// The same key without its factorization: exercises the non-CRT path.
pub fn fixture_key_no_crt() -> RsaKey {
    let mut c = fixture_components();
    c.primes.clear();
    RsaKey::from_components(c).expect("fixture key without primes")
}
