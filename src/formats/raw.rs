//! Raw keys: a keyed collection of big-endian byte strings naming just the
//! modulus and the exponent. Load-only; there are no primes to carry.

use num_bigint::BigUint;
use num_traits::Zero;

use super::KeyComponents;

const EXPONENT_NAMES: [&str; 4] = ["e", "exponent", "publicexponent", "0"];
const MODULUS_NAMES: [&str; 4] = ["n", "modulo", "modulus", "1"];

fn find<'a>(pairs: &'a [(&str, &[u8])], names: &[&str]) -> Option<&'a [u8]> {
    pairs.iter().find_map(|(name, value)| {
        let lowered = name.to_ascii_lowercase();
        names.contains(&lowered.as_str()).then_some(*value)
    })
}

pub(crate) fn load_pairs(pairs: &[(&str, &[u8])]) -> Option<KeyComponents> {
    let exponent = BigUint::from_bytes_be(find(pairs, &EXPONENT_NAMES)?);
    let modulus = BigUint::from_bytes_be(find(pairs, &MODULUS_NAMES)?);
    if modulus.is_zero() {
        return None;
    }
    Some(KeyComponents::public(modulus, exponent))
}
