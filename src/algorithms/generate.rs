//! Prime generation for RSA keys, with a cooperative wall-clock budget.

use std::time::{Duration, Instant};

use num_bigint::prime::probably_prime;
use num_bigint::{BigUint, IntoBigUint, ModInverse};
use num_integer::Integer;
use num_traits::{One, Zero};
use rand_core::CryptoRngCore;
use zeroize::Zeroize;

use crate::errors::{Error, Result};

/// Miller-Rabin rounds for candidate testing.
const PRIME_TEST_ROUNDS: usize = 20;

/// Tuning knobs for key generation.
#[derive(Debug, Clone)]
pub struct KeyGenConfig {
    /// Modulus size in bits. Must be at least 8.
    pub bits: usize,
    /// Public exponent; must be odd and at least 3.
    pub public_exponent: u64,
    /// Largest prime size generated as a single unit. When `bits / 2`
    /// exceeds this, generation switches to `bits / smallest_prime` primes
    /// of roughly this size each.
    pub smallest_prime: usize,
    /// Wall-clock budget. When it runs out mid-generation the primes found
    /// so far are handed back as a resumable [`PartialKey`].
    pub timeout: Option<Duration>,
}

impl Default for KeyGenConfig {
    fn default() -> Self {
        KeyGenConfig {
            bits: 2048,
            public_exponent: 65537,
            smallest_prime: 4096,
            timeout: None,
        }
    }
}

/// Saved state of an interrupted generation run: the primes drawn so far and
/// the running `lcm(p_i - 1)`. Re-invoking `generate` with this state picks
/// up at the next missing prime.
#[derive(Debug, Clone)]
pub struct PartialKey {
    pub(crate) primes: Vec<BigUint>,
    pub(crate) lcm: BigUint,
}

impl PartialKey {
    /// Number of primes drawn before the budget ran out.
    pub fn primes_found(&self) -> usize {
        self.primes.len()
    }
}

impl Zeroize for PartialKey {
    fn zeroize(&mut self) {
        for prime in self.primes.iter_mut() {
            prime.zeroize();
        }
        self.primes.clear();
        self.lcm.zeroize();
    }
}

impl Drop for PartialKey {
    fn drop(&mut self) {
        self.zeroize();
    }
}

/// The full set of numbers making up a freshly generated private key.
#[derive(Debug)]
pub(crate) struct GeneratedComponents {
    pub n: BigUint,
    pub e: BigUint,
    pub d: BigUint,
    pub primes: Vec<BigUint>,
    pub exponents: Vec<BigUint>,
    pub coefficients: Vec<BigUint>,
}

#[derive(Debug)]
pub(crate) enum GenOutcome {
    Complete(GeneratedComponents),
    Partial(PartialKey),
}

/// Draws a random prime of exactly `bits` bits, checking the deadline after
/// each candidate. Candidates have the top two bits set so that products of
/// them never come up one bit short.
fn gen_prime_with_deadline<R: CryptoRngCore + ?Sized>(
    rng: &mut R,
    bits: usize,
    deadline: Option<Instant>,
) -> Option<BigUint> {
    assert!(bits >= 2, "prime size must be at least 2-bit");

    let mut b = bits % 8;
    if b == 0 {
        b = 8;
    }
    let bytes_len = (bits + 7) / 8;
    let mut bytes = vec![0u8; bytes_len];

    loop {
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                return None;
            }
        }

        rng.fill_bytes(&mut bytes);
        // Clear bits in the first byte to make sure the candidate has
        // a size <= bits.
        bytes[0] &= ((1u32 << (b as u32)) - 1) as u8;

        // Don't let the value be too small: set the most significant two bits.
        if b >= 2 {
            bytes[0] |= 3u8.wrapping_shl(b as u32 - 2);
        } else {
            bytes[0] |= 1;
            if bytes_len > 1 {
                bytes[1] |= 0x80;
            }
        }

        // Make the value odd, since an even number this large certainly
        // isn't prime.
        bytes[bytes_len - 1] |= 1u8;

        let p = BigUint::from_bytes_be(&bytes);
        if p.bits() == bits && probably_prime(&p, PRIME_TEST_ROUNDS) {
            return Some(p);
        }
    }
}

/// Generates the component set for a key of `config.bits` bits, resuming from
/// `partial` when given. Primes are drawn one at a time; after each the
/// deadline is consulted and, once passed, the accumulated state is returned
/// as [`GenOutcome::Partial`].
pub(crate) fn generate_components<R: CryptoRngCore + ?Sized>(
    rng: &mut R,
    config: &KeyGenConfig,
    partial: Option<PartialKey>,
) -> Result<GenOutcome> {
    if config.bits < 8 {
        return Err(Error::Length);
    }
    if config.public_exponent < 3 || config.public_exponent % 2 == 0 {
        return Err(Error::unsupported("public exponent"));
    }

    let e = BigUint::from(config.public_exponent);
    let deadline = config.timeout.map(|t| Instant::now() + t);

    // Two primes of bits/2, unless that exceeds the single-prime ceiling, in
    // which case the modulus is split over bits/smallest_prime primes.
    let (nprimes, prime_bits) = if config.bits / 2 > config.smallest_prime {
        (config.bits / config.smallest_prime, config.smallest_prime)
    } else {
        (2, config.bits / 2)
    };
    // The last prime absorbs the remainder so the product reaches the
    // 2^(bits-1) floor.
    let last_prime_bits = config.bits - prime_bits * (nprimes - 1);

    let (mut primes, mut lcm) = match partial {
        Some(mut p) => {
            let primes = core::mem::take(&mut p.primes);
            let lcm = core::mem::replace(&mut p.lcm, BigUint::zero());
            (primes, lcm)
        }
        None => (Vec::with_capacity(nprimes), BigUint::one()),
    };

    loop {
        while primes.len() < nprimes {
            let target = if primes.len() == nprimes - 1 {
                last_prime_bits
            } else {
                prime_bits
            };
            let prime = match gen_prime_with_deadline(rng, target, deadline) {
                Some(p) => p,
                None => return Ok(GenOutcome::Partial(PartialKey { primes, lcm })),
            };

            // Primes must be pairwise unequal.
            if primes.contains(&prime) {
                continue;
            }

            lcm = lcm.lcm(&(&prime - BigUint::one()));
            primes.push(prime);
        }

        // e must be invertible mod lambda(n). If not, drop the most recent
        // prime and draw a replacement.
        if lcm.gcd(&e).is_one() {
            let n = primes.iter().fold(BigUint::one(), |acc, p| acc * p);
            if n.bits() == config.bits {
                return Ok(GenOutcome::Complete(finish(n, e, lcm, primes)?));
            }
        }

        primes.pop();
        lcm = primes
            .iter()
            .fold(BigUint::one(), |acc, p| acc.lcm(&(p - BigUint::one())));
    }
}

fn finish(
    n: BigUint,
    e: BigUint,
    lcm: BigUint,
    primes: Vec<BigUint>,
) -> Result<GeneratedComponents> {
    let d = e
        .clone()
        .mod_inverse(&lcm)
        .and_then(|d| d.into_biguint())
        .ok_or(Error::Internal)?;

    let exponents: Vec<BigUint> = primes.iter().map(|p| &d % (p - BigUint::one())).collect();

    // coefficients[0] = q^-1 mod p; for later primes the inverse of the
    // running product of the priors, per RFC 3447 OtherPrimeInfo.
    let mut coefficients = Vec::with_capacity(primes.len() - 1);
    coefficients.push(
        primes[1]
            .clone()
            .mod_inverse(&primes[0])
            .and_then(|c| c.into_biguint())
            .ok_or(Error::Internal)?,
    );
    let mut r = &primes[0] * &primes[1];
    for prime in &primes[2..] {
        coefficients.push(
            r.clone()
                .mod_inverse(prime)
                .and_then(|c| c.into_biguint())
                .ok_or(Error::Internal)?,
        );
        r *= prime;
    }

    Ok(GeneratedComponents {
        n,
        e,
        d,
        primes,
        exponents,
        coefficients,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::ChaCha8Rng;
    use rand_core::SeedableRng;

    fn config(bits: usize) -> KeyGenConfig {
        KeyGenConfig {
            bits,
            ..KeyGenConfig::default()
        }
    }

    #[test]
    fn test_generate_512() {
        let mut rng = ChaCha8Rng::from_seed([42; 32]);
        match generate_components(&mut rng, &config(512), None).unwrap() {
            GenOutcome::Complete(c) => {
                assert_eq!(c.n.bits(), 512);
                assert_eq!(c.primes.len(), 2);
                assert_eq!(c.exponents.len(), 2);
                assert_eq!(c.coefficients.len(), 1);
                assert_eq!(c.primes.iter().fold(BigUint::one(), |acc, p| acc * p), c.n);
                // e d == 1 mod (p - 1) for each prime
                let ed = &c.e * &c.d;
                for p in &c.primes {
                    assert!((&ed % (p - BigUint::one())).is_one());
                }
            }
            GenOutcome::Partial(_) => panic!("no timeout was set"),
        }
    }

    #[test]
    fn test_generate_multi_prime() {
        let mut rng = ChaCha8Rng::from_seed([43; 32]);
        let cfg = KeyGenConfig {
            bits: 768,
            smallest_prime: 256,
            ..KeyGenConfig::default()
        };
        match generate_components(&mut rng, &cfg, None).unwrap() {
            GenOutcome::Complete(c) => {
                assert_eq!(c.primes.len(), 3);
                assert_eq!(c.n.bits(), 768);
                assert_eq!(c.coefficients.len(), 2);
            }
            GenOutcome::Partial(_) => panic!("no timeout was set"),
        }
    }

    #[test]
    fn test_timeout_yields_resumable_partial() {
        let mut rng = ChaCha8Rng::from_seed([44; 32]);
        let mut cfg = config(1024);
        cfg.timeout = Some(Duration::from_nanos(1));
        let partial = match generate_components(&mut rng, &cfg, None).unwrap() {
            GenOutcome::Partial(p) => p,
            GenOutcome::Complete(_) => return, // absurdly fast machine
        };
        assert!(partial.primes_found() < 2);

        cfg.timeout = None;
        match generate_components(&mut rng, &cfg, Some(partial)).unwrap() {
            GenOutcome::Complete(c) => assert_eq!(c.n.bits(), 1024),
            GenOutcome::Partial(_) => panic!("resumed run had no timeout"),
        }
    }

    #[test]
    fn test_bits_too_small() {
        let mut rng = ChaCha8Rng::from_seed([45; 32]);
        assert_eq!(
            generate_components(&mut rng, &config(4), None).unwrap_err(),
            Error::Length
        );
    }

    #[test]
    fn test_even_exponent_rejected() {
        let mut rng = ChaCha8Rng::from_seed([46; 32]);
        let cfg = KeyGenConfig {
            bits: 512,
            public_exponent: 4,
            ..KeyGenConfig::default()
        };
        assert!(generate_components(&mut rng, &cfg, None).is_err());
    }
}
