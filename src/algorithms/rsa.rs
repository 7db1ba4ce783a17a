//! The RSA exponentiation primitives: textbook public-key exponentiation and
//! the private-key path with CRT recombination and blinding.

use num_bigint::{BigInt, BigUint, IntoBigInt, IntoBigUint, ModInverse, RandBigInt};
use num_traits::{One, Signed, Zero};
use rand_core::CryptoRngCore;
use zeroize::Zeroize;

use crate::errors::{Error, Result};

/// Borrowed view of the private-key material needed for exponentiation.
///
/// `coefficients[0]` is `q^-1 mod p`; for `i >= 1`, `coefficients[i]` is
/// `(p_1 * ... * p_{i+1})^-1 mod p_{i+2}` — the same historical-accident
/// layout RFC 3447 uses for `OtherPrimeInfo`.
pub(crate) struct PrivateParts<'a> {
    pub n: &'a BigUint,
    pub d: &'a BigUint,
    pub e: Option<&'a BigUint>,
    pub primes: &'a [BigUint],
    pub exponents: &'a [BigUint],
    pub coefficients: &'a [BigUint],
}

impl PrivateParts<'_> {
    fn has_crt(&self) -> bool {
        self.primes.len() >= 2
            && self.exponents.len() == self.primes.len()
            && self.coefficients.len() == self.primes.len() - 1
    }
}

/// Raw RSA public-key operation. No padding is performed.
#[inline]
pub(crate) fn rsa_encrypt(n: &BigUint, e: &BigUint, m: &BigUint) -> BigUint {
    m.modpow(e, n)
}

/// Raw RSA private-key operation, no padding.
///
/// When CRT material is present the computation runs per prime and is
/// recombined with Garner's algorithm. Blinding is applied whenever an RNG is
/// supplied and the public exponent is known: a uniform `r` in
/// `[1, min(primes) - 1]` multiplies each residue by `r^e mod p_i` before the
/// per-prime exponentiation and by `r^-1 mod p_i` after. Without CRT material
/// the plain `c^d mod n` is computed.
pub(crate) fn rsa_decrypt<R: CryptoRngCore + ?Sized>(
    rng: Option<&mut R>,
    key: &PrivateParts<'_>,
    c: &BigUint,
) -> Result<BigUint> {
    if key.n.is_zero() || c >= key.n {
        return Err(Error::OutOfRange);
    }

    if !key.has_crt() {
        return Ok(c.modpow(key.d, key.n));
    }

    // r and its per-prime inverses exist because r < min(primes) and r >= 1.
    let blinding = match (rng, key.e) {
        (Some(rng), Some(_)) => {
            let smallest = key.primes.iter().min().expect("primes is non-empty");
            let mut r = rng.gen_biguint_below(&(smallest - BigUint::one()));
            r += BigUint::one();
            Some(r)
        }
        _ => None,
    };

    let mut residues = Vec::with_capacity(key.primes.len());
    for (prime, exp) in key.primes.iter().zip(key.exponents.iter()) {
        let mut c_i = c % prime;
        if let Some(ref r) = blinding {
            let e = key.e.expect("blinding requires the public exponent");
            c_i = (c_i * r.modpow(e, prime)) % prime;
        }
        let mut m_i = c_i.modpow(exp, prime);
        if let Some(ref r) = blinding {
            let r_inv = r
                .clone()
                .mod_inverse(prime)
                .and_then(|i| i.into_biguint())
                .ok_or(Error::Internal)?;
            m_i = (m_i * r_inv) % prime;
        }
        residues.push(m_i.into_bigint().ok_or(Error::Internal)?);
    }

    let mut primes: Vec<BigInt> = key
        .primes
        .iter()
        .map(|p| p.clone().into_bigint())
        .map(Option::unwrap)
        .collect();

    // Garner recombination. First the classic two-prime step:
    //   h = qInv (m_1 - m_2) mod p_1;  m = m_2 + h q
    let qinv = key.coefficients[0]
        .clone()
        .into_bigint()
        .ok_or(Error::Internal)?;
    let mut m = residues[0].clone();
    m -= &residues[1];
    while m.is_negative() {
        m += &primes[0];
    }
    m *= &qinv;
    m %= &primes[0];
    m *= &primes[1];
    m += &residues[1];

    // Then the remaining primes, with R the running product of the priors.
    let mut r_acc = &primes[0] * &primes[1];
    for (i, coeff) in key.coefficients.iter().skip(1).enumerate() {
        let prime = &primes[2 + i];
        let coeff = coeff.clone().into_bigint().ok_or(Error::Internal)?;
        let mut h = residues[2 + i].clone();
        h -= &m;
        h *= &coeff;
        h %= prime;
        while h.is_negative() {
            h += prime;
        }
        h *= &r_acc;
        m += &h;
        r_acc *= prime;
    }

    for prime in primes.iter_mut() {
        prime.zeroize();
    }
    primes.clear();
    for residue in residues.iter_mut() {
        residue.zeroize();
    }
    residues.clear();

    m.into_biguint().ok_or(Error::Internal)
}

/// Raw RSA private-key operation with a CRT fault check: the result is
/// re-encrypted under the public exponent and compared against the input.
pub(crate) fn rsa_decrypt_and_check<R: CryptoRngCore + ?Sized>(
    rng: Option<&mut R>,
    key: &PrivateParts<'_>,
    c: &BigUint,
) -> Result<BigUint> {
    let m = rsa_decrypt(rng, key, c)?;

    if let Some(e) = key.e {
        let check = rsa_encrypt(key.n, e, &m);
        if c != &check {
            return Err(Error::Internal);
        }
    }

    Ok(m)
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_traits::FromPrimitive;
    use rand_chacha::ChaCha8Rng;
    use rand_core::SeedableRng;

    // 3 * 11 * 17 = 561, e = 3, d = e^-1 mod lcm(2, 10, 16) = 27
    fn toy_key() -> (BigUint, BigUint, BigUint, Vec<BigUint>, Vec<BigUint>, Vec<BigUint>) {
        let n = BigUint::from_u64(561).unwrap();
        let e = BigUint::from_u64(3).unwrap();
        let d = BigUint::from_u64(27).unwrap();
        let primes: Vec<BigUint> = [3u64, 11, 17]
            .iter()
            .map(|p| BigUint::from_u64(*p).unwrap())
            .collect();
        let exponents: Vec<BigUint> = primes
            .iter()
            .map(|p| &d % (p - BigUint::one()))
            .collect();
        let qinv = primes[1]
            .clone()
            .mod_inverse(&primes[0])
            .unwrap()
            .into_biguint()
            .unwrap();
        let r = &primes[0] * &primes[1];
        let c2 = r
            .mod_inverse(&primes[2])
            .unwrap()
            .into_biguint()
            .unwrap();
        (n, e, d, primes, exponents, vec![qinv, c2])
    }

    #[test]
    fn test_crt_matches_plain_exponentiation() {
        let (n, e, d, primes, exponents, coefficients) = toy_key();
        let key = PrivateParts {
            n: &n,
            d: &d,
            e: Some(&e),
            primes: &primes,
            exponents: &exponents,
            coefficients: &coefficients,
        };
        let bare = PrivateParts {
            n: &n,
            d: &d,
            e: Some(&e),
            primes: &[],
            exponents: &[],
            coefficients: &[],
        };

        let mut rng = ChaCha8Rng::from_seed([1; 32]);
        for m in 0u64..561 {
            let m = BigUint::from_u64(m).unwrap();
            let plain = rsa_decrypt::<ChaCha8Rng>(None, &bare, &m).unwrap();
            let crt = rsa_decrypt::<ChaCha8Rng>(None, &key, &m).unwrap();
            let blinded = rsa_decrypt(Some(&mut rng), &key, &m).unwrap();
            assert_eq!(plain, crt);
            assert_eq!(plain, blinded);
        }
    }

    #[test]
    fn test_roundtrip_with_fault_check() {
        let (n, e, d, primes, exponents, coefficients) = toy_key();
        let key = PrivateParts {
            n: &n,
            d: &d,
            e: Some(&e),
            primes: &primes,
            exponents: &exponents,
            coefficients: &coefficients,
        };

        let mut rng = ChaCha8Rng::from_seed([2; 32]);
        let m = BigUint::from_u64(42).unwrap();
        let c = rsa_encrypt(&n, &e, &m);
        let m2 = rsa_decrypt_and_check(Some(&mut rng), &key, &c).unwrap();
        assert_eq!(m, m2);
    }

    #[test]
    fn test_out_of_range() {
        let (n, e, d, primes, exponents, coefficients) = toy_key();
        let key = PrivateParts {
            n: &n,
            d: &d,
            e: Some(&e),
            primes: &primes,
            exponents: &exponents,
            coefficients: &coefficients,
        };
        let c = n.clone();
        assert_eq!(
            rsa_decrypt::<ChaCha8Rng>(None, &key, &c).unwrap_err(),
            Error::OutOfRange
        );
    }
}
