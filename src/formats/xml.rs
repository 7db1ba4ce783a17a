//! The .NET-style `<RSAKeyValue>` XML encoding: base64 children named
//! `Modulus`, `Exponent` and, for private keys, `P`, `Q`, `DP`, `DQ`,
//! `InverseQ`, `D`. Tag matching is case-insensitive.

use num_bigint::BigUint;
use num_traits::Zero;

use super::{KeyComponents, LoadOutcome};
use crate::errors::{Error, Result};

/// Extracts the text content of `<name>...</name>`, matching the tag name
/// case-insensitively.
fn child_text<'a>(document: &'a str, name: &str) -> Option<&'a str> {
    let lower = document.to_ascii_lowercase();
    let name = name.to_ascii_lowercase();

    let open = format!("<{}>", name);
    let close = format!("</{}>", name);
    let start = lower.find(&open)? + open.len();
    let end = lower[start..].find(&close)? + start;
    Some(&document[start..end])
}

fn child_uint(document: &str, name: &str) -> Option<BigUint> {
    let text: String = child_text(document, name)?
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    let bytes = base64::decode(text).ok()?;
    Some(BigUint::from_bytes_be(&bytes))
}

pub(crate) fn load(input: &[u8], _password: Option<&[u8]>) -> LoadOutcome {
    let document = match core::str::from_utf8(input) {
        Ok(text) => text,
        Err(_) => return Ok(None),
    };
    if child_text(document, "RSAKeyValue").is_none() {
        return Ok(None);
    }

    let modulus = match child_uint(document, "Modulus") {
        Some(n) if !n.is_zero() => n,
        _ => return Ok(None),
    };
    let public_exponent = match child_uint(document, "Exponent") {
        Some(e) => e,
        None => return Ok(None),
    };

    let private_exponent = child_uint(document, "D");
    if private_exponent.is_none() {
        return Ok(Some(KeyComponents::public(modulus, public_exponent)));
    }

    // A private key value carries the full CRT set.
    let fields: Option<(BigUint, BigUint, BigUint, BigUint, BigUint)> = (|| {
        Some((
            child_uint(document, "P")?,
            child_uint(document, "Q")?,
            child_uint(document, "DP")?,
            child_uint(document, "DQ")?,
            child_uint(document, "InverseQ")?,
        ))
    })();
    let (p, q, dp, dq, qinv) = match fields {
        Some(fields) => fields,
        None => return Ok(None),
    };

    Ok(Some(KeyComponents {
        is_public: false,
        modulus,
        public_exponent,
        private_exponent,
        primes: vec![p, q],
        exponents: vec![dp, dq],
        coefficients: vec![qinv],
    }))
}

fn b64(x: &BigUint) -> String {
    base64::encode(x.to_bytes_be())
}

pub(crate) fn save_public(c: &KeyComponents) -> Result<String> {
    Ok(format!(
        "<RSAKeyValue><Modulus>{}</Modulus><Exponent>{}</Exponent></RSAKeyValue>",
        b64(&c.modulus),
        b64(&c.public_exponent)
    ))
}

pub(crate) fn save_private(c: &KeyComponents) -> Result<String> {
    let d = c.private_exponent.as_ref().ok_or(Error::MissingPrivateKey)?;
    if c.primes.len() != 2 || c.exponents.len() != 2 || c.coefficients.len() != 1 {
        return Err(Error::unsupported("multi-prime key in XML"));
    }

    Ok(format!(
        "<RSAKeyValue><Modulus>{}</Modulus><Exponent>{}</Exponent><P>{}</P><Q>{}</Q><DP>{}</DP><DQ>{}</DQ><InverseQ>{}</InverseQ><D>{}</D></RSAKeyValue>",
        b64(&c.modulus),
        b64(&c.public_exponent),
        b64(&c.primes[0]),
        b64(&c.primes[1]),
        b64(&c.exponents[0]),
        b64(&c.exponents[1]),
        b64(&c.coefficients[0]),
        b64(d),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_traits::FromPrimitive;

    #[test]
    fn test_public_roundtrip_case_insensitive() {
        let xml = "<rsakeyvalue><MODULUS>DKE=</MODULUS><exponent>AQAB</exponent></rsakeyvalue>";
        let c = load(xml.as_bytes(), None).unwrap().unwrap();
        assert!(c.is_public);
        assert_eq!(c.modulus, BigUint::from_u64(3233).unwrap());
        assert_eq!(c.public_exponent, BigUint::from_u64(65537).unwrap());
    }

    #[test]
    fn test_private_roundtrip() {
        let c = KeyComponents {
            is_public: false,
            modulus: BigUint::from_u64(3233).unwrap(),
            public_exponent: BigUint::from_u64(17).unwrap(),
            private_exponent: Some(BigUint::from_u64(413).unwrap()),
            primes: vec![
                BigUint::from_u64(61).unwrap(),
                BigUint::from_u64(53).unwrap(),
            ],
            exponents: vec![
                BigUint::from_u64(53).unwrap(),
                BigUint::from_u64(49).unwrap(),
            ],
            coefficients: vec![BigUint::from_u64(38).unwrap()],
        };
        let xml = save_private(&c).unwrap();
        let parsed = load(xml.as_bytes(), None).unwrap().unwrap();
        assert_eq!(parsed, c);
    }

    #[test]
    fn test_whitespace_in_base64() {
        let xml = "<RSAKeyValue><Modulus>\n  DK\n  E=\n</Modulus><Exponent>AQAB</Exponent></RSAKeyValue>";
        let c = load(xml.as_bytes(), None).unwrap().unwrap();
        assert_eq!(c.modulus, BigUint::from_u64(3233).unwrap());
    }

    #[test]
    fn test_not_xml() {
        assert!(load(b"\x30\x82\x01\x00", None).unwrap().is_none());
        assert!(load(b"<OtherElement/>", None).unwrap().is_none());
    }
}
