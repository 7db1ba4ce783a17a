//! Conversions between the crate's big integers and `simple_asn1` blocks.

use num_bigint::BigUint;
use simple_asn1::{ASN1Block, BigInt as Asn1Int, BigUint as Asn1Uint, OID};

use crate::errors::{Error, Result};

pub(crate) fn oid(parts: &[u64]) -> OID {
    OID::new(parts.iter().map(|p| Asn1Uint::from(*p)).collect())
}

/// Encodes a non-negative integer as an ASN.1 INTEGER block. A leading zero
/// keeps the two's-complement sign bit clear.
pub(crate) fn uint_block(x: &BigUint) -> ASN1Block {
    let bytes = x.to_bytes_be();
    let mut signed = Vec::with_capacity(bytes.len() + 1);
    signed.push(0u8);
    signed.extend_from_slice(&bytes);
    ASN1Block::Integer(0, Asn1Int::from_signed_bytes_be(&signed))
}

/// Extracts a non-negative integer from an INTEGER block.
pub(crate) fn block_to_uint(block: &ASN1Block) -> Option<BigUint> {
    match block {
        ASN1Block::Integer(_, value) => {
            let bytes = value.to_signed_bytes_be();
            if bytes.first().map_or(false, |b| b & 0x80 != 0) {
                return None;
            }
            Some(BigUint::from_bytes_be(&bytes))
        }
        _ => None,
    }
}

pub(crate) fn block_to_usize(block: &ASN1Block) -> Option<usize> {
    use num_traits::ToPrimitive;
    block_to_uint(block)?.to_usize()
}

pub(crate) fn der(block: &ASN1Block) -> Result<Vec<u8>> {
    simple_asn1::to_der(block).map_err(|_| Error::Internal)
}
