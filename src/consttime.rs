//! Length-checked constant-time byte comparison.

use subtle::ConstantTimeEq;

/// Compares two byte strings without early exit.
///
/// Returns `false` immediately when the lengths differ; the lengths of
/// padded/hashed material are public. For equal lengths every byte is
/// inspected regardless of where the first mismatch occurs.
#[inline]
pub fn eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}
