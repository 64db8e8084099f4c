//! Stateless helper functions for the presence-crypto library.

use ff::PrimeField;
use std::cmp::Ordering;

/// Convert up to 31 little-endian bytes into a field element using the
/// canonical byte representation expected by `ff::PrimeField::from_repr`.
///
/// This helper centralizes our endianness assumption and is covered by tests.
/// If upstream representation changes, tests will fail here.
pub fn bytes31_to_field_le<F: PrimeField>(bytes31: &[u8]) -> F {
    debug_assert!(bytes31.len() <= 31);
    let mut repr = <F as PrimeField>::Repr::default();
    let buf = repr.as_mut();
    // Copy provided bytes into the least-significant positions (little-endian)
    buf[..bytes31.len()].copy_from_slice(bytes31);
    F::from_repr(repr).expect("31-byte chunks should always fit in the field")
}

/// Compare two field elements as canonical 255-bit integers.
///
/// `to_repr` yields little-endian bytes; comparing from the most-significant
/// byte down gives the integer ordering used for the ascending-leaves
/// invariant.
pub fn cmp_field_repr<F: PrimeField<Repr = [u8; 32]>>(a: &F, b: &F) -> Ordering {
    let ra = a.to_repr();
    let rb = b.to_repr();
    for i in (0..32).rev() {
        match ra[i].cmp(&rb[i]) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

/// Recover the low 64 bits of a field element's canonical representation.
///
/// Valid only for elements constructed via `F::from(u64)`; used to read the
/// threshold and timestamp back out of public signals.
pub fn field_to_u64<F: PrimeField<Repr = [u8; 32]>>(value: &F) -> Option<u64> {
    let repr = value.to_repr();
    if repr[8..].iter().any(|b| *b != 0) {
        return None;
    }
    let mut low = [0u8; 8];
    low.copy_from_slice(&repr[..8]);
    Some(u64::from_le_bytes(low))
}
