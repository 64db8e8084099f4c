//! Shared Poseidon hashing for leaves, tree nodes, and derived tags.
//!
//! This module is the single implementation of the circuit-friendly hash
//! used by the commitment scheme. Keeping it in one place guarantees the
//! host-side tree and the proving backend agree on every digest.

use ff::Field;
use generic_array::typenum::U2;
use neptune::poseidon::{Poseidon, PoseidonConstants};
use once_cell::sync::Lazy;

/// The scalar field of the Pallas curve, in which all commitments live.
pub type FieldElement = pasta_curves::pallas::Scalar;

/// Cached Poseidon constants for 2-arity hashing
static POSEIDON_CONSTANTS: Lazy<PoseidonConstants<FieldElement, U2>> =
    Lazy::new(PoseidonConstants::new);

/// Domain separation tag values
/// These are distinct integers used to prevent hash collisions across different contexts
mod tag_values {
    pub const LEAF: u64 = 1;
    pub const NODE: u64 = 2;
    pub const RECORD_ID: u64 = 3;
}

/// Domain separation tags for different Poseidon hash contexts
pub mod domain_tags {
    use super::tag_values;
    use ff::PrimeField;

    /// Tag for hashing raw activity values into leaves
    pub fn leaf<F: PrimeField>() -> F {
        F::from(tag_values::LEAF)
    }

    /// Tag for hashing internal Merkle tree nodes
    pub fn node<F: PrimeField>() -> F {
        F::from(tag_values::NODE)
    }

    /// Tag for deriving proof record identifiers
    pub fn record_id<F: PrimeField>() -> F {
        F::from(tag_values::RECORD_ID)
    }
}

/// Core Poseidon hash function for two field elements.
/// This is the single implementation used everywhere in the system.
/// Uses cached Poseidon constants for performance.
pub fn poseidon_hash2(left: FieldElement, right: FieldElement) -> FieldElement {
    Poseidon::new_with_preimage(&[left, right], &POSEIDON_CONSTANTS).hash()
}

/// Domain-separated Poseidon hash with 3 inputs (tag + 2 data elements)
pub fn poseidon_hash_tagged(tag: FieldElement, x: FieldElement, y: FieldElement) -> FieldElement {
    // First hash tag with x, then hash result with y for consistent 2-arity
    let h1 = poseidon_hash2(tag, x);
    poseidon_hash2(h1, y)
}

/// Domain-separated hash for Merkle tree nodes
pub fn hash_node(left: FieldElement, right: FieldElement) -> FieldElement {
    poseidon_hash_tagged(domain_tags::node(), left, right)
}

/// Hashes one raw activity value (a day-granular unix timestamp) into a
/// Merkle leaf.
///
/// Pure and deterministic; the zero field element is reserved as the
/// "no activity" padding sentinel and is never a valid output for callers
/// (the witness assembler rejects the astronomically unlikely collision).
pub fn hash_activity_value(value: u64) -> FieldElement {
    poseidon_hash_tagged(
        domain_tags::leaf(),
        FieldElement::from(value),
        FieldElement::ZERO,
    )
}
