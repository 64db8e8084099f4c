//! Witness assembly for the activity-threshold circuit.
//!
//! This module is the SINGLE SOURCE OF TRUTH for witness structure. It turns
//! a batch of raw activity values into the fixed-shape [`CircuitInput`] the
//! proving backend consumes: hashed leaves sorted ascending, an inclusion
//! proof per active slot, and an explicit padding suffix.
//!
//! The ordering and contiguity invariants are enforced here *and* re-checked
//! by the orchestrator before every backend call. The proof system itself
//! only weakly protects them (manipulating padding cannot increase the
//! counted threshold), so host-side validation is what keeps the witness
//! discipline honest; violations are rejected with [`WitnessError`], never
//! silently repaired.

use ff::Field;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::{debug, debug_span};

use crate::config;
use crate::error::{Result, WitnessError};
use crate::merkle::{verify_inclusion_proof, ActivityTree, InclusionProof};
use crate::poseidon::{hash_activity_value, FieldElement};
use crate::utils::cmp_field_repr;

/// One slot of the private witness.
///
/// Padding is a distinct variant rather than an always-present-but-ignored
/// parallel array, which makes the contiguous-suffix invariant mechanically
/// checkable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WitnessSlot {
    /// A populated slot: one hashed activity record and its inclusion proof.
    Active {
        leaf: FieldElement,
        proof: InclusionProof,
    },
    /// An empty slot holding the zero sentinel and inert proof data.
    /// Never checked against the root.
    Padding,
}

impl WitnessSlot {
    /// The leaf value this slot contributes to the circuit's leaf array.
    pub fn leaf(&self) -> FieldElement {
        match self {
            WitnessSlot::Active { leaf, .. } => *leaf,
            WitnessSlot::Padding => FieldElement::ZERO,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, WitnessSlot::Active { .. })
    }
}

/// The public half of the circuit input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicInputs {
    /// Merkle root of the activity commitment tree
    pub root: FieldElement,
    /// Minimum number of distinct active days being claimed
    pub threshold: u64,
    /// Timestamp anchoring the claim's freshness
    pub freshness_timestamp: u64,
}

/// Full public + private input assignment for one proof request.
///
/// Constructed by [`assemble_witness`], immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitInput {
    /// Public inputs, exposed to the verifier in the fixed signal order
    pub public: PublicInputs,
    /// Tree depth every inclusion proof must match
    pub depth: usize,
    /// Exactly `max_slots` slots: active entries first, padding suffix after
    pub slots: Vec<WitnessSlot>,
}

impl CircuitInput {
    /// Number of active (non-padding) slots.
    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_active()).count()
    }

    /// Flattens the slots into the parallel `leaves`/`proofs` arrays most
    /// prover wire formats consume.
    ///
    /// Padding slots contribute the zero leaf and inert all-zero proof data;
    /// the proving side never checks those proofs against the root because
    /// only non-zero slots are counted.
    pub fn slot_arrays(&self) -> (Vec<FieldElement>, Vec<InclusionProof>) {
        let mut leaves = Vec::with_capacity(self.slots.len());
        let mut proofs = Vec::with_capacity(self.slots.len());
        for slot in &self.slots {
            match slot {
                WitnessSlot::Active { leaf, proof } => {
                    leaves.push(*leaf);
                    proofs.push(proof.clone());
                }
                WitnessSlot::Padding => {
                    leaves.push(FieldElement::ZERO);
                    proofs.push(InclusionProof::inert(self.depth));
                }
            }
        }
        (leaves, proofs)
    }

    /// Re-validates every invariant the assembler guarantees.
    ///
    /// Defense in depth: the orchestrator calls this again immediately
    /// before invoking the backend, so a witness tampered with between
    /// assembly and proving is still rejected host-side.
    pub fn validate(&self) -> std::result::Result<(), WitnessError> {
        if self.public.freshness_timestamp < config::MIN_FRESHNESS_TIMESTAMP
            || self.public.freshness_timestamp >= config::MAX_FRESHNESS_TIMESTAMP
        {
            return Err(WitnessError::TimestampOutOfRange {
                timestamp: self.public.freshness_timestamp,
                min: config::MIN_FRESHNESS_TIMESTAMP,
                max: config::MAX_FRESHNESS_TIMESTAMP,
            });
        }

        let mut seen_padding = false;
        let mut prev_leaf: Option<FieldElement> = None;

        for (slot_idx, slot) in self.slots.iter().enumerate() {
            match slot {
                WitnessSlot::Padding => seen_padding = true,
                WitnessSlot::Active { leaf, proof } => {
                    if seen_padding {
                        return Err(WitnessError::PaddingBeforeActive { slot: slot_idx });
                    }
                    if *leaf == FieldElement::ZERO {
                        // An "active" zero leaf would be indistinguishable
                        // from padding inside the circuit.
                        return Err(WitnessError::ZeroLeaf { slot: slot_idx });
                    }
                    if let Some(prev) = prev_leaf {
                        match cmp_field_repr(&prev, leaf) {
                            Ordering::Less => {}
                            Ordering::Equal => {
                                return Err(WitnessError::DuplicateLeaf { slot: slot_idx })
                            }
                            Ordering::Greater => {
                                return Err(WitnessError::NonAscendingLeaves { slot: slot_idx })
                            }
                        }
                    }
                    prev_leaf = Some(*leaf);

                    if proof.siblings.len() != self.depth
                        || proof.path_indices.len() != self.depth
                    {
                        return Err(WitnessError::ProofShape {
                            slot: slot_idx,
                            got: proof.siblings.len(),
                            depth: self.depth,
                        });
                    }
                    if !verify_inclusion_proof(self.public.root, *leaf, proof) {
                        return Err(WitnessError::ProofMismatch { slot: slot_idx });
                    }
                }
            }
        }

        Ok(())
    }
}

/// Assembles a [`CircuitInput`] from a batch of raw activity values.
///
/// Steps: hash each value to a leaf, sort leaves ascending (canonical field
/// order; this is what lets the circuit enforce uniqueness with one O(n)
/// comparison chain), build the commitment tree with leaf `i` at index `i`,
/// extract an inclusion proof per leaf, pad to `max_slots`, and re-validate
/// the assembled witness before returning it.
///
/// Padding slots carry inert proof data that is never checked against the
/// root; the threshold-counting logic only root-checks non-zero slots.
pub fn assemble_witness(
    values: &[u64],
    threshold: u64,
    freshness_timestamp: u64,
    depth: usize,
    max_slots: usize,
) -> Result<CircuitInput> {
    let _span = debug_span!(
        "assemble_witness",
        num_values = values.len(),
        threshold,
        depth,
        max_slots
    )
    .entered();

    if values.len() > max_slots {
        return Err(WitnessError::TooManyEntries {
            got: values.len(),
            max: max_slots,
        }
        .into());
    }
    if freshness_timestamp < config::MIN_FRESHNESS_TIMESTAMP
        || freshness_timestamp >= config::MAX_FRESHNESS_TIMESTAMP
    {
        return Err(WitnessError::TimestampOutOfRange {
            timestamp: freshness_timestamp,
            min: config::MIN_FRESHNESS_TIMESTAMP,
            max: config::MAX_FRESHNESS_TIMESTAMP,
        }
        .into());
    }

    // Hash raw values into leaves.
    let mut leaves: Vec<FieldElement> = Vec::with_capacity(values.len());
    for (i, value) in values.iter().enumerate() {
        let leaf = hash_activity_value(*value);
        if leaf == FieldElement::ZERO {
            return Err(WitnessError::ZeroLeaf { slot: i }.into());
        }
        leaves.push(leaf);
    }

    // Sort ascending in canonical field order; duplicates become adjacent
    // and are rejected below.
    leaves.sort_unstable_by(cmp_field_repr);
    for (i, pair) in leaves.windows(2).enumerate() {
        if cmp_field_repr(&pair[0], &pair[1]) == Ordering::Equal {
            return Err(WitnessError::DuplicateLeaf { slot: i + 1 }.into());
        }
    }

    // Commit: leaf i sits at tree index i.
    let indexed: Vec<(u64, FieldElement)> = leaves
        .iter()
        .enumerate()
        .map(|(i, leaf)| (i as u64, *leaf))
        .collect();
    let tree = ActivityTree::build(&indexed, depth)?;
    let root = tree.root();

    let mut slots = Vec::with_capacity(max_slots);
    for (i, leaf) in leaves.iter().enumerate() {
        let proof = tree.proof_for(i as u64)?;
        slots.push(WitnessSlot::Active { leaf: *leaf, proof });
    }
    while slots.len() < max_slots {
        slots.push(WitnessSlot::Padding);
    }

    let input = CircuitInput {
        public: PublicInputs {
            root,
            threshold,
            freshness_timestamp,
        },
        depth,
        slots,
    };

    input.validate()?;

    debug!(
        active = input.active_count(),
        padded = max_slots - input.active_count(),
        "witness assembled"
    );

    Ok(input)
}
