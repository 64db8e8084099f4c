//! Witness Assembler validation tests.
//!
//! The assembler is the enforcement point for the ordering and contiguity
//! invariants the proof system itself only weakly checks; these tests pin
//! the rejection behavior.

mod common;

use common::fixtures::{activity_days, DAY, FRESHNESS};
use presence_crypto::config::{MAX_FRESHNESS_TIMESTAMP, MIN_FRESHNESS_TIMESTAMP};
use presence_crypto::witness::{assemble_witness, WitnessSlot};
use presence_crypto::{verify_inclusion_proof, PresenceProofError, WitnessError};

const DEPTH: usize = 10;
const MAX_SLOTS: usize = 16;

#[test]
fn assembles_padded_fixed_shape_witness() {
    let witness = assemble_witness(&activity_days(5), 3, FRESHNESS, DEPTH, MAX_SLOTS).unwrap();

    assert_eq!(witness.slots.len(), MAX_SLOTS);
    assert_eq!(witness.active_count(), 5);
    assert_eq!(witness.public.threshold, 3);
    assert_eq!(witness.depth, DEPTH);

    // Active prefix, padding suffix.
    for (i, slot) in witness.slots.iter().enumerate() {
        assert_eq!(slot.is_active(), i < 5, "slot {i}");
    }
}

#[test]
fn active_slot_proofs_verify_against_witness_root() {
    let witness = assemble_witness(&activity_days(7), 4, FRESHNESS, DEPTH, MAX_SLOTS).unwrap();

    for slot in &witness.slots {
        if let WitnessSlot::Active { leaf, proof } = slot {
            assert!(verify_inclusion_proof(witness.public.root, *leaf, proof));
        }
    }
}

#[test]
fn input_order_does_not_change_the_witness() {
    // Leaves are sorted by canonical field order during assembly, so the
    // caller's ordering of raw values is irrelevant.
    let mut days = activity_days(6);
    let sorted = assemble_witness(&days, 3, FRESHNESS, DEPTH, MAX_SLOTS).unwrap();
    days.reverse();
    let reversed = assemble_witness(&days, 3, FRESHNESS, DEPTH, MAX_SLOTS).unwrap();

    assert_eq!(sorted.public.root, reversed.public.root);
    assert_eq!(sorted.slots, reversed.slots);
}

#[test]
fn rejects_batch_larger_than_max_slots() {
    let err = assemble_witness(&activity_days(MAX_SLOTS + 1), 3, FRESHNESS, DEPTH, MAX_SLOTS)
        .unwrap_err();
    assert!(matches!(
        err,
        PresenceProofError::Witness(WitnessError::TooManyEntries { got, max })
            if got == MAX_SLOTS + 1 && max == MAX_SLOTS
    ));
}

#[test]
fn rejects_duplicate_days() {
    let mut days = activity_days(4);
    days.push(days[1]);
    let err = assemble_witness(&days, 2, FRESHNESS, DEPTH, MAX_SLOTS).unwrap_err();
    assert!(matches!(
        err,
        PresenceProofError::Witness(WitnessError::DuplicateLeaf { .. })
    ));
}

#[test]
fn rejects_timestamps_outside_epoch_window() {
    let days = activity_days(2);

    let before = assemble_witness(&days, 1, MIN_FRESHNESS_TIMESTAMP - 1, DEPTH, MAX_SLOTS);
    assert!(matches!(
        before.unwrap_err(),
        PresenceProofError::Witness(WitnessError::TimestampOutOfRange { .. })
    ));

    let at_end = assemble_witness(&days, 1, MAX_FRESHNESS_TIMESTAMP, DEPTH, MAX_SLOTS);
    assert!(matches!(
        at_end.unwrap_err(),
        PresenceProofError::Witness(WitnessError::TimestampOutOfRange { .. })
    ));

    // Window boundaries are inclusive at the start, exclusive at the end.
    assert!(assemble_witness(&days, 1, MIN_FRESHNESS_TIMESTAMP, DEPTH, MAX_SLOTS).is_ok());
    assert!(
        assemble_witness(&days, 1, MAX_FRESHNESS_TIMESTAMP - 1, DEPTH, MAX_SLOTS).is_ok()
    );
}

#[test]
fn validate_rejects_active_after_padding() {
    // A non-zero leaf after a zero leaf breaks the contiguous-suffix rule.
    let mut witness =
        assemble_witness(&activity_days(3), 2, FRESHNESS, DEPTH, MAX_SLOTS).unwrap();

    let active = witness.slots[1].clone();
    witness.slots[1] = WitnessSlot::Padding;
    witness.slots[MAX_SLOTS - 1] = active;

    assert!(matches!(
        witness.validate(),
        Err(WitnessError::PaddingBeforeActive { .. })
    ));
}

#[test]
fn validate_rejects_non_ascending_leaves() {
    let mut witness =
        assemble_witness(&activity_days(4), 2, FRESHNESS, DEPTH, MAX_SLOTS).unwrap();
    witness.slots.swap(0, 3);

    assert!(matches!(
        witness.validate(),
        Err(WitnessError::NonAscendingLeaves { .. })
    ));
}

#[test]
fn validate_rejects_repeated_active_slot() {
    let mut witness =
        assemble_witness(&activity_days(4), 2, FRESHNESS, DEPTH, MAX_SLOTS).unwrap();
    witness.slots[1] = witness.slots[0].clone();

    assert!(matches!(
        witness.validate(),
        Err(WitnessError::DuplicateLeaf { .. })
    ));
}

#[test]
fn validate_rejects_foreign_inclusion_proof() {
    // Splice slot data from a witness over different activity into an
    // otherwise valid witness: the proof no longer resolves to the root.
    let witness_a =
        assemble_witness(&activity_days(4), 2, FRESHNESS, DEPTH, MAX_SLOTS).unwrap();
    let other_days: Vec<u64> = (0..4)
        .map(|i| MIN_FRESHNESS_TIMESTAMP + 500 * DAY + i * DAY)
        .collect();
    let witness_b = assemble_witness(&other_days, 2, FRESHNESS, DEPTH, MAX_SLOTS).unwrap();

    let mut tampered = witness_a.clone();
    tampered.slots[0] = witness_b.slots[0].clone();

    let err = tampered.validate().unwrap_err();
    assert!(matches!(
        err,
        WitnessError::ProofMismatch { .. } | WitnessError::NonAscendingLeaves { .. }
    ));
}

#[test]
fn empty_batch_assembles_with_zero_active_slots() {
    let witness = assemble_witness(&[], 1, FRESHNESS, DEPTH, MAX_SLOTS).unwrap();
    assert_eq!(witness.active_count(), 0);
    assert!(witness.slots.iter().all(|s| !s.is_active()));
    assert!(witness.validate().is_ok());
}
