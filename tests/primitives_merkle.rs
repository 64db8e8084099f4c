//! Low-level Merkle tree primitive tests.
//!
//! These tests verify the sparse commitment tree independent of the
//! higher-level proof system.

use ff::Field;
use presence_crypto::merkle::{
    verify_inclusion_proof, zero_table, ActivityTree, InclusionProof, F,
};
use presence_crypto::poseidon::{hash_activity_value, hash_node, poseidon_hash2};

const DAY: u64 = 86_400;

fn leaves(n: usize) -> Vec<(u64, F)> {
    (0..n)
        .map(|i| (i as u64, hash_activity_value(1_600_000_000 + (i as u64) * DAY)))
        .collect()
}

#[test]
fn test_poseidon_hash_pair_basic() {
    let a = F::from(123u64);
    let b = F::from(456u64);
    let hash1 = poseidon_hash2(a, b);
    let hash2 = poseidon_hash2(a, b);

    // Same inputs should produce same hash
    assert_eq!(hash1, hash2);

    // Different inputs should produce different hash
    let c = F::from(789u64);
    let hash3 = poseidon_hash2(a, c);
    assert_ne!(hash1, hash3);

    // Order matters
    let hash4 = poseidon_hash2(b, a);
    assert_ne!(hash1, hash4);
}

#[test]
fn test_zero_table_chains_node_hashes() {
    let zeros = zero_table(6);
    assert_eq!(zeros.len(), 7);
    assert_eq!(zeros[0], F::ZERO);
    for i in 0..6 {
        assert_eq!(zeros[i + 1], hash_node(zeros[i], zeros[i]));
    }
}

#[test]
fn test_sparse_root_matches_dense_construction() {
    // A fully populated depth-3 tree built sparsely must agree with a
    // hand-rolled dense fold over the same leaves.
    let depth = 3;
    let populated = leaves(8);
    let tree = ActivityTree::build(&populated, depth).unwrap();

    let mut layer: Vec<F> = populated.iter().map(|(_, l)| *l).collect();
    while layer.len() > 1 {
        layer = layer
            .chunks(2)
            .map(|pair| hash_node(pair[0], pair[1]))
            .collect();
    }
    assert_eq!(tree.root(), layer[0]);
}

#[test]
fn test_every_leaf_proof_verifies_against_own_root() {
    // For any batch size, every inclusion proof must verify against the
    // tree's own computed root.
    for n in [1usize, 2, 3, 5, 16] {
        let populated = leaves(n);
        let tree = ActivityTree::build(&populated, 20).unwrap();
        let root = tree.root();

        for (index, leaf) in &populated {
            let proof = tree.proof_for(*index).unwrap();
            assert_eq!(proof.siblings.len(), 20);
            assert!(
                verify_inclusion_proof(root, *leaf, &proof),
                "leaf {index} of {n} failed to verify"
            );
        }
    }
}

#[test]
fn test_proof_rejects_wrong_leaf_and_wrong_root() {
    let populated = leaves(4);
    let tree = ActivityTree::build(&populated, 10).unwrap();
    let root = tree.root();

    let proof = tree.proof_for(2).unwrap();
    let right_leaf = populated[2].1;
    let wrong_leaf = populated[3].1;

    assert!(verify_inclusion_proof(root, right_leaf, &proof));
    assert!(!verify_inclusion_proof(root, wrong_leaf, &proof));
    assert!(!verify_inclusion_proof(root + F::ONE, right_leaf, &proof));
}

#[test]
fn test_tampered_sibling_fails_verification() {
    let populated = leaves(6);
    let tree = ActivityTree::build(&populated, 8).unwrap();
    let root = tree.root();

    let mut proof = tree.proof_for(1).unwrap();
    proof.siblings[3] += F::ONE;
    assert!(!verify_inclusion_proof(root, populated[1].1, &proof));

    let mut proof = tree.proof_for(1).unwrap();
    proof.path_indices[0] = !proof.path_indices[0];
    assert!(!verify_inclusion_proof(root, populated[1].1, &proof));
}

#[test]
fn test_sparse_indices_resolve_against_zero_subtrees() {
    // Leaves far apart in a deep tree: most siblings come from the zero
    // table, and proofs must still verify.
    let a = hash_activity_value(1_600_000_000);
    let b = hash_activity_value(1_600_000_000 + DAY);
    let tree = ActivityTree::build(&[(0, a), (1 << 19, b)], 20).unwrap();

    for (index, leaf) in [(0u64, a), (1u64 << 19, b)] {
        let proof = tree.proof_for(index).unwrap();
        assert!(verify_inclusion_proof(tree.root(), leaf, &proof));
    }
}

#[test]
fn test_random_sparse_population_proofs_verify() {
    use presence_crypto::config::TEST_RANDOM_SEED;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    let mut rng = StdRng::seed_from_u64(TEST_RANDOM_SEED);
    let depth = 16;

    let mut populated = Vec::new();
    let mut used = std::collections::BTreeSet::new();
    for _ in 0..40 {
        let index: u64 = rng.gen_range(0..(1u64 << depth));
        if used.insert(index) {
            populated.push((index, hash_activity_value(1_600_000_000 + index)));
        }
    }

    let tree = ActivityTree::build(&populated, depth).unwrap();
    for (index, leaf) in &populated {
        let proof = tree.proof_for(*index).unwrap();
        assert!(verify_inclusion_proof(tree.root(), *leaf, &proof));
    }
}

#[test]
fn test_proof_for_out_of_range_index_errors() {
    let tree = ActivityTree::build(&leaves(2), 4).unwrap();
    assert!(tree.proof_for(16).is_err());
    assert!(tree.proof_for(15).is_ok());
}

#[test]
fn test_inert_proof_shape() {
    let proof = InclusionProof::inert(12);
    assert_eq!(proof.siblings.len(), 12);
    assert_eq!(proof.path_indices.len(), 12);
    assert!(proof.siblings.iter().all(|s| *s == F::ZERO));
}

#[test]
fn test_empty_and_single_leaf_roots_differ() {
    let empty = ActivityTree::build(&[], 8).unwrap();
    let single = ActivityTree::build(&leaves(1), 8).unwrap();
    assert_ne!(empty.root(), single.root());
    assert_eq!(empty.leaf_count(), 0);
    assert_eq!(single.leaf_count(), 1);
}
