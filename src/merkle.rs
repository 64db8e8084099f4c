//! Sparse Merkle tree for the activity commitment scheme.
//!
//! The tree has a fixed depth `D` and capacity `2^D`, but only nodes with at
//! least one populated descendant are materialized; every empty subtree at
//! level `i` resolves to a precomputed `zeros[i]` value where `zeros[0] = 0`
//! and `zeros[i+1] = hash_node(zeros[i], zeros[i])`. Building over `N`
//! leaves costs O(N·D) hashes instead of O(2^D), and extracting an
//! inclusion proof costs O(D).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::PresenceProofError;
use crate::poseidon::{hash_node, FieldElement};

/// A type alias kept for call sites that predate the `FieldElement` name.
pub type F = FieldElement;

/// A Merkle inclusion proof usable both host-side and as circuit witness data.
///
/// Contains the sibling hash and direction bit for every level from the leaf
/// up to (but excluding) the root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InclusionProof {
    /// The sibling hashes needed to reconstruct the path from leaf to root.
    /// Length equals the tree depth.
    pub siblings: Vec<F>,
    /// Direction bits for the path from leaf to root.
    /// `true` means the current node is on the right (sibling on the left).
    pub path_indices: Vec<bool>,
}

impl InclusionProof {
    /// An inert proof carrying no information, used for padding slots.
    /// Never checked against a root.
    pub fn inert(depth: usize) -> Self {
        use ff::Field;
        Self {
            siblings: vec![F::ZERO; depth],
            path_indices: vec![false; depth],
        }
    }
}

/// Fixed-depth sparse Merkle tree over Poseidon.
///
/// `levels[0]` holds populated leaves, `levels[d]` holds populated nodes at
/// height `d`. Indices absent from a level's map are empty and stand for
/// `zeros[d]`.
#[derive(Debug, Clone)]
pub struct ActivityTree {
    depth: usize,
    levels: Vec<BTreeMap<u64, F>>,
    zeros: Vec<F>,
    root: F,
}

/// Precompute the zero-subtree table for a given depth.
///
/// `zeros[i]` is the hash of a fully empty subtree of height `i`.
pub fn zero_table(depth: usize) -> Vec<F> {
    use ff::Field;
    let mut zeros = Vec::with_capacity(depth + 1);
    zeros.push(F::ZERO);
    for i in 0..depth {
        let z = zeros[i];
        zeros.push(hash_node(z, z));
    }
    zeros
}

impl ActivityTree {
    /// Builds a tree of the given depth from `(index, leaf)` pairs.
    ///
    /// Duplicate or out-of-range indices are rejected, as are zero leaves
    /// (the zero value is the empty sentinel, not data).
    pub fn build(leaves: &[(u64, F)], depth: usize) -> Result<Self, PresenceProofError> {
        use ff::Field;

        if depth == 0 || depth > crate::config::MAX_TREE_DEPTH {
            return Err(PresenceProofError::InvalidInput(format!(
                "tree depth {} out of range (1..={})",
                depth,
                crate::config::MAX_TREE_DEPTH
            )));
        }

        let capacity: u64 = 1u64 << depth;
        let zeros = zero_table(depth);

        let mut levels: Vec<BTreeMap<u64, F>> = vec![BTreeMap::new(); depth + 1];

        for (index, leaf) in leaves {
            if *index >= capacity {
                return Err(PresenceProofError::IndexOutOfBounds {
                    index: *index,
                    capacity,
                });
            }
            if *leaf == F::ZERO {
                return Err(PresenceProofError::MerkleTree(
                    "zero leaf cannot be inserted: zero is the empty sentinel".to_string(),
                ));
            }
            if levels[0].insert(*index, *leaf).is_some() {
                return Err(PresenceProofError::MerkleTree(format!(
                    "duplicate leaf index {index}"
                )));
            }
        }

        // Materialize ancestors bottom-up; empty siblings come from the table.
        for level in 0..depth {
            let parents: Vec<u64> = levels[level].keys().map(|i| i >> 1).collect();
            for parent in parents {
                if levels[level + 1].contains_key(&parent) {
                    continue;
                }
                let left = levels[level]
                    .get(&(parent << 1))
                    .copied()
                    .unwrap_or(zeros[level]);
                let right = levels[level]
                    .get(&((parent << 1) | 1))
                    .copied()
                    .unwrap_or(zeros[level]);
                levels[level + 1].insert(parent, hash_node(left, right));
            }
        }

        let root = levels[depth].get(&0).copied().unwrap_or(zeros[depth]);

        Ok(Self {
            depth,
            levels,
            zeros,
            root,
        })
    }

    /// Returns the root of the tree.
    pub fn root(&self) -> F {
        self.root
    }

    /// Returns the tree depth.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Number of populated leaves.
    pub fn leaf_count(&self) -> usize {
        self.levels[0].len()
    }

    /// The leaf at `index`, if populated.
    pub fn leaf(&self, index: u64) -> Option<F> {
        self.levels[0].get(&index).copied()
    }

    /// Generates the inclusion proof for the leaf at `index`.
    ///
    /// Walks from the leaf to the root collecting the sibling at each level;
    /// missing siblings resolve via the zero table. The index must address a
    /// slot inside the tree, populated or not; proving an empty slot is
    /// legitimate (it proves the slot holds the zero sentinel).
    pub fn proof_for(&self, index: u64) -> Result<InclusionProof, PresenceProofError> {
        let capacity: u64 = 1u64 << self.depth;
        if index >= capacity {
            return Err(PresenceProofError::IndexOutOfBounds { index, capacity });
        }

        let mut siblings = Vec::with_capacity(self.depth);
        let mut path_indices = Vec::with_capacity(self.depth);
        let mut current = index;

        for level in 0..self.depth {
            let is_right_node = current & 1 == 1;
            let sibling_index = if is_right_node { current - 1 } else { current + 1 };
            let sibling = self.levels[level]
                .get(&sibling_index)
                .copied()
                .unwrap_or(self.zeros[level]);

            siblings.push(sibling);
            path_indices.push(is_right_node);
            current >>= 1;
        }

        Ok(InclusionProof {
            siblings,
            path_indices,
        })
    }
}

/// Verifies an inclusion proof against a given root.
/// This is a non-circuit implementation for direct verification.
pub fn verify_inclusion_proof(root: F, leaf: F, proof: &InclusionProof) -> bool {
    if proof.siblings.len() != proof.path_indices.len() {
        return false;
    }
    let mut current_hash = leaf;
    for (sibling, is_right) in proof.siblings.iter().zip(proof.path_indices.iter()) {
        current_hash = if *is_right {
            // Sibling is on the left
            hash_node(*sibling, current_hash)
        } else {
            // Sibling is on the right
            hash_node(current_hash, *sibling)
        };
    }
    current_hash == root
}
