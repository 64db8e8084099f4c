//! Presence-Crypto: activity-threshold zero-knowledge proofs
//!
//! This library proves that a participant was active on at least N distinct
//! days, anchored to a Merkle root over hashed activity records, without
//! revealing which days. The constraint compiler and prover are an opaque
//! dependency behind the [`backend::ProvingBackend`] trait.
//!
//! ## Main Components
//!
//! - [`api`]: High-level orchestration: [`api::ActivityProver`] with
//!   `generate`/`verify`
//! - [`witness`]: Witness assembly with ordering/padding invariants
//! - [`merkle`]: Sparse fixed-depth Merkle tree with Poseidon hashing
//! - [`poseidon`]: The circuit-friendly leaf/node hash
//! - [`cache`]: Persistent, versioned artifact cache with LRU size bounds
//! - [`backend`]: The opaque proving-backend seam and a native reference
//!   evaluator
//! - [`config`]: Centralized configuration constants
//!
//! ## Error Handling
//!
//! This library uses `Result` types for robust error handling. Core
//! functions return `Result<T, PresenceProofError>`; bad witnesses surface
//! as [`WitnessError`] before any backend work, backend failures as
//! [`BackendError`], and cache trouble never fails a proof flow. A proof
//! that fails its cryptographic check is reported through
//! [`api::VerificationOutcome`], not an error.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use presence_crypto::{
//!     api::{ActivityProver, CircuitSpec},
//!     backend::{NativeBackend, NativeSetup},
//!     cache::ArtifactCache,
//!     witness::assemble_witness,
//! };
//!
//! # async fn demo() -> presence_crypto::Result<()> {
//! let spec = CircuitSpec::activity_default();
//!
//! // 1. Assemble a witness from raw activity timestamps (sorted, distinct)
//! let days: Vec<u64> = (0..5).map(|i| 1_700_000_000 + i * 86_400).collect();
//! let witness = assemble_witness(&days, 3, 1_700_500_000, spec.depth, spec.max_slots)?;
//!
//! // 2. Wire a prover: backend + cache + artifact origin
//! let cache = Arc::new(ArtifactCache::open("artifact-cache").await.unwrap());
//! let source = Arc::new(NativeSetup { depth: spec.depth, max_slots: spec.max_slots });
//! let prover = ActivityProver::new(Arc::new(NativeBackend::new()), cache, source);
//!
//! // 3. Generate and verify
//! let record = prover.generate(&witness, &spec).await?;
//! let outcome = prover.verify(&record.proof, &witness.public, &spec).await?;
//! assert!(outcome.is_valid);
//! assert_eq!(record.proof.meets_threshold(), Some(true));
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod merkle;
pub mod poseidon;
pub mod utils;
pub mod witness;

// Re-export commonly used types and functions for convenience
pub use api::{ActivityProver, CircuitSpec, Proof, ProofRecord, ProofStatus, VerificationOutcome};
pub use backend::{ArtifactSource, CancelToken, NativeBackend, ProofElements, ProvingBackend};
pub use cache::{ArtifactCache, ArtifactKind, CacheStats};
pub use error::{BackendError, CacheError, PresenceProofError, Result, WitnessError};
pub use merkle::{verify_inclusion_proof, ActivityTree, InclusionProof};
pub use poseidon::{hash_activity_value, hash_node, poseidon_hash2, FieldElement};
pub use witness::{assemble_witness, CircuitInput, PublicInputs, WitnessSlot};
