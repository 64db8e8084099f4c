//! Core API data types and structures.
//!
//! This module contains the public data structures used by the API:
//! - CircuitSpec: identity and shape of one activity circuit
//! - Proof: the finished proof object sent to verifiers
//! - ProofRecord: the persistence object handed to the proof store
//! - VerificationOutcome: result of a verification check

use bincode::Options;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::backend::ProofElements;
use crate::config::{self, PublicSignalLayout};
use crate::error::PresenceProofError;
use crate::poseidon::FieldElement;
use crate::utils::field_to_u64;

use ff::PrimeField;

/// Identity and shape of one activity-threshold circuit.
///
/// The `(circuit_id, version)` pair keys the artifact set; `depth` and
/// `max_slots` are the shape every witness for this circuit must match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitSpec {
    pub circuit_id: String,
    pub version: String,
    pub depth: usize,
    pub max_slots: usize,
}

impl CircuitSpec {
    /// The default activity-threshold circuit shape.
    pub fn activity_default() -> Self {
        Self {
            circuit_id: "activity-threshold".to_string(),
            version: "v1".to_string(),
            depth: config::DEFAULT_TREE_DEPTH,
            max_slots: config::MAX_ACTIVITY_SLOTS,
        }
    }
}

/// The final proof object that is sent to the verifier.
///
/// Carries the backend-specific proof elements and the ordered public
/// signal vector `[root, threshold, freshness_timestamp, meets_threshold]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    pub elements: ProofElements,
    pub public_signals: Vec<FieldElement>,
}

/// Constants for proof serialization format
mod proof_format {
    /// Magic bytes identifying the presence proof format
    pub const MAGIC: &[u8] = b"PACT";

    /// Current format version for forward compatibility
    pub const VERSION: u16 = 1;

    /// Header size in bytes: magic(4) + version(2) + length(4)
    pub const HEADER_SIZE: usize = 10;
}

impl Proof {
    /// The activity root this proof is anchored to.
    pub fn root(&self) -> Option<FieldElement> {
        self.public_signals.get(PublicSignalLayout::ROOT).copied()
    }

    /// The claimed minimum-days threshold.
    pub fn threshold(&self) -> Option<u64> {
        self.public_signals
            .get(PublicSignalLayout::THRESHOLD)
            .and_then(field_to_u64)
    }

    /// The freshness timestamp the proof was generated against.
    pub fn freshness_timestamp(&self) -> Option<u64> {
        self.public_signals
            .get(PublicSignalLayout::FRESHNESS_TIMESTAMP)
            .and_then(field_to_u64)
    }

    /// Whether the backend counted enough active days.
    ///
    /// Independent of cryptographic validity: a proof can verify while
    /// reporting `meets_threshold = false`.
    pub fn meets_threshold(&self) -> Option<bool> {
        let signal = self
            .public_signals
            .get(PublicSignalLayout::MEETS_THRESHOLD)?;
        if *signal == FieldElement::from(1u64) {
            Some(true)
        } else if *signal == FieldElement::from(0u64) {
            Some(false)
        } else {
            None
        }
    }

    /// Serialize this proof to bytes for network transport.
    ///
    /// The format includes a magic number, version, and the proof data,
    /// giving a stable, versioned wire format.
    pub fn to_bytes(&self) -> crate::Result<Vec<u8>> {
        let mut result = Vec::new();

        result.extend_from_slice(proof_format::MAGIC);
        result.extend_from_slice(&proof_format::VERSION.to_le_bytes());

        // Pinned bincode options so the wire format stays stable even if
        // bincode's defaults change in the future.
        let options = bincode::DefaultOptions::new()
            .with_fixint_encoding()
            .with_little_endian()
            .reject_trailing_bytes();
        let proof_bytes = options.serialize(self).map_err(|e| {
            PresenceProofError::Serialization(format!("Failed to serialize proof: {e}"))
        })?;

        let length = proof_bytes.len() as u32;
        result.extend_from_slice(&length.to_le_bytes());
        result.extend_from_slice(&proof_bytes);

        Ok(result)
    }

    /// Deserialize a proof from bytes, validating magic and version first.
    pub fn from_bytes(bytes: &[u8]) -> crate::Result<Self> {
        if bytes.len() < proof_format::HEADER_SIZE {
            return Err(PresenceProofError::Serialization(
                "Proof bytes too short for header".to_string(),
            ));
        }

        let magic = &bytes[0..4];
        if magic != proof_format::MAGIC {
            return Err(PresenceProofError::Serialization(
                "Invalid magic bytes in proof".to_string(),
            ));
        }

        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != proof_format::VERSION {
            return Err(PresenceProofError::Serialization(format!(
                "Unsupported proof format version: {version}"
            )));
        }

        let length = u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]) as usize;

        let expected_len = proof_format::HEADER_SIZE + length;
        if bytes.len() < expected_len {
            return Err(PresenceProofError::Serialization(
                "Proof bytes truncated".to_string(),
            ));
        }
        if bytes.len() > expected_len {
            return Err(PresenceProofError::Serialization(
                "Proof bytes contain trailing data".to_string(),
            ));
        }

        let proof_bytes = &bytes[proof_format::HEADER_SIZE..expected_len];
        let options = bincode::DefaultOptions::new()
            .with_fixint_encoding()
            .with_little_endian()
            .reject_trailing_bytes();
        let proof = options.deserialize(proof_bytes).map_err(|e| {
            PresenceProofError::Serialization(format!("Failed to deserialize proof: {e}"))
        })?;

        Ok(proof)
    }
}

/// Result of a verification check.
///
/// A failed cryptographic check is an expected outcome, not an exception:
/// it is always reported as `is_valid = false` with a human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationOutcome {
    pub is_valid: bool,
    /// Present when `is_valid` is false
    pub reason: Option<String>,
}

impl VerificationOutcome {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            reason: None,
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            reason: Some(reason.into()),
        }
    }
}

/// Lifecycle status of a stored proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProofStatus {
    Generated,
    Verified,
    Expired,
}

/// The persistence object handed to the external proof store.
///
/// The subsystem produces this record; the store's lifecycle (expiry sweeps,
/// lookups) belongs to the collaborator that owns it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofRecord {
    /// Opaque identifier derived from the circuit and public signals
    pub id: String,
    pub circuit: CircuitSpec,
    pub proof: Proof,
    pub status: ProofStatus,
    pub generated_at_secs: u64,
    pub verified_at_secs: Option<u64>,
    pub expires_at_secs: u64,
}

impl ProofRecord {
    /// Wraps a freshly generated proof with identity and lifecycle stamps.
    pub fn new(circuit: CircuitSpec, proof: Proof, ttl_secs: u64) -> Self {
        let generated_at_secs = now_secs();

        let mut hasher = Sha256::new();
        hasher.update(circuit.circuit_id.as_bytes());
        hasher.update([0]);
        hasher.update(circuit.version.as_bytes());
        for signal in &proof.public_signals {
            hasher.update(signal.to_repr());
        }
        hasher.update(generated_at_secs.to_le_bytes());
        let id = hex::encode(hasher.finalize());

        Self {
            id,
            circuit,
            proof,
            status: ProofStatus::Generated,
            generated_at_secs,
            verified_at_secs: None,
            expires_at_secs: generated_at_secs + ttl_secs,
        }
    }

    /// Stamps a successful verification onto the record.
    pub fn mark_verified(&mut self) {
        self.status = ProofStatus::Verified;
        self.verified_at_secs = Some(now_secs());
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
