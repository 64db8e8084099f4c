//! The proving-backend seam.
//!
//! The constraint compiler and prover are an opaque dependency reached
//! through [`ProvingBackend`]: two functions, fixed artifact formats, and a
//! fixed public-signal wire order. Nothing else in the crate knows what the
//! backend is; swapping a real Groth16 toolchain in changes no other module.
//!
//! [`NativeBackend`] is the in-tree implementation: a deterministic
//! evaluator that executes the activity statement directly (root-checks
//! active slots, counts them, compares against the threshold) and emits
//! Groth16-shaped proof elements bound to the verifying key and public
//! signals by a SHA-256 transcript. It provides integrity for tests and the
//! CLI demo, not zero-knowledge, and its artifacts are self-generated
//! rather than the product of a trusted setup.

use ff::{Field, PrimeField};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::PublicSignalLayout;
use crate::error::BackendError;
use crate::merkle::verify_inclusion_proof;
use crate::poseidon::FieldElement;
use crate::utils::bytes31_to_field_le;
use crate::witness::{CircuitInput, WitnessSlot};

/// Cooperative cancellation signal for long-running backend calls.
///
/// The backend polls [`CancelToken::is_cancelled`] between units of work and
/// returns [`BackendError::Cancelled`] when set; partial computation is
/// dropped with the call frame.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent; already-delivered results are
    /// unaffected.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Backend-specific proof elements plus protocol identification tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofElements {
    pub group_a: Vec<FieldElement>,
    pub group_b: Vec<Vec<FieldElement>>,
    pub group_c: Vec<FieldElement>,
    /// Proof-system tag, e.g. "groth16"
    pub protocol: String,
    /// Curve tag, e.g. "pallas"
    pub curve: String,
}

/// What a successful proving call returns: the proof elements and the
/// ordered public signal vector the backend derived from the witness.
#[derive(Debug, Clone)]
pub struct BackendOutput {
    pub elements: ProofElements,
    pub public_signals: Vec<FieldElement>,
}

/// Narrow interface to the proving toolchain.
///
/// Implementations are CPU-bound and synchronous; the orchestrator runs them
/// on blocking threads with a timeout and a [`CancelToken`].
pub trait ProvingBackend: Send + Sync + 'static {
    /// Generate a proof for the witness.
    ///
    /// The backend, not the caller, computes `meets_threshold` from the
    /// witness and appends it to the public signals in the fixed wire order.
    fn generate_proof(
        &self,
        circuit_binary: &[u8],
        proving_key: &[u8],
        witness: &CircuitInput,
        cancel: &CancelToken,
    ) -> Result<BackendOutput, BackendError>;

    /// Check a proof against a verifying key and public signals.
    ///
    /// `Ok(false)` means the cryptographic check failed, an expected
    /// outcome, not an error. `Err` is reserved for infrastructure failures
    /// such as an unparseable key.
    fn verify_proof(
        &self,
        verifying_key: &[u8],
        public_signals: &[FieldElement],
        elements: &ProofElements,
    ) -> Result<bool, BackendError>;
}

/// Where artifacts come from when the cache misses.
///
/// Implementations fetch from the deployment's artifact registry (network,
/// bundled files, a setup ceremony output directory). Fetch failures fail
/// the proof request; cache failures never do.
#[async_trait::async_trait]
pub trait ArtifactSource: Send + Sync {
    async fn fetch(
        &self,
        circuit_id: &str,
        kind: crate::cache::ArtifactKind,
        version: &str,
    ) -> std::result::Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync>>;
}

// --- Native reference backend ---

/// Artifact format magics for the native backend.
mod artifact_format {
    /// Compiled circuit binary: magic + version + depth(u16) + max_slots(u32)
    pub const CIRCUIT_MAGIC: &[u8] = b"NCIR";
    /// Proving key: magic + 32-byte key material
    pub const PKEY_MAGIC: &[u8] = b"NPK1";
    /// Verifying key: magic + 32-byte digest of the proving key material
    pub const VKEY_MAGIC: &[u8] = b"NVK1";

    pub const VERSION: u16 = 1;
    pub const CIRCUIT_LEN: usize = 4 + 2 + 2 + 4;
    pub const KEY_LEN: usize = 4 + 32;
}

/// The complete artifact set for one circuit shape.
#[derive(Debug, Clone)]
pub struct ArtifactSet {
    pub circuit_binary: Vec<u8>,
    pub proving_key: Vec<u8>,
    pub verifying_key: Vec<u8>,
}

/// Deterministic reference backend. See the module docs for what it is and
/// is not.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeBackend;

impl NativeBackend {
    pub fn new() -> Self {
        Self
    }

    /// Deterministically derive the artifact set for a circuit shape.
    ///
    /// Stands in for circuit compilation plus trusted setup: the proving key
    /// material is a digest of the circuit identity, and the verifying key
    /// commits to the proving key.
    pub fn generate_artifacts(
        circuit_id: &str,
        version: &str,
        depth: usize,
        max_slots: usize,
    ) -> ArtifactSet {
        let mut circuit_binary =
            Vec::with_capacity(artifact_format::CIRCUIT_LEN);
        circuit_binary.extend_from_slice(artifact_format::CIRCUIT_MAGIC);
        circuit_binary.extend_from_slice(&artifact_format::VERSION.to_le_bytes());
        circuit_binary.extend_from_slice(&(depth as u16).to_le_bytes());
        circuit_binary.extend_from_slice(&(max_slots as u32).to_le_bytes());

        let mut hasher = Sha256::new();
        hasher.update(b"presence-native-pk");
        hasher.update(circuit_id.as_bytes());
        hasher.update([0]);
        hasher.update(version.as_bytes());
        hasher.update(&circuit_binary);
        let pk_material: [u8; 32] = hasher.finalize().into();

        let mut proving_key = Vec::with_capacity(artifact_format::KEY_LEN);
        proving_key.extend_from_slice(artifact_format::PKEY_MAGIC);
        proving_key.extend_from_slice(&pk_material);

        let mut verifying_key = Vec::with_capacity(artifact_format::KEY_LEN);
        verifying_key.extend_from_slice(artifact_format::VKEY_MAGIC);
        verifying_key.extend_from_slice(&Self::vk_digest(&pk_material));

        ArtifactSet {
            circuit_binary,
            proving_key,
            verifying_key,
        }
    }

    fn vk_digest(pk_material: &[u8]) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(b"presence-native-vk");
        hasher.update(pk_material);
        hasher.finalize().into()
    }

    fn parse_circuit(circuit_binary: &[u8]) -> Result<(usize, usize), BackendError> {
        if circuit_binary.len() != artifact_format::CIRCUIT_LEN
            || &circuit_binary[..4] != artifact_format::CIRCUIT_MAGIC
        {
            return Err(BackendError::MalformedArtifact(
                "circuit binary has wrong magic or length".to_string(),
            ));
        }
        let version = u16::from_le_bytes([circuit_binary[4], circuit_binary[5]]);
        if version != artifact_format::VERSION {
            return Err(BackendError::MalformedArtifact(format!(
                "unsupported circuit binary version {version}"
            )));
        }
        let depth = u16::from_le_bytes([circuit_binary[6], circuit_binary[7]]) as usize;
        let max_slots = u32::from_le_bytes([
            circuit_binary[8],
            circuit_binary[9],
            circuit_binary[10],
            circuit_binary[11],
        ]) as usize;
        Ok((depth, max_slots))
    }

    fn parse_key<'a>(bytes: &'a [u8], magic: &[u8], what: &str) -> Result<&'a [u8], BackendError> {
        if bytes.len() != artifact_format::KEY_LEN || &bytes[..4] != magic {
            return Err(BackendError::MalformedArtifact(format!(
                "{what} has wrong magic or length"
            )));
        }
        Ok(&bytes[4..])
    }

    /// Expand a transcript seed into the Groth16-shaped element groups.
    ///
    /// Every element is a function of `(vk digest, public signals)`, so
    /// tampering with any signal or verifying with the wrong key changes
    /// every group.
    fn transcript_elements(
        vk_digest: &[u8],
        public_signals: &[FieldElement],
    ) -> ProofElements {
        let mut hasher = Sha256::new();
        hasher.update(b"presence-native-transcript");
        hasher.update(vk_digest);
        for signal in public_signals {
            hasher.update(signal.to_repr());
        }
        let seed: [u8; 32] = hasher.finalize().into();

        let mut elements = Vec::with_capacity(12);
        let mut state = seed;
        for counter in 0u8..12 {
            let mut h = Sha256::new();
            h.update(state);
            h.update([counter]);
            state = h.finalize().into();
            elements.push(bytes31_to_field_le::<FieldElement>(&state[..31]));
        }

        ProofElements {
            group_a: elements[0..3].to_vec(),
            group_b: vec![
                elements[3..5].to_vec(),
                elements[5..7].to_vec(),
                elements[7..9].to_vec(),
            ],
            group_c: elements[9..12].to_vec(),
            protocol: "groth16".to_string(),
            curve: "pallas".to_string(),
        }
    }
}

impl ProvingBackend for NativeBackend {
    fn generate_proof(
        &self,
        circuit_binary: &[u8],
        proving_key: &[u8],
        witness: &CircuitInput,
        cancel: &CancelToken,
    ) -> Result<BackendOutput, BackendError> {
        let (depth, max_slots) = Self::parse_circuit(circuit_binary)?;
        let pk_material =
            Self::parse_key(proving_key, artifact_format::PKEY_MAGIC, "proving key")?;

        if witness.depth != depth {
            return Err(BackendError::Unsatisfiable(format!(
                "witness depth {} does not match circuit depth {depth}",
                witness.depth
            )));
        }
        if witness.slots.len() != max_slots {
            return Err(BackendError::Unsatisfiable(format!(
                "witness has {} slots, circuit has {max_slots}",
                witness.slots.len()
            )));
        }

        // Evaluate the statement: root-check every active slot, count them.
        // Padding slots are unconstrained by construction.
        let mut active_count: u64 = 0;
        for (i, slot) in witness.slots.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(BackendError::Cancelled);
            }
            if let WitnessSlot::Active { leaf, proof } = slot {
                if !verify_inclusion_proof(witness.public.root, *leaf, proof) {
                    return Err(BackendError::Unsatisfiable(format!(
                        "slot {i} inclusion proof does not resolve to the root"
                    )));
                }
                active_count += 1;
            }
        }

        let meets_threshold = active_count >= witness.public.threshold;
        let public_signals = PublicSignalLayout::build(
            witness.public.root,
            witness.public.threshold,
            witness.public.freshness_timestamp,
            meets_threshold,
        );

        let vk_digest = Self::vk_digest(pk_material);
        let elements = Self::transcript_elements(&vk_digest, &public_signals);

        Ok(BackendOutput {
            elements,
            public_signals,
        })
    }

    fn verify_proof(
        &self,
        verifying_key: &[u8],
        public_signals: &[FieldElement],
        elements: &ProofElements,
    ) -> Result<bool, BackendError> {
        let vk_digest =
            Self::parse_key(verifying_key, artifact_format::VKEY_MAGIC, "verifying key")?;

        if public_signals.len() != crate::config::NUM_PUBLIC_SIGNALS {
            return Ok(false);
        }
        // meets_threshold must be a bit
        let meets = public_signals[PublicSignalLayout::MEETS_THRESHOLD];
        if meets != FieldElement::ZERO && meets != FieldElement::ONE {
            return Ok(false);
        }

        let expected = Self::transcript_elements(vk_digest, public_signals);
        Ok(expected == *elements)
    }
}

/// [`ArtifactSource`] that derives native-backend artifacts on demand.
///
/// Stands in for a real artifact registry in tests and the CLI demo; the
/// circuit shape is fixed at construction.
#[derive(Debug, Clone, Copy)]
pub struct NativeSetup {
    pub depth: usize,
    pub max_slots: usize,
}

#[async_trait::async_trait]
impl ArtifactSource for NativeSetup {
    async fn fetch(
        &self,
        circuit_id: &str,
        kind: crate::cache::ArtifactKind,
        version: &str,
    ) -> std::result::Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync>> {
        use crate::cache::ArtifactKind;

        let set = NativeBackend::generate_artifacts(circuit_id, version, self.depth, self.max_slots);
        Ok(match kind {
            ArtifactKind::CircuitBinary => set.circuit_binary,
            ArtifactKind::ProvingKey => set.proving_key,
            ArtifactKind::VerifyingKey => set.verifying_key,
        })
    }
}
