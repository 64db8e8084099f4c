//! Error types for the presence-crypto library.
//!
//! The taxonomy separates the three failure domains a caller reacts to
//! differently: bad input (`WitnessError`, fix the input), backend failure
//! (`BackendError`, retry at most once then surface), and cache failure
//! (`CacheError`, a missed optimization that never fails a proof flow).
//! A proof that fails its cryptographic check is *not* an error; see
//! [`crate::api::VerificationOutcome`].

/// Witness-construction and validation failures.
///
/// Raised before any backend call; invalid batches are rejected, never
/// silently repaired.
#[derive(Debug, thiserror::Error)]
pub enum WitnessError {
    /// Non-zero leaves must be strictly ascending in canonical field order
    #[error("leaves out of order at slot {slot}: non-zero leaves must be strictly ascending")]
    NonAscendingLeaves { slot: usize },

    /// A duplicate raw value produced a repeated leaf
    #[error("duplicate activity value at slot {slot}")]
    DuplicateLeaf { slot: usize },

    /// An active slot appeared after a padding slot
    #[error("active slot {slot} follows a padding slot: padding must be a contiguous suffix")]
    PaddingBeforeActive { slot: usize },

    /// More activity entries than the circuit has slots
    #[error("too many activity entries: {got} exceeds limit of {max}")]
    TooManyEntries { got: usize, max: usize },

    /// Freshness timestamp outside the valid epoch window
    #[error("timestamp {timestamp} outside valid epoch window [{min}, {max})")]
    TimestampOutOfRange { timestamp: u64, min: u64, max: u64 },

    /// An active slot carries the reserved zero sentinel
    #[error("active slot {slot} carries the reserved zero leaf")]
    ZeroLeaf { slot: usize },

    /// An inclusion proof has the wrong number of levels for the tree depth
    #[error("inclusion proof at slot {slot} has {got} levels, tree depth is {depth}")]
    ProofShape { slot: usize, got: usize, depth: usize },

    /// An active slot's inclusion proof does not resolve to the witness root
    #[error("inclusion proof at slot {slot} does not match the witness root")]
    ProofMismatch { slot: usize },
}

/// Proving-backend failures.
///
/// Callers may retry a `Crashed` or `Timeout` once; after that the error
/// must be surfaced. `Cancelled` and `Unsatisfiable` are not retryable.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The backend process or thread died mid-computation
    #[error("proving backend crashed: {0}")]
    Crashed(String),

    /// The backend exceeded its time budget
    #[error("proving backend timed out after {elapsed_ms} ms")]
    Timeout { elapsed_ms: u64 },

    /// Generation was cancelled via its token; partial work was discarded
    #[error("proof generation cancelled")]
    Cancelled,

    /// The witness does not satisfy the circuit's constraints
    #[error("witness unsatisfiable: {0}")]
    Unsatisfiable(String),

    /// The backend returned public signals violating the ordering contract
    #[error("public signal contract violated: {0}")]
    PublicSignalContract(String),

    /// A proving/verifying artifact could not be parsed by the backend
    #[error("malformed artifact: {0}")]
    MalformedArtifact(String),
}

impl BackendError {
    /// Whether a caller may retry this failure (at most once).
    pub fn is_retryable(&self) -> bool {
        matches!(self, BackendError::Crashed(_) | BackendError::Timeout { .. })
    }
}

/// Artifact-cache failures.
///
/// These are logged and treated as cache misses; they never fail proof
/// generation or verification.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Backing store unavailable or an I/O operation failed
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Index or payload encoding failed
    #[error("cache serialization error: {0}")]
    Serialization(String),

    /// The on-disk index is unreadable or from an unsupported format version
    #[error("cache index corrupt: {0}")]
    Corrupt(String),
}

/// Top-level error type for the presence-crypto library.
#[derive(Debug, thiserror::Error)]
pub enum PresenceProofError {
    /// Witness ordering, contiguity, size, or freshness invariant violated
    #[error(transparent)]
    Witness(#[from] WitnessError),

    /// Proving backend crashed, timed out, or broke its output contract
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// An artifact required for proving could not be obtained from cache or origin
    #[error("artifact unavailable: {kind} for circuit {circuit_id} version {version}: {reason}")]
    ArtifactUnavailable {
        circuit_id: String,
        kind: String,
        version: String,
        reason: String,
    },

    /// Merkle tree construction or proof extraction failed
    #[error("merkle tree error: {0}")]
    MerkleTree(String),

    /// Index out of bounds
    #[error("index out of bounds: index {index}, capacity {capacity}")]
    IndexOutOfBounds { index: u64, capacity: u64 },

    /// Invalid input parameters (generic fallback)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Serialization/deserialization failed
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Convenience Result type for presence-crypto operations
pub type Result<T> = std::result::Result<T, PresenceProofError>;
