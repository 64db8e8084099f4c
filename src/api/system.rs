//! ActivityProver: unified API entry point for the activity-threshold proof
//! system.
//!
//! This facade owns the dependencies one proving session needs (the proving
//! backend, the artifact cache, and the artifact origin) and enforces the
//! concurrency discipline: at most one in-flight generation per circuit
//! identity, with a second request queueing behind the first or explicitly
//! cancelling and restarting it. The cache is passed in by the caller; there
//! is no ambient global instance.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use super::prove::{self, ProvingArtifacts};
use super::types::{CircuitSpec, Proof, ProofRecord, VerificationOutcome};
use super::verify;
use crate::backend::{ArtifactSource, CancelToken, ProvingBackend};
use crate::cache::{ArtifactCache, ArtifactKind};
use crate::config;
use crate::error::{PresenceProofError, Result};
use crate::witness::{CircuitInput, PublicInputs};

/// Tunables for one prover instance.
#[derive(Debug, Clone)]
pub struct ProverConfig {
    /// Wall-clock budget for a single backend proving call
    pub backend_timeout: Duration,
    /// Validity window stamped on finished proof records
    pub proof_ttl_secs: u64,
}

impl Default for ProverConfig {
    fn default() -> Self {
        Self {
            backend_timeout: Duration::from_secs(config::DEFAULT_BACKEND_TIMEOUT_SECS),
            proof_ttl_secs: config::DEFAULT_PROOF_TTL_SECS,
        }
    }
}

/// Per-request generation options.
#[derive(Debug, Clone, Default)]
pub struct ProveOptions {
    /// Caller-held cancellation token; a fresh one is created if absent
    pub cancel: Option<CancelToken>,
    /// Cancel the currently running generation for this circuit instead of
    /// queueing behind it
    pub cancel_running: bool,
}

/// Tracks the in-flight generation state for one circuit identity.
struct CircuitFlight {
    /// Serializes generations; waiters queue here in arrival order
    gate: Arc<AsyncMutex<()>>,
    /// Token of the generation currently holding the gate
    running: CancelToken,
}

/// The unified API entry point for activity-threshold proving.
pub struct ActivityProver {
    backend: Arc<dyn ProvingBackend>,
    cache: Arc<ArtifactCache>,
    source: Arc<dyn ArtifactSource>,
    config: ProverConfig,
    inflight: std::sync::Mutex<HashMap<String, CircuitFlight>>,
}

impl ActivityProver {
    /// Create a prover from its three dependencies with default tunables.
    pub fn new(
        backend: Arc<dyn ProvingBackend>,
        cache: Arc<ArtifactCache>,
        source: Arc<dyn ArtifactSource>,
    ) -> Self {
        Self::with_config(backend, cache, source, ProverConfig::default())
    }

    pub fn with_config(
        backend: Arc<dyn ProvingBackend>,
        cache: Arc<ArtifactCache>,
        source: Arc<dyn ArtifactSource>,
        config: ProverConfig,
    ) -> Self {
        Self {
            backend,
            cache,
            source,
            config,
            inflight: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Generate a proof for an assembled witness, queueing behind any
    /// in-flight generation for the same circuit.
    pub async fn generate(
        &self,
        witness: &CircuitInput,
        spec: &CircuitSpec,
    ) -> Result<ProofRecord> {
        self.generate_opts(witness, spec, ProveOptions::default())
            .await
    }

    /// Generate with explicit concurrency/cancellation options.
    ///
    /// Exactly one generation runs per circuit identity at a time. With
    /// `cancel_running` set, the request cancels the generation currently
    /// holding the gate before taking its place in the queue; otherwise it
    /// waits its turn. Cancelling a request discards its partial work and
    /// never affects proofs that were already delivered.
    pub async fn generate_opts(
        &self,
        witness: &CircuitInput,
        spec: &CircuitSpec,
        opts: ProveOptions,
    ) -> Result<ProofRecord> {
        // Fail fast on a bad witness before touching the queue or the cache.
        witness.validate()?;

        let token = opts.cancel.unwrap_or_default();
        let gate = {
            let mut inflight = self
                .inflight
                .lock()
                .expect("inflight map mutex should not be poisoned");
            let flight = inflight
                .entry(spec.circuit_id.clone())
                .or_insert_with(|| CircuitFlight {
                    gate: Arc::new(AsyncMutex::new(())),
                    running: CancelToken::new(),
                });
            if opts.cancel_running {
                debug!(circuit_id = %spec.circuit_id, "cancelling in-flight generation");
                flight.running.cancel();
            }
            Arc::clone(&flight.gate)
        };

        let _slot = gate.lock().await;

        // We hold the gate: publish our token so a later cancel-and-restart
        // or explicit cancel() reaches this run.
        {
            let mut inflight = self
                .inflight
                .lock()
                .expect("inflight map mutex should not be poisoned");
            if let Some(flight) = inflight.get_mut(&spec.circuit_id) {
                flight.running = token.clone();
            }
        }

        if token.is_cancelled() {
            return Err(crate::error::BackendError::Cancelled.into());
        }

        let artifacts = ProvingArtifacts {
            circuit_binary: self
                .load_artifact(spec, ArtifactKind::CircuitBinary)
                .await?,
            proving_key: self.load_artifact(spec, ArtifactKind::ProvingKey).await?,
        };

        let proof = prove::generate(
            Arc::clone(&self.backend),
            witness.clone(),
            spec,
            artifacts,
            token,
            self.config.backend_timeout,
        )
        .await?;

        Ok(ProofRecord::new(
            spec.clone(),
            proof,
            self.config.proof_ttl_secs,
        ))
    }

    /// Cancel the generation currently running for `circuit_id`, if any.
    ///
    /// Queued requests are unaffected and proceed once the cancelled run
    /// releases the gate.
    pub fn cancel(&self, circuit_id: &str) {
        let inflight = self
            .inflight
            .lock()
            .expect("inflight map mutex should not be poisoned");
        if let Some(flight) = inflight.get(circuit_id) {
            flight.running.cancel();
        }
    }

    /// Verify a proof against the caller's expected public inputs.
    ///
    /// Never returns an error for a failed cryptographic check; see
    /// [`VerificationOutcome`].
    pub async fn verify(
        &self,
        proof: &Proof,
        expected: &PublicInputs,
        spec: &CircuitSpec,
    ) -> Result<VerificationOutcome> {
        let verifying_key = self.load_artifact(spec, ArtifactKind::VerifyingKey).await?;
        verify::check(self.backend.as_ref(), proof, expected, &verifying_key)
    }

    /// The artifact cache this prover reads through (for stats/maintenance).
    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    /// Fetch one artifact: cache first, origin on a miss.
    ///
    /// Cache failures are logged and degrade to origin fetches: a broken
    /// cache costs time, never correctness. Origin failures are fatal to the
    /// request since the artifact genuinely cannot be obtained.
    async fn load_artifact(&self, spec: &CircuitSpec, kind: ArtifactKind) -> Result<Vec<u8>> {
        match self
            .cache
            .get(&spec.circuit_id, kind, &spec.version)
            .await
        {
            Ok(Some(payload)) => {
                debug!(circuit_id = %spec.circuit_id, kind = %kind, "artifact cache hit");
                return Ok(payload);
            }
            Ok(None) => {
                debug!(circuit_id = %spec.circuit_id, kind = %kind, "artifact cache miss");
            }
            Err(e) => {
                warn!(
                    circuit_id = %spec.circuit_id,
                    kind = %kind,
                    error = %e,
                    "artifact cache read failed; falling back to origin"
                );
            }
        }

        let payload = self
            .source
            .fetch(&spec.circuit_id, kind, &spec.version)
            .await
            .map_err(|e| PresenceProofError::ArtifactUnavailable {
                circuit_id: spec.circuit_id.clone(),
                kind: kind.wire_name().to_string(),
                version: spec.version.clone(),
                reason: e.to_string(),
            })?;

        if let Err(e) = self
            .cache
            .set(&spec.circuit_id, kind, &spec.version, &payload)
            .await
        {
            warn!(
                circuit_id = %spec.circuit_id,
                kind = %kind,
                error = %e,
                "artifact cache write failed; continuing without caching"
            );
        }

        Ok(payload)
    }
}
