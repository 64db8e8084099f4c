//! Proof generation orchestration.
//!
//! Generation is long-running and CPU-bound: the backend call runs on a
//! blocking thread under a wall-clock timeout with a cooperative
//! cancellation token, never inline on the caller's task.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info_span, Instrument};

use super::types::{CircuitSpec, Proof};
use crate::backend::{BackendOutput, CancelToken, ProvingBackend};
use crate::config::{self, PublicSignalLayout};
use crate::error::{BackendError, Result};
use crate::poseidon::FieldElement;
use crate::witness::CircuitInput;

/// The binary artifacts a proving call needs, already fetched.
pub(crate) struct ProvingArtifacts {
    pub circuit_binary: Vec<u8>,
    pub proving_key: Vec<u8>,
}

/// Validates the witness, runs the backend off-thread, and checks the
/// output contract.
pub(crate) async fn generate(
    backend: Arc<dyn ProvingBackend>,
    witness: CircuitInput,
    spec: &CircuitSpec,
    artifacts: ProvingArtifacts,
    cancel: CancelToken,
    timeout: Duration,
) -> Result<Proof> {
    let span = info_span!(
        "generate_proof",
        circuit_id = %spec.circuit_id,
        version = %spec.version,
        active_slots = witness.active_count(),
    );

    async move {
        // Defense in depth: the assembler validated at construction, but the
        // witness may have travelled since. Invariants are re-checked before
        // any backend work is spent on it.
        witness.validate()?;

        if witness.depth != spec.depth || witness.slots.len() != spec.max_slots {
            return Err(crate::error::PresenceProofError::InvalidInput(format!(
                "witness shape (depth {}, {} slots) does not match circuit {} (depth {}, {} slots)",
                witness.depth,
                witness.slots.len(),
                spec.circuit_id,
                spec.depth,
                spec.max_slots
            )));
        }

        let expected_public = witness.public;
        let started = Instant::now();

        let backend_for_task = Arc::clone(&backend);
        let cancel_for_task = cancel.clone();
        let task = tokio::task::spawn_blocking(move || {
            backend_for_task.generate_proof(
                &artifacts.circuit_binary,
                &artifacts.proving_key,
                &witness,
                &cancel_for_task,
            )
        });

        let output: BackendOutput = match tokio::time::timeout(timeout, task).await {
            Err(_elapsed) => {
                // Signal the worker to stop and drop its partial state; the
                // blocking thread unwinds at its next cancellation check.
                cancel.cancel();
                return Err(BackendError::Timeout {
                    elapsed_ms: started.elapsed().as_millis() as u64,
                }
                .into());
            }
            Ok(Err(join_error)) => {
                return Err(BackendError::Crashed(format!(
                    "proving task died: {join_error}"
                ))
                .into());
            }
            Ok(Ok(result)) => result?,
        };

        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "backend proving call finished"
        );

        check_signal_contract(&output.public_signals, &expected_public)?;

        Ok(Proof {
            elements: output.elements,
            public_signals: output.public_signals,
        })
    }
    .instrument(span)
    .await
}

/// Asserts the backend's public signals honor the fixed wire order and echo
/// the witness publics.
///
/// `meets_threshold` is the backend's output; the orchestrator checks it is
/// a bit but never recomputes the count itself.
fn check_signal_contract(
    signals: &[FieldElement],
    expected: &crate::witness::PublicInputs,
) -> std::result::Result<(), BackendError> {
    use ff::Field;

    if signals.len() != config::NUM_PUBLIC_SIGNALS {
        return Err(BackendError::PublicSignalContract(format!(
            "expected {} public signals, backend returned {}",
            config::NUM_PUBLIC_SIGNALS,
            signals.len()
        )));
    }
    if signals[PublicSignalLayout::ROOT] != expected.root {
        return Err(BackendError::PublicSignalContract(
            "root signal does not match witness root".to_string(),
        ));
    }
    if signals[PublicSignalLayout::THRESHOLD] != FieldElement::from(expected.threshold) {
        return Err(BackendError::PublicSignalContract(
            "threshold signal does not match witness threshold".to_string(),
        ));
    }
    if signals[PublicSignalLayout::FRESHNESS_TIMESTAMP]
        != FieldElement::from(expected.freshness_timestamp)
    {
        return Err(BackendError::PublicSignalContract(
            "freshness signal does not match witness timestamp".to_string(),
        ));
    }
    let meets = signals[PublicSignalLayout::MEETS_THRESHOLD];
    if meets != FieldElement::ZERO && meets != FieldElement::ONE {
        return Err(BackendError::PublicSignalContract(
            "meets_threshold signal is not a bit".to_string(),
        ));
    }

    Ok(())
}
