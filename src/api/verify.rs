//! Proof verification orchestration.
//!
//! Verification is cheap and synchronous-equivalent; it may run concurrently
//! with anything. A failed cryptographic check is an expected outcome and is
//! reported as `is_valid = false` with a reason, never as an error. Errors
//! are reserved for infrastructure failures (unreadable verifying key,
//! backend crash).

use tracing::{debug, info_span};

use super::types::{Proof, VerificationOutcome};
use crate::backend::ProvingBackend;
use crate::config::{self, PublicSignalLayout};
use crate::error::Result;
use crate::poseidon::FieldElement;
use crate::witness::PublicInputs;

/// Checks `proof` against the caller's expected public inputs with the given
/// verifying key.
///
/// The expected inputs guard against a proof that is internally consistent
/// but anchored to a different root, threshold, or timestamp than the caller
/// intended to check.
pub(crate) fn check(
    backend: &dyn ProvingBackend,
    proof: &Proof,
    expected: &PublicInputs,
    verifying_key: &[u8],
) -> Result<VerificationOutcome> {
    let span = info_span!("verify_proof", num_signals = proof.public_signals.len());
    let _enter = span.enter();

    if proof.public_signals.len() != config::NUM_PUBLIC_SIGNALS {
        return Ok(VerificationOutcome::invalid(format!(
            "expected {} public signals, proof carries {}",
            config::NUM_PUBLIC_SIGNALS,
            proof.public_signals.len()
        )));
    }
    if proof.public_signals[PublicSignalLayout::ROOT] != expected.root {
        return Ok(VerificationOutcome::invalid(
            "activity root does not match the expected commitment",
        ));
    }
    if proof.public_signals[PublicSignalLayout::THRESHOLD]
        != FieldElement::from(expected.threshold)
    {
        return Ok(VerificationOutcome::invalid(
            "threshold signal does not match the expected claim",
        ));
    }
    if proof.public_signals[PublicSignalLayout::FRESHNESS_TIMESTAMP]
        != FieldElement::from(expected.freshness_timestamp)
    {
        return Ok(VerificationOutcome::invalid(
            "freshness timestamp does not match the expected claim",
        ));
    }

    let is_valid =
        backend.verify_proof(verifying_key, &proof.public_signals, &proof.elements)?;

    if is_valid {
        debug!("proof verified");
        Ok(VerificationOutcome::valid())
    } else {
        debug!("proof failed cryptographic check");
        Ok(VerificationOutcome::invalid(
            "cryptographic check failed: proof does not match the public signals \
             under this verifying key",
        ))
    }
}
