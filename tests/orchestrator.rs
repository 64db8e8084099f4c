//! Orchestration tests: per-circuit single flight, cooperative cancellation,
//! backend timeouts, and cache-failure fallback.

mod common;

use common::fixtures::{activity_days, FRESHNESS};
use presence_crypto::{
    api::{ActivityProver, CircuitSpec, ProveOptions, ProverConfig},
    backend::{
        ArtifactSource, BackendOutput, CancelToken, NativeBackend, NativeSetup, ProofElements,
        ProvingBackend,
    },
    cache::{ArtifactCache, ArtifactKind},
    witness::{assemble_witness, CircuitInput},
    BackendError, FieldElement, PresenceProofError,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const DEPTH: usize = 8;
const MAX_SLOTS: usize = 16;

fn small_spec() -> CircuitSpec {
    CircuitSpec {
        circuit_id: "activity-threshold".to_string(),
        version: "v1".to_string(),
        depth: DEPTH,
        max_slots: MAX_SLOTS,
    }
}

fn small_witness(n: usize, threshold: u64) -> CircuitInput {
    assemble_witness(&activity_days(n), threshold, FRESHNESS, DEPTH, MAX_SLOTS).unwrap()
}

/// Wraps the native backend with an artificial per-slot delay so tests can
/// observe in-flight behavior. Tracks the peak number of concurrently
/// running generations.
struct SlowBackend {
    inner: NativeBackend,
    step_delay: Duration,
    steps: usize,
    running: AtomicUsize,
    peak_running: AtomicUsize,
}

impl SlowBackend {
    fn new(step_delay: Duration, steps: usize) -> Self {
        Self {
            inner: NativeBackend::new(),
            step_delay,
            steps,
            running: AtomicUsize::new(0),
            peak_running: AtomicUsize::new(0),
        }
    }

    fn peak(&self) -> usize {
        self.peak_running.load(Ordering::SeqCst)
    }
}

impl ProvingBackend for SlowBackend {
    fn generate_proof(
        &self,
        circuit_binary: &[u8],
        proving_key: &[u8],
        witness: &CircuitInput,
        cancel: &CancelToken,
    ) -> Result<BackendOutput, BackendError> {
        let now_running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_running.fetch_max(now_running, Ordering::SeqCst);

        let result = (|| {
            for _ in 0..self.steps {
                if cancel.is_cancelled() {
                    return Err(BackendError::Cancelled);
                }
                std::thread::sleep(self.step_delay);
            }
            self.inner
                .generate_proof(circuit_binary, proving_key, witness, cancel)
        })();

        self.running.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn verify_proof(
        &self,
        verifying_key: &[u8],
        public_signals: &[FieldElement],
        elements: &ProofElements,
    ) -> Result<bool, BackendError> {
        self.inner.verify_proof(verifying_key, public_signals, elements)
    }
}

/// Artifact source that counts origin fetches.
struct CountingSource {
    inner: NativeSetup,
    fetches: AtomicUsize,
}

#[async_trait::async_trait]
impl ArtifactSource for CountingSource {
    async fn fetch(
        &self,
        circuit_id: &str,
        kind: ArtifactKind,
        version: &str,
    ) -> Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch(circuit_id, kind, version).await
    }
}

/// Artifact source that always fails; used to prove the cache path alone
/// can satisfy a request and that origin failures surface properly.
struct DeadSource;

#[async_trait::async_trait]
impl ArtifactSource for DeadSource {
    async fn fetch(
        &self,
        _circuit_id: &str,
        _kind: ArtifactKind,
        _version: &str,
    ) -> Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync>> {
        Err("origin registry unreachable".into())
    }
}

async fn prover_with(
    backend: Arc<dyn ProvingBackend>,
    source: Arc<dyn ArtifactSource>,
    cache_dir: &std::path::Path,
    config: ProverConfig,
) -> ActivityProver {
    let cache = Arc::new(ArtifactCache::open(cache_dir).await.unwrap());
    ActivityProver::with_config(backend, cache, source, config)
}

#[tokio::test]
async fn concurrent_generates_for_one_circuit_never_overlap() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(SlowBackend::new(Duration::from_millis(5), 10));
    let source = Arc::new(NativeSetup {
        depth: DEPTH,
        max_slots: MAX_SLOTS,
    });
    let prover = Arc::new(
        prover_with(
            Arc::clone(&backend) as Arc<dyn ProvingBackend>,
            source,
            dir.path(),
            ProverConfig::default(),
        )
        .await,
    );

    let spec = small_spec();
    let witness = small_witness(3, 2);

    let mut handles = Vec::new();
    for _ in 0..3 {
        let prover = Arc::clone(&prover);
        let spec = spec.clone();
        let witness = witness.clone();
        handles.push(tokio::spawn(async move {
            prover.generate(&witness, &spec).await
        }));
    }

    for handle in handles {
        let record = handle.await.unwrap().unwrap();
        assert_eq!(record.proof.meets_threshold(), Some(true));
    }

    // Queue-behind discipline: the second and third request waited.
    assert_eq!(backend.peak(), 1);
}

#[tokio::test]
async fn cancel_and_restart_aborts_the_running_generation() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(SlowBackend::new(Duration::from_millis(10), 200));
    let source = Arc::new(NativeSetup {
        depth: DEPTH,
        max_slots: MAX_SLOTS,
    });
    let prover = Arc::new(
        prover_with(
            Arc::clone(&backend) as Arc<dyn ProvingBackend>,
            source,
            dir.path(),
            ProverConfig::default(),
        )
        .await,
    );

    let spec = small_spec();
    let witness = small_witness(3, 2);

    let first = {
        let prover = Arc::clone(&prover);
        let spec = spec.clone();
        let witness = witness.clone();
        tokio::spawn(async move { prover.generate(&witness, &spec).await })
    };

    // Let the first generation reach the backend before displacing it.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let second = prover
        .generate_opts(
            &witness,
            &spec,
            ProveOptions {
                cancel: None,
                cancel_running: true,
            },
        )
        .await;

    let first = first.await.unwrap();
    assert!(
        matches!(
            first,
            Err(PresenceProofError::Backend(BackendError::Cancelled))
        ),
        "first generation should have been cancelled, got {first:?}"
    );
    // The restarted request is a fresh run and succeeds.
    assert!(second.is_ok());
}

#[tokio::test]
async fn explicit_cancel_reaches_the_running_generation() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(SlowBackend::new(Duration::from_millis(10), 500));
    let source = Arc::new(NativeSetup {
        depth: DEPTH,
        max_slots: MAX_SLOTS,
    });
    let prover = Arc::new(
        prover_with(
            Arc::clone(&backend) as Arc<dyn ProvingBackend>,
            source,
            dir.path(),
            ProverConfig::default(),
        )
        .await,
    );

    let spec = small_spec();
    let witness = small_witness(2, 1);

    let task = {
        let prover = Arc::clone(&prover);
        let spec = spec.clone();
        let witness = witness.clone();
        tokio::spawn(async move { prover.generate(&witness, &spec).await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    prover.cancel(&spec.circuit_id);

    let result = task.await.unwrap();
    assert!(matches!(
        result,
        Err(PresenceProofError::Backend(BackendError::Cancelled))
    ));
}

#[tokio::test]
async fn backend_timeout_maps_to_backend_error() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(SlowBackend::new(Duration::from_millis(10), 1_000));
    let source = Arc::new(NativeSetup {
        depth: DEPTH,
        max_slots: MAX_SLOTS,
    });
    let prover = prover_with(
        backend,
        source,
        dir.path(),
        ProverConfig {
            backend_timeout: Duration::from_millis(100),
            ..ProverConfig::default()
        },
    )
    .await;

    let result = prover.generate(&small_witness(2, 1), &small_spec()).await;
    match result {
        Err(PresenceProofError::Backend(err @ BackendError::Timeout { .. })) => {
            assert!(err.is_retryable());
        }
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn warm_cache_satisfies_requests_without_the_origin() {
    let dir = tempfile::tempdir().unwrap();
    let spec = small_spec();

    // Warm the cache through a healthy source, then replace it with one
    // that always fails: the cached artifacts must carry the whole flow.
    let counting = Arc::new(CountingSource {
        inner: NativeSetup {
            depth: DEPTH,
            max_slots: MAX_SLOTS,
        },
        fetches: AtomicUsize::new(0),
    });
    let prover = prover_with(
        Arc::new(NativeBackend::new()),
        Arc::clone(&counting) as Arc<dyn ArtifactSource>,
        dir.path(),
        ProverConfig::default(),
    )
    .await;

    let witness = small_witness(4, 2);
    let record = prover.generate(&witness, &spec).await.unwrap();
    prover
        .verify(&record.proof, &witness.public, &spec)
        .await
        .unwrap();
    let warm_fetches = counting.fetches.load(Ordering::SeqCst);
    assert_eq!(warm_fetches, 3, "binary, pkey, vkey fetched once each");

    let prover = prover_with(
        Arc::new(NativeBackend::new()),
        Arc::new(DeadSource),
        dir.path(),
        ProverConfig::default(),
    )
    .await;

    let record = prover.generate(&witness, &spec).await.unwrap();
    let outcome = prover
        .verify(&record.proof, &witness.public, &spec)
        .await
        .unwrap();
    assert!(outcome.is_valid);
}

#[tokio::test]
async fn broken_cache_falls_back_to_the_origin() {
    let dir = tempfile::tempdir().unwrap();
    let spec = small_spec();
    let source = Arc::new(NativeSetup {
        depth: DEPTH,
        max_slots: MAX_SLOTS,
    });

    // Warm the cache, then delete every payload blob behind the index's
    // back. Reads now fail mid-transaction; generation must still succeed
    // by re-fetching from the origin.
    {
        let prover = prover_with(
            Arc::new(NativeBackend::new()),
            Arc::clone(&source) as Arc<dyn ArtifactSource>,
            dir.path(),
            ProverConfig::default(),
        )
        .await;
        prover
            .generate(&small_witness(2, 1), &spec)
            .await
            .unwrap();
    }

    for entry in std::fs::read_dir(dir.path()).unwrap() {
        let path = entry.unwrap().path();
        if path.file_name().map(|n| n != "index.bin").unwrap_or(false) {
            std::fs::remove_file(path).unwrap();
        }
    }

    let prover = prover_with(
        Arc::new(NativeBackend::new()),
        source,
        dir.path(),
        ProverConfig::default(),
    )
    .await;

    let witness = small_witness(3, 2);
    let record = prover.generate(&witness, &spec).await.unwrap();
    let outcome = prover
        .verify(&record.proof, &witness.public, &spec)
        .await
        .unwrap();
    assert!(outcome.is_valid);
}

#[tokio::test]
async fn dead_origin_with_cold_cache_is_a_hard_failure() {
    let dir = tempfile::tempdir().unwrap();
    let prover = prover_with(
        Arc::new(NativeBackend::new()),
        Arc::new(DeadSource),
        dir.path(),
        ProverConfig::default(),
    )
    .await;

    let result = prover.generate(&small_witness(2, 1), &small_spec()).await;
    assert!(matches!(
        result,
        Err(PresenceProofError::ArtifactUnavailable { .. })
    ));
}

#[tokio::test]
async fn invalid_witness_is_rejected_before_any_backend_work() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(SlowBackend::new(Duration::from_millis(10), 100));
    // DeadSource: reaching artifact loading at all would fail loudly with
    // ArtifactUnavailable rather than a WitnessError.
    let prover = prover_with(
        Arc::clone(&backend) as Arc<dyn ProvingBackend>,
        Arc::new(DeadSource),
        dir.path(),
        ProverConfig::default(),
    )
    .await;

    let mut witness = small_witness(3, 2);
    witness.slots.swap(0, 2);

    let result = prover.generate(&witness, &small_spec()).await;
    assert!(matches!(
        result,
        Err(PresenceProofError::Witness(_))
    ));
    assert_eq!(backend.peak(), 0, "backend was never invoked");
}
