//! Test fixtures and scenario configuration.
//!
//! Provides a declarative builder for the full proving stack (witness,
//! artifact cache in a temp directory, native backend, prover) so
//! integration tests state their scenario instead of repeating wiring.

#![allow(dead_code)]

use presence_crypto::{
    api::{ActivityProver, CircuitSpec},
    backend::{NativeBackend, NativeSetup},
    cache::ArtifactCache,
    config::MIN_FRESHNESS_TIMESTAMP,
    witness::{assemble_witness, CircuitInput},
};
use std::sync::Arc;
use tempfile::TempDir;

pub const DAY: u64 = 86_400;

/// A convenient mid-window timestamp for freshness fields.
pub const FRESHNESS: u64 = MIN_FRESHNESS_TIMESTAMP + 1_000 * DAY;

/// `n` distinct day-granular timestamps inside the epoch window.
pub fn activity_days(n: usize) -> Vec<u64> {
    (0..n)
        .map(|i| MIN_FRESHNESS_TIMESTAMP + (i as u64) * DAY)
        .collect()
}

/// Scenario configuration for a proving test.
pub struct TestConfig {
    pub spec: CircuitSpec,
    pub cache_budget_bytes: Option<u64>,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            // Depth 20 matches the production default; tests that stress the
            // tree use smaller depths directly.
            spec: CircuitSpec::activity_default(),
            cache_budget_bytes: None,
        }
    }
}

/// Everything a test needs: the prover wired to a temp-dir cache, plus the
/// handles to poke at the pieces directly.
pub struct TestSetup {
    pub spec: CircuitSpec,
    pub prover: ActivityProver,
    pub cache: Arc<ArtifactCache>,
    /// Owns the cache directory for the test's lifetime
    pub cache_dir: TempDir,
}

impl TestSetup {
    pub async fn new() -> Self {
        Self::with_config(TestConfig::default()).await
    }

    pub async fn with_config(config: TestConfig) -> Self {
        let cache_dir = tempfile::tempdir().expect("temp dir");
        let cache = match config.cache_budget_bytes {
            Some(budget) => ArtifactCache::open_with_budget(cache_dir.path(), budget).await,
            None => ArtifactCache::open(cache_dir.path()).await,
        }
        .expect("cache open");
        let cache = Arc::new(cache);

        let source = Arc::new(NativeSetup {
            depth: config.spec.depth,
            max_slots: config.spec.max_slots,
        });
        let prover = ActivityProver::new(
            Arc::new(NativeBackend::new()),
            Arc::clone(&cache),
            source,
        );

        Self {
            spec: config.spec,
            prover,
            cache,
            cache_dir,
        }
    }

    /// Assemble a witness for `n` distinct active days against this setup's
    /// circuit shape.
    pub fn witness(&self, n: usize, threshold: u64) -> CircuitInput {
        assemble_witness(
            &activity_days(n),
            threshold,
            FRESHNESS,
            self.spec.depth,
            self.spec.max_slots,
        )
        .expect("witness assembly")
    }
}
