//! Persistent, versioned artifact cache.
//!
//! Proving artifacts are large (compiled circuit binaries and proving keys
//! run to hundreds of megabytes) and expensive to re-fetch, so the
//! orchestrator keeps them in a local store keyed by
//! `(circuit_id, kind)` with the artifact version recorded per entry. A
//! `get` for any other version is a miss (the cache never serves a
//! stale-version payload) and a `set` under a new version replaces the old
//! entry, which is what makes invalidation on version bump automatic.
//!
//! Binary artifacts are bounded by a total-size budget with
//! least-recently-accessed eviction (ties broken by insertion order);
//! verifying keys are small, needed on every verification path, and exempt.
//!
//! The backing store is a directory of payload blobs plus a bincode index
//! with a pinned format version, rewritten atomically (temp file + rename).
//! Every logical operation runs under one async mutex, so each get/set/
//! invalidate executes as a single-writer transaction and the size invariant
//! holds by the time `set` returns. The cache is an explicitly constructed
//! object the caller threads through the orchestrator; there is no ambient
//! global instance.

use bincode::Options;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config;
use crate::error::CacheError;

/// The artifact kinds the proving flow depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ArtifactKind {
    /// Compiled prover program
    CircuitBinary,
    /// Proving key
    ProvingKey,
    /// Verifying key
    VerifyingKey,
}

impl ArtifactKind {
    /// Every kind required for a circuit version to count as fully cached.
    pub const ALL: [ArtifactKind; 3] = [
        ArtifactKind::CircuitBinary,
        ArtifactKind::ProvingKey,
        ArtifactKind::VerifyingKey,
    ];

    /// Stable identity string used in keys and external artifact registries.
    pub fn wire_name(&self) -> &'static str {
        match self {
            ArtifactKind::CircuitBinary => "binary:circuit",
            ArtifactKind::ProvingKey => "binary:pkey",
            ArtifactKind::VerifyingKey => "vkey",
        }
    }

    /// Binary artifacts participate in size-based eviction; vkeys do not.
    pub fn is_binary(&self) -> bool {
        matches!(self, ArtifactKind::CircuitBinary | ArtifactKind::ProvingKey)
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_name())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    circuit_id: String,
    kind: ArtifactKind,
    version: String,
    size: u64,
    /// Logical clock value of the last successful get (or the insert)
    last_access_seq: u64,
    /// Logical clock value at insertion, the eviction tie-breaker
    inserted_seq: u64,
    created_at_secs: u64,
    /// Payload blob file name, relative to the cache root
    file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheIndex {
    format_version: u16,
    /// Monotonic logical clock for access/insertion ordering
    next_seq: u64,
    entries: BTreeMap<String, IndexEntry>,
}

impl CacheIndex {
    fn empty() -> Self {
        Self {
            format_version: config::CACHE_INDEX_FORMAT_VERSION,
            next_seq: 1,
            entries: BTreeMap::new(),
        }
    }

    fn tick(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn binary_bytes(&self) -> u64 {
        self.entries
            .values()
            .filter(|e| e.kind.is_binary())
            .map(|e| e.size)
            .sum()
    }
}

/// Aggregate counts and sizes for one artifact kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindStats {
    pub count: usize,
    pub total_bytes: u64,
}

/// Per-kind cache statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub per_kind: BTreeMap<String, KindStats>,
    pub total_bytes: u64,
}

/// Persistent, versioned store for proving/verifying artifacts.
pub struct ArtifactCache {
    root: PathBuf,
    budget_bytes: u64,
    index: Mutex<CacheIndex>,
}

fn entry_key(circuit_id: &str, kind: ArtifactKind) -> String {
    format!("{circuit_id}::{}", kind.wire_name())
}

fn payload_file_name(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    format!("{}.bin", hex::encode(hasher.finalize()))
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn bincode_options() -> impl bincode::Options {
    // Pinned so the on-disk format stays stable even if bincode's defaults
    // change in the future.
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
        .reject_trailing_bytes()
}

impl ArtifactCache {
    const INDEX_FILE: &'static str = "index.bin";

    /// Opens (or initializes) a cache rooted at `root` with the default
    /// binary-size budget.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self, CacheError> {
        Self::open_with_budget(root, config::DEFAULT_BINARY_CACHE_BUDGET_BYTES).await
    }

    /// Opens (or initializes) a cache with an explicit binary-size budget.
    pub async fn open_with_budget(
        root: impl AsRef<Path>,
        budget_bytes: u64,
    ) -> Result<Self, CacheError> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root).await?;

        let index_path = root.join(Self::INDEX_FILE);
        let index = match tokio::fs::read(&index_path).await {
            Ok(bytes) => {
                if bytes.len() > config::MAX_CACHE_INDEX_SIZE_BYTES {
                    return Err(CacheError::Corrupt(format!(
                        "index file is {} bytes, limit is {}",
                        bytes.len(),
                        config::MAX_CACHE_INDEX_SIZE_BYTES
                    )));
                }
                let index: CacheIndex = bincode_options()
                    .deserialize(&bytes)
                    .map_err(|e| CacheError::Corrupt(format!("index unreadable: {e}")))?;
                if index.format_version != config::CACHE_INDEX_FORMAT_VERSION {
                    return Err(CacheError::Corrupt(format!(
                        "unsupported index format version {}",
                        index.format_version
                    )));
                }
                index
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => CacheIndex::empty(),
            Err(e) => return Err(e.into()),
        };

        debug!(
            root = %root.display(),
            entries = index.entries.len(),
            budget_bytes,
            "artifact cache opened"
        );

        Ok(Self {
            root,
            budget_bytes,
            index: Mutex::new(index),
        })
    }

    /// Fetches a payload on an exact `(circuit_id, kind, version)` match.
    ///
    /// Any version mismatch or absence is a miss. A hit touches the entry's
    /// last-access sequence, so frequently verified artifacts survive
    /// eviction pressure.
    pub async fn get(
        &self,
        circuit_id: &str,
        kind: ArtifactKind,
        version: &str,
    ) -> Result<Option<Vec<u8>>, CacheError> {
        let mut index = self.index.lock().await;
        let key = entry_key(circuit_id, kind);

        let file = match index.entries.get(&key) {
            Some(entry) if entry.version == version => entry.file.clone(),
            _ => return Ok(None),
        };

        let payload = tokio::fs::read(self.root.join(&file)).await?;

        let seq = index.tick();
        if let Some(entry) = index.entries.get_mut(&key) {
            entry.last_access_seq = seq;
        }
        self.persist(&index).await?;

        Ok(Some(payload))
    }

    /// Stores a payload, replacing any previous version of the same
    /// `(circuit_id, kind)`.
    ///
    /// If the write pushes binary usage past the budget, least-recently-
    /// accessed binaries (ties broken by insertion order) are evicted inside
    /// the same transaction, so the size invariant holds on return. The
    /// entry being written is never an eviction candidate. Verifying keys
    /// are exempt from the budget entirely.
    pub async fn set(
        &self,
        circuit_id: &str,
        kind: ArtifactKind,
        version: &str,
        payload: &[u8],
    ) -> Result<(), CacheError> {
        let mut index = self.index.lock().await;
        let key = entry_key(circuit_id, kind);
        let file = payload_file_name(&key);

        self.write_blob(&file, payload).await?;

        let seq = index.tick();
        index.entries.insert(
            key.clone(),
            IndexEntry {
                circuit_id: circuit_id.to_string(),
                kind,
                version: version.to_string(),
                size: payload.len() as u64,
                last_access_seq: seq,
                inserted_seq: seq,
                created_at_secs: now_secs(),
                file,
            },
        );

        let mut evicted_files = Vec::new();
        if kind.is_binary() {
            evicted_files = self.evict_over_budget(&mut index, &key);
        }

        self.persist(&index).await?;
        drop(index);

        // Blob removal happens after the index stops referencing the entries;
        // a crash in between leaves unreferenced blobs, not dangling entries.
        for file in evicted_files {
            if let Err(e) = tokio::fs::remove_file(self.root.join(&file)).await {
                warn!(file = %file, error = %e, "failed to remove evicted artifact blob");
            }
        }

        Ok(())
    }

    /// True only if every required artifact kind is present at exactly
    /// `version`.
    pub async fn has(&self, circuit_id: &str, version: &str) -> Result<bool, CacheError> {
        let index = self.index.lock().await;
        Ok(ArtifactKind::ALL.iter().all(|kind| {
            index
                .entries
                .get(&entry_key(circuit_id, *kind))
                .map(|e| e.version == version)
                .unwrap_or(false)
        }))
    }

    /// Removes every version and kind cached for `circuit_id`; other
    /// circuits are untouched.
    pub async fn invalidate_circuit(&self, circuit_id: &str) -> Result<(), CacheError> {
        let mut index = self.index.lock().await;

        let removed: Vec<(String, String)> = index
            .entries
            .iter()
            .filter(|(_, e)| e.circuit_id == circuit_id)
            .map(|(k, e)| (k.clone(), e.file.clone()))
            .collect();

        for (key, _) in &removed {
            index.entries.remove(key);
        }
        self.persist(&index).await?;
        drop(index);

        for (_, file) in &removed {
            if let Err(e) = tokio::fs::remove_file(self.root.join(file)).await {
                warn!(file = %file, error = %e, "failed to remove invalidated artifact blob");
            }
        }

        info!(circuit_id, removed = removed.len(), "circuit artifacts invalidated");
        Ok(())
    }

    /// Per-kind counts and aggregate byte sizes.
    pub async fn stats(&self) -> CacheStats {
        let index = self.index.lock().await;
        let mut stats = CacheStats::default();
        for entry in index.entries.values() {
            let kind_stats = stats
                .per_kind
                .entry(entry.kind.wire_name().to_string())
                .or_default();
            kind_stats.count += 1;
            kind_stats.total_bytes += entry.size;
            stats.total_bytes += entry.size;
        }
        stats
    }

    /// Select binaries to evict until usage fits the budget.
    /// Mutates the index; returns blob files to delete after persist.
    fn evict_over_budget(&self, index: &mut CacheIndex, protected_key: &str) -> Vec<String> {
        let mut evicted = Vec::new();

        while index.binary_bytes() > self.budget_bytes {
            let victim = index
                .entries
                .iter()
                .filter(|(key, e)| e.kind.is_binary() && key.as_str() != protected_key)
                .min_by_key(|(_, e)| (e.last_access_seq, e.inserted_seq))
                .map(|(key, _)| key.clone());

            let Some(key) = victim else {
                // Only the just-written entry remains; it alone exceeds the
                // budget and stays until the next write displaces it.
                break;
            };

            if let Some(entry) = index.entries.remove(&key) {
                debug!(
                    circuit_id = entry.circuit_id,
                    kind = %entry.kind,
                    size = entry.size,
                    "evicting least-recently-accessed binary artifact"
                );
                evicted.push(entry.file);
            }
        }

        evicted
    }

    async fn write_blob(&self, file: &str, payload: &[u8]) -> Result<(), CacheError> {
        let tmp = self.root.join(format!("{file}.tmp"));
        let dst = self.root.join(file);
        tokio::fs::write(&tmp, payload).await?;
        tokio::fs::rename(&tmp, &dst).await?;
        Ok(())
    }

    async fn persist(&self, index: &CacheIndex) -> Result<(), CacheError> {
        let encoded = bincode_options()
            .serialize(index)
            .map_err(|e| CacheError::Serialization(format!("failed to encode index: {e}")))?;

        let tmp = self.root.join(format!("{}.tmp", Self::INDEX_FILE));
        let dst = self.root.join(Self::INDEX_FILE);
        tokio::fs::write(&tmp, &encoded).await?;
        tokio::fs::rename(&tmp, &dst).await?;
        Ok(())
    }
}
