//! Process-wide pattern memory.
//!
//! This module stores past detection outcomes and error fixes so that
//! future jobs classify faster and resolve repeated failures without
//! re-deriving corrections. It is the only global mutable state in the
//! pipeline; all mutation goes through per-shard locks.

use crate::error::Correction;
use crate::models::Industry;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info};

const SHARD_COUNT: usize = 16;

/// Default total record capacity before LRU eviction kicks in.
pub const DEFAULT_CAPACITY: usize = 4096;

/// Kind of a stored pattern record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    /// A confirmed industry classification for a column-set fingerprint.
    DetectionBias,
    /// A correction that resolved a failure signature.
    ErrorFix,
}

/// Payload of a pattern record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PatternPayload {
    DetectionBias { industry: Industry },
    ErrorFix { correction: Correction },
}

impl PatternPayload {
    fn kind(&self) -> PatternKind {
        match self {
            PatternPayload::DetectionBias { .. } => PatternKind::DetectionBias,
            PatternPayload::ErrorFix { .. } => PatternKind::ErrorFix,
        }
    }
}

/// One remembered pattern: a signature, its payload, and usage counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternRecord {
    /// Normalized signature key.
    pub signature: String,
    /// Record kind.
    pub kind: PatternKind,
    /// The remembered outcome.
    pub payload: PatternPayload,
    /// How many times this signature was observed.
    pub occurrence_count: u64,
    /// Last observation time; drives LRU eviction.
    pub last_seen: DateTime<Utc>,
}

/// Aggregate statistics over the memory contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryStats {
    /// Total records across all shards.
    pub records: usize,
    /// Records of kind `DetectionBias`.
    pub detection_bias: usize,
    /// Records of kind `ErrorFix`.
    pub error_fixes: usize,
}

/// Sharded, process-wide store of pattern records.
///
/// Reads and writes take one shard lock each; no lock is held across an
/// await point, so no job can block another job's write for longer than
/// one map operation.
pub struct PatternMemory {
    shards: Vec<Mutex<HashMap<String, PatternRecord>>>,
    per_shard_cap: usize,
}

impl Default for PatternMemory {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl PatternMemory {
    /// Creates an empty memory bounded to roughly `capacity` records.
    pub fn with_capacity(capacity: usize) -> Self {
        let shards = (0..SHARD_COUNT).map(|_| Mutex::new(HashMap::new())).collect();
        Self {
            shards,
            per_shard_cap: (capacity / SHARD_COUNT).max(1),
        }
    }

    /// Loads a memory from a JSON snapshot written by [`save_snapshot`].
    ///
    /// [`save_snapshot`]: PatternMemory::save_snapshot
    pub fn load_snapshot(path: &Path, capacity: usize) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read memory snapshot: {}", path.display()))?;

        let records: Vec<PatternRecord> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse memory snapshot: {}", path.display()))?;

        let memory = Self::with_capacity(capacity);
        let count = records.len();
        for record in records {
            let shard = memory.shard_for(&record.signature);
            let mut map = lock(shard);
            map.insert(record.signature.clone(), record);
        }

        info!("Loaded {} pattern records from snapshot", count);
        Ok(memory)
    }

    /// Writes all records to a JSON snapshot as a flat list.
    pub fn save_snapshot(&self, path: &Path) -> Result<()> {
        let mut records: Vec<PatternRecord> = Vec::new();
        for shard in &self.shards {
            let map = lock(shard);
            records.extend(map.values().cloned());
        }
        // Stable output order for diffable snapshots.
        records.sort_by(|a, b| a.signature.cmp(&b.signature));

        let json = serde_json::to_string_pretty(&records)
            .context("Failed to serialize memory snapshot")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write memory snapshot: {}", path.display()))?;

        info!("Saved {} pattern records to snapshot", records.len());
        Ok(())
    }

    /// Looks up a record by signature.
    pub fn lookup(&self, signature: &str) -> Option<PatternRecord> {
        let map = lock(self.shard_for(signature));
        map.get(signature).cloned()
    }

    /// Creates or reinforces a record.
    ///
    /// First occurrence stores the payload with `occurrence_count` 1;
    /// repeats increment the count and replace the payload
    /// (last-writer-wins). Returns the occurrence count after the write.
    pub fn upsert(&self, signature: &str, payload: PatternPayload) -> u64 {
        let mut map = lock(self.shard_for(signature));

        let count = match map.get_mut(signature) {
            Some(record) => {
                record.occurrence_count += 1;
                record.kind = payload.kind();
                record.payload = payload;
                record.last_seen = Utc::now();
                record.occurrence_count
            }
            None => {
                map.insert(
                    signature.to_string(),
                    PatternRecord {
                        signature: signature.to_string(),
                        kind: payload.kind(),
                        payload,
                        occurrence_count: 1,
                        last_seen: Utc::now(),
                    },
                );
                1
            }
        };

        while map.len() > self.per_shard_cap {
            let oldest = map
                .values()
                .min_by_key(|r| r.last_seen)
                .map(|r| r.signature.clone());
            match oldest {
                Some(key) => {
                    debug!("Evicting pattern record: {}", key);
                    map.remove(&key);
                }
                None => break,
            }
        }

        count
    }

    /// Returns the detection bias stored for a fingerprint, if any.
    ///
    /// The weight is the record's occurrence count, i.e. how many times
    /// this column-set pattern was confirmed as that industry.
    pub fn bias_for(&self, signature: &str) -> Option<(Industry, u64)> {
        let map = lock(self.shard_for(signature));
        match map.get(signature) {
            Some(record) => match &record.payload {
                PatternPayload::DetectionBias { industry } => {
                    Some((*industry, record.occurrence_count))
                }
                PatternPayload::ErrorFix { .. } => None,
            },
            None => None,
        }
    }

    /// Aggregate statistics over all shards.
    pub fn stats(&self) -> MemoryStats {
        let mut stats = MemoryStats::default();
        for shard in &self.shards {
            let map = lock(shard);
            for record in map.values() {
                stats.records += 1;
                match record.kind {
                    PatternKind::DetectionBias => stats.detection_bias += 1,
                    PatternKind::ErrorFix => stats.error_fixes += 1,
                }
            }
        }
        stats
    }

    fn shard_for(&self, signature: &str) -> &Mutex<HashMap<String, PatternRecord>> {
        let mut hasher = DefaultHasher::new();
        signature.hash(&mut hasher);
        let idx = (hasher.finish() as usize) % SHARD_COUNT;
        &self.shards[idx]
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Builds a stable fingerprint of a dataset's column set.
///
/// Sorted and joined so the same columns in any order produce the same
/// key across runs and processes.
pub fn shape_fingerprint(column_names: &[String]) -> String {
    let mut names: Vec<&str> = column_names.iter().map(String::as_str).collect();
    names.sort_unstable();
    names.join("+")
}

/// Builds the normalized signature for a capability failure.
pub fn failure_signature(kind: &str, column: Option<&str>, fingerprint: &str) -> String {
    format!("{}:{}:{}", kind, column.unwrap_or("-"), fingerprint)
}

/// Builds the signature for a detection-bias record.
pub fn detection_signature(fingerprint: &str) -> String {
    format!("detect:{}", fingerprint)
}
