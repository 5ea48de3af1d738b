//! Snapshot Persistence Contract
//!
//! The engine defines the record shapes; the storage collaborator owns the
//! format. Saves use optimistic concurrency: every snapshot carries a
//! version, a save must present the version it loaded, and a mismatch fails
//! with `VersionConflict` instead of silently overwriting a newer state from
//! a concurrent session.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::ability::AbilityProfile;
use crate::collocation::CollocationIndex;
use crate::error::EngineError;
use crate::memory::MemoryState;

// ==================== Snapshot Shapes ====================

/// Per-(learner, object) memory snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySnapshot {
    pub learner_id: String,
    pub object_id: String,
    pub state: MemoryState,
    pub version: u64,
}

impl MemorySnapshot {
    pub fn key(&self) -> String {
        memory_key(&self.learner_id, &self.object_id)
    }
}

pub fn memory_key(learner_id: &str, object_id: &str) -> String {
    format!("{learner_id}/{object_id}")
}

/// Corpus-wide collocation snapshot. Rebuilt wholesale, so the version
/// counts reindex generations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollocationSnapshot {
    pub corpus_id: String,
    pub index: CollocationIndex,
    pub version: u64,
}

// ==================== Store Contract ====================

/// Persistence collaborator contract. `expected_version` is the version the
/// caller loaded; the store rejects the save when the stored version has
/// moved past it.
pub trait SnapshotStore {
    fn load_memory(&self, learner_id: &str, object_id: &str) -> Option<MemorySnapshot>;
    fn save_memory(
        &self,
        snapshot: MemorySnapshot,
        expected_version: u64,
    ) -> Result<u64, EngineError>;

    fn load_ability(&self, learner_id: &str, component_key: &str) -> Option<AbilityProfile>;
    fn save_ability(
        &self,
        profile: AbilityProfile,
        expected_version: u64,
    ) -> Result<u64, EngineError>;

    fn load_collocations(&self, corpus_id: &str) -> Option<CollocationSnapshot>;
    fn save_collocations(
        &self,
        snapshot: CollocationSnapshot,
        expected_version: u64,
    ) -> Result<u64, EngineError>;
}

// ==================== In-Memory Store ====================

/// Reference store used in tests and single-process deployments. Snapshots
/// are kept as JSON strings so load/save exercises the same encode/decode
/// path an external store would.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    memory: RwLock<HashMap<String, (u64, String)>>,
    ability: RwLock<HashMap<String, (u64, String)>>,
    collocations: RwLock<HashMap<String, (u64, String)>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn checked_save<T: Serialize>(
    slot: &RwLock<HashMap<String, (u64, String)>>,
    key: String,
    value: &T,
    expected_version: u64,
) -> Result<u64, EngineError> {
    let payload = serde_json::to_string(value)?;
    let mut map = slot.write();
    let current = map.get(&key).map(|(v, _)| *v).unwrap_or(0);
    if current != expected_version {
        warn!(key = %key, expected = expected_version, found = current, "stale snapshot save rejected");
        return Err(EngineError::VersionConflict {
            key,
            expected: expected_version,
            found: current,
        });
    }
    let next = current + 1;
    map.insert(key, (next, payload));
    Ok(next)
}

fn checked_load<T: for<'de> Deserialize<'de>>(
    slot: &RwLock<HashMap<String, (u64, String)>>,
    key: &str,
) -> Option<T> {
    let map = slot.read();
    let (_, payload) = map.get(key)?;
    serde_json::from_str(payload).ok()
}

impl SnapshotStore for InMemoryStore {
    fn load_memory(&self, learner_id: &str, object_id: &str) -> Option<MemorySnapshot> {
        checked_load(&self.memory, &memory_key(learner_id, object_id))
    }

    fn save_memory(
        &self,
        snapshot: MemorySnapshot,
        expected_version: u64,
    ) -> Result<u64, EngineError> {
        let key = snapshot.key();
        let next = checked_save(&self.memory, key, &snapshot, expected_version)?;
        Ok(next)
    }

    fn load_ability(&self, learner_id: &str, component_key: &str) -> Option<AbilityProfile> {
        checked_load(&self.ability, &memory_key(learner_id, component_key))
    }

    fn save_ability(
        &self,
        profile: AbilityProfile,
        expected_version: u64,
    ) -> Result<u64, EngineError> {
        let key = memory_key(&profile.learner_id, profile.component.code());
        checked_save(&self.ability, key, &profile, expected_version)
    }

    fn load_collocations(&self, corpus_id: &str) -> Option<CollocationSnapshot> {
        checked_load(&self.collocations, corpus_id)
    }

    fn save_collocations(
        &self,
        snapshot: CollocationSnapshot,
        expected_version: u64,
    ) -> Result<u64, EngineError> {
        let key = snapshot.corpus_id.clone();
        checked_save(&self.collocations, key, &snapshot, expected_version)
    }
}

// ==================== Tests ====================
