use std::collections::BTreeSet;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::domain::FileKey;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AssemblyState {
    /// Chunk positions (`current`) accepted so far, each counted once.
    pub positions: BTreeSet<u64>,
    /// Set after a failed write; the key can no longer complete.
    pub poisoned: bool,
}

impl AssemblyState {
    pub fn received(&self) -> u64 {
        self.positions.len() as u64
    }
}

/// Per-key chunk accounting shared by every chunk worker.
///
/// Live keys carry an [`AssemblyState`]. Once a key completes its state is
/// dropped and only a marker remains, so redelivered chunks can be refused.
#[derive(Debug, Default)]
pub struct ChunkTracker {
    live: DashMap<FileKey, AssemblyState>,
    completed: DashMap<FileKey, ()>,
}

impl ChunkTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record chunk `position` of `key` and return how many distinct
    /// positions the key has. `None` if the position was already recorded.
    pub fn record_chunk(&self, key: &FileKey, position: u64) -> Option<u64> {
        let mut st = self.live.entry(key.clone()).or_default();
        if !st.positions.insert(position) {
            return None;
        }
        Some(st.received())
    }

    pub fn received(&self, key: &FileKey) -> Option<u64> {
        self.live.get(key).map(|st| st.received())
    }

    pub fn poison(&self, key: &FileKey) {
        self.live.entry(key.clone()).or_default().poisoned = true;
    }

    pub fn is_poisoned(&self, key: &FileKey) -> bool {
        self.live.get(key).is_some_and(|st| st.poisoned)
    }

    /// Retire `key`. Returns true only for the first call per key; that
    /// caller owns the downstream dispatch.
    pub fn finish(&self, key: &FileKey) -> bool {
        match self.completed.entry(key.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(v) => {
                v.insert(());
                self.live.remove(key);
                true
            }
        }
    }

    pub fn is_completed(&self, key: &FileKey) -> bool {
        self.completed.contains_key(key)
    }

    pub fn live_keys(&self) -> usize {
        self.live.len()
    }

    pub fn completed_keys(&self) -> usize {
        self.completed.len()
    }
}
