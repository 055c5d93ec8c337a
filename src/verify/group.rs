//! Thread-safe accumulation of classified target files.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct GroupState {
    by_base: BTreeMap<String, BTreeSet<String>>,
    unattributed: usize,
    unattributed_suffixes: BTreeSet<String>,
}

/// Suffixes found per base name, filled concurrently by scan workers.
///
/// All mutation goes through [`record`](Self::record) and
/// [`record_unattributed`](Self::record_unattributed); the map itself is
/// never handed out while workers may still write to it.
#[derive(Debug, Default)]
pub struct ProcessedGroup {
    state: Mutex<GroupState>,
}

impl ProcessedGroup {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, GroupState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Records one output of `base_name`. Duplicate suffixes collapse.
    pub fn record(&self, base_name: &str, suffix: &str) {
        self.lock()
            .by_base
            .entry(base_name.to_string())
            .or_default()
            .insert(suffix.to_string());
    }

    /// Records an output that cannot be attributed to a source item.
    pub fn record_unattributed(&self, suffix: &str) {
        let mut state = self.lock();
        state.unattributed += 1;
        state.unattributed_suffixes.insert(suffix.to_string());
    }

    /// The suffixes recorded for `base_name`; empty when none were.
    pub fn suffixes_of(&self, base_name: &str) -> BTreeSet<String> {
        self.lock()
            .by_base
            .get(base_name)
            .cloned()
            .unwrap_or_default()
    }

    /// A copy of the whole map.
    pub fn snapshot(&self) -> BTreeMap<String, BTreeSet<String>> {
        self.lock().by_base.clone()
    }

    /// Every distinct suffix seen, attributed or not.
    pub fn observed_suffixes(&self) -> BTreeSet<String> {
        let state = self.lock();
        state
            .by_base
            .values()
            .flatten()
            .chain(state.unattributed_suffixes.iter())
            .cloned()
            .collect()
    }

    /// Distinct outputs recorded: one per (base, suffix) pair plus every
    /// unattributed file.
    pub fn processed_count(&self) -> usize {
        let state = self.lock();
        state.by_base.values().map(BTreeSet::len).sum::<usize>() + state.unattributed
    }

    pub fn base_count(&self) -> usize {
        self.lock().by_base.len()
    }
}
