use dashmap::DashMap;

use relay_core::ids::RunId;

/// Speculative file content per (run, path), not yet written to disk.
///
/// Last write wins. Entries live until overwritten or until the run's
/// owner calls [`ProposedContentStore::discard_run`].
pub struct ProposedContentStore {
    entries: DashMap<(RunId, String), String>,
}

impl ProposedContentStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn get(&self, run_id: &RunId, path: &str) -> Option<String> {
        self.entries
            .get(&(run_id.clone(), path.to_string()))
            .map(|entry| entry.value().clone())
    }

    pub fn set(&self, run_id: &RunId, path: &str, content: String) {
        let _ = self
            .entries
            .insert((run_id.clone(), path.to_string()), content);
    }

    /// Remove every entry of `run_id`. Returns how many were dropped.
    pub fn discard_run(&self, run_id: &RunId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(id, _), _| id != run_id);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ProposedContentStore {
    fn default() -> Self {
        Self::new()
    }
}
