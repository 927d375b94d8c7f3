//! Tracks which message ids already produced a reply.

use std::collections::HashSet;
use std::sync::Mutex;

/// Process-wide set of handled message ids, shared by every worker.
/// Append-only: entries are never evicted for the process lifetime.
#[derive(Default)]
pub struct ProcessedSet {
    ids: Mutex<HashSet<String>>,
}

impl ProcessedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_processed(&self, id: &str) -> bool {
        self.ids
            .lock()
            .expect("processed set lock poisoned")
            .contains(id)
    }

    /// Insert `id`. Returns false if it was already present.
    pub fn mark_processed(&self, id: &str) -> bool {
        self.ids
            .lock()
            .expect("processed set lock poisoned")
            .insert(id.to_string())
    }
}
