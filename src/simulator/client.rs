use super::cache::DirtyProjects;
use std::collections::{HashMap, HashSet};

/// What one simulated user (keyed by IP address) has fetched so far
#[derive(Debug, Clone, Default)]
pub struct ClientState {
    pub id: String,
    /// Snapshot held after the most recent request
    pub prev_snapshot: Option<String>,
    /// Snapshot held before that one
    pub prev_prev_snapshot: Option<String>,
    /// Logical project path -> versioned file last fetched for it
    pub project_pointers: HashMap<String, String>,
    /// Every metadata file and package this client already has; never evicted
    pub seen: HashSet<String>,
    /// Projects whose snapshot entry changed in the last snapshot transition
    pub dirty: DirtyProjects,
}

impl ClientState {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            ..Self::default()
        }
    }

    /// Client that already holds `snapshot`
    pub fn starting_from(id: &str, snapshot: &str) -> Self {
        Self {
            prev_snapshot: Some(snapshot.to_string()),
            ..Self::new(id)
        }
    }

    /// Shift the snapshot pointers after fetching `snapshot`
    pub fn advance_snapshot(&mut self, snapshot: &str) {
        self.prev_prev_snapshot = self.prev_snapshot.take();
        self.prev_snapshot = Some(snapshot.to_string());
    }

    pub fn has_seen(&self, relpath: &str) -> bool {
        self.seen.contains(relpath)
    }

    /// Record `relpath` as fetched; returns false if it already was
    pub fn mark_seen(&mut self, relpath: &str) -> bool {
        self.seen.insert(relpath.to_string())
    }
}
