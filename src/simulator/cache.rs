use crate::repository::metadata::jsonify;
use crate::{Result, SimError};
use once_cell::sync::OnceCell;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Logical project path -> file identifier of each project whose snapshot
/// entry changed across a transition
pub type DirtyProjects = BTreeMap<String, String>;

/// Memoized outcome of moving from one metadata file to another
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub cost: u64,
    /// Only tracked for snapshot transitions of delegated variants
    pub dirty: Option<DirtyProjects>,
}

/// `"<prev>:<curr>"`, spelling an absent previous file as `None`
pub fn transition_key(prev: Option<&str>, curr: &str) -> String {
    format!("{}:{}", prev.unwrap_or("None"), curr)
}

/// Process-wide memo of transition costs keyed by `(prev, curr)`.
///
/// Callers asking for the same key concurrently share one computation: the
/// map hands out a per-key cell and only the first caller fills it.
#[derive(Default)]
pub struct TransitionCache {
    cells: Mutex<HashMap<String, Arc<OnceCell<Arc<Transition>>>>>,
    computations: AtomicUsize,
}

impl TransitionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the cache from persisted fixtures, when present
    pub fn load(costs_file: &Path, dirty_file: &Path) -> Result<Self> {
        let costs: HashMap<String, u64> = read_fixture(costs_file)?.unwrap_or_default();
        let mut dirty: HashMap<String, DirtyProjects> = read_fixture(dirty_file)?.unwrap_or_default();

        let cells = costs
            .into_iter()
            .map(|(key, cost)| {
                let transition = Transition {
                    cost,
                    dirty: dirty.remove(&key),
                };
                (key, Arc::new(OnceCell::with_value(Arc::new(transition))))
            })
            .collect();

        Ok(Self {
            cells: Mutex::new(cells),
            computations: AtomicUsize::new(0),
        })
    }

    /// Memoized transition for `key`, running `compute` at most once per key
    pub fn get_or_compute<F>(&self, key: &str, compute: F) -> Result<Arc<Transition>>
    where
        F: FnOnce() -> Result<Transition>,
    {
        let cell = {
            let mut cells = self
                .cells
                .lock()
                .map_err(|_| SimError::invariant("transition cache lock poisoned"))?;
            Arc::clone(cells.entry(key.to_string()).or_default())
        };

        cell.get_or_try_init(|| {
            self.computations.fetch_add(1, Ordering::SeqCst);
            debug!(key, "computing transition");
            compute().map(Arc::new)
        })
        .cloned()
    }

    /// Already-computed transition for `key`
    pub fn get(&self, key: &str) -> Option<Arc<Transition>> {
        let cells = self.cells.lock().ok()?;
        cells.get(key).and_then(|cell| cell.get().cloned())
    }

    /// Number of transitions computed (not loaded) by this cache
    pub fn computations(&self) -> usize {
        self.computations.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.completed().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn completed(&self) -> Result<Vec<(String, Arc<Transition>)>> {
        let cells = self
            .cells
            .lock()
            .map_err(|_| SimError::invariant("transition cache lock poisoned"))?;
        Ok(cells
            .iter()
            .filter_map(|(key, cell)| cell.get().map(|t| (key.clone(), Arc::clone(t))))
            .collect())
    }

    /// Persist both fixtures. A fixture that already exists is left as is.
    pub fn save(&self, costs_file: &Path, dirty_file: &Path) -> Result<()> {
        let completed = self.completed()?;

        if !costs_file.exists() {
            let costs: BTreeMap<&str, u64> = completed
                .iter()
                .map(|(key, t)| (key.as_str(), t.cost))
                .collect();
            fs::write(costs_file, jsonify(&costs)?)?;
            info!(path = %costs_file.display(), entries = costs.len(), "wrote transition costs");
        }

        if !dirty_file.exists() {
            let dirty: BTreeMap<&str, &DirtyProjects> = completed
                .iter()
                .filter_map(|(key, t)| t.dirty.as_ref().map(|d| (key.as_str(), d)))
                .collect();
            fs::write(dirty_file, jsonify(&dirty)?)?;
            info!(path = %dirty_file.display(), entries = dirty.len(), "wrote dirty projects");
        }

        Ok(())
    }
}

fn read_fixture<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.is_file() {
        debug!(path = %path.display(), "no fixture");
        return Ok(None);
    }
    let bytes = fs::read(path)?;
    debug!(path = %path.display(), "read fixture");
    Ok(Some(serde_json::from_slice(&bytes)?))
}
