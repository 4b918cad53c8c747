use super::cache::{transition_key, DirtyProjects, Transition, TransitionCache};
use super::client::ClientState;
use super::cost::PackageCost;
use super::patch::{diff, patch_cost, touched_meta_paths};
use super::store::{project_targets, snapshot_meta, MetadataStore};
use super::strategy::ChargeStrategy;
use crate::error::ensure_invariant;
use crate::registry::PackageLocator;
use crate::repository::metadata::{meta_identifier, project_metadata_path, versioned_path};
use crate::{Result, SimError};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::debug;

/// Where a request leads inside the current snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTarget {
    pub project: String,
    /// `packages/<project>.json`
    pub logical: String,
    /// Versioned project file listed by the current snapshot
    pub current: String,
    /// Package path relative to the index root
    pub package: String,
}

pub fn is_snapshot(relpath: &str) -> bool {
    relpath.starts_with("snapshot.")
}

/// Everything shared by all clients of one simulation run: the metadata
/// store and the transition memo.
pub struct SimContext {
    store: MetadataStore,
    transitions: TransitionCache,
    locator: PackageLocator,
    /// Record dirty projects of snapshot transitions
    track_dirty: bool,
    initial_snapshot: String,
}

impl SimContext {
    pub fn new(
        store: MetadataStore,
        transitions: TransitionCache,
        track_dirty: bool,
        initial_snapshot: String,
    ) -> Result<Self> {
        Ok(Self {
            store,
            transitions,
            locator: PackageLocator::new()?,
            track_dirty,
            initial_snapshot,
        })
    }

    pub fn store(&self) -> &MetadataStore {
        &self.store
    }

    pub fn transitions(&self) -> &TransitionCache {
        &self.transitions
    }

    /// Snapshot released just before the window opened
    pub fn initial_snapshot(&self) -> &str {
        &self.initial_snapshot
    }

    /// Bytes `client` must fetch to move from `prev` to `curr`: zero if it
    /// already holds `curr`, otherwise the memoized patch cost.
    pub fn metadata_cost(&self, client: &mut ClientState, prev: Option<&str>, curr: &str) -> Result<u64> {
        if client.has_seen(curr) || prev == Some(curr) {
            debug!(client = %client.id, relpath = curr, "HIT");
            if is_snapshot(curr) {
                client.dirty.clear();
            }
            return Ok(0);
        }

        debug!(client = %client.id, relpath = curr, "MISS");
        let key = transition_key(prev, curr);
        let transition = self
            .transitions
            .get_or_compute(&key, || self.compute_transition(prev, curr))?;

        if self.track_dirty && is_snapshot(curr) {
            client.dirty = transition.dirty.clone().ok_or_else(|| {
                SimError::invariant(format!("no dirty projects recorded for {}", key))
            })?;
        }
        client.mark_seen(curr);
        Ok(transition.cost)
    }

    fn compute_transition(&self, prev: Option<&str>, curr: &str) -> Result<Transition> {
        let empty = Value::Object(Map::new());
        let prev_document = match prev {
            Some(prev) => Some(self.store.read(prev)?),
            None => None,
        };
        let prev_document = prev_document.as_deref().unwrap_or(&empty);
        let curr_document = self.store.read(curr)?;

        let ops = diff(prev_document, &curr_document);
        let cost = patch_cost(&ops)?;

        let dirty = if self.track_dirty && is_snapshot(curr) {
            let meta = snapshot_meta(&curr_document, curr)?;
            let mut dirty = DirtyProjects::new();
            for logical in touched_meta_paths(&ops) {
                let entry = meta.get(&logical).ok_or_else(|| {
                    SimError::invariant(format!("{} touched but absent from {}", logical, curr))
                })?;
                dirty.insert(logical, meta_identifier(entry)?);
            }
            Some(dirty)
        } else {
            None
        };

        debug!(prev = prev.unwrap_or("None"), curr, cost, "transition cost");
        Ok(Transition { cost, dirty })
    }

    /// Package body cost: `length` the first time, then zero
    pub fn package_cost(&self, client: &mut ClientState, relpath: &str, length: u64) -> u64 {
        if client.mark_seen(relpath) {
            debug!(client = %client.id, relpath, "MISS");
            length
        } else {
            debug!(client = %client.id, relpath, "HIT");
            0
        }
    }

    /// Resolve `url` against `snapshot`, failing with
    /// [`SimError::UnknownProject`] when the project is not listed.
    pub fn locate(&self, snapshot: &str, url: &str) -> Result<RequestTarget> {
        let package = url
            .strip_prefix('/')
            .ok_or_else(|| SimError::invariant(format!("request URL {} is not absolute", url)))?;
        let project = self.locator.project_name(url)?.to_string();
        let logical = project_metadata_path(&project);

        let document = self.store.read(snapshot)?;
        let meta = snapshot_meta(&document, snapshot)?;
        let entry = meta
            .get(&logical)
            .ok_or_else(|| SimError::UnknownProject(project.clone()))?;
        let current = versioned_path(&logical, &meta_identifier(entry)?);

        Ok(RequestTarget {
            project,
            logical,
            current,
            package: package.to_string(),
        })
    }

    /// Versioned file listed for `logical` by `snapshot`, if any
    pub fn pointer_in_snapshot(&self, snapshot: &str, logical: &str) -> Result<Option<String>> {
        let document = self.store.read(snapshot)?;
        let meta = snapshot_meta(&document, snapshot)?;
        meta.get(logical)
            .map(|entry| Ok(versioned_path(logical, &meta_identifier(entry)?)))
            .transpose()
    }

    /// Every project pointer listed by `snapshot`
    pub fn snapshot_pointers(&self, snapshot: &str) -> Result<HashMap<String, String>> {
        let document = self.store.read(snapshot)?;
        snapshot_meta(&document, snapshot)?
            .iter()
            .map(|(logical, entry)| {
                ensure_invariant!(logical.ends_with(".json"), "bad snapshot entry {}", logical);
                Ok((logical.clone(), versioned_path(logical, &meta_identifier(entry)?)))
            })
            .collect()
    }

    /// Minimum cost of fetching `url` as of `snapshot`: the snapshot delta,
    /// the project metadata delta and the package body if not yet held.
    pub fn baseline_charge<S>(
        &self,
        strategy: &S,
        client: &mut ClientState,
        snapshot: &str,
        url: &str,
    ) -> Result<PackageCost>
    where
        S: ChargeStrategy + ?Sized,
    {
        let mut cost = PackageCost::default();

        let prev_snapshot = client.prev_snapshot.clone();
        cost.snapshot_metadata_length = self.metadata_cost(client, prev_snapshot.as_deref(), snapshot)?;
        debug!(
            prev = prev_snapshot.as_deref().unwrap_or("None"),
            curr = snapshot,
            length = cost.snapshot_metadata_length,
            "snapshot metadata"
        );
        client.advance_snapshot(snapshot);

        let target = self.locate(snapshot, url)?;
        let prev_project = strategy.resolve_prev_project_pointer(self, client, &target.logical)?;
        self.charge_project(client, prev_project.as_deref(), &target, &mut cost)?;
        Ok(cost)
    }

    /// Charge the requested project's metadata and package into `cost`
    pub fn charge_project(
        &self,
        client: &mut ClientState,
        prev_project: Option<&str>,
        target: &RequestTarget,
        cost: &mut PackageCost,
    ) -> Result<()> {
        debug!(
            prev = prev_project.unwrap_or("None"),
            curr = %target.current,
            "project metadata"
        );
        client
            .project_pointers
            .insert(target.logical.clone(), target.current.clone());
        cost.project_metadata_length += self.metadata_cost(client, prev_project, &target.current)?;

        let document = self.store.read(&target.current)?;
        let length = project_targets(&document, &target.current)?
            .get(&target.package)
            .and_then(|entry| entry.get("length"))
            .and_then(Value::as_u64)
            .ok_or_else(|| SimError::UnknownPackage(target.package.clone()))?;

        cost.package_length = self.package_cost(client, &target.package, length);
        debug!(client = %client.id, cost = %cost, "package cost");
        Ok(())
    }
}
