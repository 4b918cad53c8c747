use super::patch::{compressed_len, to_wire_bytes};
use super::store::{fetched_path, snapshot_meta, MetadataStore};
use crate::config::DelegationFetch;
use crate::repository::metadata::{jsonify, meta_identifier, snapshot_path, versioned_path};
use crate::{Result, SimError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// What a client with an empty cache pays to bootstrap from one snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUserCost {
    /// Compressed bundle of every project document the snapshot lists, as
    /// fetched: full files or version stubs
    pub project_metadata_length: u64,
    /// Compressed snapshot document
    pub snapshot_metadata_length: u64,
}

/// `snapshot.<t>.json` -> bootstrap cost
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NewUserCosts(BTreeMap<String, NewUserCost>);

impl NewUserCosts {
    /// Compute the table over every snapshot in `store`, bundling project
    /// documents the way `fetch` downloads them
    pub fn precompute(store: &MetadataStore, fetch: DelegationFetch) -> Result<Self> {
        let mut table = BTreeMap::new();

        for timestamp in store.snapshot_timestamps()? {
            let relpath = snapshot_path(timestamp);
            let raw = store.read_bytes(&relpath)?;
            let snapshot_metadata_length = compressed_len(&raw)?;

            let document = store.read(&relpath)?;
            let mut bundle = BTreeMap::new();
            for (logical, entry) in snapshot_meta(&document, &relpath)? {
                if !logical.ends_with(".json") {
                    return Err(SimError::invariant(format!(
                        "bad snapshot entry {} in {}",
                        logical, relpath
                    )));
                }
                let fetched = fetched_path(versioned_path(logical, &meta_identifier(entry)?), fetch);
                let project = store.read(&fetched)?;
                bundle.insert(logical.as_str(), (*project).clone());
            }
            let project_metadata_length = compressed_len(&to_wire_bytes(&bundle)?)?;

            let cost = NewUserCost {
                project_metadata_length,
                snapshot_metadata_length,
            };
            debug!(snapshot = %relpath, ?cost, "new user cost");
            table.insert(relpath, cost);
        }

        info!(snapshots = table.len(), ?fetch, "precomputed new user costs");
        Ok(Self(table))
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(SimError::MissingMetadata(path.to_path_buf()));
        }
        Ok(serde_json::from_slice(&fs::read(path)?)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, jsonify(self)?)?;
        info!(path = %path.display(), "wrote new user costs");
        Ok(())
    }

    /// Cost for `snapshot`; every released snapshot has an entry
    pub fn get(&self, snapshot: &str) -> Result<NewUserCost> {
        self.0.get(snapshot).copied().ok_or_else(|| {
            SimError::invariant(format!("no new user cost precomputed for {}", snapshot))
        })
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
