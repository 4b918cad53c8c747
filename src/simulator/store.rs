use crate::config::DelegationFetch;
use crate::{Result, SimError};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Suffix asking for the version-only projection of a project document
pub const VERSION_SUFFIX: &str = ".version";

/// Read-through cache of the immutable metadata files of one variant
pub struct MetadataStore {
    dir: PathBuf,
    documents: Mutex<HashMap<String, Arc<Value>>>,
}

impl MetadataStore {
    pub fn new(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(SimError::MissingMetadata(dir.to_path_buf()));
        }
        Ok(Self {
            dir: dir.to_path_buf(),
            documents: Mutex::new(HashMap::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Document at `relpath`. A `.version` suffix yields
    /// `{signatures, signed: {version}}` of the underlying project document.
    pub fn read(&self, relpath: &str) -> Result<Arc<Value>> {
        if let Some(real) = relpath.strip_suffix(VERSION_SUFFIX) {
            let document = self.read(real)?;
            let projected = json!({
                "signatures": document.get("signatures").cloned().unwrap_or(Value::Null),
                "signed": {
                    "version": document
                        .get("signed")
                        .and_then(|signed| signed.get("version"))
                        .cloned()
                        .unwrap_or(Value::Null),
                },
            });
            return Ok(Arc::new(projected));
        }

        if let Some(document) = self.lock()?.get(relpath) {
            return Ok(Arc::clone(document));
        }

        let path = self.dir.join(relpath);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SimError::MissingMetadata(path))
            }
            Err(e) => return Err(e.into()),
        };
        let document: Arc<Value> = Arc::new(serde_json::from_slice(&bytes)?);
        debug!(relpath, "loaded metadata");

        Ok(Arc::clone(
            self.lock()?
                .entry(relpath.to_string())
                .or_insert(document),
        ))
    }

    /// Raw bytes of a file, bypassing the cache
    pub fn read_bytes(&self, relpath: &str) -> Result<Vec<u8>> {
        let path = self.dir.join(relpath);
        fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => SimError::MissingMetadata(path),
            _ => e.into(),
        })
    }

    /// Sorted timestamps of every `snapshot.<t>.json` in the directory
    pub fn snapshot_timestamps(&self) -> Result<Vec<i64>> {
        let mut timestamps = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let name = entry?.file_name().to_string_lossy().into_owned();
            let timestamp = name
                .strip_prefix("snapshot.")
                .and_then(|rest| rest.strip_suffix(".json"))
                .and_then(|t| t.parse::<i64>().ok());
            if let Some(timestamp) = timestamp {
                timestamps.push(timestamp);
            }
        }
        timestamps.sort_unstable();
        Ok(timestamps)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Arc<Value>>>> {
        self.documents
            .lock()
            .map_err(|_| SimError::invariant("metadata store lock poisoned"))
    }
}

/// Path a client downloads for the project file `relpath` under `fetch`
pub fn fetched_path(relpath: String, fetch: DelegationFetch) -> String {
    match fetch {
        DelegationFetch::VersionOnly => relpath + VERSION_SUFFIX,
        DelegationFetch::FullFile => relpath,
    }
}

/// `signed.meta` of a snapshot document
pub fn snapshot_meta<'a>(document: &'a Value, relpath: &str) -> Result<&'a Map<String, Value>> {
    document
        .get("signed")
        .and_then(|signed| signed.get("meta"))
        .and_then(Value::as_object)
        .ok_or_else(|| SimError::invariant(format!("{} has no signed.meta", relpath)))
}

/// `signed.targets` of a project document
pub fn project_targets<'a>(document: &'a Value, relpath: &str) -> Result<&'a Map<String, Value>> {
    document
        .get("signed")
        .and_then(|signed| signed.get("targets"))
        .and_then(Value::as_object)
        .ok_or_else(|| SimError::invariant(format!("{} has no signed.targets", relpath)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn store_with(files: &[(&str, Value)]) -> (TempDir, MetadataStore) {
        let temp_dir = TempDir::new().unwrap();
        for (relpath, document) in files {
            let path = temp_dir.path().join(relpath);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, serde_json::to_vec(document).unwrap()).unwrap();
        }
        let store = MetadataStore::new(temp_dir.path()).unwrap();
        (temp_dir, store)
    }

    #[test]
    fn test_read_caches_documents() {
        let (temp_dir, store) = store_with(&[("snapshot.5.json", json!({"signed": {"meta": {}}}))]);
        let first = store.read("snapshot.5.json").unwrap();
        fs::remove_file(temp_dir.path().join("snapshot.5.json")).unwrap();
        let second = store.read("snapshot.5.json").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_missing_file_is_missing_metadata() {
        let (_temp_dir, store) = store_with(&[]);
        assert!(matches!(
            store.read("packages/foo.1.json"),
            Err(SimError::MissingMetadata(_))
        ));
    }

    #[test]
    fn test_version_projection() {
        let document = json!({
            "signatures": [{"keyid": "k", "method": "ed25519", "sig": "s"}],
            "signed": {"targets": {"a": 1}, "version": 3, "expires": "x"}
        });
        let (_temp_dir, store) = store_with(&[("packages/foo.abc.json", document)]);

        let projected = store.read("packages/foo.abc.json.version").unwrap();
        assert_eq!(
            *projected,
            json!({
                "signatures": [{"keyid": "k", "method": "ed25519", "sig": "s"}],
                "signed": {"version": 3}
            })
        );
    }

    #[test]
    fn test_snapshot_timestamps_sorted() {
        let (_temp_dir, store) = store_with(&[
            ("snapshot.20.json", json!({})),
            ("snapshot.3.json", json!({})),
            ("packages/foo.1.json", json!({})),
        ]);
        assert_eq!(store.snapshot_timestamps().unwrap(), vec![3, 20]);
    }

    #[test]
    fn test_meta_and_targets_accessors() {
        let snapshot = json!({"signed": {"meta": {"packages/foo.json": 1}}});
        assert_eq!(snapshot_meta(&snapshot, "s").unwrap().len(), 1);
        assert!(project_targets(&snapshot, "s").is_err());
    }
}
