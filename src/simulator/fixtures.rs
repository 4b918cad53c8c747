//! Small metadata tree shared by the simulator unit tests.
//!
//! Three snapshots: 1 lists bar@b1 and foo@f1, 2 only bumps the snapshot
//! version, 3 moves foo to f2 (which adds foo-1.1).

use super::cache::TransitionCache;
use super::context::SimContext;
use super::store::MetadataStore;
use crate::repository::metadata::jsonify;
use serde_json::{json, Value};
use std::fs;
use tempfile::TempDir;

pub const BAR_URL: &str = "/packages/source/b/bar/bar-1.0.tar.gz";
pub const FOO_NEW_URL: &str = "/packages/source/f/foo/foo-1.1.tar.gz";

fn snapshot(version: u64, foo: &str) -> Value {
    json!({
        "signatures": [{"keyid": "k", "method": "ed25519", "sig": "s"}],
        "signed": {
            "_type": "Release",
            "expires": "2014-03-22T00:00:00Z",
            "meta": {"packages/bar.json": "b1", "packages/foo.json": foo},
            "version": version,
        }
    })
}

fn project(version: u64, targets: Value) -> Value {
    json!({
        "signatures": [{"keyid": "k", "method": "ed25519", "sig": "s"}],
        "signed": {
            "_type": "Targets",
            "delegations": {"keys": {}, "roles": []},
            "expires": "2015-03-21T00:00:00Z",
            "targets": targets,
            "version": version,
        }
    })
}

fn target(length: u64) -> Value {
    json!({"hashes": {"sha256": "0".repeat(64)}, "length": length})
}

pub fn metadata_tree() -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();
    fs::create_dir_all(dir.join("packages")).unwrap();

    let files = [
        ("snapshot.1.json", snapshot(1, "f1")),
        ("snapshot.2.json", snapshot(2, "f1")),
        ("snapshot.3.json", snapshot(3, "f2")),
        (
            "packages/bar.b1.json",
            project(1, json!({"packages/source/b/bar/bar-1.0.tar.gz": target(4)})),
        ),
        (
            "packages/foo.f1.json",
            project(1, json!({"packages/source/f/foo/foo-1.0.tar.gz": target(5)})),
        ),
        (
            "packages/foo.f2.json",
            project(
                2,
                json!({
                    "packages/source/f/foo/foo-1.0.tar.gz": target(5),
                    "packages/source/f/foo/foo-1.1.tar.gz": target(6),
                }),
            ),
        ),
    ];
    for (relpath, document) in files {
        fs::write(dir.join(relpath), jsonify(&document).unwrap()).unwrap();
    }
    temp_dir
}

/// Context over `dir`, tracking dirty projects like the delegated variant
pub fn context(temp_dir: &TempDir) -> SimContext {
    let store = MetadataStore::new(temp_dir.path()).unwrap();
    SimContext::new(store, TransitionCache::new(), true, "snapshot.1.json".to_string()).unwrap()
}
