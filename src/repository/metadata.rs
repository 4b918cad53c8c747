//! Signed metadata documents and their canonical serialization

use crate::io::digest::pseudo_signature;
use crate::registry::TargetInfo;
use crate::{Result, SimError};
use chrono::{DateTime, Duration};
use serde::{Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;
use serde_json::Value;
use std::collections::BTreeMap;

/// Project target files expire a year after signing
pub const TARGETS_EXPIRY_DAYS: i64 = 365;
/// Snapshots expire a day after signing
pub const RELEASE_EXPIRY_DAYS: i64 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub keyid: String,
    pub method: String,
    pub sig: String,
}

/// A signed document: `{signatures, signed}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signed<T> {
    pub signatures: Vec<Signature>,
    pub signed: T,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyVal {
    pub public: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEntry {
    pub keytype: String,
    pub keyval: KeyVal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleEntry {
    pub keyids: Vec<String>,
    pub name: String,
    pub paths: Vec<String>,
    pub threshold: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegations {
    pub keys: BTreeMap<String, KeyEntry>,
    pub roles: Vec<RoleEntry>,
}

impl Delegations {
    /// Delegate `packages/<role>` for each role, listing every key involved
    pub fn new<'a, I>(roles: I, keyval: impl Fn(&str) -> Option<String>) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, Vec<String>, Vec<String>)>,
    {
        let mut delegations = Delegations::default();
        for (role, keyids, paths) in roles {
            for keyid in &keyids {
                let public = keyval(keyid).ok_or_else(|| {
                    SimError::invariant(format!("no key value for keyid {}", keyid))
                })?;
                delegations.keys.insert(
                    keyid.clone(),
                    KeyEntry {
                        keytype: "ed25519".to_string(),
                        keyval: KeyVal { public },
                    },
                );
            }
            delegations.roles.push(RoleEntry {
                keyids,
                name: format!("packages/{}", role),
                paths,
                threshold: 1,
            });
        }
        Ok(delegations)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetsBody {
    #[serde(rename = "_type")]
    pub kind: String,
    pub delegations: Delegations,
    pub expires: String,
    pub targets: BTreeMap<String, TargetInfo>,
    pub version: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseBody {
    #[serde(rename = "_type")]
    pub kind: String,
    pub expires: String,
    pub meta: BTreeMap<String, Value>,
    pub version: u64,
}

pub type TargetsDocument = Signed<TargetsBody>;
pub type ReleaseDocument = Signed<ReleaseBody>;

fn signatures<'a, I>(keyids: &[String], names: I, timestamp: i64, version: u64) -> Vec<Signature>
where
    I: IntoIterator<Item = &'a str>,
{
    let sig = pseudo_signature(names, timestamp, version);
    keyids
        .iter()
        .map(|keyid| Signature {
            keyid: keyid.clone(),
            method: "ed25519".to_string(),
            sig: sig.clone(),
        })
        .collect()
}

/// ISO-8601 UTC instant `days` after `timestamp`
pub fn expiration(timestamp: i64, days: i64) -> Result<String> {
    let signed_at = DateTime::from_timestamp(timestamp, 0)
        .ok_or_else(|| SimError::invariant(format!("timestamp {} out of range", timestamp)))?;
    Ok((signed_at + Duration::days(days))
        .format("%Y-%m-%dT%H:%M:%SZ")
        .to_string())
}

pub fn targets_document(
    keyids: &[String],
    delegations: Delegations,
    targets: BTreeMap<String, TargetInfo>,
    timestamp: i64,
    version: u64,
) -> Result<TargetsDocument> {
    Ok(Signed {
        signatures: signatures(keyids, targets.keys().map(String::as_str), timestamp, version),
        signed: TargetsBody {
            kind: "Targets".to_string(),
            delegations,
            expires: expiration(timestamp, TARGETS_EXPIRY_DAYS)?,
            targets,
            version,
        },
    })
}

pub fn release_document(
    keyids: &[String],
    meta: BTreeMap<String, Value>,
    timestamp: i64,
    version: u64,
) -> Result<ReleaseDocument> {
    Ok(Signed {
        signatures: signatures(keyids, meta.keys().map(String::as_str), timestamp, version),
        signed: ReleaseBody {
            kind: "Release".to_string(),
            expires: expiration(timestamp, RELEASE_EXPIRY_DAYS)?,
            meta,
            version,
        },
    })
}

/// Canonical bytes of a document: sorted keys, one-space indentation.
/// Content-addressed identifiers hash exactly these bytes.
pub fn jsonify<T: Serialize>(document: &T) -> Result<Vec<u8>> {
    // Going through Value sorts every object's keys
    let value = serde_json::to_value(document)?;
    let mut bytes = Vec::new();
    let formatter = PrettyFormatter::with_indent(b" ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut bytes, formatter);
    value.serialize(&mut serializer)?;
    Ok(bytes)
}

/// Logical path of a project's metadata: `packages/<project>.json`
pub fn project_metadata_path(project: &str) -> String {
    format!("packages/{}.json", project)
}

/// Project name of a logical path produced by [`project_metadata_path`]
pub fn project_name_of(logical_path: &str) -> Option<&str> {
    logical_path
        .strip_prefix("packages/")
        .and_then(|rest| rest.strip_suffix(".json"))
}

/// `dir/name.json` + `id` -> `dir/name.<id>.json`
pub fn versioned_path(logical_path: &str, identifier: &str) -> String {
    match logical_path.strip_suffix(".json") {
        Some(stem) => format!("{}.{}.json", stem, identifier),
        None => format!("{}.{}", logical_path, identifier),
    }
}

/// Snapshot file released at `timestamp`
pub fn snapshot_path(timestamp: i64) -> String {
    format!("snapshot.{}.json", timestamp)
}

/// File identifier carried by a snapshot `meta` entry: a bare hash, a bare
/// version number, or the hash of a `{hashes, version}` record.
pub fn meta_identifier(entry: &Value) -> Result<String> {
    match entry {
        Value::String(hash) => Ok(hash.clone()),
        Value::Number(version) => Ok(version.to_string()),
        Value::Object(record) => record
            .get("hashes")
            .and_then(|hashes| hashes.get("sha256"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| SimError::invariant("snapshot entry without a sha256 hash")),
        other => Err(SimError::invariant(format!(
            "unexpected snapshot entry {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Hashes;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_expiration_format() {
        assert_eq!(expiration(1_395_359_999, 1).unwrap(), "2014-03-21T23:59:59Z");
        assert_eq!(expiration(0, 365).unwrap(), "1971-01-01T00:00:00Z");
    }

    #[test]
    fn test_jsonify_sorts_keys_and_indents() {
        let bytes = jsonify(&json!({"b": 1, "a": {"d": 2, "c": 3}})).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text, "{\n \"a\": {\n  \"c\": 3,\n  \"d\": 2\n },\n \"b\": 1\n}");
    }

    #[test]
    fn test_targets_document_shape() {
        let mut targets = BTreeMap::new();
        targets.insert(
            "packages/source/f/foo/foo-1.0.tar.gz".to_string(),
            TargetInfo {
                hashes: Hashes { sha256: "ab".into() },
                length: 7,
            },
        );
        let document =
            targets_document(&["k".to_string()], Delegations::default(), targets, 100, 2).unwrap();
        let value = serde_json::to_value(&document).unwrap();

        assert_eq!(value["signed"]["_type"], "Targets");
        assert_eq!(value["signed"]["version"], 2);
        assert_eq!(value["signed"]["delegations"], json!({"keys": {}, "roles": []}));
        assert_eq!(value["signatures"][0]["keyid"], "k");
        assert_eq!(value["signatures"][0]["method"], "ed25519");
        assert_eq!(
            value["signed"]["targets"]["packages/source/f/foo/foo-1.0.tar.gz"],
            json!({"hashes": {"sha256": "ab"}, "length": 7})
        );
    }

    #[test]
    fn test_release_document_shape() {
        let mut meta = BTreeMap::new();
        meta.insert("packages/foo.json".to_string(), json!(3));
        let document = release_document(&["s".to_string()], meta, 200, 4).unwrap();
        let value = serde_json::to_value(&document).unwrap();

        assert_eq!(value["signed"]["_type"], "Release");
        assert_eq!(value["signed"]["meta"]["packages/foo.json"], 3);
        assert_eq!(value["signed"]["expires"], "1970-01-02T00:03:20Z");
    }

    #[test]
    fn test_paths_and_identifiers() {
        assert_eq!(project_metadata_path("foo"), "packages/foo.json");
        assert_eq!(project_name_of("packages/foo.json"), Some("foo"));
        assert_eq!(project_name_of("snapshot.1.json"), None);
        assert_eq!(versioned_path("packages/foo.json", "3"), "packages/foo.3.json");
        assert_eq!(snapshot_path(100), "snapshot.100.json");

        assert_eq!(meta_identifier(&json!("abc")).unwrap(), "abc");
        assert_eq!(meta_identifier(&json!(7)).unwrap(), "7");
        assert_eq!(
            meta_identifier(&json!({"hashes": {"sha256": "def"}, "version": 2})).unwrap(),
            "def"
        );
        assert!(meta_identifier(&json!(null)).is_err());
    }
}
