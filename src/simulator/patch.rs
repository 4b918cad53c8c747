//! Structural JSON diff in the style of RFC 6902, and its transfer cost

use crate::Result;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use serde_json::ser::Formatter;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::io::{self, Write};

/// One edit turning the previous document into the current one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOp {
    Add { path: String, value: Value },
    Remove { path: String },
    Replace { path: String, value: Value },
}

impl PatchOp {
    pub fn path(&self) -> &str {
        match self {
            PatchOp::Add { path, .. } | PatchOp::Remove { path } | PatchOp::Replace { path, .. } => path,
        }
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            PatchOp::Add { value, .. } | PatchOp::Replace { value, .. } => Some(value),
            PatchOp::Remove { .. } => None,
        }
    }
}

/// Escape one JSON-pointer reference token
pub fn escape_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

pub fn unescape_token(token: &str) -> String {
    token.replace("~1", "/").replace("~0", "~")
}

/// Edits that turn `prev` into `curr`.
///
/// Objects are compared key by key. Arrays are compared index by index, with
/// surplus elements added at, or removed from, the tail.
pub fn diff(prev: &Value, curr: &Value) -> Vec<PatchOp> {
    let mut ops = Vec::new();
    diff_at("", prev, curr, &mut ops);
    ops
}

fn diff_at(path: &str, prev: &Value, curr: &Value, ops: &mut Vec<PatchOp>) {
    match (prev, curr) {
        (Value::Object(prev), Value::Object(curr)) => diff_objects(path, prev, curr, ops),
        (Value::Array(prev), Value::Array(curr)) => diff_arrays(path, prev, curr, ops),
        (prev, curr) if prev == curr => {}
        (_, curr) => ops.push(PatchOp::Replace {
            path: path.to_string(),
            value: curr.clone(),
        }),
    }
}

fn diff_objects(path: &str, prev: &Map<String, Value>, curr: &Map<String, Value>, ops: &mut Vec<PatchOp>) {
    let keys: BTreeSet<&String> = prev.keys().chain(curr.keys()).collect();

    for key in keys {
        let child = format!("{}/{}", path, escape_token(key));
        match (prev.get(key), curr.get(key)) {
            (Some(_), None) => ops.push(PatchOp::Remove { path: child }),
            (None, Some(value)) => ops.push(PatchOp::Add {
                path: child,
                value: value.clone(),
            }),
            (Some(prev), Some(curr)) => diff_at(&child, prev, curr, ops),
            (None, None) => {}
        }
    }
}

fn diff_arrays(path: &str, prev: &[Value], curr: &[Value], ops: &mut Vec<PatchOp>) {
    let common = prev.len().min(curr.len());
    for index in 0..common {
        diff_at(&format!("{}/{}", path, index), &prev[index], &curr[index], ops);
    }
    for (index, value) in curr.iter().enumerate().skip(common) {
        ops.push(PatchOp::Add {
            path: format!("{}/{}", path, index),
            value: value.clone(),
        });
    }
    // Highest index first so earlier removals do not shift later ones
    for index in (common..prev.len()).rev() {
        ops.push(PatchOp::Remove {
            path: format!("{}/{}", path, index),
        });
    }
}

/// Single-line JSON with `", "` and `": "` separators
struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}

/// Serialize `value` the way costed payloads go over the wire
pub fn to_wire_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut bytes, SpacedFormatter);
    value.serialize(&mut serializer)?;
    Ok(bytes)
}

/// Length of `bytes` after gzip at best compression.
///
/// Absolute figures differ from bz2 measurements of the same payloads;
/// every variant shares this compressor.
pub fn compressed_len(bytes: &[u8]) -> Result<u64> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(bytes)?;
    Ok(encoder.finish()?.len() as u64)
}

/// Bytes needed to ship `ops`: the smaller of the raw and compressed
/// serialization
pub fn patch_cost(ops: &[PatchOp]) -> Result<u64> {
    let serialized = to_wire_bytes(ops)?;
    let raw = serialized.len() as u64;
    Ok(raw.min(compressed_len(&serialized)?))
}

/// Logical paths of snapshot entries touched by `ops`.
///
/// An added `/signed` (no previous snapshot) touches every entry; otherwise
/// each added or replaced `/signed/meta/<path>...` touches `<path>`.
/// Removed entries are not dirty.
pub fn touched_meta_paths(ops: &[PatchOp]) -> BTreeSet<String> {
    let mut touched = BTreeSet::new();

    for op in ops {
        let Some(value) = op.value() else { continue };
        let path = op.path();

        if path == "/signed" || path == "/signed/meta" {
            let meta = if path == "/signed" { value.get("meta") } else { Some(value) };
            if let Some(Value::Object(meta)) = meta {
                touched.extend(meta.keys().cloned());
            }
        } else if let Some(rest) = path.strip_prefix("/signed/meta/") {
            let token = rest.split('/').next().unwrap_or(rest);
            touched.insert(unescape_token(token));
        }
    }

    touched
}
