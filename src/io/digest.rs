//! Deterministic SHA-256 digests for simulated keys, hashes and signatures
//!
//! Nothing here is cryptographically meaningful. The digests only need to be
//! stable across runs so that published metadata is byte-reproducible.

use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of `data`
pub fn sha256_hex(data: impl AsRef<[u8]>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data.as_ref());
    hex::encode(hasher.finalize())
}

/// Keyid of a project: the digest of its name
pub fn keyid_for(name: &str) -> String {
    sha256_hex(name.as_bytes())
}

/// Public key value paired with `keyid`
pub fn keyval_for(keyid: &str) -> String {
    sha256_hex(format!("keyval:{}", keyid))
}

/// 128 hex characters that change whenever the signed names, the timestamp
/// or the version change.
pub fn pseudo_signature<'a, I>(names: I, timestamp: i64, version: u64) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut names: Vec<&str> = names.into_iter().collect();
    names.sort_unstable();

    let change = format!("{}{}{}", names.concat(), timestamp, version);
    let first_half = sha256_hex(change.as_bytes());
    let second_half = sha256_hex(first_half.as_bytes());
    first_half + &second_half
}
