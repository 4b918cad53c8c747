use crate::config::MetadataVariant;
use crate::io::digest::sha256_hex;
use serde_json::{json, Value};

/// How a variant names project metadata files and what it records for them
/// in the snapshot.
pub trait IdentifierStrategy: Send + Sync {
    fn variant(&self) -> MetadataVariant;

    /// Identifier spliced into the file name of a project document
    fn file_identifier(&self, document: &[u8], version: u64) -> String;

    /// Value recorded under the project's logical path in the snapshot
    fn meta_entry(&self, document: &[u8], version: u64) -> Value;
}

/// Files addressed by content hash; snapshot lists the hash
pub struct ContentAddressed;

/// Files addressed by content hash; snapshot lists hash and version
pub struct HybridAddressed;

/// Files addressed by project version; snapshot lists the version
pub struct VersionAddressed;

impl IdentifierStrategy for ContentAddressed {
    fn variant(&self) -> MetadataVariant {
        MetadataVariant::Tuf
    }

    fn file_identifier(&self, document: &[u8], _version: u64) -> String {
        sha256_hex(document)
    }

    fn meta_entry(&self, document: &[u8], _version: u64) -> Value {
        Value::String(sha256_hex(document))
    }
}

impl IdentifierStrategy for HybridAddressed {
    fn variant(&self) -> MetadataVariant {
        MetadataVariant::Mercury
    }

    fn file_identifier(&self, document: &[u8], _version: u64) -> String {
        sha256_hex(document)
    }

    fn meta_entry(&self, document: &[u8], version: u64) -> Value {
        json!({
            "hashes": { "sha256": sha256_hex(document) },
            "version": version,
        })
    }
}

impl IdentifierStrategy for VersionAddressed {
    fn variant(&self) -> MetadataVariant {
        MetadataVariant::MercuryNohash
    }

    fn file_identifier(&self, _document: &[u8], version: u64) -> String {
        version.to_string()
    }

    fn meta_entry(&self, _document: &[u8], version: u64) -> Value {
        Value::from(version)
    }
}

/// Identifier strategy used by `variant`
pub fn strategy_for(variant: MetadataVariant) -> Box<dyn IdentifierStrategy> {
    match variant {
        MetadataVariant::Tuf => Box::new(ContentAddressed),
        MetadataVariant::Mercury => Box::new(HybridAddressed),
        MetadataVariant::MercuryNohash => Box::new(VersionAddressed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::metadata::meta_identifier;

    #[test]
    fn test_meta_entry_round_trips_to_file_identifier() {
        let document = b"{\n \"signed\": {}\n}";
        for variant in [
            MetadataVariant::Tuf,
            MetadataVariant::Mercury,
            MetadataVariant::MercuryNohash,
        ] {
            let strategy = strategy_for(variant);
            assert_eq!(strategy.variant(), variant);
            let entry = strategy.meta_entry(document, 4);
            assert_eq!(
                meta_identifier(&entry).unwrap(),
                strategy.file_identifier(document, 4)
            );
        }
    }

    #[test]
    fn test_version_addressing_ignores_content() {
        let strategy = VersionAddressed;
        assert_eq!(strategy.file_identifier(b"a", 3), "3");
        assert_eq!(strategy.file_identifier(b"b", 3), "3");
        assert_eq!(strategy.meta_entry(b"a", 3), Value::from(3u64));
    }
}
