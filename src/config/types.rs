use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 2014-03-21T00:00:00Z, the first instant of the observed window.
pub const DEFAULT_SINCE: i64 = 1_395_360_000;
/// 2014-04-20T00:00:00Z, the first instant after the observed window.
pub const DEFAULT_UNTIL: i64 = 1_397_952_000;
/// Timestamp of the last request in the default trace.
pub const DEFAULT_LAST_REQUEST: i64 = 1_397_951_999;

/// How project metadata files are identified on disk and in the snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum MetadataVariant {
    /// Delegated hierarchy, content-addressed project files
    Tuf,
    /// Flat snapshot carrying both hash and version, content-addressed files
    Mercury,
    /// Flat snapshot carrying versions only, version-addressed files
    MercuryNohash,
}

impl MetadataVariant {
    pub fn name(&self) -> &'static str {
        match self {
            MetadataVariant::Tuf => "tuf",
            MetadataVariant::Mercury => "mercury",
            MetadataVariant::MercuryNohash => "mercury-nohash",
        }
    }

    /// Whether clients must walk a delegation tree to validate a project
    pub fn is_delegated(&self) -> bool {
        matches!(self, MetadataVariant::Tuf)
    }
}

impl std::fmt::Display for MetadataVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// What a freshly seen client is assumed to already hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ClientModel {
    /// Clients start with nothing cached
    Worst,
    /// Clients start with the initial snapshot and every project it lists
    Best,
}

impl ClientModel {
    pub fn name(&self) -> &'static str {
        match self {
            ClientModel::Worst => "worst",
            ClientModel::Best => "best",
        }
    }
}

/// How sibling projects listed as dirty are fetched in the delegated variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum, Default)]
#[serde(rename_all = "snake_case")]
pub enum DelegationFetch {
    /// Download every dirty project's complete metadata file
    FullFile,
    /// Download only a signed version-number stub of each dirty project
    #[default]
    VersionOnly,
}

/// Top-level configuration, usually read from tufsim.yaml
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Root of the mirrored package index (contains simple/ and packages/)
    pub pypi_directory: PathBuf,

    /// Where changelogs, traces, metadata and ledgers live
    pub output_directory: PathBuf,

    /// Changelog file; derived from the window when unset
    pub changelog_file: Option<PathBuf>,

    /// Sorted request trace; derived from output_directory when unset
    pub requests_file: Option<PathBuf>,

    /// Metadata root; derived from output_directory when unset
    pub metadata_directory: Option<PathBuf>,

    /// Start of the observed window (inclusive, UNIX seconds)
    pub since: i64,

    /// End of the observed window (exclusive, UNIX seconds)
    pub until: i64,

    /// Publish cadence multiplier f > 0: f < 1 speeds snapshots up, f > 1 slows them down
    pub frequency: f64,

    /// Stop reading snapshots and requests this many seconds after `since`
    pub time_limit_seconds: Option<i64>,

    /// Snapshots whose scaled timestamp reaches this point are never seen by any client
    pub last_request_timestamp: i64,

    /// How dirty sibling projects are charged in the delegated variant
    pub delegation_fetch: DelegationFetch,

    /// Also write projects-administrator and subordinate role metadata
    pub publish_delegations: bool,

    /// Wipe the metadata directory before the first release
    pub clean_metadata_directory: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            pypi_directory: PathBuf::from("/var/pypi.python.org/web"),
            output_directory: PathBuf::from("/var/experiments-output"),
            changelog_file: None,
            requests_file: None,
            metadata_directory: None,
            since: DEFAULT_SINCE,
            until: DEFAULT_UNTIL,
            frequency: 1.0,
            time_limit_seconds: None,
            last_request_timestamp: DEFAULT_LAST_REQUEST,
            delegation_fetch: DelegationFetch::default(),
            publish_delegations: false,
            clean_metadata_directory: true,
        }
    }
}

impl SimConfig {
    /// Timestamp of the release made just before the window opens
    pub fn initial_release_timestamp(&self) -> i64 {
        self.since - 1
    }

    /// Upper bound imposed by `time_limit_seconds`, if any
    pub fn time_limit(&self) -> Option<i64> {
        self.time_limit_seconds.map(|limit| self.since + limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = SimConfig::default();
        assert_eq!(config.since, DEFAULT_SINCE);
        assert_eq!(config.until, DEFAULT_UNTIL);
        assert_eq!(config.frequency, 1.0);
        assert_eq!(config.delegation_fetch, DelegationFetch::VersionOnly);
        assert_eq!(config.initial_release_timestamp(), 1_395_359_999);
        assert_eq!(config.time_limit(), None);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "frequency: 0.5\ntime_limit_seconds: 1655\ndelegation_fetch: full_file\n";
        let config: SimConfig = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(config.frequency, 0.5);
        assert_eq!(config.time_limit(), Some(DEFAULT_SINCE + 1655));
        assert_eq!(config.delegation_fetch, DelegationFetch::FullFile);
        assert_eq!(config.until, DEFAULT_UNTIL);
    }

    #[test]
    fn test_variant_names() {
        assert_eq!(MetadataVariant::Tuf.to_string(), "tuf");
        assert_eq!(MetadataVariant::MercuryNohash.name(), "mercury-nohash");
        assert!(MetadataVariant::Tuf.is_delegated());
        assert!(!MetadataVariant::Mercury.is_delegated());
    }
}
