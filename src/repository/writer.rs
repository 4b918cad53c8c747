use super::identifier::{strategy_for, IdentifierStrategy};
use super::metadata::{
    jsonify, project_metadata_path, release_document, targets_document, versioned_path,
    Delegations,
};
use super::repo::Repository;
use crate::config::MetadataVariant;
use crate::error::ensure_invariant;
use crate::{Result, SimError};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// What one call to [`MetadataWriter::release`] put on disk
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseReport {
    pub timestamp: i64,
    /// Project metadata files newly written
    pub project_files: Vec<PathBuf>,
    /// Snapshot file, if a snapshot was released
    pub snapshot_file: Option<PathBuf>,
    /// Delegation role files newly written
    pub delegation_files: Vec<PathBuf>,
}

impl ReleaseReport {
    pub fn released(&self) -> bool {
        self.snapshot_file.is_some()
    }
}

/// Materializes versioned metadata for a [`Repository`] under one directory.
/// Files are write-once: an existing `(path, identifier)` is never rewritten.
pub struct MetadataWriter {
    repository: Repository,
    strategy: Box<dyn IdentifierStrategy>,
    metadata_dir: PathBuf,
    publish_delegations: bool,
    /// Latest serialized document per project, dirty or not
    project_json: HashMap<String, Vec<u8>>,
}

impl MetadataWriter {
    pub fn new(
        repository: Repository,
        variant: MetadataVariant,
        metadata_dir: &Path,
        clean: bool,
    ) -> Result<Self> {
        if clean {
            match fs::remove_dir_all(metadata_dir) {
                Ok(()) => debug!(dir = %metadata_dir.display(), "removed old metadata"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        fs::create_dir_all(metadata_dir)?;

        Ok(Self {
            repository,
            strategy: strategy_for(variant),
            metadata_dir: metadata_dir.to_path_buf(),
            publish_delegations: false,
            project_json: HashMap::new(),
        })
    }

    /// Also write the projects administrator and subordinate role documents
    pub fn with_delegations(mut self, enabled: bool) -> Self {
        self.publish_delegations = enabled;
        self
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    pub fn repository_mut(&mut self) -> &mut Repository {
        &mut self.repository
    }

    pub fn metadata_dir(&self) -> &Path {
        &self.metadata_dir
    }

    /// Publish every dirty project and a snapshot identified by `timestamp`.
    /// Nothing is written when no project is dirty.
    pub fn release(&mut self, timestamp: i64) -> Result<ReleaseReport> {
        ensure_invariant!(timestamp > 0, "release timestamp must be positive, got {}", timestamp);
        let mut report = ReleaseReport {
            timestamp,
            ..ReleaseReport::default()
        };

        let dirty = self.repository.projects().dirty();
        if dirty.is_empty() {
            debug!(timestamp, "no dirty metadata to flush");
            return Ok(report);
        }

        for name in &dirty {
            let projects = self.repository.projects();
            let keyids = vec![projects.keyid(name)?.to_string()];
            let document = targets_document(
                &keyids,
                Delegations::default(),
                projects.targets_metadata(name)?,
                timestamp,
                projects.version(name)?,
            )?;
            self.project_json.insert(name.clone(), jsonify(&document)?);
        }

        self.repository.release()?;

        let mut meta = BTreeMap::new();
        for name in self.repository.projects().names() {
            let json = self.project_json.get(name).ok_or_else(|| {
                SimError::invariant(format!("no metadata generated for project {}", name))
            })?;
            let version = self.repository.projects().version(name)?;
            meta.insert(project_metadata_path(name), self.strategy.meta_entry(json, version));
        }
        let snapshot = release_document(
            &self.repository.snapshot_keyids(),
            meta,
            timestamp,
            self.repository.snapshot_version()?,
        )?;
        let snapshot_json = jsonify(&snapshot)?;

        for name in &dirty {
            let version = self.repository.projects().version(name)?;
            let json = self.project_json.get(name).ok_or_else(|| {
                SimError::invariant(format!("no metadata generated for project {}", name))
            })?;
            let identifier = self.strategy.file_identifier(json, version);
            if let Some(path) = self.write_once(&project_metadata_path(name), &identifier, json)? {
                report.project_files.push(path);
            }
            self.repository.projects_mut().unmark_dirty(name)?;
        }

        if self.publish_delegations {
            report.delegation_files = self.write_delegations(timestamp)?;
        }

        report.snapshot_file =
            Some(self.write_snapshot(&snapshot_json, timestamp)?);

        info!(
            timestamp,
            projects = dirty.len(),
            version = self.repository.snapshot_version()?,
            "released snapshot"
        );
        Ok(report)
    }

    fn write_snapshot(&self, json: &[u8], timestamp: i64) -> Result<PathBuf> {
        let identifier = timestamp.to_string();
        let path = self.metadata_dir.join(versioned_path("snapshot.json", &identifier));
        self.write_once("snapshot.json", &identifier, json)?;
        Ok(path)
    }

    fn write_delegations(&self, timestamp: i64) -> Result<Vec<PathBuf>> {
        let repository = &self.repository;
        let keyval = |keyid: &str| repository.keyval(keyid);
        let mut written = Vec::new();

        let subordinate_keyids = repository.projects_subordinate_keyids();
        let roles = repository.partition().keys().map(|role| {
            (
                role.as_str(),
                subordinate_keyids.clone(),
                vec![format!("packages/*/{}/*", role)],
            )
        });
        let administrator = targets_document(
            &repository.projects_administrator_keyids(),
            Delegations::new(roles, keyval)?,
            BTreeMap::new(),
            timestamp,
            repository.projects_administrator_version()?,
        )?;
        let identifier = repository.projects_administrator_version()?.to_string();
        if let Some(path) = self.write_once("packages.json", &identifier, &jsonify(&administrator)?)? {
            written.push(path);
        }

        for (role, members) in repository.partition() {
            let mut delegated = Vec::with_capacity(members.len());
            for name in members {
                let letter: String = name.chars().take(1).collect();
                delegated.push((
                    name.as_str(),
                    vec![repository.projects().keyid(name)?.to_string()],
                    vec![format!("packages/*/{}/{}/*", letter, name)],
                ));
            }
            let version = repository.subordinate_version(role)?;
            let subordinate = targets_document(
                &subordinate_keyids,
                Delegations::new(delegated, keyval)?,
                BTreeMap::new(),
                timestamp,
                version,
            )?;
            let logical = format!("packages/{}.json", role);
            if let Some(path) = self.write_once(&logical, &version.to_string(), &jsonify(&subordinate)?)? {
                written.push(path);
            }
        }

        Ok(written)
    }

    /// Write `json` to `<logical stem>.<identifier>.json` unless it exists.
    /// Returns the path if a file was written.
    fn write_once(&self, logical_path: &str, identifier: &str, json: &[u8]) -> Result<Option<PathBuf>> {
        ensure_invariant!(
            logical_path.ends_with(".json") && !Path::new(logical_path).is_absolute(),
            "bad logical metadata path {}",
            logical_path
        );
        let path = self.metadata_dir.join(versioned_path(logical_path, identifier));

        if path.exists() {
            return Ok(None);
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, json)?;
        debug!(path = %path.display(), "W");
        Ok(Some(path))
    }

    /// Current snapshot `meta` of the variant, for inspection
    pub fn snapshot_meta(&self) -> Result<BTreeMap<String, Value>> {
        self.repository
            .projects()
            .names()
            .map(|name| {
                let json = self.project_json.get(name).ok_or_else(|| {
                    SimError::invariant(format!("no metadata generated for project {}", name))
                })?;
                let version = self.repository.projects().version(name)?;
                Ok((project_metadata_path(name), self.strategy.meta_entry(json, version)))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::io::SimPaths;
    use crate::registry::Projects;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn writer(temp_dir: &TempDir, variant: MetadataVariant) -> MetadataWriter {
        let config = SimConfig {
            pypi_directory: temp_dir.path().join("web"),
            output_directory: temp_dir.path().join("out"),
            ..SimConfig::default()
        };
        let paths = SimPaths::from_config(&config);
        let mut projects = Projects::new(&paths).unwrap();
        projects.add_project("foo").unwrap();
        let package = projects.package_path("source/f/foo/foo-1.0.tar.gz");
        projects.insert_package(&package, 42).unwrap();
        projects.add_project("bar").unwrap();

        let repository = Repository::new(projects).unwrap();
        MetadataWriter::new(repository, variant, &paths.variant_dir(variant), true).unwrap()
    }

    fn files_under(dir: &Path) -> Vec<String> {
        let mut files: Vec<String> = walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.path().strip_prefix(dir).unwrap().to_string_lossy().into_owned())
            .collect();
        files.sort();
        files
    }

    #[test]
    fn test_initial_release_writes_everything() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = writer(&temp_dir, MetadataVariant::MercuryNohash);

        let report = writer.release(99).unwrap();
        assert!(report.released());
        assert_eq!(report.project_files.len(), 2);
        assert_eq!(
            files_under(writer.metadata_dir()),
            vec!["packages/bar.1.json", "packages/foo.1.json", "snapshot.99.json"]
        );
        assert!(writer.repository().projects().dirty().is_empty());
    }

    #[test]
    fn test_no_dirty_projects_no_files() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = writer(&temp_dir, MetadataVariant::Tuf);
        writer.release(99).unwrap();

        let report = writer.release(100).unwrap();
        assert!(!report.released());
        assert!(!writer.metadata_dir().join("snapshot.100.json").exists());
    }

    #[test]
    fn test_content_addressed_names_match_snapshot() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = writer(&temp_dir, MetadataVariant::Tuf);
        let report = writer.release(99).unwrap();

        let snapshot: Value =
            serde_json::from_slice(&fs::read(report.snapshot_file.unwrap()).unwrap()).unwrap();
        let hash = snapshot["signed"]["meta"]["packages/foo.json"].as_str().unwrap();
        let project = writer.metadata_dir().join(format!("packages/foo.{}.json", hash));
        let bytes = fs::read(&project).unwrap();
        assert_eq!(crate::io::digest::sha256_hex(&bytes), hash);
        assert_eq!(snapshot["signed"]["version"], 1);
    }

    #[test]
    fn test_hybrid_snapshot_entries() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = writer(&temp_dir, MetadataVariant::Mercury);
        writer.release(99).unwrap();
        writer.repository_mut().projects_mut().inc_version("foo").unwrap();
        writer.release(150).unwrap();

        let meta = writer.snapshot_meta().unwrap();
        assert_eq!(meta["packages/foo.json"]["version"], 2);
        assert_eq!(meta["packages/bar.json"]["version"], 1);
        assert_eq!(writer.repository().snapshot_version().unwrap(), 2);
    }

    #[test]
    fn test_delegation_documents() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = writer(&temp_dir, MetadataVariant::Tuf).with_delegations(true);
        let report = writer.release(99).unwrap();
        assert_eq!(report.delegation_files.len(), 3);

        let administrator: Value = serde_json::from_slice(
            &fs::read(writer.metadata_dir().join("packages.1.json")).unwrap(),
        )
        .unwrap();
        let roles = administrator["signed"]["delegations"]["roles"].as_array().unwrap();
        assert_eq!(roles.len(), 2);
        assert_eq!(roles[0]["name"], "packages/b");
        assert_eq!(roles[0]["paths"][0], "packages/*/b/*");

        let subordinate: Value = serde_json::from_slice(
            &fs::read(writer.metadata_dir().join("packages/f.1.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(
            subordinate["signed"]["delegations"]["roles"][0]["paths"][0],
            "packages/*/f/foo/*"
        );
    }
}
