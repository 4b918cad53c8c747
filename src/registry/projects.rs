use super::locator::PackageLocator;
use crate::error::ensure_invariant;
use crate::io::digest::{keyid_for, keyval_for, sha256_hex};
use crate::io::SimPaths;
use crate::{Result, SimError};
use glob::Pattern;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// `{"sha256": <hex>}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hashes {
    pub sha256: String,
}

/// Entry of a project's target listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetInfo {
    pub hashes: Hashes,
    pub length: u64,
}

/// A registered package file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub sha256: String,
    pub length: u64,
}

/// A registered project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub keyid: String,
    pub version: u64,
    /// Absolute package path -> package
    pub packages: BTreeMap<String, Package>,
    pub dirty: bool,
}

impl Project {
    fn new(name: &str) -> Self {
        Self {
            keyid: keyid_for(name),
            version: 1,
            packages: BTreeMap::new(),
            dirty: true,
        }
    }
}

/// Live model of which projects and packages exist
#[derive(Debug, Clone)]
pub struct Projects {
    pypi_dir: PathBuf,
    packages_dir: PathBuf,
    locator: PackageLocator,
    projects: BTreeMap<String, Project>,
    keyvals: HashMap<String, String>,
}

impl Projects {
    /// Empty registry over the index rooted at `paths.pypi_dir`
    pub fn new(paths: &SimPaths) -> Result<Self> {
        Ok(Self {
            pypi_dir: paths.pypi_dir.clone(),
            packages_dir: paths.packages_dir.clone(),
            locator: PackageLocator::new()?,
            projects: BTreeMap::new(),
            keyvals: HashMap::new(),
        })
    }

    /// Registry seeded with every project listed under `simple/` and every
    /// package file found for it under `packages/`.
    pub fn from_disk(paths: &SimPaths) -> Result<Self> {
        let mut projects = Self::new(paths)?;
        projects.scan(&paths.simple_dir)?;
        Ok(projects)
    }

    fn scan(&mut self, simple_dir: &Path) -> Result<()> {
        let mut names: Vec<String> = walkdir::WalkDir::new(simple_dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_dir())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();

        info!(projects = names.len(), dir = %simple_dir.display(), "scanning package index");
        for name in names {
            self.add_project_and_packages(&name)?;
        }
        Ok(())
    }

    pub fn locator(&self) -> &PackageLocator {
        &self.locator
    }

    /// Absolute package path for a coordinate relative to `packages/`
    pub fn package_path(&self, coordinate: &str) -> String {
        self.packages_dir.join(coordinate).to_string_lossy().into_owned()
    }

    /// Glob pattern for a coordinate that may itself contain wildcards
    pub(crate) fn package_pattern(&self, coordinate: &str) -> String {
        let prefix = Pattern::escape(&self.packages_dir.to_string_lossy());
        format!("{}/{}", prefix, coordinate)
    }

    pub fn project_exists(&self, name: &str) -> bool {
        self.projects.contains_key(name)
    }

    pub fn project(&self, name: &str) -> Result<&Project> {
        self.projects
            .get(name)
            .ok_or_else(|| SimError::UnknownProject(name.to_string()))
    }

    fn project_mut(&mut self, name: &str) -> Result<&mut Project> {
        self.projects
            .get_mut(name)
            .ok_or_else(|| SimError::invariant(format!("project {} does not exist", name)))
    }

    pub fn package_exists(&self, package: &str) -> Result<bool> {
        let name = self.locator.project_name(package)?;
        let project = self
            .projects
            .get(name)
            .ok_or_else(|| SimError::invariant(format!("project {} does not exist", name)))?;
        Ok(project.packages.contains_key(package))
    }

    /// Sorted project names
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.projects.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }

    /// Sorted names of projects with unpublished changes
    pub fn dirty(&self) -> Vec<String> {
        self.projects
            .iter()
            .filter(|(_, project)| project.dirty)
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn version(&self, name: &str) -> Result<u64> {
        let version = self.project(name)?.version;
        ensure_invariant!(version > 0, "project {} has version 0", name);
        Ok(version)
    }

    pub fn keyid(&self, name: &str) -> Result<&str> {
        Ok(&self.project(name)?.keyid)
    }

    pub fn keyval(&self, keyid: &str) -> Option<&str> {
        self.keyvals.get(keyid).map(String::as_str)
    }

    pub fn add_project(&mut self, name: &str) -> Result<()> {
        ensure_invariant!(!self.project_exists(name), "project {} already exists", name);

        let project = Project::new(name);
        self.keyvals
            .insert(project.keyid.clone(), keyval_for(&project.keyid));
        self.projects.insert(name.to_string(), project);
        info!(project = %name, "added project");
        Ok(())
    }

    /// Add a project together with every package file on disk for it
    pub fn add_project_and_packages(&mut self, name: &str) -> Result<()> {
        debug!(project = %name, "adding project from disk");
        self.add_project(name)?;

        // Renamed projects may have no packages under their listing name
        let pattern = self.package_pattern(&format!("*/*/{}/*", Pattern::escape(name)));
        for package in expand(&pattern)? {
            self.add_package(&package)?;
        }
        Ok(())
    }

    pub fn remove_project(&mut self, name: &str) -> Result<()> {
        let project = self
            .projects
            .remove(name)
            .ok_or_else(|| SimError::invariant(format!("cannot remove missing project {}", name)))?;
        self.keyvals.remove(&project.keyid);

        for package in project.packages.keys() {
            info!(package = %package, "removed package");
        }
        info!(project = %name, "removed project");
        Ok(())
    }

    /// Register the package file at absolute path `package`, reading its size from disk
    pub fn add_package(&mut self, package: &str) -> Result<()> {
        let length = fs::metadata(package)?.len();
        self.insert_package(package, length)
    }

    /// Register a package whose size is already known
    pub fn insert_package(&mut self, package: &str, length: u64) -> Result<()> {
        let name = self.locator.project_name(package)?.to_string();
        let project = self.project_mut(&name)?;
        project.packages.insert(
            package.to_string(),
            Package {
                sha256: sha256_hex(package.as_bytes()),
                length,
            },
        );
        project.dirty = true;
        info!(package = %package, "added package");
        Ok(())
    }

    pub fn remove_package(&mut self, package: &str) -> Result<()> {
        let name = self.locator.project_name(package)?.to_string();
        let project = self.project_mut(&name)?;
        ensure_invariant!(
            project.packages.remove(package).is_some(),
            "cannot remove missing package {}",
            package
        );
        project.dirty = true;
        info!(package = %package, "removed package");
        Ok(())
    }

    pub fn inc_version(&mut self, name: &str) -> Result<()> {
        let project = self.project_mut(name)?;
        project.version += 1;
        project.dirty = true;
        info!(project = %name, version = project.version, "incremented project version");
        Ok(())
    }

    pub fn mark_dirty(&mut self, name: &str) -> Result<()> {
        self.project_mut(name)?.dirty = true;
        debug!(project = %name, "marked project as dirty");
        Ok(())
    }

    pub fn unmark_dirty(&mut self, name: &str) -> Result<()> {
        self.project_mut(name)?.dirty = false;
        debug!(project = %name, "unmarked project as dirty");
        Ok(())
    }

    /// Target listing of a project: package path relative to the index root
    /// mapped to its hash and length.
    pub fn targets_metadata(&self, name: &str) -> Result<BTreeMap<String, TargetInfo>> {
        let project = self.project(name)?;
        project
            .packages
            .iter()
            .map(|(package, info)| {
                let relpath = Path::new(package)
                    .strip_prefix(&self.pypi_dir)
                    .map_err(|_| {
                        SimError::invariant(format!(
                            "package {} lies outside {}",
                            package,
                            self.pypi_dir.display()
                        ))
                    })?
                    .to_string_lossy()
                    .into_owned();
                let target = TargetInfo {
                    hashes: Hashes {
                        sha256: info.sha256.clone(),
                    },
                    length: info.length,
                };
                Ok((relpath, target))
            })
            .collect()
    }

    /// Project name to sorted package paths, for comparing registry states
    pub fn inventory(&self) -> BTreeMap<String, Vec<String>> {
        self.projects
            .iter()
            .map(|(name, project)| (name.clone(), project.packages.keys().cloned().collect()))
            .collect()
    }
}

/// Sorted file paths matching a glob pattern
pub(crate) fn expand(pattern: &str) -> Result<Vec<String>> {
    let mut matches = Vec::new();
    for entry in glob::glob(pattern)? {
        let path = entry.map_err(glob::GlobError::into_error)?;
        if path.is_file() {
            matches.push(path.to_string_lossy().into_owned());
        }
    }
    matches.sort();
    Ok(matches)
}
