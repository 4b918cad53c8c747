use crate::config::{ClientModel, DelegationFetch, MetadataVariant, SimConfig};
use crate::{Result, SimError};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Every file and directory location the simulator reads or writes
#[derive(Debug, Clone)]
pub struct SimPaths {
    /// Root of the mirrored package index
    pub pypi_dir: PathBuf,
    /// Directory of per-project listing directories (simple/)
    pub simple_dir: PathBuf,
    /// Directory of package files (packages/)
    pub packages_dir: PathBuf,
    /// Experiment output root
    pub output_dir: PathBuf,
    /// Metadata root, one subdirectory per variant
    pub metadata_dir: PathBuf,
    changelog_file: PathBuf,
    requests_file: PathBuf,
}

impl SimPaths {
    /// Derive every location from the configuration
    pub fn from_config(config: &SimConfig) -> Self {
        let pypi_dir = config.pypi_directory.clone();
        let output_dir = config.output_directory.clone();
        let metadata_dir = config
            .metadata_directory
            .clone()
            .unwrap_or_else(|| output_dir.join("metadata"));
        let changelog_file = config.changelog_file.clone().unwrap_or_else(|| {
            output_dir.join(format!("{}-{}.changelog", config.since, config.until))
        });
        let requests_file = config
            .requests_file
            .clone()
            .unwrap_or_else(|| output_dir.join("simple").join("sorted.mercury.log.new"));

        Self {
            simple_dir: pypi_dir.join("simple"),
            packages_dir: pypi_dir.join("packages"),
            pypi_dir,
            output_dir,
            metadata_dir,
            changelog_file,
            requests_file,
        }
    }

    /// Directory holding the user-level default config, if the platform has one
    pub fn user_config_dir() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("", "", "tufsim").ok_or_else(|| {
            SimError::Config("Failed to determine project directories".to_string())
        })?;
        Ok(dirs.config_dir().to_path_buf())
    }

    pub fn changelog_file(&self) -> &Path {
        &self.changelog_file
    }

    pub fn requests_file(&self) -> &Path {
        &self.requests_file
    }

    /// Metadata tree written by the release engine for `variant`
    pub fn variant_dir(&self, variant: MetadataVariant) -> PathBuf {
        self.metadata_dir.join(variant.name())
    }

    /// Persisted transition-cost fixture
    pub fn patch_length_cache_file(&self, variant: MetadataVariant) -> PathBuf {
        self.metadata_dir.join(format!(
            "{}-METADATA-PATCH-LENGTH-CACHE.json",
            variant.name().to_uppercase()
        ))
    }

    /// Persisted dirty-projects fixture
    pub fn dirty_projects_cache_file(&self, variant: MetadataVariant) -> PathBuf {
        self.metadata_dir.join(format!(
            "{}-DIRTY-PROJECTS-CACHE.json",
            variant.name().to_uppercase()
        ))
    }

    /// Precomputed first-contact costs per snapshot; one table per fetch mode
    pub fn new_user_cost_file(&self, variant: MetadataVariant, fetch: DelegationFetch) -> PathBuf {
        let mode = match fetch {
            DelegationFetch::VersionOnly => "-VERSION",
            DelegationFetch::FullFile => "",
        };
        self.metadata_dir.join(format!(
            "{}{}-COST-FOR-NEW-USERS.json",
            variant.name().to_uppercase(),
            mode
        ))
    }

    /// Day-bucketed cost ledger for one simulation run
    pub fn ledger_file(&self, variant: MetadataVariant, model: ClientModel, frequency: f64) -> PathBuf {
        self.metadata_dir.join(format!(
            "{}-{}.f{}.json",
            variant.name(),
            model.name(),
            frequency
        ))
    }

    /// Absolute path of a package given its index-relative path
    pub fn package_path(&self, relpath: &str) -> PathBuf {
        self.pypi_dir.join(relpath)
    }

    /// Path of a package relative to the index root, if it lies inside it
    pub fn package_relpath(&self, package: &Path) -> Option<String> {
        package
            .strip_prefix(&self.pypi_dir)
            .ok()
            .map(|p| p.to_string_lossy().replace('\\', "/"))
    }

    /// Ensure output directories exist
    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.output_dir)?;
        std::fs::create_dir_all(&self.metadata_dir)?;
        Ok(())
    }
}
