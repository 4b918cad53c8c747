use super::repo::Repository;
use super::writer::{MetadataWriter, ReleaseReport};
use crate::changelog::{aggregate, ChangeLogReader};
use crate::config::{MetadataVariant, SimConfig};
use crate::error::ensure_invariant;
use crate::io::SimPaths;
use crate::registry::Projects;
use crate::Result;
use std::fs;
use tracing::info;

/// Totals of one publishing run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub releases: usize,
    pub snapshots_written: usize,
    pub project_files_written: usize,
    pub final_snapshot_version: u64,
}

/// Rebuild the registry as of the window start, then replay the window's
/// changelog, releasing once per distinct timestamp.
pub fn publish(config: &SimConfig, variant: MetadataVariant) -> Result<PublishReport> {
    let paths = SimPaths::from_config(config);
    paths.ensure_directories()?;

    // Fixtures computed against an older publication are stale
    for fixture in [
        paths.dirty_projects_cache_file(variant),
        paths.patch_length_cache_file(variant),
    ] {
        if fixture.is_file() {
            fs::remove_file(&fixture)?;
            info!(path = %fixture.display(), "removed stale fixture");
        }
    }

    let mut reader = ChangeLogReader::new(config.since, config.until)?;
    reader.read_file(paths.changelog_file())?;
    let changes = reader.filter_changes(None, None);

    let mut projects = Projects::from_disk(&paths)?;
    projects.reverse(&changes)?;
    info!(projects = projects.len(), "registry reconstructed at window start");

    let repository = Repository::new(projects)?;
    let publish_delegations = config.publish_delegations && variant.is_delegated();
    let mut writer = MetadataWriter::new(
        repository,
        variant,
        &paths.variant_dir(variant),
        config.clean_metadata_directory,
    )?
    .with_delegations(publish_delegations);

    let mut report = PublishReport::default();
    let mut prev_timestamp = config.initial_release_timestamp();
    let initial = writer.release(prev_timestamp)?;
    report.record(&initial);

    for (timestamp, events) in aggregate(&changes)? {
        ensure_invariant!(
            prev_timestamp < timestamp,
            "release timestamps must increase: {} then {}",
            prev_timestamp,
            timestamp
        );
        for event in &events {
            info!(change = %event, timestamp, "applying change");
            writer.repository_mut().apply(event)?;
        }
        let release = writer.release(timestamp)?;
        report.record(&release);
        prev_timestamp = timestamp;
    }

    report.final_snapshot_version = writer.repository().snapshot_version().unwrap_or(0);
    info!(
        variant = %variant,
        releases = report.releases,
        snapshots = report.snapshots_written,
        "publishing finished"
    );
    Ok(report)
}

impl PublishReport {
    fn record(&mut self, release: &ReleaseReport) {
        self.releases += 1;
        if release.released() {
            self.snapshots_written += 1;
        }
        self.project_files_written += release.project_files.len();
    }
}
