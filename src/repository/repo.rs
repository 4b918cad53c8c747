use crate::changelog::ChangeEvent;
use crate::error::ensure_invariant;
use crate::io::digest::{keyid_for, keyval_for};
use crate::registry::Projects;
use crate::{Result, SimError};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

/// Subordinate role -> projects it signs for
pub type Partition = BTreeMap<String, BTreeSet<String>>;

/// Repository-wide state: administrator keys, the snapshot version and the
/// alphabetical delegation of projects to subordinate roles.
pub struct Repository {
    projects: Projects,
    snapshot_keyid: String,
    projects_keyid: String,
    keyvals: HashMap<String, String>,
    snapshot_version: u64,
    projects_version: u64,
    partition: Partition,
    /// Partition as of the last release
    released_partition: Partition,
    role_versions: BTreeMap<String, u64>,
}

impl Repository {
    pub fn new(projects: Projects) -> Result<Self> {
        let snapshot_keyid = keyid_for("snapshot");
        let projects_keyid = keyid_for("projects");
        let keyvals = [&snapshot_keyid, &projects_keyid]
            .into_iter()
            .map(|keyid| (keyid.clone(), keyval_for(keyid)))
            .collect();

        let mut repository = Self {
            projects,
            snapshot_keyid,
            projects_keyid,
            keyvals,
            snapshot_version: 0,
            projects_version: 0,
            partition: Partition::new(),
            released_partition: Partition::new(),
            role_versions: BTreeMap::new(),
        };
        repository.refresh_partition()?;
        Ok(repository)
    }

    pub fn projects(&self) -> &Projects {
        &self.projects
    }

    pub fn projects_mut(&mut self) -> &mut Projects {
        &mut self.projects
    }

    /// Apply a changelog event to the registry and re-shard the projects
    pub fn apply(&mut self, change: &ChangeEvent) -> Result<()> {
        self.projects.apply(change)?;
        self.refresh_partition()
    }

    /// Assign every project to the role named by its first character
    pub fn refresh_partition(&mut self) -> Result<()> {
        let mut partition = Partition::new();
        for name in self.projects.names() {
            let role = name
                .chars()
                .next()
                .ok_or_else(|| SimError::invariant("project with an empty name"))?;
            partition
                .entry(role.to_string())
                .or_default()
                .insert(name.to_string());
        }
        self.partition = partition;
        self.check_partition()
    }

    /// Every project belongs to exactly one role
    pub fn check_partition(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        for (role, members) in &self.partition {
            for name in members {
                ensure_invariant!(
                    seen.insert(name.as_str()),
                    "project {} is delegated to more than one role (again by {})",
                    name,
                    role
                );
            }
        }
        ensure_invariant!(
            seen.len() == self.projects.len() && self.projects.names().all(|n| seen.contains(n)),
            "delegations cover {} of {} projects",
            seen.len(),
            self.projects.len()
        );
        Ok(())
    }

    /// Cut a new snapshot version if any project changed. Returns whether a
    /// release happened.
    pub fn release(&mut self) -> Result<bool> {
        let dirty = self.projects.dirty();
        if dirty.is_empty() {
            debug!("no repository release without dirty project metadata");
            return Ok(false);
        }
        self.snapshot_version += 1;

        let roles_changed = self.partition.keys().ne(self.released_partition.keys());
        if roles_changed || self.projects_version == 0 {
            self.projects_version += 1;
        }

        let dirty: BTreeSet<&str> = dirty.iter().map(String::as_str).collect();
        for (role, members) in &self.partition {
            let changed = self.released_partition.get(role) != Some(members);
            let touched = members.iter().any(|name| dirty.contains(name.as_str()));
            let version = self.role_versions.entry(role.clone()).or_insert(0);
            if *version == 0 || changed || touched {
                *version += 1;
            }
        }
        self.role_versions.retain(|role, _| self.partition.contains_key(role));
        self.released_partition = self.partition.clone();

        debug!(version = self.snapshot_version, dirty = dirty.len(), "repository release");
        Ok(true)
    }

    pub fn snapshot_keyids(&self) -> Vec<String> {
        vec![self.snapshot_keyid.clone()]
    }

    pub fn projects_administrator_keyids(&self) -> Vec<String> {
        vec![self.projects_keyid.clone()]
    }

    /// Subordinate roles share the projects administrator's key
    pub fn projects_subordinate_keyids(&self) -> Vec<String> {
        vec![self.projects_keyid.clone()]
    }

    /// Key value for an administrator or project keyid
    pub fn keyval(&self, keyid: &str) -> Option<String> {
        self.keyvals
            .get(keyid)
            .map(String::as_str)
            .or_else(|| self.projects.keyval(keyid))
            .map(str::to_string)
    }

    pub fn snapshot_version(&self) -> Result<u64> {
        ensure_invariant!(self.snapshot_version > 0, "no snapshot has been released");
        Ok(self.snapshot_version)
    }

    pub fn projects_administrator_version(&self) -> Result<u64> {
        ensure_invariant!(self.projects_version > 0, "projects administrator was never released");
        Ok(self.projects_version)
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    pub fn subordinate_version(&self, role: &str) -> Result<u64> {
        self.role_versions
            .get(role)
            .copied()
            .ok_or_else(|| SimError::invariant(format!("unknown subordinate role {}", role)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::io::SimPaths;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn repository(temp_dir: &TempDir, names: &[&str]) -> Repository {
        let config = SimConfig {
            pypi_directory: temp_dir.path().join("web"),
            output_directory: temp_dir.path().join("out"),
            ..SimConfig::default()
        };
        let mut projects = Projects::new(&SimPaths::from_config(&config)).unwrap();
        for name in names {
            projects.add_project(name).unwrap();
        }
        Repository::new(projects).unwrap()
    }

    #[test]
    fn test_partition_by_first_letter() {
        let temp_dir = TempDir::new().unwrap();
        let repo = repository(&temp_dir, &["bar", "baz", "foo"]);

        let partition: Vec<(String, Vec<String>)> = repo
            .partition()
            .iter()
            .map(|(role, members)| (role.clone(), members.iter().cloned().collect()))
            .collect();
        assert_eq!(
            partition,
            vec![
                ("b".to_string(), vec!["bar".to_string(), "baz".to_string()]),
                ("f".to_string(), vec!["foo".to_string()]),
            ]
        );
    }

    #[test]
    fn test_partition_follows_population() {
        let temp_dir = TempDir::new().unwrap();
        let mut repo = repository(&temp_dir, &["foo"]);
        repo.apply(&ChangeEvent::AddProject("quux".into())).unwrap();
        assert!(repo.partition().contains_key("q"));
        repo.apply(&ChangeEvent::RemoveProject("foo".into())).unwrap();
        assert!(!repo.partition().contains_key("f"));
        repo.check_partition().unwrap();
    }

    #[test]
    fn test_release_requires_dirty_projects() {
        let temp_dir = TempDir::new().unwrap();
        let mut repo = repository(&temp_dir, &["foo", "bar"]);
        assert!(repo.snapshot_version().is_err());

        assert!(repo.release().unwrap());
        assert_eq!(repo.snapshot_version().unwrap(), 1);
        assert_eq!(repo.subordinate_version("f").unwrap(), 1);

        repo.projects_mut().unmark_dirty("foo").unwrap();
        repo.projects_mut().unmark_dirty("bar").unwrap();
        assert!(!repo.release().unwrap());
        assert_eq!(repo.snapshot_version().unwrap(), 1);

        repo.projects_mut().inc_version("foo").unwrap();
        assert!(repo.release().unwrap());
        assert_eq!(repo.snapshot_version().unwrap(), 2);
        assert_eq!(repo.subordinate_version("f").unwrap(), 2);
        assert_eq!(repo.subordinate_version("b").unwrap(), 1);
        assert_eq!(repo.projects_administrator_version().unwrap(), 1);
    }

    #[test]
    fn test_keyvals_cover_administrators_and_projects() {
        let temp_dir = TempDir::new().unwrap();
        let repo = repository(&temp_dir, &["foo"]);
        assert!(repo.keyval(&repo.snapshot_keyids()[0]).is_some());
        let project_keyid = repo.projects().keyid("foo").unwrap().to_string();
        assert!(repo.keyval(&project_keyid).is_some());
    }
}
