use super::projects::{expand, Projects};
use crate::changelog::{ChangeEvent, TimedChange};
use crate::Result;
use std::path::Path;
use tracing::{debug, warn};

impl Projects {
    /// Apply one change going forward in time.
    ///
    /// Changes that refer to vanished projects or files are skipped with a
    /// warning; the changelog routinely mentions content that is no longer on
    /// the mirror.
    pub fn apply(&mut self, change: &ChangeEvent) -> Result<()> {
        match change {
            ChangeEvent::AddPackage(coordinate) => {
                let package = self.package_path(coordinate);
                let name = self.locator().project_name(&package)?.to_string();

                if !self.project_exists(&name) {
                    warn!(project = %name, package = %package, "created missing project for added package");
                    self.add_project(&name)?;
                } else if Path::new(&package).exists() {
                    if !self.package_exists(&package)? {
                        self.add_package(&package)?;
                    }
                    self.inc_version(&name)?;
                } else {
                    warn!(package = %package, "did not add package missing from disk");
                }
            }
            ChangeEvent::AddProject(name) => self.add_project_and_packages(name)?,
            ChangeEvent::RemovePackage(coordinate) => {
                let pattern = self.package_pattern(coordinate);
                let name = self.locator().project_name(&pattern)?.to_string();

                if self.project_exists(&name) {
                    for package in expand(&pattern)? {
                        if self.package_exists(&package)? {
                            self.remove_package(&package)?;
                            self.inc_version(&name)?;
                        } else {
                            warn!(package = %package, project = %name, "could not remove unregistered package");
                        }
                    }
                } else {
                    warn!(packages = %pattern, project = %name, "could not remove packages of missing project");
                }
            }
            ChangeEvent::RemoveProject(name) => {
                if self.project_exists(name) {
                    self.remove_project(name)?;
                } else {
                    warn!(project = %name, "could not remove missing project");
                }
            }
        }
        Ok(())
    }

    /// Walk `changes` newest first and undo additions, turning an end-of-window
    /// registry into the registry as it stood when the window opened.
    ///
    /// Removals are left alone: content removed during the window is either
    /// already gone, or still present and removed again on forward replay.
    pub fn reverse(&mut self, changes: &[TimedChange]) -> Result<()> {
        debug!(changes = changes.len(), "reversing changelog");

        for change in changes.iter().rev() {
            match &change.event {
                ChangeEvent::AddPackage(coordinate) => {
                    let package = self.package_path(coordinate);
                    let name = self.locator().project_name(&package)?.to_string();

                    if !self.project_exists(&name) {
                        warn!(package = %package, project = %name, "could not remove package from missing project");
                    } else if self.package_exists(&package)? {
                        self.remove_package(&package)?;
                    } else {
                        warn!(package = %package, project = %name, "could not remove unregistered package");
                    }
                }
                ChangeEvent::AddProject(name) => {
                    if self.project_exists(name) {
                        self.remove_project(name)?;
                    } else {
                        warn!(project = %name, "could not remove missing project");
                    }
                }
                ChangeEvent::RemovePackage(_) | ChangeEvent::RemoveProject(_) => {}
            }
        }

        debug!(projects = self.len(), "changelog reversed");
        Ok(())
    }
}
