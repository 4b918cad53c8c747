use crate::{Result, SimError};
use regex::Regex;

/// Extracts project names from package paths and request URLs.
///
/// Packages live at `.../packages/<pyversion>/<letter>/<project>/<file>`; the
/// project is the directory immediately above the file.
#[derive(Debug, Clone)]
pub struct PackageLocator {
    pattern: Regex,
}

impl PackageLocator {
    pub fn new() -> Result<Self> {
        Ok(Self {
            pattern: Regex::new(r"^.*/packages/.+/.+/(.+)/.+$")?,
        })
    }

    /// Project owning `package`, or [`SimError::UnknownPackage`] if the path
    /// does not have the package layout.
    pub fn project_name<'a>(&self, package: &'a str) -> Result<&'a str> {
        self.pattern
            .captures(package)
            .and_then(|captures| captures.get(1))
            .map(|m| m.as_str())
            .ok_or_else(|| SimError::UnknownPackage(package.to_string()))
    }
}
