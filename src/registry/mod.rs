//! Project and package registry, seeded from disk and driven by the changelog

pub mod locator;
pub mod projects;
mod replay;

pub use locator::PackageLocator;
pub use projects::{Hashes, Package, Project, Projects, TargetInfo};
