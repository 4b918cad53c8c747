use serde::{Deserialize, Serialize};
use std::iter::Sum;
use std::ops::{Add, AddAssign};

/// Bytes transferred for one request, or a running total of them
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageCost {
    pub package_length: u64,
    pub project_metadata_length: u64,
    pub snapshot_metadata_length: u64,
}

impl PackageCost {
    pub fn new(package_length: u64, project_metadata_length: u64, snapshot_metadata_length: u64) -> Self {
        Self {
            package_length,
            project_metadata_length,
            snapshot_metadata_length,
        }
    }

    pub fn total(&self) -> u64 {
        self.package_length + self.project_metadata_length + self.snapshot_metadata_length
    }

    pub fn metadata_length(&self) -> u64 {
        self.project_metadata_length + self.snapshot_metadata_length
    }
}

impl Add for PackageCost {
    type Output = PackageCost;

    fn add(self, other: PackageCost) -> PackageCost {
        PackageCost {
            package_length: self.package_length + other.package_length,
            project_metadata_length: self.project_metadata_length + other.project_metadata_length,
            snapshot_metadata_length: self.snapshot_metadata_length + other.snapshot_metadata_length,
        }
    }
}

impl AddAssign for PackageCost {
    fn add_assign(&mut self, other: PackageCost) {
        *self = *self + other;
    }
}

impl Sum for PackageCost {
    fn sum<I: Iterator<Item = PackageCost>>(iter: I) -> Self {
        iter.fold(PackageCost::default(), Add::add)
    }
}

impl std::fmt::Display for PackageCost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{{package: {}, project metadata: {}, snapshot metadata: {}}}",
            self.package_length, self.project_metadata_length, self.snapshot_metadata_length
        )
    }
}
