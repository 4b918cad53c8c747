pub mod digest;
pub mod paths;

pub use paths::SimPaths;
