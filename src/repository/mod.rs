//! Release engine: repository versioning and metadata materialization

pub mod identifier;
pub mod metadata;
pub mod publish;
pub mod repo;
pub mod writer;

pub use identifier::{strategy_for, IdentifierStrategy};
pub use publish::{publish, PublishReport};
pub use repo::{Partition, Repository};
pub use writer::{MetadataWriter, ReleaseReport};
