//! Client cost simulation over released metadata
//!
//! Replays a request trace against the metadata tree of one variant and
//! accounts, per client, the bytes of snapshot metadata, project metadata
//! and package content it must download. Metadata transitions are costed by
//! the compressed size of a structural patch, computed once per distinct
//! `(prev, curr)` pair and shared by all clients.

pub mod cache;
pub mod client;
pub mod context;
pub mod cost;
pub mod ledger;
pub mod new_users;
pub mod patch;
pub mod runner;
pub mod schedule;
pub mod store;
pub mod strategy;
pub mod trace;

#[cfg(test)]
mod fixtures;

pub use cache::{transition_key, DirtyProjects, Transition, TransitionCache};
pub use client::ClientState;
pub use context::{RequestTarget, SimContext};
pub use cost::PackageCost;
pub use ledger::{CostLedger, DayEntry};
pub use new_users::{NewUserCost, NewUserCosts};
pub use patch::PatchOp;
pub use runner::{Simulation, SimulationSummary};
pub use schedule::SnapshotSchedule;
pub use store::MetadataStore;
pub use strategy::{ChargeStrategy, DelegatedStrategy, FlatStrategy};
pub use trace::{parse_request, read_requests, RequestRecord};

use crate::config::{MetadataVariant, SimConfig};
use crate::io::SimPaths;
use crate::Result;

/// Compute and persist the new-user cost table of `variant` for the
/// configured delegation fetch mode
pub fn precompute_new_user_costs(config: &SimConfig, variant: MetadataVariant) -> Result<NewUserCosts> {
    let paths = SimPaths::from_config(config);
    let store = MetadataStore::new(&paths.variant_dir(variant))?;
    let costs = NewUserCosts::precompute(&store, config.delegation_fetch)?;
    costs.save(&paths.new_user_cost_file(variant, config.delegation_fetch))?;
    Ok(costs)
}
