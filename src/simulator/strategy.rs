//! Per-variant client behavior

use super::client::ClientState;
use super::context::SimContext;
use super::cost::PackageCost;
use super::new_users::NewUserCosts;
use super::store::fetched_path;
use crate::config::{ClientModel, DelegationFetch};
use crate::repository::metadata::versioned_path;
use crate::Result;
use std::collections::HashMap;
use tracing::debug;

/// How a client model charges requests. Implementations decide where a
/// client's previous copy of a project comes from and what it pays on top
/// of the baseline.
pub trait ChargeStrategy: Send + Sync {
    /// Versioned project file the client held before this request, if any
    fn resolve_prev_project_pointer(
        &self,
        ctx: &SimContext,
        client: &ClientState,
        logical: &str,
    ) -> Result<Option<String>>;

    /// Extra bytes on top of `cost` after the baseline for `requested`
    fn compute_extra_charge(
        &self,
        ctx: &SimContext,
        client: &mut ClientState,
        requested: &str,
        cost: PackageCost,
    ) -> Result<PackageCost>;

    fn new_client(&self, _ctx: &SimContext, id: &str) -> ClientState {
        ClientState::new(id)
    }

    /// First request of a client
    fn new_charge(&self, ctx: &SimContext, client: &mut ClientState, snapshot: &str, url: &str) -> Result<PackageCost> {
        self.return_charge(ctx, client, snapshot, url)
    }

    /// Any later request
    fn return_charge(&self, ctx: &SimContext, client: &mut ClientState, snapshot: &str, url: &str) -> Result<PackageCost> {
        let cost = ctx.baseline_charge(self, client, snapshot, url)?;
        let requested = ctx.locate(snapshot, url)?.logical;
        self.compute_extra_charge(ctx, client, &requested, cost)
    }
}

/// Flat snapshot: one signed index lists every project, so a client only
/// ever fetches what it asks for.
pub struct FlatStrategy {
    model: ClientModel,
    /// Pointers of the initial snapshot, held by best-case clients
    initial_pointers: HashMap<String, String>,
}

impl FlatStrategy {
    pub fn new(ctx: &SimContext, model: ClientModel) -> Result<Self> {
        let initial_pointers = match model {
            ClientModel::Best => ctx.snapshot_pointers(ctx.initial_snapshot())?,
            ClientModel::Worst => HashMap::new(),
        };
        Ok(Self {
            model,
            initial_pointers,
        })
    }
}

impl ChargeStrategy for FlatStrategy {
    fn resolve_prev_project_pointer(
        &self,
        _ctx: &SimContext,
        client: &ClientState,
        logical: &str,
    ) -> Result<Option<String>> {
        Ok(client
            .project_pointers
            .get(logical)
            .or_else(|| self.initial_pointers.get(logical))
            .cloned())
    }

    fn compute_extra_charge(
        &self,
        _ctx: &SimContext,
        _client: &mut ClientState,
        _requested: &str,
        cost: PackageCost,
    ) -> Result<PackageCost> {
        Ok(cost)
    }

    fn new_client(&self, ctx: &SimContext, id: &str) -> ClientState {
        match self.model {
            ClientModel::Best => ClientState::starting_from(id, ctx.initial_snapshot()),
            ClientModel::Worst => ClientState::new(id),
        }
    }
}

/// Delegated hierarchy: validating the tree means fetching every sibling
/// project whose snapshot entry moved, not just the requested one.
pub struct DelegatedStrategy {
    model: ClientModel,
    fetch: DelegationFetch,
    /// First-contact cost per snapshot, required by the worst-case model
    new_user_costs: Option<NewUserCosts>,
}

impl DelegatedStrategy {
    pub fn new(model: ClientModel, fetch: DelegationFetch, new_user_costs: Option<NewUserCosts>) -> Self {
        Self {
            model,
            fetch,
            new_user_costs,
        }
    }

    /// A brand-new client downloads the whole snapshot and a bundle of every
    /// project document as fetched under `fetch`, then the requested project
    /// in full.
    fn first_contact_charge(
        &self,
        costs: &NewUserCosts,
        ctx: &SimContext,
        client: &mut ClientState,
        snapshot: &str,
        url: &str,
    ) -> Result<PackageCost> {
        let precomputed = costs.get(snapshot)?;
        let mut cost = PackageCost {
            snapshot_metadata_length: precomputed.snapshot_metadata_length,
            ..PackageCost::default()
        };
        client.advance_snapshot(snapshot);

        let target = ctx.locate(snapshot, url)?;
        cost.project_metadata_length += precomputed.project_metadata_length;
        ctx.charge_project(client, None, &target, &mut cost)?;
        Ok(cost)
    }
}

impl ChargeStrategy for DelegatedStrategy {
    /// The entry for `logical` in the snapshot the client held before the
    /// current one.
    fn resolve_prev_project_pointer(
        &self,
        ctx: &SimContext,
        client: &ClientState,
        logical: &str,
    ) -> Result<Option<String>> {
        match client.prev_prev_snapshot.as_deref() {
            Some(snapshot) => ctx.pointer_in_snapshot(snapshot, logical),
            None => Ok(None),
        }
    }

    fn compute_extra_charge(
        &self,
        ctx: &SimContext,
        client: &mut ClientState,
        requested: &str,
        mut cost: PackageCost,
    ) -> Result<PackageCost> {
        let dirty = std::mem::take(&mut client.dirty);
        debug!(client = %client.id, dirty = dirty.len(), "fetching dirty projects");

        for (logical, identifier) in &dirty {
            if logical == requested {
                continue;
            }
            let prev = self
                .resolve_prev_project_pointer(ctx, client, logical)?
                .map(|prev| fetched_path(prev, self.fetch));
            let curr = fetched_path(versioned_path(logical, identifier), self.fetch);
            cost.project_metadata_length += ctx.metadata_cost(client, prev.as_deref(), &curr)?;
        }

        client.dirty = dirty;
        Ok(cost)
    }

    fn new_client(&self, ctx: &SimContext, id: &str) -> ClientState {
        match self.model {
            ClientModel::Best => ClientState::starting_from(id, ctx.initial_snapshot()),
            ClientModel::Worst => ClientState::new(id),
        }
    }

    fn new_charge(&self, ctx: &SimContext, client: &mut ClientState, snapshot: &str, url: &str) -> Result<PackageCost> {
        match (&self.model, &self.new_user_costs) {
            (ClientModel::Worst, Some(costs)) => {
                self.first_contact_charge(costs, ctx, client, snapshot, url)
            }
            _ => self.return_charge(ctx, client, snapshot, url),
        }
    }
}

/// Strategy for a variant and client model
pub fn strategy_for(
    ctx: &SimContext,
    delegated: bool,
    model: ClientModel,
    fetch: DelegationFetch,
    new_user_costs: Option<NewUserCosts>,
) -> Result<Box<dyn ChargeStrategy>> {
    if delegated {
        Ok(Box::new(DelegatedStrategy::new(model, fetch, new_user_costs)))
    } else {
        Ok(Box::new(FlatStrategy::new(ctx, model)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::cache::transition_key;
    use crate::simulator::fixtures::{context, metadata_tree, BAR_URL, FOO_NEW_URL};
    use pretty_assertions::assert_eq;

    fn delegated(fetch: DelegationFetch) -> DelegatedStrategy {
        DelegatedStrategy::new(ClientModel::Best, fetch, None)
    }

    #[test]
    fn test_flat_worst_second_request_is_free() {
        let tree = metadata_tree();
        let ctx = context(&tree);
        let strategy = FlatStrategy::new(&ctx, ClientModel::Worst).unwrap();
        let mut client = strategy.new_client(&ctx, "a");

        let first = strategy.new_charge(&ctx, &mut client, "snapshot.1.json", BAR_URL).unwrap();
        assert_eq!(first.package_length, 4);
        assert!(first.project_metadata_length > 0);
        assert!(first.snapshot_metadata_length > 0);

        let second = strategy.return_charge(&ctx, &mut client, "snapshot.1.json", BAR_URL).unwrap();
        assert_eq!(second, PackageCost::default());
    }

    #[test]
    fn test_flat_best_starts_with_initial_snapshot() {
        let tree = metadata_tree();
        let ctx = context(&tree);
        let strategy = FlatStrategy::new(&ctx, ClientModel::Best).unwrap();
        let mut client = strategy.new_client(&ctx, "a");

        let cost = strategy.new_charge(&ctx, &mut client, "snapshot.1.json", BAR_URL).unwrap();
        assert_eq!(cost, PackageCost::new(4, 0, 0));
    }

    #[test]
    fn test_delegated_unchanged_snapshot_has_no_extra_charge() {
        let tree = metadata_tree();
        let ctx = context(&tree);
        let strategy = delegated(DelegationFetch::VersionOnly);
        let mut client = strategy.new_client(&ctx, "a");

        let cost = strategy.new_charge(&ctx, &mut client, "snapshot.2.json", BAR_URL).unwrap();
        assert!(client.dirty.is_empty());
        assert_eq!(cost.project_metadata_length, 0);
        assert_eq!(cost.package_length, 4);
        assert!(cost.snapshot_metadata_length > 0);
    }

    #[test]
    fn test_delegated_charges_dirty_siblings() {
        let tree = metadata_tree();
        let version_only = {
            let ctx = context(&tree);
            let strategy = delegated(DelegationFetch::VersionOnly);
            let mut client = ClientState::starting_from("a", "snapshot.2.json");
            let cost = strategy.return_charge(&ctx, &mut client, "snapshot.3.json", BAR_URL).unwrap();
            assert!(ctx
                .transitions()
                .get(&transition_key(Some("packages/foo.f1.json.version"), "packages/foo.f2.json.version"))
                .is_some());
            cost.project_metadata_length
        };
        let full_file = {
            let ctx = context(&tree);
            let strategy = delegated(DelegationFetch::FullFile);
            let mut client = ClientState::starting_from("a", "snapshot.2.json");
            let cost = strategy.return_charge(&ctx, &mut client, "snapshot.3.json", BAR_URL).unwrap();
            cost.project_metadata_length
        };

        assert!(version_only > 0);
        assert!(full_file > version_only);
    }

    #[test]
    fn test_delegated_requested_project_not_charged_twice() {
        let tree = metadata_tree();
        let ctx = context(&tree);
        let strategy = delegated(DelegationFetch::FullFile);
        let mut client = ClientState::starting_from("a", "snapshot.2.json");

        let cost = strategy.return_charge(&ctx, &mut client, "snapshot.3.json", FOO_NEW_URL).unwrap();
        let project = ctx
            .transitions()
            .get(&transition_key(Some("packages/foo.f1.json"), "packages/foo.f2.json"))
            .unwrap();
        assert_eq!(cost.project_metadata_length, project.cost);
        assert_eq!(cost.package_length, 6);
    }

    #[test]
    fn test_delegated_worst_new_client_pays_precomputed_cost() {
        let tree = metadata_tree();
        let ctx = context(&tree);
        let costs = NewUserCosts::precompute(ctx.store(), DelegationFetch::VersionOnly).unwrap();
        let table = costs.get("snapshot.3.json").unwrap();
        let full_files = NewUserCosts::precompute(ctx.store(), DelegationFetch::FullFile)
            .unwrap()
            .get("snapshot.3.json")
            .unwrap();
        let strategy = DelegatedStrategy::new(ClientModel::Worst, DelegationFetch::VersionOnly, Some(costs));

        let mut client = strategy.new_client(&ctx, "a");
        let cost = strategy.new_charge(&ctx, &mut client, "snapshot.3.json", BAR_URL).unwrap();
        let bar = ctx.transitions().get(&transition_key(None, "packages/bar.b1.json")).unwrap();

        assert_eq!(cost.snapshot_metadata_length, table.snapshot_metadata_length);
        assert_eq!(cost.project_metadata_length, table.project_metadata_length + bar.cost);
        assert_eq!(cost.package_length, 4);
        assert_eq!(client.prev_snapshot.as_deref(), Some("snapshot.3.json"));
        // Version stubs of every project, not their full files
        assert!(table.project_metadata_length < full_files.project_metadata_length);
    }
}
