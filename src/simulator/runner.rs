use super::cache::TransitionCache;
use super::client::ClientState;
use super::context::SimContext;
use super::cost::PackageCost;
use super::ledger::{day_number, CostLedger, DayEntry};
use super::new_users::NewUserCosts;
use super::schedule::SnapshotSchedule;
use super::store::MetadataStore;
use super::strategy::{strategy_for, ChargeStrategy};
use super::trace::{read_requests, RequestRecord};
use crate::config::{ClientModel, MetadataVariant, SimConfig};
use crate::error::ensure_invariant;
use crate::io::SimPaths;
use crate::Result;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use tracing::{debug, info};

/// Outcome of one simulation run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SimulationSummary {
    pub total_requests: u64,
    pub missed_requests: u64,
    pub missed_urls: BTreeSet<String>,
    pub new_cost: PackageCost,
    pub return_cost: PackageCost,
    /// Day bucket of the last counted request
    pub last_day: i64,
    /// Transitions diffed during this run (not loaded from fixtures)
    pub transitions_computed: usize,
}

impl SimulationSummary {
    pub fn missed_percentage(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        self.missed_requests as f64 / self.total_requests as f64 * 100.0
    }

    pub fn total_cost(&self) -> PackageCost {
        self.new_cost + self.return_cost
    }
}

impl fmt::Display for SimulationSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total requests: {}", self.total_requests)?;
        writeln!(
            f,
            "Missed requests: {} ({:.4}%)",
            self.missed_requests,
            self.missed_percentage()
        )?;
        if !self.missed_urls.is_empty() {
            writeln!(f, "Missed packages:")?;
            for url in &self.missed_urls {
                writeln!(f, "  {}", url)?;
            }
        }
        writeln!(f, "Day {}", self.last_day)?;
        writeln!(f, "New: {}", self.new_cost)?;
        writeln!(f, "Return: {}", self.return_cost)?;
        write!(f, "Total: {}", self.total_cost())
    }
}

/// One replay of a request trace against one metadata variant and client model
pub struct Simulation {
    since: i64,
    time_limit: Option<i64>,
    paths: SimPaths,
    variant: MetadataVariant,
    ctx: SimContext,
    strategy: Box<dyn ChargeStrategy>,
    schedule: SnapshotSchedule,
    ledger: CostLedger,
    clients: HashMap<String, ClientState>,
}

impl Simulation {
    /// Load the metadata tree, persisted fixtures and (when the model needs
    /// it) the new-user cost table.
    pub fn setup(config: &SimConfig, variant: MetadataVariant, model: ClientModel) -> Result<Self> {
        let paths = SimPaths::from_config(config);
        let store = MetadataStore::new(&paths.variant_dir(variant))?;
        let transitions = TransitionCache::load(
            &paths.patch_length_cache_file(variant),
            &paths.dirty_projects_cache_file(variant),
        )?;
        info!(
            variant = %variant,
            model = model.name(),
            cached_transitions = transitions.len(),
            "setting up simulation"
        );

        let schedule = SnapshotSchedule::new(store.snapshot_timestamps()?, config)?;
        let ctx = SimContext::new(store, transitions, variant.is_delegated(), schedule.initial())?;

        let new_user_costs = match (variant.is_delegated(), model) {
            (true, ClientModel::Worst) => Some(NewUserCosts::load(
                &paths.new_user_cost_file(variant, config.delegation_fetch),
            )?),
            _ => None,
        };
        let strategy = strategy_for(
            &ctx,
            variant.is_delegated(),
            model,
            config.delegation_fetch,
            new_user_costs,
        )?;

        let ledger = CostLedger::new(paths.ledger_file(variant, model, config.frequency));
        ledger.reset()?;

        Ok(Self {
            since: config.since,
            time_limit: config.time_limit(),
            paths,
            variant,
            ctx,
            strategy,
            schedule,
            ledger,
            clients: HashMap::new(),
        })
    }

    pub fn context(&self) -> &SimContext {
        &self.ctx
    }

    pub fn ledger(&self) -> &CostLedger {
        &self.ledger
    }

    pub fn client(&self, id: &str) -> Option<&ClientState> {
        self.clients.get(id)
    }

    /// Replay the configured request log
    pub fn run_file(&mut self) -> Result<SimulationSummary> {
        let requests = read_requests(self.paths.requests_file())?;
        self.run(requests)
    }

    /// Replay `requests` in order, charging each one to its client.
    ///
    /// Requests for projects or packages absent at the simulated time are
    /// tallied as missed; every other error aborts the run.
    pub fn run<I>(&mut self, requests: I) -> Result<SimulationSummary>
    where
        I: IntoIterator<Item = Result<RequestRecord>>,
    {
        let mut summary = SimulationSummary::default();
        let mut prev_timestamp = self.since;
        let mut prev_day = 0;
        let computed_before = self.ctx.transitions().computations();

        for record in requests {
            let record = record?;

            if self.time_limit.is_some_and(|limit| record.timestamp > limit) {
                debug!(timestamp = record.timestamp, "time limit reached");
                break;
            }
            if self.schedule.is_exhausted() {
                debug!(timestamp = record.timestamp, "snapshots exhausted");
                break;
            }

            ensure_invariant!(
                summary.total_requests == 0 || prev_timestamp <= record.timestamp,
                "request at {} precedes previous request at {}",
                record.timestamp,
                prev_timestamp
            );
            prev_timestamp = record.timestamp;
            self.schedule.advance(record.timestamp);
            let snapshot = self.schedule.current();

            debug!(client = %record.client, url = %record.url, snapshot = %snapshot, "request");
            let charged = match self.clients.get_mut(&record.client) {
                Some(client) => self
                    .strategy
                    .return_charge(&self.ctx, client, &snapshot, &record.url)
                    .map(|cost| (cost, false)),
                None => {
                    let mut client = self.strategy.new_client(&self.ctx, &record.client);
                    let charged = self
                        .strategy
                        .new_charge(&self.ctx, &mut client, &snapshot, &record.url);
                    self.clients.insert(record.client.clone(), client);
                    charged.map(|cost| (cost, true))
                }
            };
            summary.total_requests += 1;

            match charged {
                Ok((cost, is_new)) => {
                    if is_new {
                        summary.new_cost += cost;
                    } else {
                        summary.return_cost += cost;
                    }

                    summary.last_day = day_number(self.since, record.timestamp);
                    if summary.last_day > prev_day {
                        self.flush(&summary, prev_timestamp)?;
                        prev_day = summary.last_day;
                    }
                }
                Err(e) if e.is_missed_request() => {
                    debug!(url = %record.url, error = %e, "missed request");
                    summary.missed_requests += 1;
                    summary.missed_urls.insert(record.url);
                }
                Err(e) => return Err(e),
            }
        }

        self.flush(&summary, prev_timestamp)?;
        summary.transitions_computed = self.ctx.transitions().computations() - computed_before;

        info!(
            variant = %self.variant,
            total = summary.total_requests,
            missed = summary.missed_requests,
            missed_percentage = summary.missed_percentage(),
            clients = self.clients.len(),
            "simulation finished"
        );
        info!(new = %summary.new_cost, returning = %summary.return_cost, total = %summary.total_cost(), "costs");
        Ok(summary)
    }

    fn flush(&self, summary: &SimulationSummary, prev_timestamp: i64) -> Result<()> {
        self.ledger.flush(
            summary.last_day,
            DayEntry {
                elapsed_time: prev_timestamp - self.since,
                new: summary.new_cost,
                ret: summary.return_cost,
            },
        )
    }

    /// Persist the transition fixtures for later runs
    pub fn teardown(self) -> Result<()> {
        self.ctx.transitions().save(
            &self.paths.patch_length_cache_file(self.variant),
            &self.paths.dirty_projects_cache_file(self.variant),
        )
    }
}
