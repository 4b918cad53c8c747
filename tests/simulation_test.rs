//! Publish a small index, then replay request traces against it

mod test_helpers;

use pretty_assertions::assert_eq;
use std::path::Path;
use tempfile::TempDir;
use test_helpers::{create_index, fixture_config, init_test_logging, write_lines};
use tufsim::config::{ClientModel, DelegationFetch, MetadataVariant, SimConfig};
use tufsim::io::SimPaths;
use tufsim::repository::publish;
use tufsim::simulator::{
    parse_request, precompute_new_user_costs, transition_key, PackageCost, RequestRecord, Simulation,
};
use tufsim::Result;

const BAR: &str = "/packages/source/b/bar/bar-1.0.tar.gz";
const FOO_NEW: &str = "/packages/source/f/foo/foo-1.1.tar.gz";

/// bar and foo at the window start; foo-1.1 lands at t=1500
fn published(root: &Path, variants: &[MetadataVariant]) -> SimConfig {
    let config = fixture_config(root);
    let paths = SimPaths::from_config(&config);
    create_index(
        &config.pypi_directory,
        &[
            ("bar", &[("bar-1.0.tar.gz", "bar!")]),
            ("foo", &[("foo-1.0.tar.gz", "foo"), ("foo-1.1.tar.gz", "foo 1.1")]),
        ],
    );
    write_lines(
        paths.changelog_file(),
        &["foo;1.1;1500;add source file foo-1.1.tar.gz;1"],
    );
    for variant in variants {
        publish(&config, *variant).unwrap();
    }
    config
}

fn requests(lines: &[String]) -> Vec<Result<RequestRecord>> {
    lines
        .iter()
        .enumerate()
        .map(|(index, line)| parse_request(line, index + 1))
        .collect()
}

#[test]
fn test_two_new_clients_share_diffs_but_not_downloads() {
    init_test_logging();
    let temp_dir = TempDir::new().unwrap();
    let config = published(temp_dir.path(), &[MetadataVariant::MercuryNohash]);

    let mut alone = Simulation::setup(&config, MetadataVariant::MercuryNohash, ClientModel::Worst).unwrap();
    let single = alone
        .run(requests(&[format!("1100,10.0.0.1,{},pip/1.5", BAR)]))
        .unwrap();

    let mut simulation =
        Simulation::setup(&config, MetadataVariant::MercuryNohash, ClientModel::Worst).unwrap();
    let summary = simulation
        .run(requests(&[
            format!("1100,10.0.0.1,{},pip/1.5", BAR),
            format!("1100,10.0.0.2,{},pip/1.5", BAR),
            format!("1200,10.0.0.1,{},pip/1.5", BAR),
        ]))
        .unwrap();

    assert_eq!(summary.total_requests, 3);
    assert_eq!(summary.missed_requests, 0);
    assert_eq!(summary.new_cost.project_metadata_length, 2 * single.new_cost.project_metadata_length);
    assert_eq!(summary.new_cost.package_length, 8);
    // Same package, same snapshot: nothing more to download
    assert_eq!(summary.return_cost, PackageCost::default());
    // One snapshot diff and one project diff, whatever the number of clients
    assert_eq!(summary.transitions_computed, 2);
    assert!(simulation
        .context()
        .transitions()
        .get(&transition_key(None, "packages/bar.1.json"))
        .is_some());
}

#[test]
fn test_missed_requests_snapshot_advance_and_ledger() {
    init_test_logging();
    let temp_dir = TempDir::new().unwrap();
    let config = published(temp_dir.path(), &[MetadataVariant::MercuryNohash]);

    let mut simulation =
        Simulation::setup(&config, MetadataVariant::MercuryNohash, ClientModel::Worst).unwrap();
    let summary = simulation
        .run(requests(&[
            format!("1100,10.0.0.1,{},pip", FOO_NEW),
            format!("1100,10.0.0.1,{},pip", BAR),
            "1300,10.0.0.3,/packages/source/z/zed/zed-1.0.tar.gz,pip".to_string(),
            format!("1600,10.0.0.1,{},pip", FOO_NEW),
        ]))
        .unwrap();

    // foo-1.1 does not exist before its release; zed never does
    assert_eq!(summary.missed_requests, 2);
    assert_eq!(
        summary.missed_urls.iter().cloned().collect::<Vec<_>>(),
        vec!["/packages/source/f/foo/foo-1.1.tar.gz", "/packages/source/z/zed/zed-1.0.tar.gz"]
    );
    assert!((summary.missed_percentage() - 50.0).abs() < f64::EPSILON);

    let client = simulation.client("10.0.0.1").unwrap();
    assert_eq!(client.prev_snapshot.as_deref(), Some("snapshot.1500.json"));
    assert_eq!(
        client.project_pointers.get("packages/foo.json").map(String::as_str),
        Some("packages/foo.2.json")
    );
    assert_eq!(summary.return_cost.package_length, 4 + 7);
    assert!(summary.return_cost.snapshot_metadata_length > 0);

    let days = simulation.ledger().read().unwrap();
    assert_eq!(days.len(), 1);
    assert_eq!(days["0"].elapsed_time, 600);
    assert_eq!(days["0"].new, summary.new_cost);
    assert_eq!(days["0"].ret, summary.return_cost);
}

#[test]
fn test_fixtures_persist_across_runs() {
    init_test_logging();
    let temp_dir = TempDir::new().unwrap();
    let config = published(temp_dir.path(), &[MetadataVariant::MercuryNohash]);
    let paths = SimPaths::from_config(&config);
    let trace = [format!("1100,10.0.0.1,{},pip", BAR)];

    let mut first = Simulation::setup(&config, MetadataVariant::MercuryNohash, ClientModel::Worst).unwrap();
    let cold = first.run(requests(&trace)).unwrap();
    first.teardown().unwrap();
    assert!(paths.patch_length_cache_file(MetadataVariant::MercuryNohash).is_file());
    assert!(paths.dirty_projects_cache_file(MetadataVariant::MercuryNohash).is_file());

    let mut second = Simulation::setup(&config, MetadataVariant::MercuryNohash, ClientModel::Worst).unwrap();
    let warm = second.run(requests(&trace)).unwrap();
    assert_eq!(warm.transitions_computed, 0);
    assert_eq!(warm.new_cost, cold.new_cost);
}

#[test]
fn test_request_log_out_of_order_is_fatal() {
    let temp_dir = TempDir::new().unwrap();
    let config = published(temp_dir.path(), &[MetadataVariant::Mercury]);

    let mut simulation = Simulation::setup(&config, MetadataVariant::Mercury, ClientModel::Best).unwrap();
    let result = simulation.run(requests(&[
        format!("1200,a,{},pip", BAR),
        format!("1100,b,{},pip", BAR),
    ]));
    assert!(matches!(result, Err(tufsim::SimError::Invariant(_))));
}

#[test]
fn test_tuf_models() {
    init_test_logging();
    let temp_dir = TempDir::new().unwrap();
    let config = published(temp_dir.path(), &[MetadataVariant::Tuf]);
    let trace = [
        format!("1100,10.0.0.1,{},pip", BAR),
        format!("1600,10.0.0.1,{},pip", BAR),
    ];

    let mut best = Simulation::setup(&config, MetadataVariant::Tuf, ClientModel::Best).unwrap();
    let summary = best.run(requests(&trace)).unwrap();
    // Starting from the initial snapshot, only the package body is new
    assert_eq!(summary.new_cost, PackageCost::new(4, 0, 0));
    // foo moved while the client held bar: its version stub is charged
    assert_eq!(summary.return_cost.package_length, 0);
    assert!(summary.return_cost.project_metadata_length > 0);
    assert!(summary.return_cost.snapshot_metadata_length > 0);

    // Worst-case new clients need the precomputed bootstrap table
    assert!(Simulation::setup(&config, MetadataVariant::Tuf, ClientModel::Worst).is_err());
    let costs = precompute_new_user_costs(&config, MetadataVariant::Tuf).unwrap();
    let bootstrap = costs.get("snapshot.999.json").unwrap();
    // Default config fetches version stubs, so that is the table written and loaded
    let paths = SimPaths::from_config(&config);
    assert!(paths
        .new_user_cost_file(MetadataVariant::Tuf, DelegationFetch::VersionOnly)
        .is_file());
    assert!(!paths
        .new_user_cost_file(MetadataVariant::Tuf, DelegationFetch::FullFile)
        .exists());

    let mut worst = Simulation::setup(&config, MetadataVariant::Tuf, ClientModel::Worst).unwrap();
    let summary = worst.run(requests(&trace)).unwrap();
    assert_eq!(summary.new_cost.snapshot_metadata_length, bootstrap.snapshot_metadata_length);
    assert!(summary.new_cost.project_metadata_length > bootstrap.project_metadata_length);
    assert_eq!(summary.new_cost.package_length, 4);
}
