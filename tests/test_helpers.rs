//! Shared fixtures for the integration tests

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Once;
use tufsim::config::SimConfig;

/// Initialize logging for tests (only once per test run)
#[allow(dead_code)]
static INIT: Once = Once::new();

#[allow(dead_code)]
pub fn init_test_logging() {
    INIT.call_once(|| {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_test_writer()
                    .with_target(true)
                    .with_level(true),
            )
            .with(tracing_subscriber::filter::EnvFilter::from_default_env())
            .try_init();
    });
}

/// Window used by every fixture: [1000, 2000)
#[allow(dead_code)]
pub const SINCE: i64 = 1_000;
#[allow(dead_code)]
pub const UNTIL: i64 = 2_000;

/// Configuration rooted at `root`, with explicit changelog and request files
#[allow(dead_code)]
pub fn fixture_config(root: &Path) -> SimConfig {
    SimConfig {
        pypi_directory: root.join("pypi"),
        output_directory: root.join("out"),
        changelog_file: Some(root.join("out").join("window.changelog")),
        requests_file: Some(root.join("out").join("requests.log")),
        metadata_directory: Some(root.join("out").join("metadata")),
        since: SINCE,
        until: UNTIL,
        last_request_timestamp: UNTIL - 1,
        ..SimConfig::default()
    }
}

/// Mirror layout: `simple/<project>/` listings and
/// `packages/<pyversion>/<letter>/<project>/<file>` package bodies
#[allow(dead_code)]
pub fn create_index(pypi: &Path, projects: &[(&str, &[(&str, &str)])]) -> Vec<PathBuf> {
    let mut packages = Vec::new();
    for (project, files) in projects {
        fs::create_dir_all(pypi.join("simple").join(project)).unwrap();
        let letter = &project[..1];
        for (filename, contents) in files.iter() {
            let dir = pypi.join("packages").join("source").join(letter).join(project);
            fs::create_dir_all(&dir).unwrap();
            let path = dir.join(filename);
            fs::write(&path, contents).unwrap();
            packages.push(path);
        }
    }
    fs::create_dir_all(pypi.join("packages")).unwrap();
    packages
}

/// Write changelog lines, one `name;version;timestamp;action;serial` each
#[allow(dead_code)]
pub fn write_lines(path: &Path, lines: &[&str]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut contents = lines.join("\n");
    contents.push('\n');
    fs::write(path, contents).unwrap();
}
