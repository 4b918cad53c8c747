use super::types::{Action, ChangeEvent, ChangeRecord, TimedChange};
use crate::error::ensure_invariant;
use crate::{Result, SimError};
use chrono::DateTime;
use regex::{Captures, Regex};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, info};

/// Field separator of the changelog format
pub const DELIMITER: char = ';';

type ActionDecoder = fn(&Captures<'_>) -> Action;

/// Decodes changelog lines into [`TimedChange`]s and keeps per-category counts.
///
/// Action strings are matched against an ordered pattern table; the first
/// match wins, so specific patterns precede general ones.
pub struct ChangeLogReader {
    since: i64,
    until: i64,
    patterns: Vec<(Regex, ActionDecoder)>,
    counts: EventCounts,
    /// Ordered by serial, hence by timestamp
    changes: Vec<TimedChange>,
    prev_serial: Option<i64>,
}

/// How many changelog entries fell into each action category
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EventCounts {
    pub add_file: u64,
    pub add_role: u64,
    pub creation: u64,
    pub default: u64,
    pub delete_role: u64,
    pub remove_file: u64,
    pub remove_release: u64,
    pub remove_package: u64,
}

impl ChangeLogReader {
    pub fn new(since: i64, until: i64) -> Result<Self> {
        ensure_invariant!(since < until, "window start {} must precede end {}", since, until);

        let table: [(&str, ActionDecoder); 6] = [
            (r"^add (.+) file (.+)$", |c| Action::AddFile {
                pyversion: c[1].to_string(),
                filename: c[2].to_string(),
            }),
            (r"^add (.+) (.+)$", |c| Action::AddRole {
                role: c[1].to_string(),
                user: c[2].to_string(),
            }),
            (r"^create$", |_| Action::Create),
            (r"^remove$", |_| Action::Remove),
            (r"^remove file (.+)$", |c| Action::RemoveFile {
                filename: c[1].to_string(),
            }),
            (r"^remove (.+) (.+)$", |c| Action::DeleteRole {
                role: c[1].to_string(),
                user: c[2].to_string(),
            }),
        ];

        let patterns = table
            .into_iter()
            .map(|(pattern, decoder)| Ok((Regex::new(pattern)?, decoder)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            since,
            until,
            patterns,
            counts: EventCounts::default(),
            changes: Vec::new(),
            prev_serial: None,
        })
    }

    pub fn since(&self) -> i64 {
        self.since
    }

    pub fn until(&self) -> i64 {
        self.until
    }

    pub fn counts(&self) -> &EventCounts {
        &self.counts
    }

    /// Every decoded change, in serial order
    pub fn changes(&self) -> &[TimedChange] {
        &self.changes
    }

    /// Split one line into its five fields
    pub fn parse_line(line: &str, line_number: usize) -> Result<ChangeRecord> {
        let line = line.trim_end_matches(['\n', '\r']);
        let fields: Vec<&str> = line.split(DELIMITER).collect();

        if fields.len() != 5 {
            return Err(SimError::MalformedRecord {
                line: line_number,
                reason: format!("expected 5 fields, found {}", fields.len()),
            });
        }

        let parse_int = |field: &str, what: &str| {
            field.trim().parse::<i64>().map_err(|_| SimError::MalformedRecord {
                line: line_number,
                reason: format!("{} is not an integer: {:?}", what, field),
            })
        };

        let version = match fields[1] {
            "None" => None,
            version => Some(version.trim().to_string()),
        };

        Ok(ChangeRecord {
            name: fields[0].to_string(),
            version,
            timestamp: parse_int(fields[2], "timestamp")?,
            action: fields[3].to_string(),
            serial: parse_int(fields[4], "serial")?,
        })
    }

    /// Classify an action string against the ordered pattern table
    pub fn classify(&self, action: &str) -> Action {
        for (regex, decode) in &self.patterns {
            if let Some(captures) = regex.captures(action) {
                return decode(&captures);
            }
        }
        Action::Other
    }

    /// Read and decode a changelog file
    pub fn read_file(&mut self, path: &Path) -> Result<()> {
        let file = File::open(path).map_err(|e| {
            SimError::Config(format!("Failed to open changelog {}: {}", path.display(), e))
        })?;
        info!(path = %path.display(), "reading changelog");
        self.read_from(BufReader::new(file))
    }

    /// Decode every line from `reader`
    pub fn read_from<R: BufRead>(&mut self, reader: R) -> Result<()> {
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            let record = Self::parse_line(&line, index + 1)?;
            self.handle(record)?;
        }
        debug!(changes = self.changes.len(), "changelog decoded");
        Ok(())
    }

    /// Decode one record, enforcing serial and timestamp monotonicity
    pub fn handle(&mut self, record: ChangeRecord) -> Result<()> {
        if let Some(prev_serial) = self.prev_serial {
            ensure_invariant!(
                prev_serial < record.serial,
                "changelog serials must strictly increase: {} then {}",
                prev_serial,
                record.serial
            );
        }
        if let Some(last) = self.changes.last() {
            ensure_invariant!(
                last.timestamp <= record.timestamp,
                "changelog timestamps must not decrease: {} then {} (serial {})",
                last.timestamp,
                record.timestamp,
                record.serial
            );
        }
        self.prev_serial = Some(record.serial);

        let name = &record.name;
        let event = match self.classify(&record.action) {
            Action::AddFile { pyversion, filename } => {
                self.counts.add_file += 1;
                Some(ChangeEvent::AddPackage(package_coordinate(&pyversion, name, &filename)))
            }
            Action::AddRole { .. } => {
                self.counts.add_role += 1;
                None
            }
            Action::Create => {
                self.counts.creation += 1;
                Some(ChangeEvent::AddProject(name.clone()))
            }
            Action::Remove => match &record.version {
                None => {
                    self.counts.remove_package += 1;
                    Some(ChangeEvent::RemoveProject(name.clone()))
                }
                Some(version) => {
                    self.counts.remove_release += 1;
                    let filename = format!("{}-{}.*", name, version);
                    Some(ChangeEvent::RemovePackage(package_coordinate("*", name, &filename)))
                }
            },
            Action::RemoveFile { filename } => {
                self.counts.remove_file += 1;
                Some(ChangeEvent::RemovePackage(package_coordinate("*", name, &filename)))
            }
            Action::DeleteRole { .. } => {
                self.counts.delete_role += 1;
                None
            }
            Action::Other => {
                self.counts.default += 1;
                None
            }
        };

        if let Some(event) = event {
            self.changes.push(TimedChange::new(event, record.timestamp));
        }
        Ok(())
    }

    /// Changes with `since <= timestamp < until`; the reader's own window by default
    pub fn filter_changes(&self, since: Option<i64>, until: Option<i64>) -> Vec<TimedChange> {
        let since = since.unwrap_or(self.since);
        let until = until.unwrap_or(self.until);

        self.changes
            .iter()
            .filter(|change| since <= change.timestamp && change.timestamp < until)
            .cloned()
            .collect()
    }

    /// Group changes by timestamp, preserving serial order inside each bucket
    pub fn aggregate(&self) -> Result<BTreeMap<i64, Vec<ChangeEvent>>> {
        aggregate(&self.changes)
    }

    /// Counts and rates over the reader's window
    pub fn summarize(&self) -> ChangeLogSummary {
        ChangeLogSummary::new(self.since, self.until, self.counts)
    }
}

/// `<pyversion>/<first letter>/<project>/<filename>`
fn package_coordinate(pyversion: &str, project: &str, filename: &str) -> String {
    let letter: String = project.chars().take(1).collect();
    format!("{}/{}/{}/{}", pyversion, letter, project, filename)
}

/// Group changes by timestamp, preserving the order of changes within a bucket
pub fn aggregate(changes: &[TimedChange]) -> Result<BTreeMap<i64, Vec<ChangeEvent>>> {
    let mut by_timestamp: BTreeMap<i64, Vec<ChangeEvent>> = BTreeMap::new();
    let mut prev_timestamp = i64::MIN;

    for change in changes {
        ensure_invariant!(
            prev_timestamp <= change.timestamp,
            "changes out of order: {} after {}",
            change.timestamp,
            prev_timestamp
        );
        by_timestamp
            .entry(change.timestamp)
            .or_default()
            .push(change.event.clone());
        prev_timestamp = change.timestamp;
    }

    Ok(by_timestamp)
}

/// Human-oriented summary of a changelog window
#[derive(Debug, Clone, Serialize)]
pub struct ChangeLogSummary {
    pub since: i64,
    pub until: i64,
    pub seconds_elapsed: i64,
    pub counts: EventCounts,
}

impl ChangeLogSummary {
    pub fn new(since: i64, until: i64, counts: EventCounts) -> Self {
        Self {
            since,
            until,
            seconds_elapsed: until - since,
            counts,
        }
    }

    fn rate(&self, count: i64) -> f64 {
        count as f64 / self.seconds_elapsed as f64
    }

    /// Created minus deleted projects
    pub fn net_projects(&self) -> i64 {
        self.counts.creation as i64 - self.counts.remove_package as i64
    }

    /// Added minus removed developer roles
    pub fn net_roles(&self) -> i64 {
        self.counts.add_role as i64 - self.counts.delete_role as i64
    }

    /// (label, count, rate per second) rows in presentation order
    pub fn rows(&self) -> Vec<(&'static str, i64, f64)> {
        let c = &self.counts;
        let rows = [
            ("created projects", c.creation as i64),
            ("deleted projects", c.remove_package as i64),
            ("net created projects", self.net_projects()),
            ("developers added to a project", c.add_role as i64),
            ("developers removed from a project", c.delete_role as i64),
            ("net developers added to a project", self.net_roles()),
            ("added packages", c.add_file as i64),
            ("releases with all packages deleted", c.remove_release as i64),
            ("single packages deleted", c.remove_file as i64),
            ("other actions", c.default as i64),
        ];
        rows.into_iter()
            .map(|(label, count)| (label, count, self.rate(count)))
            .collect()
    }
}

impl std::fmt::Display for ChangeLogSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let format_time = |t: i64| {
            DateTime::from_timestamp(t, 0)
                .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| t.to_string())
        };
        writeln!(
            f,
            "# of seconds since {} until {}: {}s",
            format_time(self.since),
            format_time(self.until),
            self.seconds_elapsed
        )?;
        for (label, count, rate) in self.rows() {
            writeln!(f)?;
            writeln!(f, "# of {}: {}", label, count)?;
            writeln!(f, "Rate: {}/s", rate)?;
        }
        Ok(())
    }
}
