use crate::config::SimConfig;
use crate::repository::metadata::snapshot_path;
use crate::{Result, SimError};
use tracing::debug;

/// Which snapshot is current as the request stream moves through time.
///
/// Snapshot `t` becomes visible at `since + f * (t - since)`, so `f < 1`
/// compresses the release history and `f > 1` stretches it.
#[derive(Debug, Clone)]
pub struct SnapshotSchedule {
    timestamps: Vec<i64>,
    since: i64,
    frequency: f64,
    index: usize,
}

impl SnapshotSchedule {
    /// Build from the sorted timestamps of every released snapshot. The
    /// first snapshot is always kept; later ones are dropped once their
    /// effective time passes the time limit or the last request.
    pub fn new(timestamps: Vec<i64>, config: &SimConfig) -> Result<Self> {
        let mut iter = timestamps.into_iter();
        let first = iter
            .next()
            .ok_or_else(|| SimError::invariant("no snapshots to simulate against"))?;

        let mut schedule = Self {
            timestamps: vec![first],
            since: config.since,
            frequency: config.frequency,
            index: 0,
        };

        let time_limit = config.time_limit();
        for timestamp in iter {
            let effective = schedule.effective_time(timestamp);
            if effective >= config.last_request_timestamp as f64 {
                break;
            }
            if time_limit.is_some_and(|limit| effective > limit as f64) {
                break;
            }
            schedule.timestamps.push(timestamp);
        }

        debug!(
            snapshots = schedule.timestamps.len(),
            frequency = schedule.frequency,
            "snapshot schedule"
        );
        Ok(schedule)
    }

    /// When a snapshot released at `timestamp` becomes visible to clients
    pub fn effective_time(&self, timestamp: i64) -> f64 {
        self.since as f64 + self.frequency * (timestamp - self.since) as f64
    }

    /// Move to the newest snapshot visible strictly before `timestamp`
    pub fn advance(&mut self, timestamp: i64) {
        while let Some(&next) = self.timestamps.get(self.index + 1) {
            if timestamp as f64 > self.effective_time(next) {
                self.index += 1;
                debug!(timestamp, snapshot = next, "advance snapshot");
            } else {
                break;
            }
        }
    }

    /// Relative path of the current snapshot
    pub fn current(&self) -> String {
        snapshot_path(self.timestamps[self.index])
    }

    /// Relative path of the first snapshot
    pub fn initial(&self) -> String {
        snapshot_path(self.timestamps[0])
    }

    /// With a sped-up cadence the history runs out before the trace does;
    /// once the last snapshot is current no later request is meaningful.
    pub fn is_exhausted(&self) -> bool {
        self.frequency < 1.0 && self.index > 0 && self.index + 1 == self.timestamps.len()
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}
