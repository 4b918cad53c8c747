use super::cost::PackageCost;
use crate::repository::metadata::jsonify;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Seconds per ledger bucket
pub const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// Cumulative costs as of the end of one day
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayEntry {
    /// Seconds from the window start to the last counted request
    pub elapsed_time: i64,
    pub new: PackageCost,
    #[serde(rename = "return")]
    pub ret: PackageCost,
}

/// Day-number -> cumulative costs, kept on disk and rewritten on each flush
#[derive(Debug, Clone)]
pub struct CostLedger {
    path: PathBuf,
}

impl CostLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Drop any ledger left by an earlier run
    pub fn reset(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
            debug!(path = %self.path.display(), "removed previous ledger");
        }
        Ok(())
    }

    /// Record `entry` under `day`, keeping every other day already on disk
    pub fn flush(&self, day: i64, entry: DayEntry) -> Result<()> {
        let mut days = self.read()?;
        days.insert(day.to_string(), entry);
        fs::write(&self.path, jsonify(&days)?)?;
        info!(
            day,
            elapsed = entry.elapsed_time,
            new = %entry.new,
            returning = %entry.ret,
            "flushed ledger"
        );
        Ok(())
    }

    pub fn read(&self) -> Result<BTreeMap<String, DayEntry>> {
        if !self.path.is_file() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_slice(&fs::read(&self.path)?)?)
    }
}

/// Day bucket of `timestamp` relative to the window start
pub fn day_number(since: i64, timestamp: i64) -> i64 {
    (timestamp - since).div_euclid(SECONDS_PER_DAY)
}
