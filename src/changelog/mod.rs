//! Repository changelog: decoding, windowing and aggregation of change events

pub mod reader;
pub mod types;

pub use reader::{aggregate, ChangeLogReader, ChangeLogSummary, EventCounts};
pub use types::{Action, ChangeEvent, ChangeRecord, TimedChange};
