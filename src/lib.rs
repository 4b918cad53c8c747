//! Package-index metadata simulation.
//!
//! Rebuilds a package index as of the start of a changelog window, replays
//! the window publishing versioned TUF or Mercury metadata at every change,
//! and replays a request log against that metadata to measure what each
//! client downloads.

pub mod changelog;
pub mod cli;
pub mod config;
pub mod error;
pub mod io;
pub mod registry;
pub mod repository;
pub mod simulator;

pub use error::{Result, SimError};
