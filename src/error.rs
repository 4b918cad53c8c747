use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("Malformed record at line {line}: {reason}")]
    MalformedRecord { line: usize, reason: String },

    #[error("Unknown project: {0}")]
    UnknownProject(String),

    #[error("Unknown package: {0}")]
    UnknownPackage(String),

    #[error("Invariant violated: {0}")]
    Invariant(String),

    #[error("Missing metadata file: {}", .0.display())]
    MissingMetadata(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("Glob pattern error: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SimError {
    /// Requests for content that no longer exists at the simulated time.
    /// These are tallied as missed requests instead of aborting the run.
    pub fn is_missed_request(&self) -> bool {
        matches!(self, SimError::UnknownProject(_) | SimError::UnknownPackage(_))
    }

    pub(crate) fn invariant(message: impl Into<String>) -> Self {
        SimError::Invariant(message.into())
    }
}

/// Fails with [`SimError::Invariant`] unless `cond` holds.
macro_rules! ensure_invariant {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err($crate::error::SimError::Invariant(format!($($arg)+)));
        }
    };
}

pub(crate) use ensure_invariant;

pub type Result<T> = std::result::Result<T, SimError>;
