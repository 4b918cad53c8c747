pub mod changelog;
pub mod precompute;
pub mod publish;
pub mod simulate;

use crate::config::SimConfig;
use crate::Result;

/// Common trait for all command handlers
pub trait CommandHandler {
    /// Execute the command against the loaded configuration
    fn execute(&self, config: &SimConfig) -> Result<()>;

    /// Get command name for logging
    fn name(&self) -> &'static str;
}
