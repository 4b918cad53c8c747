use super::CommandHandler;
use crate::config::{MetadataVariant, SimConfig};
use crate::io::SimPaths;
use crate::simulator::precompute_new_user_costs;
use crate::Result;

/// Handler for the `precompute` command
pub struct PrecomputeCommand {
    pub variant: MetadataVariant,
}

impl CommandHandler for PrecomputeCommand {
    fn execute(&self, config: &SimConfig) -> Result<()> {
        let costs = precompute_new_user_costs(config, self.variant)?;
        let path = SimPaths::from_config(config).new_user_cost_file(self.variant, config.delegation_fetch);
        println!("Snapshots: {}", costs.len());
        println!("Written to: {}", path.display());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "precompute"
    }
}

impl PrecomputeCommand {
    pub fn new(variant: MetadataVariant) -> Self {
        Self { variant }
    }
}
