use super::CommandHandler;
use crate::config::{MetadataVariant, SimConfig};
use crate::repository::publish;
use crate::Result;

/// Handler for the `publish` command
pub struct PublishCommand {
    pub variant: MetadataVariant,
    pub delegations: bool,
}

impl CommandHandler for PublishCommand {
    fn execute(&self, config: &SimConfig) -> Result<()> {
        let mut config = config.clone();
        config.publish_delegations |= self.delegations;

        let report = publish(&config, self.variant)?;
        println!("Variant: {}", self.variant);
        println!("Releases: {}", report.releases);
        println!("Snapshots written: {}", report.snapshots_written);
        println!("Project files written: {}", report.project_files_written);
        println!("Final snapshot version: {}", report.final_snapshot_version);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "publish"
    }
}

impl PublishCommand {
    pub fn new(variant: MetadataVariant, delegations: bool) -> Self {
        Self {
            variant,
            delegations,
        }
    }
}
