use super::CommandHandler;
use crate::changelog::ChangeLogReader;
use crate::config::SimConfig;
use crate::io::SimPaths;
use crate::{Result, SimError};

/// Handler for the `changelog` command
pub struct ChangelogCommand {
    pub format: String,
}

impl CommandHandler for ChangelogCommand {
    fn execute(&self, config: &SimConfig) -> Result<()> {
        let paths = SimPaths::from_config(config);
        let mut reader = ChangeLogReader::new(config.since, config.until)?;
        reader.read_file(paths.changelog_file())?;
        let summary = reader.summarize();

        match self.format.as_str() {
            "json" => println!("{}", serde_json::to_string_pretty(&summary)?),
            "text" => println!("{}", summary),
            other => {
                return Err(SimError::Config(format!("Unknown output format: {}", other)));
            }
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "changelog"
    }
}

impl ChangelogCommand {
    pub fn new(format: String) -> Self {
        Self { format }
    }
}
