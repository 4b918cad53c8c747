use super::CommandHandler;
use crate::config::{ClientModel, ConfigLoader, MetadataVariant, SimConfig};
use crate::simulator::Simulation;
use crate::Result;

/// Handler for the `simulate` command
pub struct SimulateCommand {
    pub variant: MetadataVariant,
    pub model: ClientModel,
    pub frequency: Option<f64>,
    pub time_limit: Option<i64>,
}

impl CommandHandler for SimulateCommand {
    fn execute(&self, config: &SimConfig) -> Result<()> {
        let config = self.effective_config(config)?;

        let mut simulation = Simulation::setup(&config, self.variant, self.model)?;
        let summary = simulation.run_file()?;
        let ledger = simulation.ledger().path().to_path_buf();
        simulation.teardown()?;

        println!("{}", summary);
        println!("Ledger: {}", ledger.display());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "simulate"
    }
}

impl SimulateCommand {
    pub fn new(
        variant: MetadataVariant,
        model: ClientModel,
        frequency: Option<f64>,
        time_limit: Option<i64>,
    ) -> Self {
        Self {
            variant,
            model,
            frequency,
            time_limit,
        }
    }

    /// `config` with this command's overrides applied and revalidated
    fn effective_config(&self, config: &SimConfig) -> Result<SimConfig> {
        let mut config = config.clone();
        if let Some(frequency) = self.frequency {
            config.frequency = frequency;
        }
        if self.time_limit.is_some() {
            config.time_limit_seconds = self.time_limit;
        }
        ConfigLoader::new().validate(&config)?;
        Ok(config)
    }
}
