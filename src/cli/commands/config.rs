use crate::cli::commands::Command;
use crate::config::EthynylConfig;
use anyhow::Result;

pub struct ConfigCommand {
    config: EthynylConfig,
}

impl ConfigCommand {
    pub fn new(config: EthynylConfig) -> Self {
        Self { config }
    }
}

impl Command for ConfigCommand {
    async fn execute(&self) -> Result<()> {
        println!("# Effective ethynyl configuration");
        println!("# Override with ethynyl.toml or ETHYNYL__<SECTION>__<KEY> variables");
        println!();
        print!("{}", self.config.to_toml()?);
        Ok(())
    }
}
