use crate::error::EthynylError;
use crate::reaction::{JournalFormat, Totals};
use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure for ethynyl
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EthynylConfig {
    /// Population settings
    pub simulation: SimulationConfig,
    /// Reaction journal settings
    pub journal: JournalConfig,
    /// Observability settings
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimulationConfig {
    /// Number of atoms when none is given on the command line
    pub default_atoms: i64,
    /// A uniform draw below this value makes a hydrogen atom
    pub hydrogen_threshold: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JournalConfig {
    /// Maximum radicals kept for the final dump
    pub max_lines: usize,
    /// Dump format (text or json)
    pub format: JournalFormat,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level used when RUST_LOG is not set
    pub log_level: String,
    /// Emit structured JSON logs instead of human-readable lines
    pub json_logs: bool,
}

impl Default for EthynylConfig {
    fn default() -> Self {
        Self {
            simulation: SimulationConfig {
                default_atoms: 40,
                hydrogen_threshold: 0.55,
            },
            journal: JournalConfig {
                max_lines: 100,
                format: JournalFormat::Text,
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                json_logs: false,
            },
        }
    }
}

impl EthynylConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration file (ethynyl.toml)
    /// 3. Environment variables (prefixed with ETHYNYL__, e.g. ETHYNYL__JOURNAL__MAX_LINES)
    pub fn load() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if Path::new("ethynyl.toml").exists() {
            builder = builder.add_source(File::with_name("ethynyl"));
        }

        builder = builder.add_source(
            Environment::with_prefix("ETHYNYL")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: EthynylConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make a run meaningless before any atom exists.
    pub fn validate(&self) -> Result<(), EthynylError> {
        if self.simulation.default_atoms < 0 {
            return Err(EthynylError::Configuration(format!(
                "{} is not a valid number of atoms",
                self.simulation.default_atoms
            )));
        }
        if self.simulation.default_atoms as u64 > Totals::MAX_ATOMS {
            return Err(EthynylError::Configuration(format!(
                "simulation.default_atoms {} exceeds the limit of {}",
                self.simulation.default_atoms,
                Totals::MAX_ATOMS
            )));
        }
        if !(0.0..=1.0).contains(&self.simulation.hydrogen_threshold) {
            return Err(EthynylError::Configuration(format!(
                "hydrogen threshold {} must be between 0 and 1",
                self.simulation.hydrogen_threshold
            )));
        }
        if self.journal.max_lines == 0 {
            return Err(EthynylError::Configuration(
                "journal.max_lines must be at least 1".to_string(),
            ));
        }
        if self.observability.log_level.parse::<tracing::Level>().is_err() {
            return Err(EthynylError::Configuration(format!(
                "unknown log level '{}'",
                self.observability.log_level
            )));
        }
        Ok(())
    }

    /// Render as TOML, in the same shape ethynyl.toml is read in
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<EthynylConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        // Load .env file first
        let _ = EthynylConfig::load_env_file();
        EthynylConfig::load()
    });

/// Get the global configuration
pub fn config() -> Result<&'static EthynylConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
}

/// Initialize configuration (called at startup)
pub fn init_config() -> Result<()> {
    let config = config()?;
    tracing::debug!(
        default_atoms = config.simulation.default_atoms,
        max_lines = config.journal.max_lines,
        "Configuration loaded successfully"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EthynylConfig::default();
        config.validate().unwrap();
        assert_eq!(config.simulation.default_atoms, 40);
        assert_eq!(config.journal.max_lines, 100);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = EthynylConfig::default();
        config.simulation.hydrogen_threshold = 1.2;
        assert!(matches!(config.validate(), Err(EthynylError::Configuration(_))));

        let mut config = EthynylConfig::default();
        config.simulation.default_atoms = -1;
        assert!(config.validate().is_err());

        let mut config = EthynylConfig::default();
        config.simulation.default_atoms = 5_000_000;
        assert!(config.validate().is_err());

        let mut config = EthynylConfig::default();
        config.journal.max_lines = 0;
        assert!(config.validate().is_err());

        let mut config = EthynylConfig::default();
        config.observability.log_level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = EthynylConfig::default();
        config.journal.format = JournalFormat::Json;
        let rendered = config.to_toml().unwrap();
        assert!(rendered.contains("[journal]"));
        assert!(rendered.contains("format = \"json\""));

        let parsed: EthynylConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.journal.format, JournalFormat::Json);
        assert_eq!(parsed.simulation.default_atoms, 40);
    }
}
