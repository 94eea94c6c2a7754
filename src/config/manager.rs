use super::{
    evolution::EvolutionConfig,
    fitness::FitnessConfig,
    trading::TradeConfig,
    training::TrainingConfig,
    traits::ConfigSection,
};
use crate::error::EvotraderError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, RwLock};

/// Prefix of environment overrides, e.g. `EVOTRADER__TRADING__LEVERAGE=10`
pub const ENV_PREFIX: &str = "EVOTRADER";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub trading: TradeConfig,
    #[serde(default)]
    pub evolution: EvolutionConfig,
    #[serde(default)]
    pub fitness: FitnessConfig,
    #[serde(default)]
    pub training: TrainingConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), EvotraderError> {
        self.trading.validate()?;
        self.evolution.validate()?;
        self.fitness.validate()?;
        self.training.validate()?;
        Ok(())
    }
}

pub struct ConfigManager {
    config: Arc<RwLock<AppConfig>>,
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigManager {
    pub fn new() -> Self {
        Self {
            config: Arc::new(RwLock::new(AppConfig::default())),
        }
    }

    /// Reads the file, applies environment overrides and validates the result
    pub fn load_from_file<P: AsRef<Path>>(&self, path: P) -> Result<(), EvotraderError> {
        let config: AppConfig = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|built| built.try_deserialize())
            .map_err(|e| EvotraderError::Configuration(format!("Failed to load config: {}", e)))?;

        config.validate()?;

        *self.config.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = config;
        Ok(())
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), EvotraderError> {
        let config = self.get();
        let toml_str = toml::to_string_pretty(&config)
            .map_err(|e| EvotraderError::Configuration(format!("Failed to serialize: {}", e)))?;

        std::fs::write(path, toml_str)
            .map_err(|e| EvotraderError::Configuration(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    pub fn get(&self) -> AppConfig {
        self.config
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Applies `f` and keeps the change only if the result still validates
    pub fn update<F>(&self, f: F) -> Result<(), EvotraderError>
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut config = self.config.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut candidate = config.clone();
        f(&mut candidate);
        candidate.validate()?;
        *config = candidate;
        Ok(())
    }
}
