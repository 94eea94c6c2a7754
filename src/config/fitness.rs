use super::traits::{invalid, ConfigSection};
use crate::error::EvotraderError;
use serde::{Deserialize, Serialize};

/// Weights of the default composite fitness
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FitnessConfig {
    pub return_weight: f64,
    pub drawdown_weight: f64,
    /// Below this many closed trades a genome is penalized
    pub min_trades: usize,
    pub trade_penalty: f64,
}

impl Default for FitnessConfig {
    fn default() -> Self {
        Self {
            return_weight: 1.0,
            drawdown_weight: 0.5,
            min_trades: 10,
            trade_penalty: 0.5,
        }
    }
}

impl ConfigSection for FitnessConfig {
    fn section_name() -> &'static str {
        "fitness"
    }

    fn validate(&self) -> Result<(), EvotraderError> {
        if self.return_weight < 0.0 || self.drawdown_weight < 0.0 || self.trade_penalty < 0.0 {
            return Err(invalid(Self::section_name(), "fitness weights must not be negative"));
        }
        Ok(())
    }
}
