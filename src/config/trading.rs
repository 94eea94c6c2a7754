use super::trade_management::{ExitStrategyConfig, SizingPolicy};
use super::traits::{invalid, ConfigSection};
use crate::error::EvotraderError;
use crate::types::CandleInterval;
use serde::{Deserialize, Serialize};

/// Asset, interval and risk settings for one simulated market
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TradeConfig {
    pub asset: String,
    pub base: String,
    pub interval: CandleInterval,
    pub initial_capital: f64,
    pub leverage: u32,
    /// Exchange limit for `leverage`
    pub max_leverage: u32,
    /// Taker fee charged on every fill, as a fraction of notional
    pub fee_rate: f64,
    /// Adverse price move applied to market fills, as a fraction
    pub slippage: f64,
    /// Quantity precision; sizes are rounded down to a multiple of it
    pub lot_step: f64,
    pub allow_pyramiding: bool,
    /// Never hold a long and a short at the same time
    pub unidirectional: bool,
    pub sizing: SizingPolicy,
    pub exit: ExitStrategyConfig,
}

impl Default for TradeConfig {
    fn default() -> Self {
        Self {
            asset: "BTC".to_string(),
            base: "USDT".to_string(),
            interval: CandleInterval::FiveMinutes,
            initial_capital: 1000.0,
            leverage: 20,
            max_leverage: 125,
            fee_rate: 0.0004,
            slippage: 0.0,
            lot_step: 0.001,
            allow_pyramiding: false,
            unidirectional: true,
            sizing: SizingPolicy::FixedPercentage { allocation: 0.02 },
            exit: ExitStrategyConfig::default(),
        }
    }
}

impl TradeConfig {
    pub fn pair(&self) -> String {
        format!("{}{}", self.asset, self.base)
    }
}

impl ConfigSection for TradeConfig {
    fn section_name() -> &'static str {
        "trading"
    }

    fn validate(&self) -> Result<(), EvotraderError> {
        let section = Self::section_name();
        if self.asset.is_empty() || self.base.is_empty() {
            return Err(invalid(section, "asset and base must be set"));
        }
        if self.initial_capital <= 0.0 {
            return Err(invalid(section, "initial_capital must be positive"));
        }
        if self.leverage == 0 || self.leverage > self.max_leverage {
            return Err(invalid(
                section,
                format!("leverage must be between 1 and {}, got {}", self.max_leverage, self.leverage),
            ));
        }
        if !(0.0..1.0).contains(&self.fee_rate) {
            return Err(invalid(section, "fee_rate must be in [0, 1)"));
        }
        if !(0.0..1.0).contains(&self.slippage) {
            return Err(invalid(section, "slippage must be in [0, 1)"));
        }
        if self.lot_step <= 0.0 {
            return Err(invalid(section, "lot_step must be positive"));
        }
        self.sizing.validate()?;
        if matches!(self.sizing, SizingPolicy::RiskBased { .. }) && self.exit.stop_loss.is_none() {
            return Err(invalid(section, "risk based sizing needs a stop loss"));
        }
        self.exit.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(TradeConfig::default().validate().is_ok());
        assert_eq!(TradeConfig::default().pair(), "BTCUSDT");
    }

    #[test]
    fn test_leverage_over_exchange_limit() {
        let config = TradeConfig { leverage: 150, ..TradeConfig::default() };
        assert!(matches!(config.validate(), Err(EvotraderError::Configuration(_))));
    }

    #[test]
    fn test_risk_sizing_without_stop_loss() {
        let mut config = TradeConfig {
            sizing: SizingPolicy::RiskBased { risk: 0.01 },
            ..TradeConfig::default()
        };
        config.exit.stop_loss = None;
        assert!(config.validate().is_err());
    }
}
