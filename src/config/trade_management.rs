use super::traits::{check_unit, invalid};
use crate::error::EvotraderError;
use serde::{Deserialize, Serialize};

const SECTION: &str = "trading.exit";

/// How many units to buy or sell when a signal fires
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum SizingPolicy {
    /// Spend a fixed share of the wallet: `balance * allocation / price`
    FixedPercentage { allocation: f64 },
    /// Lose at most `balance * risk` if the stop loss is hit
    RiskBased { risk: f64 },
}

impl SizingPolicy {
    pub fn validate(&self) -> Result<(), EvotraderError> {
        let (name, value) = match self {
            SizingPolicy::FixedPercentage { allocation } => ("allocation", *allocation),
            SizingPolicy::RiskBased { risk } => ("risk", *risk),
        };
        if !(value > 0.0 && value <= 1.0) {
            return Err(invalid(
                "trading.sizing",
                format!("{} must be in (0, 1], got {}", name, value),
            ));
        }
        Ok(())
    }
}

/// One rung of the take-profit ladder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfitTarget {
    /// Favorable move from entry, as a fraction (1.0 = +100%)
    pub delta_percentage: f64,
    /// Share of the position closed at this target
    pub quantity_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrailingStopConfig {
    /// Retrace from the tracked extreme that fills the order, in (0, 1)
    pub callback_rate: f64,
    /// Activate after this favorable move from entry
    pub change_percentage: Option<f64>,
    /// Activate after covering this share of the distance to the last take profit
    pub percentage_to_tp: Option<f64>,
}

/// Which of the two activation parameterizations a trailing stop uses
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActivationRule {
    ChangePercentage(f64),
    PercentageToTarget(f64),
}

impl TrailingStopConfig {
    pub fn activation_rule(&self) -> Result<ActivationRule, EvotraderError> {
        match (self.change_percentage, self.percentage_to_tp) {
            (Some(change), None) => Ok(ActivationRule::ChangePercentage(change)),
            (None, Some(share)) => Ok(ActivationRule::PercentageToTarget(share)),
            (Some(_), Some(_)) => Err(invalid(
                SECTION,
                "trailing stop sets both change_percentage and percentage_to_tp",
            )),
            (None, None) => Err(invalid(
                SECTION,
                "trailing stop needs change_percentage or percentage_to_tp",
            )),
        }
    }
}

/// Orders placed around every new position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitStrategyConfig {
    /// Adverse move from entry that triggers the stop loss, as a fraction
    pub stop_loss: Option<f64>,
    #[serde(default)]
    pub take_profits: Vec<ProfitTarget>,
    pub trailing_stop: Option<TrailingStopConfig>,
}

impl Default for ExitStrategyConfig {
    fn default() -> Self {
        Self {
            stop_loss: Some(0.005),
            take_profits: vec![ProfitTarget {
                delta_percentage: 0.01,
                quantity_percentage: 1.0,
            }],
            trailing_stop: None,
        }
    }
}

impl ExitStrategyConfig {
    pub fn validate(&self) -> Result<(), EvotraderError> {
        if let Some(stop_loss) = self.stop_loss {
            if !(stop_loss > 0.0 && stop_loss < 1.0) {
                return Err(invalid(SECTION, format!("stop_loss must be in (0, 1), got {}", stop_loss)));
            }
        }

        let mut total_quantity = 0.0;
        for target in &self.take_profits {
            if target.delta_percentage <= 0.0 {
                return Err(invalid(SECTION, "take profit delta_percentage must be positive"));
            }
            if !(target.quantity_percentage > 0.0 && target.quantity_percentage <= 1.0) {
                return Err(invalid(SECTION, "take profit quantity_percentage must be in (0, 1]"));
            }
            total_quantity += target.quantity_percentage;
        }
        if total_quantity > 1.0 + 1e-9 {
            return Err(invalid(
                SECTION,
                format!("take profit quantities sum to {} (more than the whole position)", total_quantity),
            ));
        }

        if let Some(trailing) = &self.trailing_stop {
            if !(trailing.callback_rate > 0.0 && trailing.callback_rate < 1.0) {
                return Err(invalid(SECTION, "callback_rate must be in (0, 1)"));
            }
            match trailing.activation_rule()? {
                ActivationRule::ChangePercentage(change) => {
                    if change < 0.0 {
                        return Err(invalid(SECTION, "change_percentage must not be negative"));
                    }
                }
                ActivationRule::PercentageToTarget(share) => {
                    check_unit(SECTION, "percentage_to_tp", share)?;
                    if self.take_profits.is_empty() {
                        return Err(invalid(SECTION, "percentage_to_tp needs at least one take profit"));
                    }
                    // A short can only reach targets below +100%
                    if self.take_profits.iter().all(|t| t.delta_percentage >= 1.0) {
                        return Err(invalid(
                            SECTION,
                            "percentage_to_tp needs a take profit a short can reach (delta_percentage < 1)",
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_both_activations_rejected() {
        let config = ExitStrategyConfig {
            stop_loss: None,
            take_profits: vec![ProfitTarget { delta_percentage: 0.05, quantity_percentage: 1.0 }],
            trailing_stop: Some(TrailingStopConfig {
                callback_rate: 0.1,
                change_percentage: Some(0.02),
                percentage_to_tp: Some(0.5),
            }),
        };
        assert!(matches!(config.validate(), Err(EvotraderError::Configuration(_))));
    }

    #[test]
    fn test_trailing_target_unreachable_for_shorts() {
        let mut config = ExitStrategyConfig {
            stop_loss: Some(0.05),
            take_profits: vec![ProfitTarget { delta_percentage: 1.0, quantity_percentage: 1.0 }],
            trailing_stop: Some(TrailingStopConfig {
                callback_rate: 0.1,
                change_percentage: None,
                percentage_to_tp: Some(0.5),
            }),
        };
        assert!(matches!(config.validate(), Err(EvotraderError::Configuration(_))));

        config.take_profits.insert(0, ProfitTarget { delta_percentage: 0.3, quantity_percentage: 0.5 });
        config.take_profits[1].quantity_percentage = 0.5;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_ladder_over_full_size_rejected() {
        let config = ExitStrategyConfig {
            stop_loss: Some(0.01),
            take_profits: vec![
                ProfitTarget { delta_percentage: 0.01, quantity_percentage: 0.7 },
                ProfitTarget { delta_percentage: 0.02, quantity_percentage: 0.7 },
            ],
            trailing_stop: None,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sizing_bounds() {
        assert!(SizingPolicy::RiskBased { risk: 0.0 }.validate().is_err());
        assert!(SizingPolicy::FixedPercentage { allocation: 0.02 }.validate().is_ok());
    }
}
