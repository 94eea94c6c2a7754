use crate::error::ratio;

/// Equity-curve statistics that do not depend on individual trades
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RiskMetrics {
    /// Largest peak-to-trough fall, as a fraction of the peak
    pub max_drawdown: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
}

impl RiskMetrics {
    pub fn calculate(equity_curve: &[f64]) -> Self {
        if equity_curve.len() < 2 {
            return Self::default();
        }

        let returns = Self::calculate_returns(equity_curve);
        let volatility = Self::std_dev(&returns);
        let avg_return = ratio(returns.iter().sum::<f64>(), returns.len() as f64);

        let downside_returns: Vec<f64> = returns.iter().filter(|&&r| r < 0.0).copied().collect();
        let downside_dev = Self::std_dev(&downside_returns);

        Self {
            max_drawdown: Self::max_drawdown(equity_curve),
            volatility,
            // risk-free rate = 0
            sharpe_ratio: ratio(avg_return, volatility),
            sortino_ratio: ratio(avg_return, downside_dev),
        }
    }

    pub fn max_drawdown(equity: &[f64]) -> f64 {
        let mut max_dd: f64 = 0.0;
        let mut peak = match equity.first() {
            Some(first) => *first,
            None => return 0.0,
        };

        for &value in equity {
            if value > peak {
                peak = value;
            }
            max_dd = max_dd.max(ratio(peak - value, peak));
        }

        max_dd
    }

    fn calculate_returns(equity: &[f64]) -> Vec<f64> {
        equity.windows(2).map(|w| ratio(w[1] - w[0], w[0])).collect()
    }

    fn std_dev(values: &[f64]) -> f64 {
        if values.is_empty() {
            return 0.0;
        }

        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let variance = values.iter().map(|&v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;

        variance.sqrt()
    }
}
