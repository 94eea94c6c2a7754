use super::stats::StrategyStats;
use serde::{Deserialize, Serialize};

/// Summary consumed by downstream report tooling
///
/// Field names are serialized in camelCase and must stay exactly as they are.
/// Every value is derived from [`StrategyStats`] plus the capital figures.
/// @see: https://www.metatrader5.com/en/terminal/help/algotrading/testing_report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyReport {
    pub test_period: Option<String>,
    pub initial_capital: f64,
    pub final_capital: f64,
    pub number_symbol: usize,
    pub total_net_profit: f64,
    pub total_fees: f64,
    pub total_bars: usize,
    pub total_trades: usize,
    pub total_long_trades: usize,
    pub total_short_trades: usize,
    pub profit_factor: f64,
    pub total_profit: f64,
    pub total_loss: f64,
    pub max_absolute_drawdown: f64,
    pub max_relative_drawdown: f64,
    pub total_win_rate: f64,
    pub long_win_rate: f64,
    pub short_win_rate: f64,
    pub long_winning_trade: usize,
    pub long_lost_trade: usize,
    pub short_winning_trade: usize,
    pub short_lost_trade: usize,
    pub avg_profit: f64,
    pub avg_loss: f64,
    pub max_profit: f64,
    pub max_loss: f64,
    pub max_consecutive_profit: f64,
    pub max_consecutive_loss: f64,
    pub max_consecutive_wins_count: usize,
    pub max_consecutive_losses_count: usize,
}

impl StrategyReport {
    pub fn from_stats(
        stats: &StrategyStats,
        initial_capital: f64,
        final_capital: f64,
        test_period: Option<String>,
    ) -> Self {
        Self {
            test_period,
            initial_capital,
            final_capital,
            number_symbol: 1,
            total_net_profit: final_capital - initial_capital,
            total_fees: stats.total_fees,
            total_bars: stats.total_bars,
            total_trades: stats.total_trades,
            total_long_trades: stats.total_long_trades(),
            total_short_trades: stats.total_short_trades(),
            profit_factor: stats.profit_factor(),
            total_profit: stats.total_profit,
            total_loss: stats.total_loss,
            max_absolute_drawdown: stats.max_absolute_drawdown,
            max_relative_drawdown: stats.max_relative_drawdown,
            total_win_rate: stats.win_rate(),
            long_win_rate: stats.long_win_rate(),
            short_win_rate: stats.short_win_rate(),
            long_winning_trade: stats.long_winning_trades,
            long_lost_trade: stats.long_lost_trades,
            short_winning_trade: stats.short_winning_trades,
            short_lost_trade: stats.short_lost_trades,
            avg_profit: stats.avg_profit(),
            avg_loss: stats.avg_loss(),
            max_profit: stats.max_profit,
            max_loss: stats.max_loss,
            max_consecutive_profit: stats.max_consecutive_profit,
            max_consecutive_loss: stats.max_consecutive_loss,
            max_consecutive_wins_count: stats.max_consecutive_wins_count,
            max_consecutive_losses_count: stats.max_consecutive_losses_count,
        }
    }

    /// Return on investment as a fraction of the initial capital
    pub fn roi(&self) -> f64 {
        crate::error::ratio(self.total_net_profit, self.initial_capital)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PositionSide;

    #[test]
    fn test_field_names_are_camel_case() {
        let mut stats = StrategyStats::new();
        stats.record_trade(PositionSide::Short, 4.0, 1.0);
        let report = StrategyReport::from_stats(&stats, 1000.0, 1004.0, None);
        let json = serde_json::to_value(&report).unwrap();

        for field in [
            "testPeriod",
            "initialCapital",
            "finalCapital",
            "numberSymbol",
            "totalNetProfit",
            "totalFees",
            "totalBars",
            "totalTrades",
            "totalLongTrades",
            "totalShortTrades",
            "profitFactor",
            "totalProfit",
            "totalLoss",
            "maxAbsoluteDrawdown",
            "maxRelativeDrawdown",
            "totalWinRate",
            "longWinRate",
            "shortWinRate",
            "longWinningTrade",
            "longLostTrade",
            "shortWinningTrade",
            "shortLostTrade",
            "avgProfit",
            "avgLoss",
            "maxProfit",
            "maxLoss",
            "maxConsecutiveProfit",
            "maxConsecutiveLoss",
            "maxConsecutiveWinsCount",
            "maxConsecutiveLossesCount",
        ] {
            assert!(json.get(field).is_some(), "missing {}", field);
        }
        assert_eq!(json["shortWinningTrade"], 1);
        assert_eq!(json["shortWinRate"], 100.0);
    }

    #[test]
    fn test_roi() {
        let report = StrategyReport::from_stats(&StrategyStats::new(), 1000.0, 1100.0, None);
        assert!((report.roi() - 0.1).abs() < 1e-12);
        assert_eq!(report.total_win_rate, 0.0);
    }
}
