use crate::error::ratio;
use crate::types::PositionSide;
use serde::{Deserialize, Serialize};

/// Running counters of one backtest
///
/// Updated once per closed trade and once per equity mark. Nothing here ever
/// decreases except through [`StrategyStats::reset`]. Losses and fees are stored as
/// positive magnitudes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyStats {
    /// Sum of gross pnl over trades that made money before fees
    pub total_profit: f64,
    /// Sum of gross pnl magnitude over trades that lost money before fees
    pub total_loss: f64,
    pub total_fees: f64,

    pub total_trades: usize,
    pub winning_trades: usize,
    pub lost_trades: usize,
    pub long_winning_trades: usize,
    pub long_lost_trades: usize,
    pub short_winning_trades: usize,
    pub short_lost_trades: usize,

    pub max_profit: f64,
    pub max_loss: f64,

    consecutive_wins: usize,
    consecutive_losses: usize,
    consecutive_profit: f64,
    consecutive_loss: f64,
    pub max_consecutive_wins_count: usize,
    pub max_consecutive_losses_count: usize,
    pub max_consecutive_profit: f64,
    pub max_consecutive_loss: f64,

    pub peak_equity: f64,
    pub max_absolute_drawdown: f64,
    pub max_relative_drawdown: f64,
    pub total_bars: usize,
}

impl StrategyStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Records one fully closed position; `pnl` is net of `fees`
    pub fn record_trade(&mut self, side: PositionSide, pnl: f64, fees: f64) {
        let gross = pnl + fees;
        if gross >= 0.0 {
            self.total_profit += gross;
        } else {
            self.total_loss += -gross;
        }
        self.total_fees += fees;
        self.total_trades += 1;

        if pnl > 0.0 {
            self.winning_trades += 1;
            match side {
                PositionSide::Long => self.long_winning_trades += 1,
                PositionSide::Short => self.short_winning_trades += 1,
            }
            self.max_profit = self.max_profit.max(pnl);

            self.consecutive_wins += 1;
            self.consecutive_profit += pnl;
            self.consecutive_losses = 0;
            self.consecutive_loss = 0.0;
            self.max_consecutive_wins_count = self.max_consecutive_wins_count.max(self.consecutive_wins);
            self.max_consecutive_profit = self.max_consecutive_profit.max(self.consecutive_profit);
        } else {
            self.lost_trades += 1;
            match side {
                PositionSide::Long => self.long_lost_trades += 1,
                PositionSide::Short => self.short_lost_trades += 1,
            }
            self.max_loss = self.max_loss.max(-pnl);

            self.consecutive_losses += 1;
            self.consecutive_loss += -pnl;
            self.consecutive_wins = 0;
            self.consecutive_profit = 0.0;
            self.max_consecutive_losses_count =
                self.max_consecutive_losses_count.max(self.consecutive_losses);
            self.max_consecutive_loss = self.max_consecutive_loss.max(self.consecutive_loss);
        }
    }

    /// Records one equity sample and updates the drawdown high-water mark
    pub fn record_equity(&mut self, equity: f64) {
        self.total_bars += 1;
        if !equity.is_finite() {
            return;
        }
        if equity > self.peak_equity {
            self.peak_equity = equity;
        }
        let drawdown = self.peak_equity - equity;
        self.max_absolute_drawdown = self.max_absolute_drawdown.max(drawdown);
        self.max_relative_drawdown = self.max_relative_drawdown.max(ratio(drawdown, self.peak_equity));
    }

    pub fn total_long_trades(&self) -> usize {
        self.long_winning_trades + self.long_lost_trades
    }

    pub fn total_short_trades(&self) -> usize {
        self.short_winning_trades + self.short_lost_trades
    }

    /// Percentage of winning trades, 0 without trades
    pub fn win_rate(&self) -> f64 {
        ratio(self.winning_trades as f64, self.total_trades as f64) * 100.0
    }

    pub fn long_win_rate(&self) -> f64 {
        ratio(self.long_winning_trades as f64, self.total_long_trades() as f64) * 100.0
    }

    pub fn short_win_rate(&self) -> f64 {
        ratio(self.short_winning_trades as f64, self.total_short_trades() as f64) * 100.0
    }

    /// Gross profit over gross loss plus fees, 0 when nothing was lost or paid
    pub fn profit_factor(&self) -> f64 {
        ratio(self.total_profit, self.total_loss + self.total_fees)
    }

    pub fn avg_profit(&self) -> f64 {
        ratio(self.total_profit, self.winning_trades as f64)
    }

    pub fn avg_loss(&self) -> f64 {
        ratio(self.total_loss, self.lost_trades as f64)
    }
}
