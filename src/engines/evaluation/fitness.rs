use crate::config::FitnessConfig;
use crate::engines::metrics::{StrategyReport, StrategyStats};

/// Score of a genome whose evaluation failed
pub const WORST_FITNESS: f64 = f64::NEG_INFINITY;

/// Summary of a finished backtest that fitness functions score
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FitnessInput {
    /// Net profit over initial capital
    pub roi: f64,
    /// Fraction of peak equity
    pub max_relative_drawdown: f64,
    pub total_trades: usize,
    /// Percent
    pub win_rate: f64,
    pub profit_factor: f64,
}

impl FitnessInput {
    pub fn from_report(report: &StrategyReport, stats: &StrategyStats) -> Self {
        Self {
            roi: report.roi(),
            max_relative_drawdown: stats.max_relative_drawdown,
            total_trades: stats.total_trades,
            win_rate: stats.win_rate(),
            profit_factor: stats.profit_factor(),
        }
    }
}

pub trait FitnessFunction: Send + Sync {
    fn score(&self, input: &FitnessInput) -> f64;
}

impl<F> FitnessFunction for F
where
    F: Fn(&FitnessInput) -> f64 + Send + Sync,
{
    fn score(&self, input: &FitnessInput) -> f64 {
        self(input)
    }
}

/// Weighted return minus drawdown, penalizing strategies that barely trade
#[derive(Debug, Clone)]
pub struct CompositeFitness {
    config: FitnessConfig,
}

impl CompositeFitness {
    pub fn new(config: FitnessConfig) -> Self {
        Self { config }
    }
}

impl Default for CompositeFitness {
    fn default() -> Self {
        Self::new(FitnessConfig::default())
    }
}

impl FitnessFunction for CompositeFitness {
    fn score(&self, input: &FitnessInput) -> f64 {
        let shortfall = if self.config.min_trades > 0 && input.total_trades < self.config.min_trades {
            (self.config.min_trades - input.total_trades) as f64 / self.config.min_trades as f64
        } else {
            0.0
        };

        self.config.return_weight * input.roi
            - self.config.drawdown_weight * input.max_relative_drawdown
            - self.config.trade_penalty * shortfall
    }
}

/// Scores `input`, mapping NaN and infinities to 0
pub fn sanitized_score(function: &dyn FitnessFunction, input: &FitnessInput) -> f64 {
    let score = function.score(input);
    if score.is_finite() {
        score
    } else {
        log::trace!("Fitness {} is not finite; using 0", score);
        0.0
    }
}
