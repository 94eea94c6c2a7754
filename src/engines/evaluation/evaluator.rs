use super::backtester::{BacktestOutcome, Trader};
use super::fitness::FitnessFunction;
use super::signal::GenomeSignal;
use crate::config::{ConfigSection, EvolutionConfig, TradeConfig};
use crate::data::CandleSeries;
use crate::engines::generation::{Evaluation, FitnessEvaluator, Genome};
use crate::error::Result;
use std::sync::Arc;

/// Scores genomes by trading them over a shared candle series
#[derive(Clone)]
pub struct BacktestEvaluator {
    candles: Arc<CandleSeries>,
    trade: Arc<TradeConfig>,
    fitness: Arc<dyn FitnessFunction>,
    lookback: usize,
    threshold: f64,
}

impl BacktestEvaluator {
    /// Rejects a contradictory trade config up front rather than per genome
    pub fn new(
        candles: Arc<CandleSeries>,
        trade: Arc<TradeConfig>,
        fitness: Arc<dyn FitnessFunction>,
        evolution: &EvolutionConfig,
    ) -> Result<Self> {
        trade.validate()?;
        Ok(Self {
            candles,
            trade,
            fitness,
            lookback: evolution.lookback,
            threshold: evolution.decision_threshold,
        })
    }

    /// Same evaluator over another series, e.g. the held-out test range
    pub fn with_candles(&self, candles: Arc<CandleSeries>) -> Self {
        Self {
            candles,
            ..self.clone()
        }
    }

    pub fn input_count(&self) -> usize {
        GenomeSignal::input_count(self.lookback)
    }

    /// Full backtest of one genome
    pub fn backtest(&self, genome: &Genome) -> Result<BacktestOutcome> {
        let signal = GenomeSignal::new(genome, self.lookback, self.threshold)?;
        let trader = Trader::new(Arc::clone(&self.trade), Box::new(signal), Arc::clone(&self.fitness))?;
        trader.run(&self.candles)
    }
}

impl FitnessEvaluator for BacktestEvaluator {
    fn evaluate(&self, genome: &Genome) -> Result<Evaluation> {
        let outcome = self.backtest(genome)?;
        Ok(Evaluation {
            fitness: outcome.fitness,
            report: Some(outcome.report),
        })
    }
}
