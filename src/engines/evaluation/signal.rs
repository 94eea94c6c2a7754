use crate::engines::generation::{Genome, Network};
use crate::error::{EvotraderError, Result};
use crate::types::{Candle, Decision, PositionSide};

/// What the trader knows about its own book when asking for a decision
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MarketState {
    pub position: Option<PositionSide>,
    pub unrealized_profit: f64,
    pub available_balance: f64,
}

/// Produces a decision from recent candles
pub trait SignalSource: Send {
    /// Number of candles of history `signal` expects
    fn lookback(&self) -> usize;

    fn signal(&mut self, history: &[Candle], state: &MarketState) -> Result<Decision>;
}

type Predicate = Box<dyn Fn(&[Candle]) -> bool + Send + Sync>;

/// Hand written buy/sell rules
pub struct RuleSignal {
    lookback: usize,
    buy: Predicate,
    sell: Predicate,
}

impl RuleSignal {
    pub fn new<B, S>(lookback: usize, buy: B, sell: S) -> Self
    where
        B: Fn(&[Candle]) -> bool + Send + Sync + 'static,
        S: Fn(&[Candle]) -> bool + Send + Sync + 'static,
    {
        Self {
            lookback: lookback.max(1),
            buy: Box::new(buy),
            sell: Box::new(sell),
        }
    }
}

impl SignalSource for RuleSignal {
    fn lookback(&self) -> usize {
        self.lookback
    }

    fn signal(&mut self, history: &[Candle], _state: &MarketState) -> Result<Decision> {
        Ok(match ((self.buy)(history), (self.sell)(history)) {
            (true, false) => Decision::Buy,
            (false, true) => Decision::Sell,
            _ => Decision::Hold,
        })
    }
}

/// Decisions from an evolved network with a single output
pub struct GenomeSignal {
    network: Network,
    lookback: usize,
    threshold: f64,
    inputs: Vec<f64>,
}

impl GenomeSignal {
    pub fn new(genome: &Genome, lookback: usize, threshold: f64) -> Result<Self> {
        let network = Network::from_genome(genome)?;
        if network.input_count() != Self::input_count(lookback) || network.output_count() != 1 {
            return Err(EvotraderError::Generation(format!(
                "Genome has {} inputs and {} outputs, expected {} and 1",
                network.input_count(),
                network.output_count(),
                Self::input_count(lookback)
            )));
        }
        Ok(Self {
            network,
            lookback,
            threshold,
            inputs: Vec::with_capacity(Self::input_count(lookback)),
        })
    }

    /// `lookback` returns, the last range and the position side
    pub fn input_count(lookback: usize) -> usize {
        lookback + 2
    }

    /// Fills `out` with the network inputs for `history`
    pub fn features(lookback: usize, history: &[Candle], state: &MarketState, out: &mut Vec<f64>) {
        out.clear();
        let missing = (lookback + 1).saturating_sub(history.len());
        out.extend(std::iter::repeat(0.0).take(missing.min(lookback)));
        let start = history.len().saturating_sub(lookback + 1);
        for pair in history[start..].windows(2) {
            out.push((pair[1].close / pair[0].close - 1.0) * 10.0);
        }

        let range = history
            .last()
            .map(|c| (c.high - c.low) / c.close * 10.0)
            .unwrap_or(0.0);
        out.push(range);
        out.push(match state.position {
            Some(side) => side.direction(),
            None => 0.0,
        });
    }

    pub fn decide(output: f64, threshold: f64) -> Decision {
        if output > threshold {
            Decision::Buy
        } else if output < -threshold {
            Decision::Sell
        } else {
            Decision::Hold
        }
    }
}

impl SignalSource for GenomeSignal {
    fn lookback(&self) -> usize {
        // One extra candle for the first return
        self.lookback + 1
    }

    fn signal(&mut self, history: &[Candle], state: &MarketState) -> Result<Decision> {
        Self::features(self.lookback, history, state, &mut self.inputs);
        let outputs = self.network.activate(&self.inputs)?;
        let output = outputs.first().copied().unwrap_or(0.0);
        Ok(Self::decide(output, self.threshold))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    fn candles(closes: &[f64]) -> Vec<Candle> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                open_time: DateTime::<Utc>::from_timestamp(i as i64 * 60, 0).unwrap(),
                open: close,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 1.0,
            })
            .collect()
    }

    #[test]
    fn test_rule_signal() {
        let mut signal = RuleSignal::new(
            2,
            |h: &[Candle]| h.len() == 2 && h[1].close > h[0].close,
            |h: &[Candle]| h.len() == 2 && h[1].close < h[0].close,
        );
        let state = MarketState::default();
        assert_eq!(signal.signal(&candles(&[100.0, 101.0]), &state).unwrap(), Decision::Buy);
        assert_eq!(signal.signal(&candles(&[100.0, 99.0]), &state).unwrap(), Decision::Sell);
        assert_eq!(signal.signal(&candles(&[100.0, 100.0]), &state).unwrap(), Decision::Hold);
    }

    #[test]
    fn test_features_shape() {
        let history = candles(&[100.0, 110.0, 99.0]);
        let state = MarketState {
            position: Some(PositionSide::Short),
            ..MarketState::default()
        };
        let mut out = Vec::new();
        GenomeSignal::features(2, &history, &state, &mut out);
        assert_eq!(out.len(), GenomeSignal::input_count(2));
        assert!((out[0] - 1.0).abs() < 1e-9);
        assert!((out[1] + 1.0).abs() < 1e-9);
        assert_eq!(out[3], -1.0);

        // Short history is padded at the front
        GenomeSignal::features(4, &history, &state, &mut out);
        assert_eq!(out.len(), GenomeSignal::input_count(4));
        assert_eq!(out[0], 0.0);
    }

    #[test]
    fn test_decide_threshold() {
        assert_eq!(GenomeSignal::decide(0.6, 0.5), Decision::Buy);
        assert_eq!(GenomeSignal::decide(-0.6, 0.5), Decision::Sell);
        assert_eq!(GenomeSignal::decide(0.5, 0.5), Decision::Hold);
    }
}
