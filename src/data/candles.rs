use crate::error::{EvotraderError, Result};
use crate::types::Candle;
use std::ops::Deref;

/// Time-ordered candles that passed integrity checks
///
/// Construction is the only validation point; once built the series is immutable
/// and can be shared between backtests behind an `Arc`.
#[derive(Debug, Clone, PartialEq)]
pub struct CandleSeries {
    candles: Vec<Candle>,
}

impl CandleSeries {
    pub fn new(candles: Vec<Candle>) -> Result<Self> {
        validate_candles(&candles)?;
        Ok(Self { candles })
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    /// The `lookback` candles ending at `index` (inclusive)
    pub fn window(&self, index: usize, lookback: usize) -> &[Candle] {
        let end = (index + 1).min(self.candles.len());
        let start = end.saturating_sub(lookback);
        &self.candles[start..end]
    }

    pub fn into_inner(self) -> Vec<Candle> {
        self.candles
    }
}

impl Deref for CandleSeries {
    type Target = [Candle];

    fn deref(&self) -> &[Candle] {
        &self.candles
    }
}

/// Rejects non-finite prices, inverted ranges and timestamps that do not strictly increase
pub fn validate_candles(candles: &[Candle]) -> Result<()> {
    for (i, candle) in candles.iter().enumerate() {
        let values = [candle.open, candle.high, candle.low, candle.close, candle.volume];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(EvotraderError::DataIntegrity(format!(
                "Candle {} at {} has a non-finite value",
                i, candle.open_time
            )));
        }
        if candle.low <= 0.0 {
            return Err(EvotraderError::DataIntegrity(format!(
                "Candle {} at {} has a non-positive low {}",
                i, candle.open_time, candle.low
            )));
        }
        if candle.high < candle.low
            || candle.high < candle.open.max(candle.close)
            || candle.low > candle.open.min(candle.close)
        {
            return Err(EvotraderError::DataIntegrity(format!(
                "Candle {} at {} has inconsistent OHLC values",
                i, candle.open_time
            )));
        }
        if i > 0 && candle.open_time <= candles[i - 1].open_time {
            return Err(EvotraderError::DataIntegrity(format!(
                "Candle {} at {} does not come after {}",
                i,
                candle.open_time,
                candles[i - 1].open_time
            )));
        }
    }
    Ok(())
}
