use crate::data::CandleSeries;
use crate::error::Result;
use crate::types::CandleInterval;
use chrono::{DateTime, Utc};

/// Source of historical candles
///
/// Implementations must return the candles whose open time falls in `[start, end)`
/// and fail when the range is empty or only partially covered, rather than
/// returning whatever happens to be available.
pub trait CandleLoader: Send + Sync {
    fn load_candles(
        &self,
        pair: &str,
        interval: CandleInterval,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<CandleSeries>;
}
