pub mod candles;
pub mod connectors;
pub mod loader;

pub use candles::{validate_candles, CandleSeries};
pub use connectors::CsvConnector;
pub use loader::CandleLoader;
