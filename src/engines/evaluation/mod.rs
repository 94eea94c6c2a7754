pub mod backtester;
pub mod evaluator;
pub mod exits;
pub mod fitness;
pub mod orders;
pub mod signal;
pub mod sizing;
pub mod wallet;

pub use backtester::{BacktestOutcome, Trader, TraderState};
pub use evaluator::BacktestEvaluator;
pub use fitness::{CompositeFitness, FitnessFunction, FitnessInput, WORST_FITNESS};
pub use orders::{OpenOrder, OrderBook, OrderId, OrderKind, TrailingStatus, TrailingStop};
pub use signal::{GenomeSignal, MarketState, RuleSignal, SignalSource};
pub use sizing::position_size;
pub use wallet::{Position, Settlement, Wallet};
