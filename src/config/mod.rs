pub mod traits;
pub mod trading;
pub mod trade_management;
pub mod evolution;
pub mod fitness;
pub mod training;
pub mod manager;

pub use manager::{ConfigManager, AppConfig};
pub use trading::TradeConfig;
pub use trade_management::{ExitStrategyConfig, ProfitTarget, SizingPolicy, TrailingStopConfig};
pub use evolution::EvolutionConfig;
pub use fitness::FitnessConfig;
pub use training::TrainingConfig;
pub use traits::ConfigSection;
