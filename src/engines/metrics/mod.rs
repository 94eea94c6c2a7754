pub mod report;
pub mod risk;
pub mod stats;

pub use report::StrategyReport;
pub use risk::RiskMetrics;
pub use stats::StrategyStats;
