pub mod save_manager;
pub mod training;

pub use save_manager::{JsonSaveManager, SaveManager};
pub use training::{BestGenome, TrainingLoop, TrainingSummary};
