pub mod evolution_engine;
pub mod genome;
pub mod innovation;
pub mod network;
pub mod operators;
pub mod progress;
pub mod species;

pub use evolution_engine::{
    normalize_fitness, Evaluation, EvolutionEngine, FitnessEvaluator, GenerationSummary,
};
pub use genome::{ConnectionGene, Genome, NodeGene, NodeId, NodeRole};
pub use innovation::InnovationTracker;
pub use network::Network;
pub use progress::{ChannelEventSink, EventSink, LogEventSink, NullEventSink, TrainingEvent};
pub use species::{Species, SpeciesId};
