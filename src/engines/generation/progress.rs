use crate::engines::metrics::StrategyReport;
use std::sync::mpsc::Sender;

/// Progress of a training run
#[derive(Debug, Clone)]
pub enum TrainingEvent {
    GenerationStarted {
        generation: usize,
    },
    GenomeEvaluated {
        generation: usize,
        index: usize,
        total: usize,
        fitness: f64,
    },
    GenomeFailed {
        generation: usize,
        index: usize,
        error: String,
    },
    GenerationCompleted {
        generation: usize,
        best_fitness: f64,
        species: usize,
        failures: usize,
    },
    /// A genome beat the all-time high score
    NewBest {
        generation: usize,
        fitness: f64,
        report: Option<Box<StrategyReport>>,
    },
    GenomeSaved {
        generation: usize,
    },
    SaveFailed {
        generation: usize,
        error: String,
    },
    /// The all-time best replayed on the held-out series
    TestEvaluated {
        fitness: f64,
        report: Option<Box<StrategyReport>>,
    },
}

/// Receives training events; must never block the caller for long
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &TrainingEvent);
}

/// Writes events through the `log` facade
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn emit(&self, event: &TrainingEvent) {
        match event {
            TrainingEvent::GenerationStarted { generation } => {
                log::info!("Generation {} starting...", generation + 1)
            }
            TrainingEvent::GenomeEvaluated { index, total, .. } => {
                if (index + 1) % 10 == 0 || index + 1 == *total {
                    log::debug!("  Evaluated {}/{} genomes", index + 1, total);
                }
            }
            TrainingEvent::GenomeFailed { index, error, .. } => {
                log::warn!("  Genome {} failed: {}", index, error)
            }
            TrainingEvent::GenerationCompleted {
                generation,
                best_fitness,
                species,
                failures,
            } => log::info!(
                "Generation {} complete. Best fitness: {:.4}, species: {}, failures: {}",
                generation + 1,
                best_fitness,
                species,
                failures
            ),
            TrainingEvent::NewBest {
                generation,
                fitness,
                report,
            } => {
                log::info!("New all-time best in generation {}: {:.4}", generation + 1, fitness);
                if let Some(report) = report {
                    log::info!(
                        "  Net profit {:.2}, trades {}, win rate {:.1}%, profit factor {:.2}, max drawdown {:.1}%",
                        report.total_net_profit,
                        report.total_trades,
                        report.total_win_rate,
                        report.profit_factor,
                        report.max_relative_drawdown * 100.0
                    );
                }
            }
            TrainingEvent::GenomeSaved { generation } => {
                log::debug!("Saved best genome of generation {}", generation + 1)
            }
            TrainingEvent::SaveFailed { generation, error } => {
                log::warn!("Saving best genome of generation {} failed: {}", generation + 1, error)
            }
            TrainingEvent::TestEvaluated { fitness, report } => {
                log::info!("Out-of-sample fitness: {:.4}", fitness);
                if let Some(report) = report {
                    log::info!(
                        "  Net profit {:.2} over {} trades ({})",
                        report.total_net_profit,
                        report.total_trades,
                        report.test_period.as_deref().unwrap_or("unknown period")
                    );
                }
            }
        }
    }
}

/// Forwards events over a channel, e.g. to a UI thread
pub struct ChannelEventSink {
    sender: Sender<TrainingEvent>,
}

impl ChannelEventSink {
    pub fn new(sender: Sender<TrainingEvent>) -> Self {
        Self { sender }
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: &TrainingEvent) {
        // A closed receiver just means nobody is listening anymore
        let _ = self.sender.send(event.clone());
    }
}

/// Discards everything
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: &TrainingEvent) {}
}
