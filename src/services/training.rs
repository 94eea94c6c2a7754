use super::save_manager::SaveManager;
use crate::engines::generation::{
    Evaluation, EventSink, EvolutionEngine, FitnessEvaluator, Genome, TrainingEvent,
};
use crate::engines::metrics::StrategyReport;
use crate::error::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Background writer; saves run in submission order so the newest best lands last
struct Saver {
    queue: Sender<(Genome, usize)>,
    worker: JoinHandle<usize>,
}

/// All-time high score of a run
#[derive(Debug, Clone)]
pub struct BestGenome {
    pub genome: Genome,
    pub fitness: f64,
    pub generation: usize,
    pub report: Option<StrategyReport>,
}

#[derive(Debug, Clone)]
pub struct TrainingSummary {
    pub generations_run: usize,
    pub best: Option<BestGenome>,
    pub stopped_early: bool,
    pub save_failures: usize,
}

/// Drives the engine generation by generation, keeping and persisting the best genome
pub struct TrainingLoop<E: FitnessEvaluator> {
    engine: EvolutionEngine,
    evaluator: E,
    save_manager: Arc<dyn SaveManager>,
    sink: Arc<dyn EventSink>,
    generations: usize,
    best: Option<BestGenome>,
    stop: Arc<AtomicBool>,
    saver: Option<Saver>,
}

impl<E: FitnessEvaluator> TrainingLoop<E> {
    pub fn new(
        engine: EvolutionEngine,
        evaluator: E,
        save_manager: Arc<dyn SaveManager>,
        sink: Arc<dyn EventSink>,
        generations: usize,
    ) -> Self {
        Self {
            engine,
            evaluator,
            save_manager,
            sink,
            generations,
            best: None,
            stop: Arc::new(AtomicBool::new(false)),
            saver: None,
        }
    }

    /// Seeds the engine from the saved genome, if there is one
    pub fn load_saved(&mut self) -> Result<bool> {
        match self.save_manager.load()? {
            Some(genome) => {
                self.engine.seed_from(&genome)?;
                Ok(true)
            }
            None => {
                log::info!("No saved genome, starting from a minimal population");
                Ok(false)
            }
        }
    }

    /// Raising the flag ends training at the next generation boundary
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn engine(&self) -> &EvolutionEngine {
        &self.engine
    }

    pub fn best(&self) -> Option<&BestGenome> {
        self.best.as_ref()
    }

    pub fn run(&mut self) -> TrainingSummary {
        let mut generations_run = 0;
        let mut stopped_early = false;

        for _ in 0..self.generations {
            if self.stop.load(Ordering::Relaxed) {
                log::info!("Stop requested, ending training");
                stopped_early = true;
                break;
            }

            let summary = self.engine.evaluate(&self.evaluator, self.sink.as_ref());
            generations_run += 1;

            let improved = summary.best_fitness.is_finite()
                && self
                    .best
                    .as_ref()
                    .map_or(true, |best| summary.best_fitness > best.fitness);
            if improved {
                let genome = self.engine.population()[summary.best_index].clone();
                self.sink.emit(&TrainingEvent::NewBest {
                    generation: summary.generation,
                    fitness: summary.best_fitness,
                    report: summary.best_report.clone().map(Box::new),
                });
                self.save_in_background(genome.clone(), summary.generation);
                self.best = Some(BestGenome {
                    genome,
                    fitness: summary.best_fitness,
                    generation: summary.generation,
                    report: summary.best_report,
                });
            }

            self.engine.generate();
        }

        let save_failures = match self.saver.take() {
            Some(Saver { queue, worker }) => {
                drop(queue);
                worker.join().unwrap_or_else(|_| {
                    log::error!("Save thread panicked");
                    1
                })
            }
            None => 0,
        };
        if save_failures > 0 {
            log::warn!("{} background saves failed", save_failures);
        }

        TrainingSummary {
            generations_run,
            best: self.best.clone(),
            stopped_early,
            save_failures,
        }
    }

    fn save_in_background(&mut self, genome: Genome, generation: usize) {
        let saver = self.saver.get_or_insert_with(|| {
            let (queue, pending) = channel::<(Genome, usize)>();
            let save_manager = Arc::clone(&self.save_manager);
            let sink = Arc::clone(&self.sink);
            let worker = std::thread::spawn(move || {
                let mut failures = 0;
                for (genome, generation) in pending {
                    match save_manager.save(&genome) {
                        Ok(()) => sink.emit(&TrainingEvent::GenomeSaved { generation }),
                        Err(e) => {
                            failures += 1;
                            sink.emit(&TrainingEvent::SaveFailed {
                                generation,
                                error: e.to_string(),
                            });
                        }
                    }
                }
                failures
            });
            Saver { queue, worker }
        });

        if saver.queue.send((genome, generation)).is_err() {
            log::warn!("Save thread is gone, generation {} not saved", generation + 1);
        }
    }

    /// Replays the all-time best with another evaluator, e.g. on held-out data
    pub fn evaluate_best<T: FitnessEvaluator>(&self, evaluator: &T) -> Option<Result<Evaluation>> {
        let best = self.best.as_ref()?;
        let result = evaluator.evaluate(&best.genome);
        if let Ok(evaluation) = &result {
            self.sink.emit(&TrainingEvent::TestEvaluated {
                fitness: evaluation.fitness,
                report: evaluation.report.clone().map(Box::new),
            });
        }
        Some(result)
    }
}
