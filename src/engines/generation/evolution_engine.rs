use crate::config::{ConfigSection, EvolutionConfig};
use crate::engines::evaluation::WORST_FITNESS;
use crate::engines::generation::{
    genome::Genome,
    innovation::InnovationTracker,
    operators::{crossover, mutate, roulette_selection},
    progress::{EventSink, TrainingEvent},
    species::{speciate, Species, SpeciesId},
};
use crate::engines::metrics::StrategyReport;
use crate::error::{EvotraderError, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use rayon::ThreadPool;

/// Score of one genome
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub fitness: f64,
    pub report: Option<StrategyReport>,
}

/// Scores genomes; called from several threads at once
pub trait FitnessEvaluator: Sync {
    fn evaluate(&self, genome: &Genome) -> Result<Evaluation>;
}

/// Outcome of evaluating one generation
#[derive(Debug, Clone)]
pub struct GenerationSummary {
    pub generation: usize,
    pub best_index: usize,
    pub best_fitness: f64,
    pub best_report: Option<StrategyReport>,
    pub failures: usize,
}

/// Maps raw scores into `[0, 1]` without reversing their order: finite values
/// land in `[0.01, 1]`, `+inf` at 1, NaN and `-inf` at 0. Equal scores all map to 1.
pub fn normalize_fitness(raw: &[f64]) -> Vec<f64> {
    let finite = raw.iter().copied().filter(|f| f.is_finite());
    let (min, max) = finite.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), f| (lo.min(f), hi.max(f)));

    let span = max - min;
    raw.iter()
        .map(|&f| {
            if f == f64::INFINITY {
                1.0
            } else if !f.is_finite() {
                0.0
            } else if span == 0.0 {
                1.0
            } else {
                0.01 + 0.99 * (f - min) / span
            }
        })
        .collect()
}

fn rank_key(fitness: f64) -> f64 {
    if fitness.is_nan() {
        f64::NEG_INFINITY
    } else {
        fitness
    }
}

/// Indices sorted best first; ties keep population order
fn ranked(fitness: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..fitness.len()).collect();
    order.sort_by(|&a, &b| {
        rank_key(fitness[b])
            .total_cmp(&rank_key(fitness[a]))
            .then(a.cmp(&b))
    });
    order
}

/// Splits `slots` proportionally to `shares` with largest remainder rounding
fn allocate(shares: &[f64], slots: usize) -> Vec<usize> {
    if shares.is_empty() {
        return Vec::new();
    }
    let weights: Vec<f64> = shares
        .iter()
        .map(|&s| if s.is_finite() && s > 0.0 { s } else { 0.0 })
        .collect();
    let total: f64 = weights.iter().sum();
    let exact: Vec<f64> = if total > 0.0 {
        weights.iter().map(|w| w / total * slots as f64).collect()
    } else {
        vec![slots as f64 / shares.len() as f64; shares.len()]
    };

    let mut quotas: Vec<usize> = exact.iter().map(|e| e.floor() as usize).collect();
    let assigned: usize = quotas.iter().sum();
    let mut by_remainder: Vec<usize> = (0..exact.len()).collect();
    by_remainder.sort_by(|&a, &b| {
        let (ra, rb) = (exact[a] - exact[a].floor(), exact[b] - exact[b].floor());
        rb.total_cmp(&ra).then(a.cmp(&b))
    });
    for &i in by_remainder.iter().cycle().take(slots.saturating_sub(assigned)) {
        quotas[i] += 1;
    }
    quotas
}

/// NEAT population manager
pub struct EvolutionEngine {
    config: EvolutionConfig,
    inputs: usize,
    outputs: usize,
    population: Vec<Genome>,
    species: Vec<Species>,
    next_species_id: SpeciesId,
    tracker: InnovationTracker,
    rng: StdRng,
    generation: usize,
    pool: Option<ThreadPool>,
    /// Species already match the current population
    speciated: bool,
}

impl EvolutionEngine {
    /// Starts from minimal genomes wiring every input to every output
    pub fn new(config: EvolutionConfig, inputs: usize, outputs: usize) -> Result<Self> {
        config.validate()?;
        if inputs == 0 || outputs == 0 {
            return Err(EvotraderError::Generation(format!(
                "A network needs inputs and outputs, got {} and {}",
                inputs, outputs
            )));
        }

        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let pool = if config.workers > 0 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(config.workers)
                .build()
                .map_err(|e| EvotraderError::Generation(format!("Cannot start evaluation pool: {}", e)))?;
            Some(pool)
        } else {
            None
        };

        let mut tracker = InnovationTracker::new();
        let population = (0..config.population_size)
            .map(|_| Genome::minimal(inputs, outputs, &mut tracker, &mut rng))
            .collect();

        Ok(Self {
            config,
            inputs,
            outputs,
            population,
            species: Vec::new(),
            next_species_id: 0,
            tracker,
            rng,
            generation: 0,
            pool,
            speciated: false,
        })
    }

    /// Replaces the population with one unchanged copy of `genome` and mutated clones
    pub fn seed_from(&mut self, genome: &Genome) -> Result<()> {
        genome.validate()?;
        if genome.input_count() != self.inputs || genome.output_count() != self.outputs {
            return Err(EvotraderError::Generation(format!(
                "Saved genome has {} inputs and {} outputs, expected {} and {}",
                genome.input_count(),
                genome.output_count(),
                self.inputs,
                self.outputs
            )));
        }

        self.tracker.absorb(genome);
        let mut seed = genome.clone();
        seed.fitness = 0.0;
        seed.species = None;

        let mut population = Vec::with_capacity(self.config.population_size);
        population.push(seed.clone());
        while population.len() < self.config.population_size {
            let mut child = seed.clone();
            mutate(&mut child, &mut self.tracker, &self.config, &mut self.rng);
            population.push(child);
        }
        self.population = population;
        self.species.clear();
        self.speciated = false;
        log::info!("Seeded population from a saved genome");
        Ok(())
    }

    pub fn config(&self) -> &EvolutionConfig {
        &self.config
    }

    pub fn population(&self) -> &[Genome] {
        &self.population
    }

    pub fn population_mut(&mut self) -> &mut [Genome] {
        self.speciated = false;
        &mut self.population
    }

    pub fn species(&self) -> &[Species] {
        &self.species
    }

    pub fn generation(&self) -> usize {
        self.generation
    }

    pub fn input_count(&self) -> usize {
        self.inputs
    }

    /// Highest scoring genome of the current population
    pub fn best(&self) -> Option<&Genome> {
        let fitness: Vec<f64> = self.population.iter().map(|g| g.fitness).collect();
        ranked(&fitness).first().map(|&i| &self.population[i])
    }

    /// Scores every genome in parallel and groups the population into species.
    /// A failed evaluation, or one scoring NaN or infinity, gets the worst
    /// fitness and never aborts the generation.
    pub fn evaluate<E: FitnessEvaluator>(&mut self, evaluator: &E, sink: &dyn EventSink) -> GenerationSummary {
        let generation = self.generation;
        sink.emit(&TrainingEvent::GenerationStarted { generation });

        let population = &self.population;
        let results: Vec<Result<Evaluation>> = match &self.pool {
            Some(pool) => pool.install(|| population.par_iter().map(|g| evaluator.evaluate(g)).collect()),
            None => population.par_iter().map(|g| evaluator.evaluate(g)).collect(),
        };

        let total = self.population.len();
        let mut reports = Vec::with_capacity(total);
        let mut failures = 0;
        for (index, (genome, result)) in self.population.iter_mut().zip(results).enumerate() {
            let result = result.and_then(|evaluation| {
                if evaluation.fitness.is_finite() {
                    Ok(evaluation)
                } else {
                    Err(EvotraderError::NumericDegeneracy(format!(
                        "fitness {} is not a finite number",
                        evaluation.fitness
                    )))
                }
            });
            match result {
                Ok(evaluation) => {
                    genome.fitness = evaluation.fitness;
                    sink.emit(&TrainingEvent::GenomeEvaluated {
                        generation,
                        index,
                        total,
                        fitness: genome.fitness,
                    });
                    reports.push(evaluation.report);
                }
                Err(e) => {
                    genome.fitness = WORST_FITNESS;
                    failures += 1;
                    sink.emit(&TrainingEvent::GenomeFailed {
                        generation,
                        index,
                        error: e.to_string(),
                    });
                    reports.push(None);
                }
            }
        }

        let fitness: Vec<f64> = self.population.iter().map(|g| g.fitness).collect();
        let best_index = ranked(&fitness).first().copied().unwrap_or(0);
        let best_fitness = fitness.get(best_index).copied().unwrap_or(WORST_FITNESS);

        self.assign_species();
        sink.emit(&TrainingEvent::GenerationCompleted {
            generation,
            best_fitness,
            species: self.species.len(),
            failures,
        });

        GenerationSummary {
            generation,
            best_index,
            best_fitness,
            best_report: reports.get_mut(best_index).and_then(Option::take),
            failures,
        }
    }

    /// Replaces the population with the next generation, using the fitness
    /// set by the last `evaluate`.
    pub fn generate(&mut self) {
        let size = self.config.population_size;
        let raw: Vec<f64> = self.population.iter().map(|g| g.fitness).collect();
        let normalized = normalize_fitness(&raw);
        if !self.speciated {
            self.assign_species();
        }

        let order = ranked(&raw);
        let mut next: Vec<Genome> = order
            .iter()
            .take(self.config.elitism)
            .map(|&i| self.population[i].clone())
            .collect();

        let shares: Vec<f64> = self.species.iter().map(|s| s.shared_fitness(&normalized)).collect();
        let quotas = allocate(&shares, size.saturating_sub(next.len()));

        // Survivors of each species, best first, weighted by normalized fitness
        let keep_share = 1.0 - self.config.elimination_fraction;
        let plans: Vec<(Vec<(usize, f64)>, usize)> = self
            .species
            .iter()
            .zip(quotas)
            .filter(|(_, quota)| *quota > 0)
            .map(|(s, quota)| {
                let mut members = s.members.clone();
                members.sort_by(|&a, &b| rank_key(raw[b]).total_cmp(&rank_key(raw[a])).then(a.cmp(&b)));
                let keep = ((members.len() as f64 * keep_share).ceil() as usize).max(1);
                members.truncate(keep);
                (members.into_iter().map(|i| (i, normalized[i])).collect(), quota)
            })
            .collect();

        for (candidates, quota) in &plans {
            for _ in 0..*quota {
                next.push(self.offspring(candidates));
            }
        }

        // Only reachable when speciation produced nothing
        if next.len() < size {
            let everyone: Vec<(usize, f64)> = order.iter().map(|&i| (i, normalized[i])).collect();
            while next.len() < size {
                next.push(self.offspring(&everyone));
            }
        }
        next.truncate(size);

        log::debug!(
            "Generation {} -> {}: {} species, {} innovations",
            self.generation + 1,
            self.generation + 2,
            self.species.len(),
            self.tracker.innovation_count()
        );
        self.population = next;
        self.speciated = false;
        self.generation += 1;
    }

    fn assign_species(&mut self) {
        speciate(
            &mut self.population,
            &mut self.species,
            &mut self.next_species_id,
            &self.config,
            &mut self.rng,
        );
        self.speciated = true;
    }

    fn offspring(&mut self, candidates: &[(usize, f64)]) -> Genome {
        let first = roulette_selection(candidates, &mut self.rng);
        let mut child = if candidates.len() > 1 && self.rng.gen::<f64>() < self.config.crossover_rate {
            let second = roulette_selection(candidates, &mut self.rng);
            crossover(&self.population[first], &self.population[second], &mut self.rng)
        } else {
            self.population[first].clone()
        };
        mutate(&mut child, &mut self.tracker, &self.config, &mut self.rng);
        child.fitness = 0.0;
        child.species = None;
        child
    }
}
