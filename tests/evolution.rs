use chrono::{DateTime, Utc};
use evotrader::config::{EvolutionConfig, SizingPolicy, TradeConfig};
use evotrader::data::CandleSeries;
use evotrader::engines::evaluation::{BacktestEvaluator, CompositeFitness, WORST_FITNESS};
use evotrader::engines::generation::{
    normalize_fitness, ChannelEventSink, Evaluation, EvolutionEngine, FitnessEvaluator, Genome,
    Network, NullEventSink, TrainingEvent,
};
use evotrader::services::{JsonSaveManager, SaveManager, TrainingLoop};
use evotrader::types::Candle;
use evotrader::{EvotraderError, Result};
use std::sync::mpsc;
use std::sync::Arc;

fn config(seed: u64) -> EvolutionConfig {
    EvolutionConfig {
        population_size: 4,
        elitism: 1,
        lookback: 3,
        seed: Some(seed),
        workers: 1,
        ..EvolutionConfig::default()
    }
}

/// Sine wave with a slow drift, always a valid candle
fn wave(count: usize) -> CandleSeries {
    let candles = (0..count)
        .map(|i| {
            let close = 100.0 + 5.0 * (i as f64 / 6.0).sin() + i as f64 * 0.05;
            let open = 100.0 + 5.0 * ((i as f64 - 1.0) / 6.0).sin() + (i as f64 - 1.0) * 0.05;
            Candle {
                open_time: DateTime::<Utc>::from_timestamp(1_650_000_000 + i as i64 * 300, 0).unwrap(),
                open,
                high: open.max(close) + 0.3,
                low: open.min(close) - 0.3,
                close,
                volume: 1.0,
            }
        })
        .collect();
    CandleSeries::new(candles).unwrap()
}

#[test]
fn test_same_seed_same_offspring() {
    let mut first = EvolutionEngine::new(config(7), 5, 1).unwrap();
    let mut second = EvolutionEngine::new(config(7), 5, 1).unwrap();
    assert_eq!(first.population(), second.population());

    for engine in [&mut first, &mut second] {
        for (genome, fitness) in engine.population_mut().iter_mut().zip([1.0, 2.0, 3.0, 4.0]) {
            genome.fitness = fitness;
        }
        engine.generate();
    }
    assert_eq!(first.population(), second.population());
}

#[test]
fn test_normalized_fitness_keeps_order() {
    let raw = [-3.0, 12.5, 0.0, 7.25, WORST_FITNESS];
    let normalized = normalize_fitness(&raw);
    assert!(normalized.iter().all(|f| (0.0..=1.0).contains(f)));
    assert_eq!(normalized[4], 0.0);
    for i in 0..4 {
        for j in 0..4 {
            if raw[i] < raw[j] {
                assert!(normalized[i] < normalized[j]);
            }
        }
    }
}

#[test]
fn test_offspring_stay_valid_across_generations() {
    let mut engine = EvolutionEngine::new(
        EvolutionConfig {
            population_size: 30,
            add_node_rate: 0.3,
            add_connection_rate: 0.5,
            ..config(11)
        },
        4,
        2,
    )
    .unwrap();

    for round in 0..15 {
        for (i, genome) in engine.population_mut().iter_mut().enumerate() {
            genome.fitness = ((i * 7 + round) % 13) as f64;
        }
        engine.generate();
        for genome in engine.population() {
            genome.validate().unwrap();
            let mut network = Network::from_genome(genome).unwrap();
            let outputs = network.activate(&[0.5, -0.5, 1.0, 0.0]).unwrap();
            assert_eq!(outputs.len(), 2);
            assert!(outputs.iter().all(|o| o.is_finite() && o.abs() <= 1.0));
        }
    }
    assert_eq!(engine.population().len(), 30);
}

struct Unreliable;

impl FitnessEvaluator for Unreliable {
    fn evaluate(&self, genome: &Genome) -> Result<Evaluation> {
        let weight = genome.connections()[0].weight;
        if weight > 0.5 {
            return Err(EvotraderError::Generation("network diverged".to_string()));
        }
        Ok(Evaluation {
            fitness: if weight < -0.5 { f64::NAN } else { weight },
            report: None,
        })
    }
}

#[test]
fn test_failures_do_not_abort_generation() {
    let mut engine = EvolutionEngine::new(EvolutionConfig { population_size: 25, ..config(3) }, 2, 1).unwrap();
    let (tx, rx) = mpsc::channel();
    let summary = engine.evaluate(&Unreliable, &ChannelEventSink::new(tx));

    let events: Vec<TrainingEvent> = rx.try_iter().collect();
    let failed = events
        .iter()
        .filter(|e| matches!(e, TrainingEvent::GenomeFailed { .. }))
        .count();
    assert_eq!(failed, summary.failures);
    assert!(matches!(events.first(), Some(TrainingEvent::GenerationStarted { generation: 0 })));
    assert!(matches!(events.last(), Some(TrainingEvent::GenerationCompleted { .. })));
    assert!(summary.best_fitness <= 0.5);

    for genome in engine.population() {
        if genome.connections()[0].weight > 0.5 || genome.connections()[0].weight < -0.5 {
            assert_eq!(genome.fitness, WORST_FITNESS);
        }
    }
}

#[test]
fn test_training_on_candles_end_to_end() {
    let evolution = EvolutionConfig {
        population_size: 10,
        ..config(21)
    };
    let evaluator = BacktestEvaluator::new(
        Arc::new(wave(120)),
        Arc::new(TradeConfig::default()),
        Arc::new(CompositeFitness::default()),
        &evolution,
    )
    .unwrap();
    let engine = EvolutionEngine::new(evolution, evaluator.input_count(), 1).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let saves = Arc::new(JsonSaveManager::new(dir.path().join("best.json")));
    let mut training = TrainingLoop::new(engine, evaluator.clone(), saves.clone(), Arc::new(NullEventSink), 3);
    let summary = training.run();

    assert_eq!(summary.generations_run, 3);
    assert!(!summary.stopped_early);
    let best = summary.best.expect("some genome scored");
    assert!(best.fitness.is_finite());
    assert!(best.report.is_some());

    let saved = saves.load().unwrap().expect("best genome saved");
    assert_eq!(saved.connections(), best.genome.connections());

    let held_out = evaluator.with_candles(Arc::new(wave(60)));
    let replay = training.evaluate_best(&held_out).unwrap().unwrap();
    assert!(replay.fitness.is_finite());
}

#[test]
fn test_wrong_shape_genome_is_rejected() {
    let evolution = config(1);
    let evaluator = BacktestEvaluator::new(
        Arc::new(wave(20)),
        Arc::new(TradeConfig::default()),
        Arc::new(CompositeFitness::default()),
        &evolution,
    )
    .unwrap();
    let engine = EvolutionEngine::new(evolution, evaluator.input_count() + 1, 1).unwrap();
    assert!(evaluator.evaluate(&engine.population()[0]).is_err());
}

#[test]
fn test_evaluator_rejects_contradictory_trade_config() {
    let trade = TradeConfig {
        leverage: 0,
        sizing: SizingPolicy::RiskBased { risk: -0.5 },
        ..TradeConfig::default()
    };
    let evaluator = BacktestEvaluator::new(
        Arc::new(wave(20)),
        Arc::new(trade),
        Arc::new(CompositeFitness::default()),
        &config(1),
    );
    assert!(matches!(evaluator, Err(EvotraderError::Configuration(_))));
}
