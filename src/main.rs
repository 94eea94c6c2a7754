use anyhow::Context;
use evotrader::config::ConfigManager;
use evotrader::data::{CandleLoader, CsvConnector};
use evotrader::engines::evaluation::{BacktestEvaluator, CompositeFitness};
use evotrader::engines::generation::{EvolutionEngine, LogEventSink};
use evotrader::services::{JsonSaveManager, TrainingLoop};
use std::sync::Arc;

const DEFAULT_CONFIG: &str = "evotrader.toml";

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut config_path = DEFAULT_CONFIG.to_string();
    let mut reset = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--reset" => reset = true,
            path => config_path = path.to_string(),
        }
    }

    let manager = ConfigManager::new();
    manager
        .load_from_file(&config_path)
        .with_context(|| format!("loading {}", config_path))?;
    let config = manager.get();

    let pair = config.trading.pair();
    let interval = config.trading.interval;
    let loader = CsvConnector::new(&config.training.data_dir);
    let training_candles = loader
        .load_candles(
            &pair,
            interval,
            config.training.start_date_training,
            config.training.end_date_training,
        )
        .context("loading training candles")?;
    log::info!("Training on {} {} candles of {}", training_candles.len(), interval, pair);

    let evaluator = BacktestEvaluator::new(
        Arc::new(training_candles),
        Arc::new(config.trading.clone()),
        Arc::new(CompositeFitness::new(config.fitness.clone())),
        &config.evolution,
    )?;
    let engine = EvolutionEngine::new(config.evolution.clone(), evaluator.input_count(), 1)?;
    let test_evaluator = match config.training.test_range() {
        Some((start, end)) => {
            let candles = loader
                .load_candles(&pair, interval, start, end)
                .context("loading test candles")?;
            Some(evaluator.with_candles(Arc::new(candles)))
        }
        None => None,
    };

    let mut training = TrainingLoop::new(
        engine,
        evaluator,
        Arc::new(JsonSaveManager::new(&config.training.save_path)),
        Arc::new(LogEventSink),
        config.training.generations,
    );
    if !(reset || config.training.reset) {
        training.load_saved()?;
    }

    let summary = training.run();
    match &summary.best {
        Some(best) => log::info!(
            "Finished {} generations, best fitness {:.4} from generation {}",
            summary.generations_run,
            best.fitness,
            best.generation + 1
        ),
        None => log::warn!("Finished {} generations without a valid genome", summary.generations_run),
    }

    if let Some(test_evaluator) = test_evaluator {
        if let Some(result) = training.evaluate_best(&test_evaluator) {
            let evaluation = result.context("evaluating on the test range")?;
            if let Some(report) = evaluation.report {
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
        }
    }

    Ok(())
}
