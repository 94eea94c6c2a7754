//! Backtesting and neuroevolution of trading strategies.
//!
//! A [`engines::evaluation::Trader`] replays candles through an exchange-like
//! order and margin model; an [`engines::generation::EvolutionEngine`] evolves
//! NEAT networks scored by those backtests.

pub mod config;
pub mod data;
pub mod engines;
pub mod error;
pub mod services;
pub mod types;

pub use error::{EvotraderError, Result};
