use super::traits::{check_unit, invalid, ConfigSection};
use crate::error::EvotraderError;
use serde::{Deserialize, Serialize};

/// Hyperparameters of the neuroevolution engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolutionConfig {
    pub population_size: usize,
    /// Candles of history fed to every network
    pub lookback: usize,
    /// Output band inside which the network holds
    pub decision_threshold: f64,

    // Speciation
    pub compatibility_threshold: f64,
    pub excess_coefficient: f64,
    pub disjoint_coefficient: f64,
    pub weight_coefficient: f64,

    // Selection
    pub elimination_fraction: f64,
    pub elitism: usize,
    pub crossover_rate: f64,

    // Mutation
    pub weight_mutation_rate: f64,
    pub weight_perturbation: f64,
    pub weight_replace_rate: f64,
    pub weight_limit: f64,
    pub toggle_connection_rate: f64,
    pub add_node_rate: f64,
    pub add_connection_rate: f64,

    pub seed: Option<u64>,
    /// Evaluation threads; 0 uses rayon's default pool
    pub workers: usize,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            population_size: 100,
            lookback: 10,
            decision_threshold: 0.5,
            compatibility_threshold: 3.0,
            excess_coefficient: 1.0,
            disjoint_coefficient: 1.0,
            weight_coefficient: 0.4,
            elimination_fraction: 0.5,
            elitism: 2,
            crossover_rate: 0.75,
            weight_mutation_rate: 0.8,
            weight_perturbation: 0.5,
            weight_replace_rate: 0.1,
            weight_limit: 8.0,
            toggle_connection_rate: 0.02,
            add_node_rate: 0.03,
            add_connection_rate: 0.05,
            seed: None,
            workers: 0,
        }
    }
}

impl ConfigSection for EvolutionConfig {
    fn section_name() -> &'static str {
        "evolution"
    }

    fn validate(&self) -> Result<(), EvotraderError> {
        let section = Self::section_name();
        if self.population_size < 2 {
            return Err(invalid(section, "population_size must be at least 2"));
        }
        if self.elitism == 0 || self.elitism >= self.population_size {
            return Err(invalid(section, "elitism must be between 1 and population_size - 1"));
        }
        if self.lookback == 0 {
            return Err(invalid(section, "lookback must be at least 1"));
        }
        if !(0.0..1.0).contains(&self.decision_threshold) {
            return Err(invalid(section, "decision_threshold must be in [0, 1)"));
        }
        if self.compatibility_threshold <= 0.0 {
            return Err(invalid(section, "compatibility_threshold must be positive"));
        }
        if self.weight_perturbation <= 0.0 || self.weight_limit <= 0.0 {
            return Err(invalid(section, "weight_perturbation and weight_limit must be positive"));
        }
        if !(0.0..1.0).contains(&self.elimination_fraction) {
            return Err(invalid(section, "elimination_fraction must be in [0, 1)"));
        }
        check_unit(section, "crossover_rate", self.crossover_rate)?;
        check_unit(section, "weight_mutation_rate", self.weight_mutation_rate)?;
        check_unit(section, "weight_replace_rate", self.weight_replace_rate)?;
        check_unit(section, "toggle_connection_rate", self.toggle_connection_rate)?;
        check_unit(section, "add_node_rate", self.add_node_rate)?;
        check_unit(section, "add_connection_rate", self.add_connection_rate)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rates_validated() {
        let config = EvolutionConfig { crossover_rate: 1.5, ..EvolutionConfig::default() };
        assert!(config.validate().is_err());
        let config = EvolutionConfig { elitism: 100, ..EvolutionConfig::default() };
        assert!(config.validate().is_err());
        assert!(EvolutionConfig::default().validate().is_ok());
    }
}
