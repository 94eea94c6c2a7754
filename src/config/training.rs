use super::traits::{invalid, ConfigSection};
use crate::error::EvotraderError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where the data lives and how long to train
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub generations: usize,
    pub data_dir: PathBuf,
    pub save_path: PathBuf,
    /// Start from scratch instead of the saved network
    pub reset: bool,
    pub start_date_training: DateTime<Utc>,
    pub end_date_training: DateTime<Utc>,
    pub start_date_test: Option<DateTime<Utc>>,
    pub end_date_test: Option<DateTime<Utc>>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        let start = DateTime::<Utc>::from_timestamp(1_609_459_200, 0).unwrap_or_default();
        let end = DateTime::<Utc>::from_timestamp(1_640_995_200, 0).unwrap_or_default();
        Self {
            generations: 50,
            data_dir: PathBuf::from("data"),
            save_path: PathBuf::from("neural_network.json"),
            reset: false,
            start_date_training: start,
            end_date_training: end,
            start_date_test: None,
            end_date_test: None,
        }
    }
}

impl TrainingConfig {
    /// The held-out range, when both ends are configured
    pub fn test_range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        self.start_date_test.zip(self.end_date_test)
    }
}

impl ConfigSection for TrainingConfig {
    fn section_name() -> &'static str {
        "training"
    }

    fn validate(&self) -> Result<(), EvotraderError> {
        let section = Self::section_name();
        if self.generations == 0 {
            return Err(invalid(section, "generations must be at least 1"));
        }
        if self.start_date_training >= self.end_date_training {
            return Err(invalid(section, "training start must be before training end"));
        }
        match (self.start_date_test, self.end_date_test) {
            (Some(start), Some(end)) if start >= end => {
                Err(invalid(section, "test start must be before test end"))
            }
            (Some(_), None) | (None, Some(_)) => {
                Err(invalid(section, "test range needs both start_date_test and end_date_test"))
            }
            _ => Ok(()),
        }
    }
}
