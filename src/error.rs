use thiserror::Error;

#[derive(Error, Debug)]
pub enum EvotraderError {
    #[error("Data integrity error: {0}")]
    DataIntegrity(String),

    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Numeric degeneracy: {0}")]
    NumericDegeneracy(String),

    #[error("Data loading error: {0}")]
    DataLoading(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("Serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EvotraderError>;

/// Divides `numerator` by `denominator`, refusing to produce NaN or infinity.
pub fn checked_ratio(numerator: f64, denominator: f64) -> Result<f64> {
    let value = numerator / denominator;
    if denominator == 0.0 || !value.is_finite() {
        return Err(EvotraderError::NumericDegeneracy(format!(
            "{} / {} is not a finite number",
            numerator, denominator
        )));
    }
    Ok(value)
}

/// Statistics never carry NaN: a degenerate ratio collapses to 0.
pub fn ratio(numerator: f64, denominator: f64) -> f64 {
    checked_ratio(numerator, denominator).unwrap_or_else(|e| {
        log::trace!("{}; using 0", e);
        0.0
    })
}
