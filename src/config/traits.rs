use crate::error::EvotraderError;
use serde::{Deserialize, Serialize};

/// Trait for configuration sections
pub trait ConfigSection: Serialize + for<'de> Deserialize<'de> + Default + Clone {
    fn section_name() -> &'static str;
    fn validate(&self) -> Result<(), EvotraderError>;
}

/// Shorthand for the error every section returns
pub(crate) fn invalid(section: &str, message: impl Into<String>) -> EvotraderError {
    EvotraderError::Configuration(format!("[{}] {}", section, message.into()))
}

/// Checks that a rate lies in `[0, 1]`
pub(crate) fn check_unit(section: &str, name: &str, value: f64) -> Result<(), EvotraderError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(invalid(section, format!("{} must be between 0 and 1, got {}", name, value)));
    }
    Ok(())
}
