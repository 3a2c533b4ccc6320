use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// A value picked from an enumerated set, written as `{default, values}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Choice<T> {
    pub default: T,
    pub values: Vec<T>,
}

impl<T: PartialEq + Debug + Clone> Choice<T> {
    pub fn new(default: T, values: Vec<T>) -> Self {
        Self { default, values }
    }

    pub fn contains(&self, value: &T) -> bool {
        self.values.iter().any(|v| v == value)
    }

    /// Check that `values` is non-empty and holds `default`.
    pub fn validate(&self, key: &str) -> Result<(), ConfigError> {
        if self.values.is_empty() {
            return Err(ConfigError::EmptyChoice(key.to_string()));
        }
        if !self.contains(&self.default) {
            return Err(ConfigError::ChoiceDefaultNotAllowed {
                key: key.to_string(),
                default: format!("{:?}", self.default),
                values: format!("{:?}", self.values),
            });
        }
        Ok(())
    }
}
