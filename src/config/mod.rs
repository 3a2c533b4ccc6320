pub mod choice;
pub mod directive;
pub mod hyperparams;
pub mod model;
pub mod search_space;

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

pub use choice::Choice;
pub use directive::{ConstructTarget, Device};
pub use hyperparams::{FinetuneHyperparams, HyperValue, Metric, SchedulerSetting};
pub use model::ModelName;
pub use search_space::{SearchSpace, Trial};

/// Run configuration for one model variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    pub device: ConstructTarget,
    pub hyperparams_finetuning: FinetuneHyperparams,
    pub model_name: ModelName,
    pub seed: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            device: ConstructTarget::TorchDevice(Device::default()),
            hyperparams_finetuning: FinetuneHyperparams::default(),
            model_name: ModelName::Tab2D,
            seed: 0,
        }
    }
}

impl RunConfig {
    pub fn device(&self) -> Device {
        self.device.device()
    }

    /// Parse and validate a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: RunConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml_str(&content)?;
        debug!(path = %path.display(), model = %config.model_name, "loaded run config");
        Ok(config)
    }

    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        std::fs::write(path, self.to_yaml_string()?).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.hyperparams_finetuning.validate()
    }

    /// Apply a `key=value` override. Keys are `seed`, `model_name`, `device`,
    /// or a hyperparameter, optionally prefixed with `hyperparams_finetuning.`.
    pub fn apply_override(&mut self, assignment: &str) -> Result<(), ConfigError> {
        let (key, literal) = assignment
            .split_once('=')
            .ok_or_else(|| ConfigError::MalformedOverride(assignment.to_string()))?;
        let key = key.trim();
        let literal = literal.trim();
        let mut next = self.clone();

        match key {
            "seed" => {
                next.seed = literal
                    .parse()
                    .map_err(|_| ConfigError::invalid("seed", format!("`{}` is not an integer", literal)))?;
            }
            "model_name" => {
                next.model_name = serde_yaml::from_str(literal)?;
            }
            "device" => {
                next.device = ConstructTarget::TorchDevice(literal.parse()?);
            }
            _ => {
                let key = key.strip_prefix("hyperparams_finetuning.").unwrap_or(key);
                next.hyperparams_finetuning
                    .set(key, HyperValue::parse_literal(literal))?;
            }
        }

        next.validate()?;
        debug!(key, value = literal, "applied config override");
        *self = next;
        Ok(())
    }

    pub fn apply_overrides<I, S>(&mut self, assignments: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for assignment in assignments {
            self.apply_override(assignment.as_ref())?;
        }
        Ok(())
    }

    pub fn to_dict(&self) -> Result<HashMap<String, serde_json::Value>, ConfigError> {
        Ok(serde_json::from_value(serde_json::to_value(self)?)?)
    }

    pub fn from_dict(data: HashMap<String, serde_json::Value>) -> Result<Self, ConfigError> {
        let config: RunConfig = serde_json::from_value(serde_json::to_value(data)?)?;
        config.validate()?;
        Ok(config)
    }
}
