//! Finetuning hyperparameters (`hyperparams_finetuning`)

use super::choice::Choice;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;

/// Which split drives early stopping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EarlyStoppingSplit {
    Valid,
    Train,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Optimizer {
    Adamw,
    Adam,
    Sgd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    Bfloat16,
    Float16,
    Float32,
}

/// Early-stopping metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    LogLoss,
    Accuracy,
    Auc,
    Mse,
    Mae,
    Rmse,
    R2,
}

impl Metric {
    pub fn is_classification(&self) -> bool {
        matches!(self, Metric::LogLoss | Metric::Accuracy | Metric::Auc)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegressionLoss {
    Mse,
    Mae,
}

/// `lr_scheduler` as written: a bare flag, or a `{default, values}` choice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SchedulerSetting {
    Fixed(bool),
    Choice(Choice<bool>),
}

impl SchedulerSetting {
    pub fn enabled(&self) -> bool {
        match self {
            SchedulerSetting::Fixed(on) => *on,
            SchedulerSetting::Choice(choice) => choice.default,
        }
    }

    pub fn as_choice(&self) -> Option<&Choice<bool>> {
        match self {
            SchedulerSetting::Choice(choice) => Some(choice),
            SchedulerSetting::Fixed(_) => None,
        }
    }

    pub fn validate(&self, key: &str) -> Result<(), ConfigError> {
        match self {
            SchedulerSetting::Fixed(_) => Ok(()),
            SchedulerSetting::Choice(choice) => choice.validate(key),
        }
    }
}

impl Default for SchedulerSetting {
    fn default() -> Self {
        SchedulerSetting::Choice(Choice::new(false, vec![true, false]))
    }
}

/// Typed `hyperparams_finetuning` block. Unknown keys are rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FinetuneHyperparams {
    pub dim_embedding: Option<usize>,
    pub early_stopping_data_split: EarlyStoppingSplit,
    pub early_stopping_max_samples: usize,
    pub early_stopping_patience: usize,
    pub grad_scaler_enabled: bool,
    pub grad_scaler_growth_interval: usize,
    pub grad_scaler_scale_init: f64,
    pub grad_scaler_scale_min: f64,
    pub label_smoothing: f64,
    pub lr_scheduler: SchedulerSetting,
    pub lr_scheduler_patience: usize,
    pub max_epochs: usize,
    pub max_samples_query: usize,
    pub max_samples_support: usize,
    pub optimizer: Optimizer,
    pub lr: f64,
    pub weight_decay: f64,
    pub warmup_steps: usize,
    pub path_to_weights: Option<String>,
    pub precision: Precision,
    pub random_mirror_regression: bool,
    pub random_mirror_x: bool,
    pub shuffle_classes: bool,
    pub shuffle_features: bool,
    pub use_random_transforms: bool,
    pub use_feature_count_scaling: bool,
    pub use_pretrained_weights: bool,
    pub use_quantile_transformer: bool,
    pub budget: u64,
    pub metric: Metric,

    // Written by the estimator once the task is known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_ensembles: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dim: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dim_output: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_layers: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_heads: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regression_loss: Option<RegressionLoss>,
}

impl Default for FinetuneHyperparams {
    fn default() -> Self {
        Self {
            dim_embedding: None,
            early_stopping_data_split: EarlyStoppingSplit::Valid,
            early_stopping_max_samples: 2048,
            early_stopping_patience: 40,
            grad_scaler_enabled: false,
            grad_scaler_growth_interval: 1000,
            grad_scaler_scale_init: 65536.0,
            grad_scaler_scale_min: 65536.0,
            label_smoothing: 0.0,
            lr_scheduler: SchedulerSetting::default(),
            lr_scheduler_patience: 25,
            max_epochs: 50,
            max_samples_query: 1024,
            max_samples_support: 8192,
            optimizer: Optimizer::Adamw,
            lr: 1e-4,
            weight_decay: 0.1,
            warmup_steps: 1000,
            path_to_weights: None,
            precision: Precision::Bfloat16,
            random_mirror_regression: true,
            random_mirror_x: true,
            shuffle_classes: false,
            shuffle_features: false,
            use_random_transforms: false,
            use_feature_count_scaling: false,
            use_pretrained_weights: false,
            use_quantile_transformer: false,
            budget: 3600,
            metric: Metric::LogLoss,
            n_ensembles: None,
            dim: None,
            dim_output: None,
            n_layers: None,
            n_heads: None,
            regression_loss: None,
        }
    }
}

impl FinetuneHyperparams {
    /// Every key the block accepts, in file order
    pub const KEYS: &'static [&'static str] = &[
        "dim_embedding",
        "early_stopping_data_split",
        "early_stopping_max_samples",
        "early_stopping_patience",
        "grad_scaler_enabled",
        "grad_scaler_growth_interval",
        "grad_scaler_scale_init",
        "grad_scaler_scale_min",
        "label_smoothing",
        "lr_scheduler",
        "lr_scheduler_patience",
        "max_epochs",
        "max_samples_query",
        "max_samples_support",
        "optimizer",
        "lr",
        "weight_decay",
        "warmup_steps",
        "path_to_weights",
        "precision",
        "random_mirror_regression",
        "random_mirror_x",
        "shuffle_classes",
        "shuffle_features",
        "use_random_transforms",
        "use_feature_count_scaling",
        "use_pretrained_weights",
        "use_quantile_transformer",
        "budget",
        "metric",
        "n_ensembles",
        "dim",
        "dim_output",
        "n_layers",
        "n_heads",
        "regression_loss",
    ];

    pub fn is_known_key(key: &str) -> bool {
        Self::KEYS.contains(&key)
    }

    /// Whether the learning-rate scheduler is switched on
    pub fn lr_scheduler_enabled(&self) -> bool {
        self.lr_scheduler.enabled()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.lr_scheduler.validate("lr_scheduler")?;

        if self.max_samples_query == 0 {
            return Err(ConfigError::invalid("max_samples_query", "must be positive"));
        }
        if self.max_samples_support <= self.max_samples_query {
            return Err(ConfigError::invalid(
                "max_samples_support",
                format!(
                    "({}) must be greater than max_samples_query ({})",
                    self.max_samples_support, self.max_samples_query
                ),
            ));
        }
        if !(self.lr > 0.0) {
            return Err(ConfigError::invalid("lr", format!("must be positive, got {}", self.lr)));
        }
        if self.weight_decay < 0.0 {
            return Err(ConfigError::invalid(
                "weight_decay",
                format!("must be non-negative, got {}", self.weight_decay),
            ));
        }
        if !(0.0..1.0).contains(&self.label_smoothing) {
            return Err(ConfigError::invalid(
                "label_smoothing",
                format!("must be in [0, 1), got {}", self.label_smoothing),
            ));
        }
        if self.grad_scaler_growth_interval == 0 {
            return Err(ConfigError::invalid("grad_scaler_growth_interval", "must be positive"));
        }
        if self.grad_scaler_scale_min > self.grad_scaler_scale_init {
            return Err(ConfigError::invalid(
                "grad_scaler_scale_min",
                format!(
                    "({}) must not exceed grad_scaler_scale_init ({})",
                    self.grad_scaler_scale_min, self.grad_scaler_scale_init
                ),
            ));
        }
        if self.early_stopping_patience == 0 {
            return Err(ConfigError::invalid("early_stopping_patience", "must be positive"));
        }
        if self.early_stopping_max_samples == 0 {
            return Err(ConfigError::invalid("early_stopping_max_samples", "must be positive"));
        }
        if self.budget == 0 {
            return Err(ConfigError::invalid("budget", "must be positive"));
        }
        if let Some(0) = self.dim_embedding {
            return Err(ConfigError::invalid("dim_embedding", "must be positive when set"));
        }

        for (key, value) in [
            ("n_ensembles", self.n_ensembles),
            ("dim", self.dim),
            ("dim_output", self.dim_output),
            ("n_layers", self.n_layers),
            ("n_heads", self.n_heads),
        ] {
            if value == Some(0) {
                return Err(ConfigError::invalid(key, "must be positive when set"));
            }
        }
        if let (Some(dim), Some(heads)) = (self.dim, self.n_heads) {
            if dim % heads != 0 {
                return Err(ConfigError::invalid(
                    "dim",
                    format!("({}) must be divisible by n_heads ({})", dim, heads),
                ));
            }
        }

        Ok(())
    }

    /// Replace one key with a parsed value, keeping the block typed.
    ///
    /// A scalar assigned to a choice key moves that choice's default.
    pub fn set(&mut self, key: &str, value: HyperValue) -> Result<(), ConfigError> {
        if !Self::is_known_key(key) {
            return Err(ConfigError::UnknownKey(key.to_string()));
        }

        let mut block = serde_yaml::to_value(&*self)?;
        let Value::Mapping(map) = &mut block else {
            return Err(ConfigError::invalid(key, "hyperparameter block is not a mapping"));
        };

        let new_value = value.into_yaml();
        let key_value = Value::String(key.to_string());
        let replaced = match (map.get_mut(&key_value), &new_value) {
            (Some(Value::Mapping(choice)), scalar) if !matches!(scalar, Value::Mapping(_)) => {
                choice.insert(Value::String("default".to_string()), new_value.clone());
                true
            }
            _ => false,
        };
        if !replaced {
            map.insert(key_value, new_value);
        }

        *self = serde_yaml::from_value(block)?;
        Ok(())
    }
}

/// Untyped value of a single hyperparameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HyperValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Choice(Box<Choice<HyperValue>>),
}

impl HyperValue {
    /// Parse a command-line literal (`true`, `1024`, `1e-4`, `null`, `adamw`)
    pub fn parse_literal(literal: &str) -> Self {
        let trimmed = literal.trim();
        if trimmed.is_empty() {
            return HyperValue::Str(String::new());
        }
        serde_yaml::from_str(trimmed).unwrap_or_else(|_| HyperValue::Str(trimmed.to_string()))
    }

    pub fn into_yaml(self) -> Value {
        match self {
            HyperValue::Null => Value::Null,
            HyperValue::Bool(b) => Value::Bool(b),
            HyperValue::Int(i) => Value::Number(i.into()),
            HyperValue::Float(f) => Value::Number(f.into()),
            HyperValue::Str(s) => Value::String(s),
            HyperValue::Choice(choice) => {
                let choice = *choice;
                let mut map = serde_yaml::Mapping::new();
                map.insert(Value::String("default".to_string()), choice.default.into_yaml());
                map.insert(
                    Value::String("values".to_string()),
                    Value::Sequence(choice.values.into_iter().map(HyperValue::into_yaml).collect()),
                );
                Value::Mapping(map)
            }
        }
    }
}
