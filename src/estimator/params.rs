//! User-facing estimator parameters and their translation into a run config

use super::problem::{ProblemType, Task};
use crate::config::hyperparams::{
    EarlyStoppingSplit, Optimizer, Precision, RegressionLoss, SchedulerSetting,
};
use crate::config::{ConstructTarget, Device, FinetuneHyperparams, Metric, ModelName, RunConfig};
use crate::error::EstimatorError;
use serde::{Deserialize, Serialize};

/// Default time budget per fit, in seconds
pub const DEFAULT_BUDGET: u64 = 3600;
pub const DEFAULT_VALIDATION_SPLIT: f64 = 0.2;

/// Parameters accepted by the Mitra estimator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MitraParams {
    pub model_type: ModelName,
    pub n_estimators: usize,
    pub device: Device,
    pub epoch: usize,
    pub budget: u64,
    pub metric: Option<Metric>,
    pub state_dict: Option<String>,
    pub state_dict_classification: Option<String>,
    pub state_dict_regression: Option<String>,
    pub patience: usize,
    pub lr: f64,
    pub warmup_steps: usize,
    pub shuffle_classes: bool,
    pub shuffle_features: bool,
    pub use_random_transforms: bool,
    pub random_mirror_regression: bool,
    pub random_mirror_x: bool,
}

impl Default for MitraParams {
    fn default() -> Self {
        Self {
            model_type: ModelName::Tab2D,
            n_estimators: 1,
            device: Device::Cuda(None),
            epoch: 50,
            budget: DEFAULT_BUDGET,
            metric: None,
            state_dict: None,
            state_dict_classification: None,
            state_dict_regression: None,
            patience: 40,
            lr: 1e-4,
            warmup_steps: 1000,
            shuffle_classes: false,
            shuffle_features: false,
            use_random_transforms: false,
            random_mirror_regression: true,
            random_mirror_x: true,
        }
    }
}

impl MitraParams {
    /// Pick the pretrained weights matching the problem type.
    ///
    /// Task-specific paths win over the shared `state_dict`.
    pub fn resolve_state_dict(&self, problem: ProblemType) -> Option<&str> {
        let specific = match problem.task() {
            Task::Classification => self.state_dict_classification.as_deref(),
            Task::Regression => self.state_dict_regression.as_deref(),
        };
        specific.or(self.state_dict.as_deref())
    }

    pub fn metric_for(&self, task: Task) -> Metric {
        self.metric.unwrap_or_else(|| task.default_metric())
    }

    /// Build the run configuration for one fit
    pub fn to_run_config(&self, problem: ProblemType) -> Result<RunConfig, EstimatorError> {
        if self.n_estimators == 0 {
            return Err(EstimatorError::NoEstimators);
        }

        let task = problem.task();
        let arch = self.model_type.architecture();
        let hyperparams = FinetuneHyperparams {
            dim_embedding: None,
            early_stopping_data_split: EarlyStoppingSplit::Valid,
            early_stopping_max_samples: 2048,
            early_stopping_patience: self.patience,
            grad_scaler_enabled: false,
            grad_scaler_growth_interval: 1000,
            grad_scaler_scale_init: 65536.0,
            grad_scaler_scale_min: 65536.0,
            label_smoothing: 0.0,
            lr_scheduler: SchedulerSetting::Fixed(false),
            lr_scheduler_patience: 25,
            max_epochs: self.epoch,
            max_samples_query: 1024,
            max_samples_support: 8192,
            optimizer: Optimizer::Adamw,
            lr: self.lr,
            weight_decay: 0.1,
            warmup_steps: self.warmup_steps,
            path_to_weights: self.resolve_state_dict(problem).map(str::to_string),
            precision: Precision::Bfloat16,
            random_mirror_regression: self.random_mirror_regression,
            random_mirror_x: self.random_mirror_x,
            shuffle_classes: self.shuffle_classes,
            shuffle_features: self.shuffle_features,
            use_random_transforms: self.use_random_transforms,
            use_feature_count_scaling: false,
            use_pretrained_weights: false,
            use_quantile_transformer: false,
            budget: self.budget,
            metric: self.metric_for(task),
            n_ensembles: Some(self.n_estimators),
            dim: Some(arch.dim),
            dim_output: Some(task.dim_output()),
            n_layers: Some(arch.n_layers),
            n_heads: Some(arch.n_heads),
            regression_loss: Some(RegressionLoss::Mse),
        };

        let config = RunConfig {
            device: ConstructTarget::TorchDevice(self.device),
            hyperparams_finetuning: hyperparams,
            model_name: self.model_type,
            seed: 0,
        };
        config.validate()?;
        Ok(config)
    }
}
