//! Hyperparameter search space for finetuning runs

use super::choice::Choice;
use super::hyperparams::Metric;
use super::RunConfig;
use crate::error::ConfigError;
use crate::estimator::Task;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Candidate values for each tunable hyperparameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    pub max_epochs: Choice<usize>,
    pub classification_metric: Choice<Metric>,
    pub regression_metric: Choice<Metric>,
    pub shuffle_classes: Choice<bool>,
    pub shuffle_features: Choice<bool>,
    pub use_random_transforms: Choice<bool>,
    pub random_mirror_regression: Choice<bool>,
    pub random_mirror_x: Choice<bool>,
    pub lr: Choice<f64>,
    pub early_stopping_patience: Choice<usize>,
    pub warmup_steps: Choice<usize>,
}

impl Default for SearchSpace {
    fn default() -> Self {
        Self {
            max_epochs: Choice::new(50, vec![50, 60, 70, 80, 90, 100]),
            classification_metric: Choice::new(
                Metric::LogLoss,
                vec![Metric::LogLoss, Metric::Accuracy, Metric::Auc],
            ),
            regression_metric: Choice::new(
                Metric::Mse,
                vec![Metric::Mse, Metric::Mae, Metric::Rmse, Metric::R2],
            ),
            shuffle_classes: Choice::new(false, vec![true, false]),
            shuffle_features: Choice::new(false, vec![true, false]),
            use_random_transforms: Choice::new(false, vec![true, false]),
            random_mirror_regression: Choice::new(true, vec![true, false]),
            random_mirror_x: Choice::new(true, vec![true, false]),
            lr: Choice::new(
                1e-4,
                vec![1e-5, 2.5e-5, 5e-5, 7.5e-5, 1e-4, 2.5e-4, 5e-4, 7.5e-4, 1e-3],
            ),
            early_stopping_patience: Choice::new(40, vec![30, 35, 40, 45, 50]),
            warmup_steps: Choice::new(1000, vec![500, 750, 1000, 1250, 1500]),
        }
    }
}

/// One point of the search space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub max_epochs: usize,
    pub metric: Metric,
    pub shuffle_classes: bool,
    pub shuffle_features: bool,
    pub use_random_transforms: bool,
    pub random_mirror_regression: bool,
    pub random_mirror_x: bool,
    pub lr: f64,
    pub early_stopping_patience: usize,
    pub warmup_steps: usize,
}

impl Trial {
    /// Write the trial's values into a run configuration
    pub fn apply(&self, config: &mut RunConfig) {
        let hp = &mut config.hyperparams_finetuning;
        hp.max_epochs = self.max_epochs;
        hp.metric = self.metric;
        hp.shuffle_classes = self.shuffle_classes;
        hp.shuffle_features = self.shuffle_features;
        hp.use_random_transforms = self.use_random_transforms;
        hp.random_mirror_regression = self.random_mirror_regression;
        hp.random_mirror_x = self.random_mirror_x;
        hp.lr = self.lr;
        hp.early_stopping_patience = self.early_stopping_patience;
        hp.warmup_steps = self.warmup_steps;
    }
}

fn pick<T: Clone, R: Rng>(choice: &Choice<T>, rng: &mut R) -> T {
    choice
        .values
        .choose(rng)
        .cloned()
        .unwrap_or_else(|| choice.default.clone())
}

impl SearchSpace {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.max_epochs.validate("max_epochs")?;
        self.classification_metric.validate("classification_metric")?;
        self.regression_metric.validate("regression_metric")?;
        self.shuffle_classes.validate("shuffle_classes")?;
        self.shuffle_features.validate("shuffle_features")?;
        self.use_random_transforms.validate("use_random_transforms")?;
        self.random_mirror_regression.validate("random_mirror_regression")?;
        self.random_mirror_x.validate("random_mirror_x")?;
        self.lr.validate("lr")?;
        self.early_stopping_patience.validate("early_stopping_patience")?;
        self.warmup_steps.validate("warmup_steps")?;

        for (key, metrics, classification) in [
            ("classification_metric", &self.classification_metric.values, true),
            ("regression_metric", &self.regression_metric.values, false),
        ] {
            if metrics.iter().any(|m| m.is_classification() != classification) {
                return Err(ConfigError::invalid(key, "mixes classification and regression metrics"));
            }
        }
        Ok(())
    }

    fn metric_choice(&self, task: Task) -> &Choice<Metric> {
        match task {
            Task::Classification => &self.classification_metric,
            Task::Regression => &self.regression_metric,
        }
    }

    /// Number of distinct trials for a task
    pub fn cardinality(&self, task: Task) -> usize {
        self.max_epochs.values.len()
            * self.metric_choice(task).values.len()
            * self.shuffle_classes.values.len()
            * self.shuffle_features.values.len()
            * self.use_random_transforms.values.len()
            * self.random_mirror_regression.values.len()
            * self.random_mirror_x.values.len()
            * self.lr.values.len()
            * self.early_stopping_patience.values.len()
            * self.warmup_steps.values.len()
    }

    pub fn default_trial(&self, task: Task) -> Trial {
        Trial {
            max_epochs: self.max_epochs.default,
            metric: self.metric_choice(task).default,
            shuffle_classes: self.shuffle_classes.default,
            shuffle_features: self.shuffle_features.default,
            use_random_transforms: self.use_random_transforms.default,
            random_mirror_regression: self.random_mirror_regression.default,
            random_mirror_x: self.random_mirror_x.default,
            lr: self.lr.default,
            early_stopping_patience: self.early_stopping_patience.default,
            warmup_steps: self.warmup_steps.default,
        }
    }

    pub fn sample<R: Rng>(&self, task: Task, rng: &mut R) -> Trial {
        Trial {
            max_epochs: pick(&self.max_epochs, rng),
            metric: pick(self.metric_choice(task), rng),
            shuffle_classes: pick(&self.shuffle_classes, rng),
            shuffle_features: pick(&self.shuffle_features, rng),
            use_random_transforms: pick(&self.use_random_transforms, rng),
            random_mirror_regression: pick(&self.random_mirror_regression, rng),
            random_mirror_x: pick(&self.random_mirror_x, rng),
            lr: pick(&self.lr, rng),
            early_stopping_patience: pick(&self.early_stopping_patience, rng),
            warmup_steps: pick(&self.warmup_steps, rng),
        }
    }

    /// Default trial first, then `n - 1` seeded samples
    pub fn sample_many(&self, task: Task, n: usize, seed: u64) -> Vec<Trial> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut trials = Vec::with_capacity(n);
        if n > 0 {
            trials.push(self.default_trial(task));
        }
        while trials.len() < n {
            trials.push(self.sample(task, &mut rng));
        }
        trials
    }
}
