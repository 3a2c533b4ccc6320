//! Ensemble finetuning with out-of-memory back-off
//!
//! The network itself lives behind [`FinetuneBackend`]. This module decides
//! what to train, on which rows, with which sample budget, and how member
//! outputs combine.

use super::budget::SampleBudget;
use super::params::{MitraParams, DEFAULT_VALIDATION_SPLIT};
use super::problem::{ProblemType, Task};
use super::split::{validation_split, Targets};
use crate::config::RunConfig;
use crate::error::{EstimatorError, TrainError};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Feature matrix with its targets
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub features: Vec<Vec<f64>>,
    pub targets: Targets,
}

impl Dataset {
    pub fn new(features: Vec<Vec<f64>>, targets: Targets) -> Result<Self, EstimatorError> {
        if features.len() != targets.len() {
            return Err(EstimatorError::RowMismatch {
                features: features.len(),
                targets: targets.len(),
            });
        }
        if features.is_empty() {
            return Err(EstimatorError::EmptyData);
        }
        Ok(Self { features, targets })
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn select(&self, indices: &[usize]) -> Dataset {
        Dataset {
            features: indices.iter().map(|&i| self.features[i].clone()).collect(),
            targets: self.targets.select(indices),
        }
    }

    fn check_task(&self, task: Task) -> Result<(), EstimatorError> {
        match (task, &self.targets) {
            (Task::Classification, Targets::Classes(_)) | (Task::Regression, Targets::Values(_)) => {
                Ok(())
            }
            (Task::Classification, Targets::Values(_)) => Err(EstimatorError::TargetMismatch {
                task: "classification",
                expected: "class",
            }),
            (Task::Regression, Targets::Classes(_)) => Err(EstimatorError::TargetMismatch {
                task: "regression",
                expected: "continuous",
            }),
        }
    }
}

/// Trains and runs a single ensemble member
pub trait FinetuneBackend {
    type Member;

    fn train(
        &mut self,
        config: &RunConfig,
        train: &Dataset,
        valid: &Dataset,
    ) -> Result<Self::Member, TrainError>;

    /// Outputs for each row of `x`, using `context` as the in-context support set.
    ///
    /// Classification rows hold one logit per output head, where head `i`
    /// stands for the `i`-th smallest training label; heads past the number of
    /// training classes are ignored. Regression rows hold one value.
    fn predict(
        &self,
        member: &Self::Member,
        context: &Dataset,
        x: &[Vec<f64>],
    ) -> anyhow::Result<Vec<Vec<f64>>>;
}

/// Mitra estimator: an ensemble of finetuned members
#[derive(Debug)]
pub struct MitraEstimator<B: FinetuneBackend> {
    params: MitraParams,
    problem: ProblemType,
    backend: B,
    seed: u64,
    members: Vec<B::Member>,
    context: Option<Dataset>,
    classes: Vec<i64>,
    fitted_config: Option<RunConfig>,
    train_time: Duration,
    oom_retries: usize,
}

impl<B: FinetuneBackend> MitraEstimator<B> {
    pub fn new(params: MitraParams, problem: ProblemType, backend: B) -> Self {
        Self {
            params,
            problem,
            backend,
            seed: 0,
            members: Vec::new(),
            context: None,
            classes: Vec::new(),
            fitted_config: None,
            train_time: Duration::ZERO,
            oom_retries: 0,
        }
    }

    /// Seed for the train/validation split
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn params(&self) -> &MitraParams {
        &self.params
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn members(&self) -> &[B::Member] {
        &self.members
    }

    /// Configuration the current members were trained with
    pub fn fitted_config(&self) -> Option<&RunConfig> {
        self.fitted_config.as_ref()
    }

    /// Class labels seen during fit, ascending
    pub fn classes(&self) -> &[i64] {
        &self.classes
    }

    pub fn train_time(&self) -> Duration {
        self.train_time
    }

    pub fn oom_retries(&self) -> usize {
        self.oom_retries
    }

    pub fn is_fitted(&self) -> bool {
        !self.members.is_empty()
    }

    /// Fit the ensemble. Without `validation`, 20% of `data` is held out.
    pub fn fit(
        &mut self,
        data: Dataset,
        validation: Option<Dataset>,
    ) -> Result<&mut Self, EstimatorError> {
        let task = self.problem.task();
        data.check_task(task)?;

        let (train, valid) = match validation {
            Some(valid) => {
                valid.check_task(task)?;
                (data.clone(), valid)
            }
            None => {
                let mut rng = StdRng::seed_from_u64(self.seed);
                let split = validation_split(&data.targets, DEFAULT_VALIDATION_SPLIT, &mut rng);
                (data.select(&split.train), data.select(&split.valid))
            }
        };

        let mut config = self.params.to_run_config(self.problem)?;
        info!(
            problem = %self.problem,
            n_estimators = self.params.n_estimators,
            train_rows = train.len(),
            valid_rows = valid.len(),
            "fitting Mitra ensemble"
        );

        self.oom_retries = 0;
        loop {
            match self.train_members(&config, &train, &valid) {
                Ok(()) => break,
                Err(TrainError::OutOfMemory) => {
                    let hp = &mut config.hyperparams_finetuning;
                    let next = SampleBudget::from_hyperparams(hp).shrink()?;
                    warn!(
                        support = next.support,
                        query = next.query,
                        "out of memory, retrying with a smaller sample budget"
                    );
                    next.write_to(hp);
                    self.oom_retries += 1;
                }
                Err(TrainError::Other(e)) => {
                    self.members.clear();
                    return Err(EstimatorError::Backend(e));
                }
            }
        }

        info!(
            members = self.members.len(),
            seconds = self.train_time.as_secs_f64(),
            "ensemble fitted"
        );
        self.classes = data.targets.classes();
        self.context = Some(data);
        self.fitted_config = Some(config);
        Ok(self)
    }

    /// Train every member from scratch; any failure discards the whole ensemble.
    fn train_members(
        &mut self,
        config: &RunConfig,
        train: &Dataset,
        valid: &Dataset,
    ) -> Result<(), TrainError> {
        self.members.clear();
        self.train_time = Duration::ZERO;

        for index in 0..self.params.n_estimators {
            let start = Instant::now();
            let member = match self.backend.train(config, train, valid) {
                Ok(member) => member,
                Err(e) => {
                    self.members.clear();
                    return Err(e);
                }
            };
            self.train_time += start.elapsed();
            debug!(member = index, "ensemble member trained");
            self.members.push(member);
        }
        Ok(())
    }

    fn member_outputs(&self, x: &[Vec<f64>]) -> Result<Vec<Vec<Vec<f64>>>, EstimatorError> {
        let context = self.context.as_ref().ok_or(EstimatorError::NotFitted)?;
        if self.members.is_empty() {
            return Err(EstimatorError::NotFitted);
        }

        let mut outputs = Vec::with_capacity(self.members.len());
        for member in &self.members {
            let out = self
                .backend
                .predict(member, context, x)
                .map_err(EstimatorError::Backend)?;
            outputs.push(out);
        }
        Ok(outputs)
    }

    fn require_task(&self, operation: &'static str, required: Task) -> Result<(), EstimatorError> {
        if self.problem.task() != required {
            return Err(EstimatorError::WrongTask {
                operation,
                required,
                problem: self.problem,
            });
        }
        Ok(())
    }

    /// Mean of raw member outputs, row by row
    pub fn predict_raw(&self, x: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, EstimatorError> {
        average_outputs(&self.member_outputs(x)?)
    }

    /// Class probabilities, one column per training class. Each member's
    /// logits are cut to the training classes and softmaxed before averaging.
    pub fn predict_proba(&self, x: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, EstimatorError> {
        self.require_task("predict_proba", Task::Classification)?;
        let n_classes = self.classes.len();
        let probabilities = self
            .member_outputs(x)?
            .into_iter()
            .map(|logits| class_probabilities(logits, n_classes))
            .collect::<Result<Vec<_>, _>>()?;
        average_outputs(&probabilities)
    }

    /// Most probable training label per row
    pub fn predict_classes(&self, x: &[Vec<f64>]) -> Result<Vec<i64>, EstimatorError> {
        self.require_task("predict_classes", Task::Classification)?;
        Ok(self
            .predict_proba(x)?
            .iter()
            .map(|row| self.classes[argmax(row)])
            .collect())
    }

    pub fn predict_values(&self, x: &[Vec<f64>]) -> Result<Vec<f64>, EstimatorError> {
        self.require_task("predict_values", Task::Regression)?;
        Ok(self
            .predict_raw(x)?
            .into_iter()
            .map(|row| row.first().copied().unwrap_or(f64::NAN))
            .collect())
    }
}

/// Softmax over the first `n_classes` logits of each row
fn class_probabilities(
    logits: Vec<Vec<f64>>,
    n_classes: usize,
) -> Result<Vec<Vec<f64>>, EstimatorError> {
    logits
        .into_iter()
        .map(|row| {
            if n_classes == 0 || row.len() < n_classes {
                return Err(EstimatorError::ShapeMismatch);
            }
            let kept = &row[..n_classes];
            let max = kept.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let exp: Vec<f64> = kept.iter().map(|v| (v - max).exp()).collect();
            let total: f64 = exp.iter().sum();
            Ok(exp.into_iter().map(|e| e / total).collect())
        })
        .collect()
}

/// Element-wise mean over ensemble members
pub fn average_outputs(outputs: &[Vec<Vec<f64>>]) -> Result<Vec<Vec<f64>>, EstimatorError> {
    let first = outputs.first().ok_or(EstimatorError::NotFitted)?;
    let mut sum: Vec<Vec<f64>> = first.clone();

    for out in &outputs[1..] {
        if out.len() != sum.len() {
            return Err(EstimatorError::ShapeMismatch);
        }
        for (acc_row, row) in sum.iter_mut().zip(out) {
            if acc_row.len() != row.len() {
                return Err(EstimatorError::ShapeMismatch);
            }
            for (acc, v) in acc_row.iter_mut().zip(row) {
                *acc += v;
            }
        }
    }

    let n = outputs.len() as f64;
    for row in &mut sum {
        for v in row.iter_mut() {
            *v /= n;
        }
    }
    Ok(sum)
}

fn argmax(row: &[f64]) -> usize {
    row.iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(best_i, best_v), (i, &v)| {
            if v > best_v {
                (i, v)
            } else {
                (best_i, best_v)
            }
        })
        .0
}
