//! Error types for configuration loading, estimator orchestration and provisioning

use crate::estimator::{ProblemType, Task};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("malformed configuration dictionary: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown construction target `{0}`")]
    UnknownTarget(String),

    #[error("target `{target}` expects {expected} positional argument(s), got {got}")]
    TargetArity {
        target: String,
        expected: usize,
        got: usize,
    },

    #[error("invalid device identifier `{0}` (expected cpu, mps, cuda or cuda:<index>)")]
    InvalidDevice(String),

    #[error("`{key}`: default {default} is not one of {values}")]
    ChoiceDefaultNotAllowed {
        key: String,
        default: String,
        values: String,
    },

    #[error("`{0}`: choice has no values")]
    EmptyChoice(String),

    #[error("unknown hyperparameter `{0}`")]
    UnknownKey(String),

    #[error("override `{0}` must have the form key=value")]
    MalformedOverride(String),

    #[error("`{key}` {reason}")]
    Invalid { key: String, reason: String },
}

impl ConfigError {
    pub fn invalid(key: &str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum EstimatorError {
    #[error("unsupported problem_type: {0}")]
    UnsupportedProblemType(String),

    #[error("n_estimators must be at least 1")]
    NoEstimators,

    #[error("training data is empty")]
    EmptyData,

    #[error("features and targets disagree on row count ({features} vs {targets})")]
    RowMismatch { features: usize, targets: usize },

    #[error("{task} requires {expected} targets")]
    TargetMismatch {
        task: &'static str,
        expected: &'static str,
    },

    #[error("{operation} needs a {required} problem, but the estimator was built for {problem}")]
    WrongTask {
        operation: &'static str,
        required: Task,
        problem: ProblemType,
    },

    #[error("sample budget exhausted after out-of-memory retries (support={support}, query={query})")]
    BudgetExhausted { support: usize, query: usize },

    #[error("model has not been fitted")]
    NotFitted,

    #[error("ensemble member outputs do not have the expected shape")]
    ShapeMismatch,

    #[error("no pretrained weights configured for {0}")]
    MissingWeights(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("training failed: {0}")]
    Backend(#[source] anyhow::Error),
}

/// Failure reported by a finetuning backend for a single ensemble member.
#[derive(Error, Debug)]
pub enum TrainError {
    #[error("device ran out of memory")]
    OutOfMemory,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("provisioning plan has no base image")]
    MissingBaseImage,

    #[error("provisioning plan has no steps")]
    NoSteps,

    #[error("step {index} ({kind}) requires `{path}`, which no earlier step provides")]
    MissingPrerequisite {
        index: usize,
        kind: &'static str,
        path: String,
    },

    #[error("step {index} ({kind}) is incomplete: {reason}")]
    InvalidStep {
        index: usize,
        kind: &'static str,
        reason: String,
    },

    #[error("step {index} ({kind}) failed with {status}")]
    StepFailed {
        index: usize,
        kind: &'static str,
        status: String,
    },

    #[error("step {index} ({kind}) could not be started: {source}")]
    Spawn {
        index: usize,
        kind: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to prepare workdir {path}: {source}")]
    Workdir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Parse(#[from] serde_yaml::Error),

    #[error("failed to read plan {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
