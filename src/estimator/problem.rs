use crate::config::model::DEFAULT_CLASSES;
use crate::config::Metric;
use crate::error::EstimatorError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Problem types a Mitra model can be fitted on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProblemType {
    Binary,
    Multiclass,
    Regression,
}

/// Learning task derived from the problem type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Task {
    Classification,
    Regression,
}

impl ProblemType {
    pub const SUPPORTED: [ProblemType; 3] = [
        ProblemType::Binary,
        ProblemType::Multiclass,
        ProblemType::Regression,
    ];

    pub fn task(&self) -> Task {
        match self {
            ProblemType::Binary | ProblemType::Multiclass => Task::Classification,
            ProblemType::Regression => Task::Regression,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProblemType::Binary => "binary",
            ProblemType::Multiclass => "multiclass",
            ProblemType::Regression => "regression",
        }
    }
}

impl Task {
    /// Width of the model's output head
    pub fn dim_output(&self) -> usize {
        match self {
            Task::Classification => DEFAULT_CLASSES,
            Task::Regression => 1,
        }
    }

    pub fn default_metric(&self) -> Metric {
        match self {
            Task::Classification => Metric::LogLoss,
            Task::Regression => Metric::Mse,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Task::Classification => "classification",
            Task::Regression => "regression",
        }
    }
}

impl fmt::Display for ProblemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProblemType {
    type Err = EstimatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "binary" => Ok(ProblemType::Binary),
            "multiclass" => Ok(ProblemType::Multiclass),
            "regression" => Ok(ProblemType::Regression),
            other => Err(EstimatorError::UnsupportedProblemType(other.to_string())),
        }
    }
}

impl FromStr for Task {
    type Err = EstimatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "classification" => Ok(Task::Classification),
            "regression" => Ok(Task::Regression),
            other => Err(EstimatorError::UnsupportedProblemType(other.to_string())),
        }
    }
}
