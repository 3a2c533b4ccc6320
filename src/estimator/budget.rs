//! Support/query sample budget and its out-of-memory back-off

use crate::config::FinetuneHyperparams;
use crate::error::EstimatorError;
use serde::{Deserialize, Serialize};

/// Below this many support rows the query budget shrinks too
pub const SUPPORT_SHRINK_FLOOR: usize = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleBudget {
    pub support: usize,
    pub query: usize,
}

impl SampleBudget {
    pub fn new(support: usize, query: usize) -> Self {
        Self { support, query }
    }

    pub fn from_hyperparams(hp: &FinetuneHyperparams) -> Self {
        Self::new(hp.max_samples_support, hp.max_samples_query)
    }

    pub fn write_to(&self, hp: &mut FinetuneHyperparams) {
        hp.max_samples_support = self.support;
        hp.max_samples_query = self.query;
    }

    /// Halve the budget after an out-of-memory failure.
    ///
    /// Only support shrinks while it is at least [`SUPPORT_SHRINK_FLOOR`];
    /// after that both halve. Fails once either side would reach zero.
    pub fn shrink(&self) -> Result<Self, EstimatorError> {
        let next = if self.support >= SUPPORT_SHRINK_FLOOR {
            Self::new(self.support / 2, self.query)
        } else {
            Self::new(self.support / 2, self.query / 2)
        };

        if next.support == 0 || next.query == 0 {
            return Err(EstimatorError::BudgetExhausted {
                support: self.support,
                query: self.query,
            });
        }
        Ok(next)
    }
}
