//! Mitra benchmark tooling
//!
//! Typed loading of the run configuration consumed by the Mitra tabular
//! model, the finetuning orchestration around it, and the provisioning plan
//! that builds the benchmark image.
//!
//! ## Main Components
//!
//! - `config`: run configuration record, construction directives, search space
//! - `estimator`: problem types, ensemble fitting with out-of-memory back-off
//! - `provision`: ordered image setup steps, Dockerfile rendering, execution
//! - `error`: error types shared by the above

pub mod config;
pub mod error;
pub mod estimator;
pub mod provision;

pub use config::RunConfig;
pub use provision::ProvisionPlan;

/// Library errors
pub use anyhow::{Error, Result};
