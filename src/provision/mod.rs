pub mod plan;
pub mod runner;
pub mod step;

pub use plan::ProvisionPlan;
pub use runner::{DryRunRunner, ProvisionReport, Provisioner, ShellRunner, StepOutcome, StepRunner};
pub use step::{ShellCommand, Step};
