//! All-or-nothing execution of a provisioning plan

use super::plan::ProvisionPlan;
use super::step::ShellCommand;
use crate::error::ProvisionError;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Exit status of one step's process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepOutcome {
    /// `None` when the process was killed by a signal
    pub code: Option<i32>,
}

impl StepOutcome {
    pub fn success() -> Self {
        Self { code: Some(0) }
    }

    pub fn failure(code: i32) -> Self {
        Self { code: Some(code) }
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }

    fn describe(&self) -> String {
        match self.code {
            Some(code) => format!("exit code {}", code),
            None => "termination by signal".to_string(),
        }
    }
}

pub trait StepRunner {
    /// Called once before the first step with the plan's workdir
    fn prepare(&mut self, _workdir: &Path) -> std::io::Result<()> {
        Ok(())
    }

    fn run(&mut self, command: &ShellCommand) -> std::io::Result<StepOutcome>;
}

/// Runs each command as a child process
pub struct ShellRunner;

impl StepRunner for ShellRunner {
    /// Every command runs inside the workdir, so it has to exist first
    fn prepare(&mut self, workdir: &Path) -> std::io::Result<()> {
        std::fs::create_dir_all(workdir)
    }

    fn run(&mut self, command: &ShellCommand) -> std::io::Result<StepOutcome> {
        let status = Command::new(&command.program)
            .args(&command.args)
            .current_dir(&command.cwd)
            .status()?;
        Ok(StepOutcome {
            code: status.code(),
        })
    }
}

/// Records commands without running them; every step succeeds
#[derive(Debug, Default)]
pub struct DryRunRunner {
    pub commands: Vec<ShellCommand>,
}

impl StepRunner for DryRunRunner {
    fn prepare(&mut self, workdir: &Path) -> std::io::Result<()> {
        println!("[dry-run] mkdir -p {}", workdir.display());
        Ok(())
    }

    fn run(&mut self, command: &ShellCommand) -> std::io::Result<StepOutcome> {
        println!("[dry-run] ({}) {}", command.cwd.display(), command);
        self.commands.push(command.clone());
        Ok(StepOutcome::success())
    }
}

/// Produced only when every step succeeded
#[derive(Debug, Clone)]
pub struct ProvisionReport {
    pub base_image: String,
    pub steps_run: usize,
    pub elapsed: Duration,
}

pub struct Provisioner<R: StepRunner> {
    runner: R,
    context: PathBuf,
    show_progress: bool,
}

impl<R: StepRunner> Provisioner<R> {
    /// `context` is the directory `copy` steps read from
    pub fn new(runner: R, context: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            context: context.into(),
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Validate, then run every step in order. The first failing step aborts
    /// the whole run; no retries.
    pub fn execute(&mut self, plan: &ProvisionPlan) -> Result<ProvisionReport, ProvisionError> {
        plan.validate()?;

        let start = Instant::now();
        let workdir = plan.workdir_path();
        let total = plan.steps.len();

        self.runner
            .prepare(&workdir)
            .map_err(|source| ProvisionError::Workdir {
                path: workdir.clone(),
                source,
            })?;

        let progress = self.show_progress.then(|| {
            let pb = ProgressBar::new(total as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            pb
        });

        info!(base_image = %plan.base_image, steps = total, "provisioning started");

        for (index, step) in plan.steps.iter().enumerate() {
            let command = step.command(&workdir, &self.context);
            if let Some(pb) = &progress {
                pb.set_message(step.kind());
            }
            info!(step = index + 1, total, kind = step.kind(), command = %command, "running step");

            let outcome = self
                .runner
                .run(&command)
                .map_err(|source| ProvisionError::Spawn {
                    index,
                    kind: step.kind(),
                    source,
                });
            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(e) => {
                    abandon(&progress);
                    error!(step = index + 1, error = %e, "provisioning aborted");
                    return Err(e);
                }
            };

            if !outcome.is_success() {
                abandon(&progress);
                error!(step = index + 1, kind = step.kind(), status = %outcome.describe(), "provisioning aborted");
                return Err(ProvisionError::StepFailed {
                    index,
                    kind: step.kind(),
                    status: outcome.describe(),
                });
            }

            if let Some(pb) = &progress {
                pb.inc(1);
            }
        }

        if let Some(pb) = &progress {
            pb.finish_with_message("done");
        }

        let report = ProvisionReport {
            base_image: plan.base_image.clone(),
            steps_run: total,
            elapsed: start.elapsed(),
        };
        info!(steps = report.steps_run, seconds = report.elapsed.as_secs_f64(), "provisioning finished");
        Ok(report)
    }
}

fn abandon(progress: &Option<ProgressBar>) {
    if let Some(pb) = progress {
        pb.abandon_with_message("failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Fails the n-th command (0-based), succeeds otherwise
    struct FailAt {
        fail_at: usize,
        seen: Vec<String>,
    }

    impl StepRunner for FailAt {
        fn run(&mut self, command: &ShellCommand) -> std::io::Result<StepOutcome> {
            let n = self.seen.len();
            self.seen.push(command.program.clone());
            if n == self.fail_at {
                Ok(StepOutcome::failure(2))
            } else {
                Ok(StepOutcome::success())
            }
        }
    }

    #[test]
    fn test_dry_run_visits_every_step_in_order() {
        let plan = ProvisionPlan::tabrepo();
        let mut provisioner = Provisioner::new(DryRunRunner::default(), "/build");
        let report = provisioner.execute(&plan).unwrap();
        assert_eq!(report.steps_run, 6);

        let programs: Vec<&str> = provisioner
            .runner()
            .commands
            .iter()
            .map(|c| c.program.as_str())
            .collect();
        assert_eq!(programs, vec!["git", "bash", "cp", "python", "python", "chmod"]);
        assert_eq!(
            provisioner.runner().commands[1].cwd,
            PathBuf::from("/opt/benchmark/autogluon")
        );
        assert_eq!(provisioner.runner().commands[2].args[1], "/build/.");
    }

    #[test]
    fn test_first_failure_aborts() {
        let plan = ProvisionPlan::tabrepo();
        let mut provisioner = Provisioner::new(
            FailAt {
                fail_at: 1,
                seen: Vec::new(),
            },
            ".",
        );
        match provisioner.execute(&plan) {
            Err(ProvisionError::StepFailed { index, kind, status }) => {
                assert_eq!(index, 1);
                assert_eq!(kind, "run_script");
                assert_eq!(status, "exit code 2");
            }
            other => panic!("expected step failure, got {:?}", other),
        }
        assert_eq!(provisioner.runner().seen.len(), 2);
    }

    struct ReadOnlyHost {
        ran: usize,
    }

    impl StepRunner for ReadOnlyHost {
        fn prepare(&mut self, _workdir: &Path) -> std::io::Result<()> {
            Err(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only file system",
            ))
        }

        fn run(&mut self, _command: &ShellCommand) -> std::io::Result<StepOutcome> {
            self.ran += 1;
            Ok(StepOutcome::success())
        }
    }

    #[test]
    fn test_unprepared_workdir_runs_nothing() {
        let mut provisioner = Provisioner::new(ReadOnlyHost { ran: 0 }, ".");
        match provisioner.execute(&ProvisionPlan::tabrepo()) {
            Err(ProvisionError::Workdir { path, .. }) => {
                assert_eq!(path, PathBuf::from("/opt/benchmark"));
            }
            other => panic!("expected workdir failure, got {:?}", other),
        }
        assert_eq!(provisioner.runner().ran, 0);
    }

    #[test]
    fn test_invalid_plan_runs_nothing() {
        let mut plan = ProvisionPlan::tabrepo();
        plan.steps.swap(0, 1);
        let mut provisioner = Provisioner::new(DryRunRunner::default(), ".");
        assert!(provisioner.execute(&plan).is_err());
        assert!(provisioner.runner().commands.is_empty());
    }
}
