//! CLI command implementations

use anyhow::{Context, Result};
use mitra_bench::config::{Device, RunConfig, SearchSpace};
use mitra_bench::estimator::{MitraParams, ProblemType, Task};
use mitra_bench::provision::{DryRunRunner, ProvisionPlan, Provisioner, ShellRunner};
use std::fs;
use std::path::Path;
use tracing::info;

fn load_config(path: &str, overrides: &[String]) -> Result<RunConfig> {
    let mut config =
        RunConfig::load(path).with_context(|| format!("Failed to load run config {}", path))?;
    config
        .apply_overrides(overrides)
        .context("Failed to apply overrides")?;
    Ok(config)
}

fn load_plan(plan: Option<String>) -> Result<ProvisionPlan> {
    match plan {
        Some(path) => ProvisionPlan::load(&path)
            .with_context(|| format!("Failed to load provisioning plan {}", path)),
        None => Ok(ProvisionPlan::tabrepo()),
    }
}

fn write_or_print(content: &str, output: Option<String>) -> Result<()> {
    match output {
        Some(path) => {
            fs::write(&path, content).with_context(|| format!("Failed to write {}", path))?;
            println!("Wrote {}", path);
        }
        None => print!("{}", content),
    }
    Ok(())
}

pub fn check(path: &str, overrides: &[String]) -> Result<()> {
    let config = load_config(path, overrides)?;
    let hp = &config.hyperparams_finetuning;

    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Run configuration OK: {}", path);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("  Model:          {}", config.model_name);
    println!("  Device:         {}", config.device());
    println!("  Seed:           {}", config.seed);
    println!("  Optimizer:      {:?} (lr={}, wd={})", hp.optimizer, hp.lr, hp.weight_decay);
    println!("  Epochs:         {} (patience {})", hp.max_epochs, hp.early_stopping_patience);
    println!(
        "  Samples:        support={} query={}",
        hp.max_samples_support, hp.max_samples_query
    );
    println!("  LR scheduler:   {}", hp.lr_scheduler_enabled());
    println!("  Metric:         {:?}", hp.metric);
    println!("  Precision:      {:?}", hp.precision);
    println!(
        "  Weights:        {}",
        hp.path_to_weights.as_deref().unwrap_or("(none)")
    );
    Ok(())
}

pub fn render(path: &str, overrides: &[String], format: &str, output: Option<String>) -> Result<()> {
    let config = load_config(path, overrides)?;
    let content = match format {
        "yaml" => config.to_yaml_string()?,
        "json" => format!("{}\n", serde_json::to_string_pretty(&config)?),
        other => anyhow::bail!("Unknown format: {}. Use yaml or json", other),
    };
    write_or_print(&content, output)
}

pub fn search(path: &str, trials: usize, seed: u64, task: &str, output: Option<String>) -> Result<()> {
    let base = load_config(path, &[])?;
    let task: Task = task.parse()?;
    let space = SearchSpace::default();
    space.validate()?;

    println!(
        "Search space: {} configurations for {}; sampling {} (seed {})",
        space.cardinality(task),
        task,
        trials,
        seed
    );

    if let Some(dir) = &output {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir))?;
    }

    for (i, trial) in space.sample_many(task, trials, seed).iter().enumerate() {
        let mut config = base.clone();
        trial.apply(&mut config);
        config
            .validate()
            .with_context(|| format!("Trial {} produced an invalid config", i))?;

        match &output {
            Some(dir) => {
                let file = Path::new(dir).join(format!("trial-{:03}.yaml", i));
                config.save(&file)?;
                info!(trial = i, path = %file.display(), "wrote trial config");
            }
            None => println!("[{}] {}", i, serde_json::to_string(trial)?),
        }
    }
    Ok(())
}

pub fn estimator_config(
    problem_type: &str,
    state_dict: Option<String>,
    n_estimators: usize,
    device: &str,
) -> Result<()> {
    let problem: ProblemType = problem_type.parse()?;
    let device: Device = device.parse()?;
    let params = MitraParams {
        n_estimators,
        device,
        state_dict,
        ..Default::default()
    };
    let config = params.to_run_config(problem)?;
    print!("{}", config.to_yaml_string()?);
    Ok(())
}

pub fn dockerfile(plan: Option<String>, output: Option<String>) -> Result<()> {
    let plan = load_plan(plan)?;
    plan.validate()?;
    write_or_print(&plan.render_dockerfile(), output)
}

pub fn provision(plan: Option<String>, context: &str, dry_run: bool) -> Result<()> {
    let plan = load_plan(plan)?;

    println!("╔═══════════════════════════════════════════════════════════════╗");
    println!("║       Provisioning benchmark environment                      ║");
    println!("╚═══════════════════════════════════════════════════════════════╝");
    println!("  Base image: {}", plan.base_image);
    println!("  Workdir:    {}", plan.workdir);
    println!("  Steps:      {}", plan.steps.len());
    println!();

    let report = if dry_run {
        Provisioner::new(DryRunRunner::default(), context).execute(&plan)?
    } else {
        Provisioner::new(ShellRunner, context)
            .with_progress(true)
            .execute(&plan)?
    };

    println!(
        "\n✓ {} steps completed in {:.1}s",
        report.steps_run,
        report.elapsed.as_secs_f64()
    );
    Ok(())
}
