pub mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "mitra_bench")]
#[command(about = "Run configuration, finetuning setup and image provisioning for Mitra benchmarks", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and validate a run configuration
    Check {
        /// Path to the YAML run configuration
        #[arg(long)]
        config: String,
        /// Override a value (key=value), repeatable
        #[arg(long = "set")]
        overrides: Vec<String>,
    },
    /// Print the normalized run configuration
    Render {
        #[arg(long)]
        config: String,
        #[arg(long = "set")]
        overrides: Vec<String>,
        /// Output format: yaml or json
        #[arg(long, default_value = "yaml")]
        format: String,
        /// Write to a file instead of stdout
        #[arg(long)]
        output: Option<String>,
    },
    /// Sample hyperparameter trials from the search space
    Search {
        /// Base run configuration the trials are applied to
        #[arg(long)]
        config: String,
        /// Number of trials (the first is always the default trial)
        #[arg(long, default_value = "10")]
        trials: usize,
        #[arg(long, default_value = "0")]
        seed: u64,
        /// classification or regression
        #[arg(long, default_value = "classification")]
        task: String,
        /// Directory to write one YAML config per trial
        #[arg(long)]
        output: Option<String>,
    },
    /// Show the run configuration the estimator builds for a problem type
    EstimatorConfig {
        /// binary, multiclass or regression
        #[arg(long)]
        problem_type: String,
        /// Pretrained weights path
        #[arg(long)]
        state_dict: Option<String>,
        #[arg(long, default_value = "1")]
        n_estimators: usize,
        /// cpu, mps, cuda or cuda:<index>
        #[arg(long, default_value = "cuda")]
        device: String,
    },
    /// Render the provisioning plan as a Dockerfile
    Dockerfile {
        /// Plan file (built-in tabrepo plan if omitted)
        #[arg(long)]
        plan: Option<String>,
        #[arg(long)]
        output: Option<String>,
    },
    /// Execute the provisioning plan on this machine
    Provision {
        #[arg(long)]
        plan: Option<String>,
        /// Build context that copy steps read from
        #[arg(long, default_value = ".")]
        context: String,
        /// Print commands instead of running them
        #[arg(long)]
        dry_run: bool,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check { config, overrides } => commands::check(&config, &overrides),
        Commands::Render {
            config,
            overrides,
            format,
            output,
        } => commands::render(&config, &overrides, &format, output),
        Commands::Search {
            config,
            trials,
            seed,
            task,
            output,
        } => commands::search(&config, trials, seed, &task, output),
        Commands::EstimatorConfig {
            problem_type,
            state_dict,
            n_estimators,
            device,
        } => commands::estimator_config(&problem_type, state_dict, n_estimators, &device),
        Commands::Dockerfile { plan, output } => commands::dockerfile(plan, output),
        Commands::Provision {
            plan,
            context,
            dry_run,
        } => commands::provision(plan, &context, dry_run),
    }
}
