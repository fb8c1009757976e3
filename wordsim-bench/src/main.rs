//! Word similarity benchmark CLI

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use wordsim_bench::{
    analysis::ComparisonGrouper,
    config::Config,
    experiment::{expand, variables::MODEL, ExperimentDefinition, ExperimentSession, RunContext},
    providers::ModelRegistry,
    reporting::{print_comparisons, print_console_report, JsonResultSink, RunSummary},
};

#[derive(Parser)]
#[command(name = "wordsim-bench")]
#[command(about = "Benchmark LLM word-pair similarity judgements against human gold scores")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an experiment
    Run {
        /// Experiment definition file
        #[arg(short, long)]
        experiment: PathBuf,

        /// Output directory for results
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the variable combinations of an experiment without running it
    Plan {
        /// Experiment definition file
        #[arg(short, long)]
        experiment: PathBuf,
    },

    /// Print comparison tables from a saved run summary
    Compare {
        /// Path to summary.json
        #[arg(short, long)]
        input: PathBuf,

        /// Decimals to round scores to (default: from config)
        #[arg(short, long)]
        precision: Option<u32>,
    },

    /// Generate sample configuration
    InitConfig {
        /// Output path for configuration file
        #[arg(short, long, default_value = "config/models.toml")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let default_filter = if cli.verbose {
        "wordsim_bench=debug,info"
    } else {
        "wordsim_bench=info,warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .init();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load_or_default(),
    };

    match cli.command {
        Commands::Run { experiment, output } => {
            run_experiment(&config, &experiment, output).await?;
        }

        Commands::Plan { experiment } => {
            plan_experiment(&config, &experiment)?;
        }

        Commands::Compare { input, precision } => {
            compare_results(&input, precision.unwrap_or(config.evaluation.score_precision))?;
        }

        Commands::InitConfig { output } => {
            init_config(output)?;
        }
    }

    Ok(())
}

async fn run_experiment(
    config: &Config,
    experiment: &Path,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let definition = ExperimentDefinition::from_file(experiment)?;
    let output_dir = output.unwrap_or_else(|| PathBuf::from(&config.output.output_dir));

    let mut ctx = RunContext::new();
    let sink = JsonResultSink::create(&output_dir, &ctx.run_id)?;
    tracing::info!("Writing results to {}", sink.run_dir().display());

    let dataset_root = experiment.parent().unwrap_or(Path::new("."));
    let mut session = ExperimentSession::new(definition, ModelRegistry::new(config), Box::new(sink))?
        .with_config(config)
        .with_dataset_root(dataset_root);

    let interrupted = tokio::select! {
        _ = session.run(&mut ctx) => false,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted, writing results collected so far");
            true
        }
    };

    let summary = session.finish(&ctx, interrupted)?;
    print_console_report(&summary);
    Ok(())
}

fn plan_experiment(config: &Config, experiment: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let definition = ExperimentDefinition::from_file(experiment)?;
    let combinations = expand(&definition.matrix());

    println!("Experiment: {}", definition.name);
    println!(
        "Combinations: {} ({} trial(s) each)",
        combinations.len(),
        definition.trials
    );
    println!("{:-<60}", "");

    if let Some(models) = definition.variables.iter().find(|a| a.name == MODEL) {
        println!("Models:");
        for spec in &models.values {
            println!("  {}  {}", spec, config.display_name(spec).unwrap_or("(not in config)"));
        }
        println!();
    }

    for (i, vars) in combinations.iter().enumerate() {
        println!("  {:>4}  {}", i, vars.label());
    }

    Ok(())
}

fn compare_results(input: &Path, precision: u32) -> Result<(), Box<dyn std::error::Error>> {
    let summary = RunSummary::from_file(input)?;
    println!("Run {} of {}", summary.run_id, summary.experiment);

    let groups = summary.regroup(&ComparisonGrouper::with_precision(precision));
    if groups.is_empty() {
        println!("No variable pair has two or more values to compare");
    }
    print_comparisons(&groups);
    Ok(())
}

fn init_config(output: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();
    config.save_toml(&output)?;
    println!("Configuration written to: {}", output.display());
    Ok(())
}
