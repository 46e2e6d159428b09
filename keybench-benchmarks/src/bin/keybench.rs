//! Command-line runner for key encoding experiments

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use keybench_benchmarks::benchmarks::key_encoding::KeyEncoding;
use keybench_benchmarks::benchmarks::scenario::{run_experiment, METRIC_INDEX_SIZE};
use keybench_benchmarks::benchmarks::ScenarioSuite;
use keybench_benchmarks::config::{load_config, save_config, ConfigSource};
use keybench_benchmarks::metrics::METRIC_THROUGHPUT;
use keybench_benchmarks::report::{render_report, ReportConfig, ReportGenerator};
use keybench_benchmarks::utils::{format_bytes, format_duration, format_rate};
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;

#[derive(Parser)]
#[command(name = "keybench")]
#[command(about = "Compare primary-key encodings under weighted workloads")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an experiment and print the statistics tables
    Run {
        /// TOML configuration file; defaults plus KEYBENCH_* overrides otherwise
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Scenario preset to take the operation mix from
        #[arg(short, long)]
        scenario: Option<String>,

        /// Key encodings to compare (comma separated)
        #[arg(long, value_delimiter = ',')]
        variants: Vec<String>,

        /// Variant the others are compared against
        #[arg(long)]
        baseline: Option<String>,

        /// Repetitions per variant
        #[arg(short, long)]
        runs: Option<usize>,

        /// Operations per run
        #[arg(long)]
        ops: Option<u64>,

        /// Concurrent workers
        #[arg(short, long)]
        workers: Option<usize>,

        /// Write CSV and JSON exports into this directory
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List scenario presets and key encodings
    List,
    /// Write the default configuration as TOML
    InitConfig {
        #[arg(default_value = "keybench.toml")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(format!(
                    "keybench={},keybench_benchmarks={}",
                    level, level
                ))
            }),
        )
        .init();

    match cli.command {
        Commands::Run {
            config,
            scenario,
            variants,
            baseline,
            runs,
            ops,
            workers,
            output,
        } => {
            let mut config = match config {
                Some(path) => {
                    let mut config = load_config(ConfigSource::File(path.clone()))
                        .with_context(|| format!("failed to load {}", path.display()))?;
                    config.apply_env_overrides();
                    config
                }
                None => load_config(ConfigSource::Environment)?,
            };

            if let Some(name) = scenario {
                let suite = ScenarioSuite::new();
                let Some(preset) = suite.get(&name) else {
                    bail!("unknown scenario '{}', expected one of {:?}", name, suite.names());
                };
                config.apply_preset(preset);
            }
            if !variants.is_empty() {
                config.variants = variants;
            }
            if let Some(baseline) = baseline {
                config.baseline = baseline;
            }
            if let Some(runs) = runs {
                config.runs = runs;
            }
            if let Some(ops) = ops {
                config.total_ops = ops;
            }
            if let Some(workers) = workers {
                config.workers = workers;
            }
            config.validate().context("invalid configuration")?;

            let started = Instant::now();
            let experiment = run_experiment(&config).await?;
            println!("{}", render_report(&experiment));
            for variant in experiment.variant_order() {
                let throughput = experiment
                    .stats(variant, METRIC_THROUGHPUT)
                    .map_or(0.0, |s| s.median);
                let index_size = experiment
                    .stats(variant, METRIC_INDEX_SIZE)
                    .map_or(0.0, |s| s.median);
                println!(
                    "{:<10} median {}, index {}",
                    variant,
                    format_rate(throughput),
                    format_bytes(index_size as u64)
                );
            }
            info!("Experiment {} finished in {}", experiment.id, format_duration(started.elapsed()));

            if let Some(output_dir) = output {
                let generator = ReportGenerator::new(ReportConfig {
                    output_dir,
                    ..ReportConfig::default()
                });
                for path in generator.generate_report(&experiment)? {
                    println!("wrote {}", path.display());
                }
            }
        }
        Commands::List => {
            println!("Scenarios:");
            for preset in ScenarioSuite::new().presets() {
                println!(
                    "  {:<24} {:>3}/{:>3}/{:>3}  preload {:>9}  {}",
                    preset.name,
                    preset.insert,
                    preset.read,
                    preset.update,
                    preset.initial_dataset,
                    preset.description
                );
            }
            println!("\nKey encodings:");
            for encoding in KeyEncoding::ALL {
                println!("  {:<24} {}", encoding.as_str(), encoding.description());
            }
        }
        Commands::InitConfig { path } => {
            let config = load_config(ConfigSource::Default)?;
            save_config(&config, &path)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("wrote {}", path.display());
        }
    }

    Ok(())
}
