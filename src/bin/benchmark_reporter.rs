//! keybench report generator
//!
//! Re-renders the tables of an exported experiment and optionally rewrites
//! its CSV and JSON exports, possibly against a different baseline variant.

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command};
use keybench::report::{load_experiment, render_report, ReportConfig, ReportGenerator};
use std::path::PathBuf;
use tracing::info;

fn main() -> Result<()> {
    let matches = Command::new("keybench Benchmark Reporter")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Renders statistics tables and exports from an experiment JSON file")
        .arg(
            Arg::new("input")
                .short('i')
                .long("input")
                .value_name("FILE")
                .help("Experiment JSON written by `keybench run --output`")
                .required(true),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("DIR")
                .help("Write CSV and JSON exports into this directory"),
        )
        .arg(
            Arg::new("baseline")
                .short('b')
                .long("baseline")
                .value_name("VARIANT")
                .help("Compare against this variant instead of the recorded baseline"),
        )
        .arg(
            Arg::new("no-raw")
                .long("no-raw")
                .help("Skip the per-run values CSV")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let level = if matches.get_flag("verbose") { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(format!(
            "benchmark_reporter={},keybench_benchmarks={}",
            level, level
        )))
        .init();

    let input = matches
        .get_one::<String>("input")
        .map(PathBuf::from)
        .context("--input is required")?;
    let mut experiment = load_experiment(&input)
        .with_context(|| format!("failed to load {}", input.display()))?;
    info!(
        "Loaded experiment {} ({} variants, started {})",
        experiment.id,
        experiment.variants.len(),
        experiment.started_at
    );

    if let Some(baseline) = matches.get_one::<String>("baseline") {
        experiment
            .rebaseline(baseline)
            .with_context(|| format!("cannot compare against '{}'", baseline))?;
    }

    println!("{}", render_report(&experiment));

    if let Some(output_dir) = matches.get_one::<String>("output") {
        let generator = ReportGenerator::new(ReportConfig {
            output_dir: PathBuf::from(output_dir),
            include_raw_data: !matches.get_flag("no-raw"),
            include_json: true,
        });
        for path in generator.generate_report(&experiment)? {
            println!("wrote {}", path.display());
        }
    }

    Ok(())
}
