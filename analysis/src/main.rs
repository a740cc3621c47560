use clap::{Parser, Subcommand};
use orambench_analysis::{write_report_file, write_table_file, Aggregator, EnduranceModel};
use orambench_runner::{logging, BenchConfig};
use std::{path::PathBuf, process::ExitCode};
use tracing::warn;
use tracing_unwrap::ResultExt;

#[derive(Parser)]
#[command(author, version, about = "Aggregates finished OramSimulator runs")]
struct Cli {
    /// YAML config, defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the metrics of every complete run
    Aggregate {
        #[arg(short, long, default_value = "recsys_sim_results.csv")]
        output: PathBuf,
    },
    /// Write the metrics extended with the drive lifetime projection
    Report {
        #[arg(short, long, default_value = "recsys_sim_results_processed.csv")]
        output: PathBuf,
        /// full drive writes the medium is rated for
        #[arg(long, default_value_t = 5437.0)]
        rated_drive_writes: f64,
        /// time per round spent outside the simulation
        #[arg(long, default_value_t = 2.0)]
        overhead_minutes: f64,
    },
}

fn main() -> ExitCode {
    logging::init();
    let cli = Cli::parse();

    let config = match cli.config.as_deref() {
        Some(path) => BenchConfig::load(path),
        None => BenchConfig::from_env(),
    }
    .expect_or_log("Failed to load config");

    let aggregation = Aggregator::new(&config)
        .aggregate()
        .expect_or_log("Failed to aggregate runs");

    if !aggregation.excluded.is_empty() {
        warn!("{} runs were excluded", aggregation.excluded.len());
    }

    match cli.command {
        Commands::Aggregate { output } => write_table_file(&aggregation.rows, &output),
        Commands::Report {
            output,
            rated_drive_writes,
            overhead_minutes,
        } => {
            let model = EnduranceModel {
                rated_drive_writes,
                overhead_minutes,
            };
            write_report_file(&aggregation.rows, &model, &output)
        }
    }
    .expect_or_log("Failed to write results");

    ExitCode::SUCCESS
}
