use clap::{Parser, Subcommand};
use orambench_runner::{
    executors::{BuildExecutor, RunExecutor},
    logging, BenchConfig, CommandEngine, ExperimentMatrix,
};
use std::{path::PathBuf, process::ExitCode};
use tracing_unwrap::ResultExt;

#[derive(Parser)]
#[command(author, version, about = "Builds and runs OramSimulator experiments")]
struct Cli {
    /// YAML config, defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build every missing artifact of the build matrix
    Build,
    /// Run every incomplete cell of the experiment matrix
    Run,
    /// Print the artifacts and run directories the config expands to
    Matrix,
}

fn main() -> ExitCode {
    logging::init();
    let cli = Cli::parse();

    let config = match cli.config.as_deref() {
        Some(path) => BenchConfig::load(path),
        None => BenchConfig::from_env(),
    }
    .expect_or_log("Failed to load config");

    let matrix = ExperimentMatrix::new(&config);

    match cli.command {
        Commands::Build => {
            let engine = CommandEngine::new(&config.paths.executable)
                .expect_or_log("Failed to locate OramSimulator");
            let report = BuildExecutor::new(&config, &engine)
                .execute(&matrix.build_vectors())
                .expect_or_log("Build phase failed");

            report.log_failures();

            if report.failed.is_empty() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Commands::Run => {
            let engine = CommandEngine::new(&config.paths.executable)
                .expect_or_log("Failed to locate OramSimulator");
            let report = RunExecutor::new(&config, &engine)
                .execute(&matrix.run_configs())
                .expect_or_log("Run phase failed");

            if report.failed.is_empty() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Commands::Matrix => {
            for vector in matrix.build_vectors() {
                println!("{}", vector.artifact_id());
            }
            for run in matrix.run_configs() {
                println!("{}", run.dir_name());
            }

            ExitCode::SUCCESS
        }
    }
}
