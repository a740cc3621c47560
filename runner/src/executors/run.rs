use super::ExecutorError;
use crate::{
    config::BenchConfig,
    engine::{Engine, EngineExit, Invocation},
    matrix::RunConfig,
    naming::RunDirName,
};
use orambench_ingest::documents::RUN_STATS_FILE;
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

/// command line of the engine call, kept next to the results
pub const CMDARGS_FILE: &str = "cmdargs";

#[derive(Error, Debug)]
pub enum RunSkip {
    #[error("ORAM not found at {0:?}")]
    MissingArtifact(PathBuf),
    #[error("Trace file {0:?} does not exist")]
    MissingTrace(PathBuf),
}

#[derive(Error, Debug)]
pub enum RunFailure {
    #[error("Failed to prepare {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to start OramSimulator")]
    Spawn(#[source] io::Error),
    #[error("OramSimulator exited with {0:?}")]
    Exit(Option<i32>),
    #[error("OramSimulator succeeded without writing {0:?}")]
    MissingStats(PathBuf),
}

impl RunFailure {
    fn io(path: &Path) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub completed: Vec<RunDirName>,
    pub already_complete: Vec<RunDirName>,
    /// partial directories removed before running again
    pub restarted: Vec<RunDirName>,
    pub skipped: Vec<(RunDirName, RunSkip)>,
    pub failed: Vec<(RunDirName, RunFailure)>,
}

/// Absolute locations every run of a pass shares
struct RunPaths {
    oram_dir: PathBuf,
    experiment_dir: PathBuf,
    temp_dir: PathBuf,
}

/// Runs simulations one after the other, never more than one engine at a time
pub struct RunExecutor<'a> {
    config: &'a BenchConfig,
    engine: &'a dyn Engine,
}

impl<'a> RunExecutor<'a> {
    pub fn new(config: &'a BenchConfig, engine: &'a dyn Engine) -> Self {
        Self { config, engine }
    }

    fn paths(&self) -> Result<RunPaths, ExecutorError> {
        let absolute =
            |path: &Path| std::path::absolute(path).map_err(ExecutorError::directory(path));
        let paths = &self.config.paths;

        let experiment_dir = absolute(paths.experiment_dir.as_path())?;
        fs::create_dir_all(&experiment_dir).map_err(ExecutorError::directory(&experiment_dir))?;

        Ok(RunPaths {
            oram_dir: absolute(paths.oram_dir.as_path())?,
            experiment_dir,
            temp_dir: absolute(paths.working_dir.as_path())?,
        })
    }

    #[instrument(skip_all, level = "info")]
    pub fn execute(&self, runs: &[RunConfig]) -> Result<RunReport, ExecutorError> {
        let paths = self.paths()?;
        let mut report = RunReport::default();

        for (index, run) in runs.iter().enumerate() {
            self.run(run, &paths, &mut report);
            debug!("Done with {}/{}", index + 1, runs.len());
        }

        info!(
            "Completed {}, already complete {}, restarted {}, skipped {}, failed {}",
            report.completed.len(),
            report.already_complete.len(),
            report.restarted.len(),
            report.skipped.len(),
            report.failed.len()
        );

        Ok(report)
    }

    fn run(&self, run: &RunConfig, paths: &RunPaths, report: &mut RunReport) {
        let name = run.dir_name();

        let artifact_dir = paths.oram_dir.join(&run.artifact);
        if !artifact_dir.is_dir() {
            warn!("Skipping {name}: ORAM not found");
            report.skipped.push((name, RunSkip::MissingArtifact(artifact_dir)));
            return;
        }

        let trace_file = match std::path::absolute(&run.trace_file) {
            Ok(path) if path.is_file() => path,
            _ => {
                warn!("Skipping {name}: trace {} not found", run.trace_file.display());
                report
                    .skipped
                    .push((name, RunSkip::MissingTrace(run.trace_file.clone())));
                return;
            }
        };

        let run_dir = paths.experiment_dir.join(name.to_string());
        let stats_file = run_dir.join(RUN_STATS_FILE);

        if run_dir.exists() {
            if stats_file.is_file() {
                debug!("{name} is already complete");
                report.already_complete.push(name);
                return;
            }

            // partial results are never resumed
            warn!("Removing partial run {}", run_dir.display());
            if let Err(err) = fs::remove_dir_all(&run_dir) {
                error!("Failed to remove {}: {err}", run_dir.display());
                report.failed.push((name, RunFailure::io(&run_dir)(err)));
                return;
            }
            report.restarted.push(name.clone());
        }

        info!("Starting sim of {name}");

        match self.simulate(run, paths, &artifact_dir, &trace_file, &run_dir, &stats_file) {
            Ok(()) => {
                info!("Completed sim of {name}");
                report.completed.push(name);
            }
            Err(failure) => {
                error!("Sim of {name} failed: {failure}");
                report.failed.push((name, failure));
            }
        }
    }

    fn simulate(
        &self,
        run: &RunConfig,
        paths: &RunPaths,
        artifact_dir: &Path,
        trace_file: &Path,
        run_dir: &Path,
        stats_file: &Path,
    ) -> Result<(), RunFailure> {
        fs::create_dir_all(run_dir).map_err(RunFailure::io(run_dir))?;

        let invocation = Invocation::run(
            run,
            artifact_dir,
            trace_file,
            run_dir,
            stats_file,
            &paths.temp_dir,
            &self.config.run.k_union,
        );

        let cmdargs = run_dir.join(CMDARGS_FILE);
        fs::write(&cmdargs, invocation.command_line(self.engine.program()))
            .map_err(RunFailure::io(&cmdargs))?;

        match self.engine.invoke(&invocation).map_err(RunFailure::Spawn)? {
            EngineExit::Success if stats_file.is_file() => Ok(()),
            EngineExit::Success => Err(RunFailure::MissingStats(stats_file.to_path_buf())),
            EngineExit::Failure(code) => Err(RunFailure::Exit(code)),
        }
    }
}
