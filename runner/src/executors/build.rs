use super::ExecutorError;
use crate::{
    config::BenchConfig,
    engine::{Engine, EngineExit, Invocation},
    naming::ArtifactId,
    oram::OramParameterVector,
    solver::{Capacity, CapacitySolver, NumericalError},
};
use rayon::{prelude::*, ThreadPoolBuilder};
use std::{
    collections::BTreeSet,
    fs,
    path::PathBuf,
    sync::atomic::{AtomicU64, Ordering},
};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BuildFailure {
    #[error("Could not solve the eviction width")]
    Solver(#[from] NumericalError),
    #[error("OramSimulator failed {attempts} times")]
    Exhausted { attempts: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FailedBuild {
    pub id: ArtifactId,
    pub failure: BuildFailure,
}

/// One artifact that has to be built, owned by exactly one worker
#[derive(Debug, Clone)]
pub struct BuildJob {
    pub vector: OramParameterVector,
    pub id: ArtifactId,
    pub capacity: Capacity,
    pub output: PathBuf,
}

/// The build matrix partitioned before any worker starts
#[derive(Debug, Default)]
pub struct BuildPlan {
    pub jobs: Vec<BuildJob>,
    pub skipped: Vec<ArtifactId>,
    pub failed: Vec<FailedBuild>,
}

impl BuildReport {
    /// summary of everything that is still missing, kept visible under `RUST_LOG=warn`
    pub fn log_failures(&self) {
        for failed in self.failed.iter() {
            error!("{} failed: {}", failed.id, failed.failure);
        }
    }
}

#[derive(Debug, Default)]
pub struct BuildReport {
    pub built: Vec<ArtifactId>,
    /// already present before the pass started
    pub skipped: Vec<ArtifactId>,
    pub failed: Vec<FailedBuild>,
}

/// Builds artifacts on a fixed size thread pool
pub struct BuildExecutor<'a> {
    config: &'a BenchConfig,
    engine: &'a dyn Engine,
    solver: CapacitySolver,
}

impl<'a> BuildExecutor<'a> {
    pub fn new(config: &'a BenchConfig, engine: &'a dyn Engine) -> Self {
        Self {
            config,
            engine,
            solver: CapacitySolver::from(&config.solver),
        }
    }

    /// Decide for every vector whether it is built, skipped or failed.
    ///
    /// This is the only place the artifact directory is checked. Jobs have
    /// unique identifiers, so no two workers ever write the same artifact.
    pub fn plan(&self, vectors: &[OramParameterVector]) -> BuildPlan {
        let mut plan = BuildPlan::default();
        let mut seen = BTreeSet::new();

        for vector in vectors {
            let id = vector.artifact_id();

            if !seen.insert(id.clone()) {
                warn!("Dropping duplicate build of {id}");
                continue;
            }

            let output = self.config.paths.artifact_dir(&id);
            if output.is_dir() {
                info!("{} already exists, skipping", output.display());
                plan.skipped.push(id);
                continue;
            }

            match vector
                .eviction_width()
                .and_then(|width| self.solver.solve(width))
            {
                Ok(capacity) => {
                    debug!(
                        "A is set to {} for {id} (Z = {})",
                        capacity.max_real_blocks, capacity.width
                    );
                    plan.jobs.push(BuildJob {
                        vector: vector.clone(),
                        id,
                        capacity,
                        output,
                    });
                }
                Err(err) => {
                    error!("Cannot build {id}: {err}");
                    plan.failed.push(FailedBuild {
                        id,
                        failure: err.into(),
                    });
                }
            }
        }

        plan
    }

    /// build every missing artifact, one failure never stops the others
    #[instrument(skip_all, level = "info")]
    pub fn execute(&self, vectors: &[OramParameterVector]) -> Result<BuildReport, ExecutorError> {
        let oram_dir = &self.config.paths.oram_dir;
        fs::create_dir_all(oram_dir).map_err(ExecutorError::directory(oram_dir))?;

        let plan = self.plan(vectors);
        let threads = self.config.build.threads;
        debug!("Starting thread pool with {threads} threads");

        let pool = ThreadPoolBuilder::new().num_threads(threads).build()?;

        // general counters to provide a progress bar
        let total = plan.jobs.len() as u64;
        let processed = AtomicU64::new(0);

        let results = pool.install(|| {
            plan.jobs
                .par_iter()
                .map(|job| {
                    let result = self.build(job);
                    info!(
                        "Done with {}/{total}",
                        processed.fetch_add(1, Ordering::SeqCst) + 1
                    );
                    (job.id.clone(), result)
                })
                .collect::<Vec<_>>()
        });

        let mut report = BuildReport {
            built: Vec::new(),
            skipped: plan.skipped,
            failed: plan.failed,
        };

        for (id, result) in results {
            match result {
                Ok(()) => report.built.push(id),
                Err(failure) => report.failed.push(FailedBuild { id, failure }),
            }
        }

        info!(
            "Built {}, skipped {}, failed {}",
            report.built.len(),
            report.skipped.len(),
            report.failed.len()
        );

        Ok(report)
    }

    /// retry serially until the engine succeeds or the attempts run out
    fn build(&self, job: &BuildJob) -> Result<(), BuildFailure> {
        let limit = self.config.build.retry_limit;
        let invocation = Invocation::build(
            &job.vector,
            &job.capacity,
            &job.output,
            &self.config.paths.working_dir,
        );

        info!("Generating {}", job.id);

        for attempt in 1..=limit {
            match self.engine.invoke(&invocation) {
                Ok(EngineExit::Success) => {
                    info!("Finished {}", job.id);
                    return Ok(());
                }
                Ok(EngineExit::Failure(code)) => {
                    warn!(
                        "OramSimulator failed for {} with {code:?} (attempt {attempt}/{limit})",
                        job.id
                    );
                }
                Err(err) => {
                    warn!(
                        "Failed to start OramSimulator for {}: {err} (attempt {attempt}/{limit})",
                        job.id
                    );
                }
            }

            // a leftover directory would mark the artifact as built on the next pass
            if job.output.exists() {
                if let Err(err) = fs::remove_dir_all(&job.output) {
                    error!("Failed to remove partial artifact {}: {err}", job.output.display());
                }
            }
        }

        error!("{} FAILED after {limit} attempts", job.id);

        Err(BuildFailure::Exhausted { attempts: limit })
    }
}
