pub mod build;
pub mod run;

pub use build::{BuildExecutor, BuildFailure, BuildJob, BuildPlan, BuildReport, FailedBuild};
pub use run::{RunExecutor, RunFailure, RunReport, RunSkip};

use std::path::PathBuf;
use thiserror::Error;

/// Setup failures that abort a whole phase, as opposed to per-cell failures
/// which end up in the phase report
#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Failed to start the worker pool")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("Failed to prepare directory {path:?}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ExecutorError {
    pub(crate) fn directory(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Directory { path, source }
    }
}

/// In-process engines standing in for the OramSimulator
#[cfg(test)]
pub(crate) mod stub {
    use crate::engine::{Engine, EngineExit, Invocation, BUILD_SUBCOMMAND};
    use std::{
        ffi::OsStr,
        fs, io,
        path::{Path, PathBuf},
        sync::Mutex,
    };

    /// Counts invocations and behaves like the engine on success: builds
    /// create the `--output` directory, runs write the `--output_file`.
    pub struct StubEngine {
        pub invocations: Mutex<Vec<Invocation>>,
        fails: Box<dyn Fn(&Invocation) -> bool + Sync>,
    }

    impl StubEngine {
        pub fn succeeding() -> Self {
            Self::failing_when(|_| false)
        }

        pub fn failing_when(fails: impl Fn(&Invocation) -> bool + Sync + 'static) -> Self {
            Self {
                invocations: Mutex::new(Vec::new()),
                fails: Box::new(fails),
            }
        }

        pub fn count(&self) -> usize {
            self.invocations.lock().unwrap().len()
        }

        pub fn count_where(&self, predicate: impl Fn(&Invocation) -> bool) -> usize {
            self.invocations
                .lock()
                .unwrap()
                .iter()
                .filter(|invocation| predicate(invocation))
                .count()
        }
    }

    impl Engine for StubEngine {
        fn program(&self) -> &Path {
            Path::new("OramSimulator")
        }

        fn invoke(&self, invocation: &Invocation) -> io::Result<EngineExit> {
            self.invocations.lock().unwrap().push(invocation.clone());

            if (self.fails)(invocation) {
                // failed builds may leave a half written artifact behind
                if let Some(output) = invocation.value_of("output") {
                    fs::create_dir_all(output)?;
                }
                return Ok(EngineExit::Failure(Some(1)));
            }

            if invocation.subcommand() == Some(OsStr::new(BUILD_SUBCOMMAND)) {
                let output = invocation.value_of("output").map(PathBuf::from);
                fs::create_dir_all(output.ok_or(io::ErrorKind::InvalidInput)?)?;
            } else {
                let output = invocation.value_of("output_file").map(PathBuf::from);
                fs::write(
                    output.ok_or(io::ErrorKind::InvalidInput)?,
                    "rounds = 1\nsamples_per_round = 1\n",
                )?;
            }

            Ok(EngineExit::Success)
        }
    }
}
