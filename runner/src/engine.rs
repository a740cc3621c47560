//! The external OramSimulator, driven through command-line flags and exit status.

use crate::{matrix::RunConfig, oram::OramParameterVector, solver::Capacity};
use std::{
    ffi::{OsStr, OsString},
    io,
    path::{Path, PathBuf},
    process::{Command, ExitStatus},
};
use tracing::debug;

pub const BUILD_SUBCOMMAND: &str = "create";
pub const RUN_SUBCOMMAND: &str = "recsys_sim";

/// Arguments and working directory of one engine call
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    pub args: Vec<OsString>,
    pub working_dir: Option<PathBuf>,
}

impl Invocation {
    fn new(subcommand: &str) -> Self {
        Self {
            args: vec![subcommand.into()],
            working_dir: None,
        }
    }

    fn flag(mut self, name: &str, value: impl AsRef<OsStr>) -> Self {
        self.args.push(format!("--{name}").into());
        self.args.push(value.as_ref().to_owned());
        self
    }

    fn switch(mut self, name: &str) -> Self {
        self.args.push(format!("--{name}").into());
        self
    }

    /// `create` call building `vector` into `output`
    pub fn build(
        vector: &OramParameterVector,
        capacity: &Capacity,
        output: &Path,
        temp_dir: &Path,
    ) -> Self {
        Self::new(BUILD_SUBCOMMAND)
            .flag("type", vector.variant.name())
            .flag("size", vector.total_size().to_string())
            .flag("block_size", vector.entry_size.to_string())
            .flag("page_size", vector.page_size.to_string())
            .flag("position_map_size", vector.position_map_size.to_string())
            .flag("output", output)
            .flag("tree_order", vector.tree_order.to_string())
            .flag(
                "num_accesses_per_eviction",
                capacity.max_real_blocks.to_string(),
            )
            .flag("load_factor", vector.load_factor.to_string())
            .flag("temp_dir", temp_dir)
            .flag("levels_per_page", vector.levels_per_page.to_string())
            .switch("fast_init")
            .flag("crypto_module", &vector.crypto_module)
    }

    /// `recsys_sim` call of one run, executed inside `run_dir`
    ///
    /// Every path handed in must be absolute since the engine runs with
    /// `run_dir` as its working directory.
    pub fn run(
        run: &RunConfig,
        artifact_dir: &Path,
        trace_file: &Path,
        run_dir: &Path,
        output_file: &Path,
        temp_dir: &Path,
        k_union: &str,
    ) -> Self {
        let mut invocation = Self::new(RUN_SUBCOMMAND)
            .flag("memory", artifact_dir)
            .flag("rounds", run.num_rounds.to_string())
            .flag("samples_per_round", run.cell.samples_per_round.to_string())
            .flag("sample_file", trace_file)
            .flag("buffer", run.buffer);

        invocation
            .args
            .push(format!("--unsafe_optimization={}", run.unsafe_optimization).into());

        invocation = invocation
            .flag("temp_dir", temp_dir)
            .flag("output_file", output_file)
            .flag("epsilon", run.epsilon.to_string())
            .flag("k_union", k_union);
        invocation.working_dir = Some(run_dir.to_path_buf());

        invocation
    }

    /// value following `--{name}`
    pub fn value_of(&self, name: &str) -> Option<&OsStr> {
        let flag = format!("--{name}");

        self.args
            .iter()
            .position(|arg| arg.as_os_str() == OsStr::new(&flag))
            .and_then(|index| self.args.get(index + 1))
            .map(OsString::as_os_str)
    }

    pub fn subcommand(&self) -> Option<&OsStr> {
        self.args.first().map(OsString::as_os_str)
    }

    /// space separated program and arguments, as written to `cmdargs`
    pub fn command_line(&self, program: &Path) -> String {
        std::iter::once(program.as_os_str())
            .chain(self.args.iter().map(OsString::as_os_str))
            .map(|arg| arg.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineExit {
    Success,
    /// non-zero exit, `None` when terminated by a signal
    Failure(Option<i32>),
}

impl From<ExitStatus> for EngineExit {
    fn from(status: ExitStatus) -> Self {
        if status.success() {
            Self::Success
        } else {
            Self::Failure(status.code())
        }
    }
}

/// Anything able to carry out engine invocations. Shared across the build
/// workers, hence `Sync`.
pub trait Engine: Sync {
    fn program(&self) -> &Path;

    /// run to completion, an `Err` means the process could not be started
    fn invoke(&self, invocation: &Invocation) -> io::Result<EngineExit>;
}

/// Spawns the configured executable with inherited stdio
#[derive(Clone, Debug)]
pub struct CommandEngine {
    executable: PathBuf,
}

impl CommandEngine {
    /// resolves `executable` against the current directory, run invocations
    /// change their working directory
    pub fn new(executable: &Path) -> io::Result<Self> {
        Ok(Self {
            executable: std::path::absolute(executable)?,
        })
    }
}

impl Engine for CommandEngine {
    fn program(&self) -> &Path {
        &self.executable
    }

    fn invoke(&self, invocation: &Invocation) -> io::Result<EngineExit> {
        debug!("Invoking {}", invocation.command_line(&self.executable));

        let mut command = Command::new(&self.executable);
        command.args(&invocation.args);

        if let Some(dir) = invocation.working_dir.as_ref() {
            command.current_dir(dir);
        }

        let status = command.status()?;
        debug!("Engine exited with {status}");

        Ok(status.into())
    }
}
