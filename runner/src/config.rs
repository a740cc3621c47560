use crate::naming::ArtifactId;
use orambench_ingest::size::deserialize_size;
use serde::{Deserialize, Serialize};
use std::{
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{error, info};

/// environment variable overriding the scratch directory handed to the engine
pub const WORKING_DIR_ENV: &str = "ORAM_WORKING_DIR";

#[derive(Error, Debug)]
pub enum ConfigErrors {
    #[error("Failed to read config file {path:?}")]
    FileNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Everything the build, run and aggregation phases need. Loaded once and
/// handed to every component by reference.
#[derive(Deserialize, Serialize, Clone, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct BenchConfig {
    #[serde(default)]
    pub paths: PathOptions,
    #[serde(default)]
    pub oram: OramOptions,
    #[serde(default)]
    pub build: BuildOptions,
    #[serde(default)]
    pub run: RunOptions,
    #[serde(default)]
    pub matrix: MatrixOptions,
    #[serde(default)]
    pub solver: SolverOptions,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct PathOptions {
    // the OramSimulator binary
    #[serde(default = "default_executable")]
    pub executable: PathBuf,
    #[serde(default = "default_oram_dir")]
    pub oram_dir: PathBuf,
    #[serde(default = "default_experiment_dir")]
    pub experiment_dir: PathBuf,
    #[serde(default = "default_trace_dir")]
    pub trace_dir: PathBuf,
    // scratch space for the engine, see WORKING_DIR_ENV
    #[serde(default = "default_working_dir")]
    pub working_dir: PathBuf,
}

impl Default for PathOptions {
    fn default() -> Self {
        Self {
            executable: default_executable(),
            oram_dir: default_oram_dir(),
            experiment_dir: default_experiment_dir(),
            trace_dir: default_trace_dir(),
            working_dir: default_working_dir(),
        }
    }
}

impl PathOptions {
    /// directory an artifact with the given identifier is built into
    pub fn artifact_dir(&self, id: &ArtifactId) -> PathBuf {
        self.oram_dir.join(id.as_str())
    }
}

/// Parameters shared by every artifact of the build matrix
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields, default)]
pub struct OramOptions {
    #[serde(deserialize_with = "deserialize_size")]
    pub page_size: u64,
    #[serde(deserialize_with = "deserialize_size")]
    pub position_map_size: u64,
    pub load_factor: f64,
    pub tree_order: u32,
    pub crypto_module: String,
}

impl Default for OramOptions {
    fn default() -> Self {
        Self {
            page_size: 4096,
            position_map_size: 4096,
            load_factor: 0.75,
            tree_order: 2,
            crypto_module: "AEGIS256".to_owned(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields, default)]
pub struct BuildOptions {
    pub threads: usize,
    // attempts per artifact, including the first one
    pub retry_limit: u32,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            threads: 4,
            retry_limit: 3,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields, default)]
pub struct RunOptions {
    /// total number of accesses per run, split into rounds
    pub access_budget: u64,
    /// passed through to the engine as a size string
    pub k_union: String,
    /// largest samples per round the linear scan buffer is run with
    pub linear_scan_cutoff: u64,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            access_budget: 1_000_000,
            k_union: "16Ki".to_owned(),
            linear_scan_cutoff: 250_000,
        }
    }
}

/// One table size of the experiment, shared by the build and run matrix
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SizeCategory {
    pub name: String,
    #[serde(deserialize_with = "deserialize_size")]
    pub entries: u64,
    #[serde(deserialize_with = "deserialize_size")]
    pub entry_size: u64,
    /// suffix of the trace files generated for this size
    pub trace_label: String,
    pub tree_levels_per_page: u32,
}

impl SizeCategory {
    fn new(name: &str, entries: u64, entry_size: u64, trace_label: &str, levels: u32) -> Self {
        Self {
            name: name.to_owned(),
            entries,
            entry_size,
            trace_label: trace_label.to_owned(),
            tree_levels_per_page: levels,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields, default)]
pub struct MatrixOptions {
    pub sizes: Vec<SizeCategory>,
    pub samples_per_round: Vec<u64>,
    pub datasets: Vec<String>,
    /// dataset the baseline strategies are run against
    pub baseline_dataset: String,
    pub include_unsafe_strawman: bool,
}

impl Default for MatrixOptions {
    fn default() -> Self {
        Self {
            sizes: vec![
                SizeCategory::new("Small", 10_000_000, 64, "10M", 4),
                SizeCategory::new("Medium", 50_000_000, 128, "50M", 3),
                SizeCategory::new("Large", 250_000_000, 256, "250M", 2),
            ],
            samples_per_round: vec![10_000, 100_000, 1_000_000],
            datasets: [
                "kaggle",
                "movielens_unpadded",
                "movielens_padded",
                "taobao_padded",
                "taobao_unpadded",
            ]
            .map(String::from)
            .to_vec(),
            baseline_dataset: "kaggle".to_owned(),
            include_unsafe_strawman: false,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug)]
#[serde(deny_unknown_fields, default)]
pub struct SolverOptions {
    pub tolerance: f64,
    pub max_iterations: u32,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            tolerance: 1.48e-8,
            max_iterations: 50,
        }
    }
}

impl BenchConfig {
    /// read, apply the environment and validate a YAML config file
    pub fn load(path: &Path) -> Result<Self, ConfigErrors> {
        let text = fs::read_to_string(path).map_err(|source| ConfigErrors::FileNotFound {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_yaml(&text)?
            .with_working_dir_override(std::env::var_os(WORKING_DIR_ENV))
            .validated()
    }

    pub fn from_yaml(text: &str) -> Result<Self, ConfigErrors> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// defaults plus the environment, used when no config file is given
    pub fn from_env() -> Result<Self, ConfigErrors> {
        Self::default()
            .with_working_dir_override(std::env::var_os(WORKING_DIR_ENV))
            .validated()
    }

    pub fn with_working_dir_override(mut self, value: Option<OsString>) -> Self {
        if let Some(dir) = value.filter(|dir| !dir.is_empty()) {
            info!(
                "Using {WORKING_DIR_ENV}={} as working directory",
                dir.to_string_lossy()
            );
            self.paths.working_dir = PathBuf::from(dir);
        }

        self
    }

    pub fn validated(self) -> Result<Self, ConfigErrors> {
        let problems = self.problems();

        if problems.is_empty() {
            Ok(self)
        } else {
            for problem in problems.iter() {
                error!("{problem}");
            }

            Err(ConfigErrors::Invalid(problems.join("; ")))
        }
    }

    /// collect all problems at once instead of piece-by-piece to make debugging easier
    fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.build.threads == 0 {
            problems.push("build.threads must be at least 1".to_owned());
        }
        if self.build.retry_limit == 0 {
            problems.push("build.retry_limit must be at least 1".to_owned());
        }
        if self.oram.page_size <= 32 {
            problems.push(format!(
                "oram.page_size ({}) must exceed the 32 byte page header",
                self.oram.page_size
            ));
        }
        if !(self.solver.tolerance.is_finite() && self.solver.tolerance > 0.0) {
            problems.push("solver.tolerance must be a positive number".to_owned());
        }
        if self.solver.max_iterations == 0 {
            problems.push("solver.max_iterations must be at least 1".to_owned());
        }

        if self.matrix.sizes.is_empty() {
            problems.push("matrix.sizes must not be empty".to_owned());
        }
        if self.matrix.datasets.is_empty() {
            problems.push("matrix.datasets must not be empty".to_owned());
        }
        if self.matrix.samples_per_round.is_empty() {
            problems.push("matrix.samples_per_round must not be empty".to_owned());
        }

        for samples in self.matrix.samples_per_round.iter() {
            if *samples == 0 || *samples > self.run.access_budget {
                problems.push(format!(
                    "matrix.samples_per_round {samples} must be within 1..={}",
                    self.run.access_budget
                ));
            }
        }

        for size in self.matrix.sizes.iter() {
            if size.entries == 0 || size.entry_size == 0 {
                problems.push(format!(
                    "matrix.sizes.{} needs a positive entry count and entry size",
                    size.name
                ));
            }
        }

        // names end up as '-' separated fields of run directory names
        let names = self
            .matrix
            .sizes
            .iter()
            .map(|size| size.name.as_str())
            .chain(self.matrix.datasets.iter().map(String::as_str))
            .chain(std::iter::once(self.matrix.baseline_dataset.as_str()));

        for name in names {
            if name.is_empty() || name.contains('-') {
                problems.push(format!(
                    "'{name}' cannot be used as a size or dataset name, it must be non-empty and free of '-'"
                ));
            }
        }

        problems
    }
}

fn default_executable() -> PathBuf {
    PathBuf::from("build/src/OramSimulator")
}

fn default_oram_dir() -> PathBuf {
    PathBuf::from("orams")
}

fn default_experiment_dir() -> PathBuf {
    PathBuf::from("experiments")
}

fn default_trace_dir() -> PathBuf {
    PathBuf::from("input-traces")
}

fn default_working_dir() -> PathBuf {
    PathBuf::from(".")
}
