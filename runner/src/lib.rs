//! Calibration, naming, matrix expansion and orchestration of OramSimulator
//! builds and runs.

pub mod config;
pub mod engine;
pub mod executors;
pub mod logging;
pub mod matrix;
pub mod naming;
pub mod oram;
pub mod solver;

pub use config::{BenchConfig, ConfigErrors};
pub use engine::{CommandEngine, Engine, EngineExit, Invocation};
pub use matrix::{ExperimentCell, ExperimentMatrix, RunConfig, Strategy};
pub use naming::{ArtifactId, NamingError, ParsedArtifactId, RunDirName};
pub use oram::{EngineVariant, Layout, OramParameterVector};
pub use solver::{Capacity, CapacitySolver, NumericalError};
