//! Expansion of the configured axes into build vectors and run cells.

use crate::{
    config::{BenchConfig, SizeCategory},
    naming::{ArtifactId, NamingError, RunDirName},
    oram::{EngineVariant, Layout, OramParameterVector},
};
use itertools::iproduct;
use std::{fmt, path::PathBuf, str::FromStr};
use tracing::debug;

/// Buffering strategy of a run, fixing the engine variant it runs against
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Strategy {
    PathOramWithBuffer,
    StrawmanSafe,
    StrawmanUnsafe,
    PosMap,
    LinearScannedPosMap,
}

impl Strategy {
    pub const ALL: [Strategy; 5] = [
        Self::PathOramWithBuffer,
        Self::StrawmanSafe,
        Self::StrawmanUnsafe,
        Self::PosMap,
        Self::LinearScannedPosMap,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::PathOramWithBuffer => "PathORAMWithBuffer",
            Self::StrawmanSafe => "StrawmanSafe",
            Self::StrawmanUnsafe => "StrawmanUnsafe",
            Self::PosMap => "PosMap",
            Self::LinearScannedPosMap => "LinearScannedPosMap",
        }
    }

    pub fn engine(self) -> EngineVariant {
        match self {
            Self::PathOramWithBuffer => EngineVariant::BinaryPathOram2,
            _ => EngineVariant::PageOptimizedRawOram,
        }
    }

    /// `--buffer` handed to the engine
    pub fn buffer(self) -> &'static str {
        match self {
            Self::PathOramWithBuffer | Self::StrawmanSafe | Self::StrawmanUnsafe => {
                "ORAMBuffer3RAW"
            }
            Self::PosMap => "ORAMBufferDP",
            Self::LinearScannedPosMap => "ORAMBufferDPLinearScanPosmap",
        }
    }

    pub fn base_epsilon(self) -> f64 {
        match self {
            Self::PosMap | Self::LinearScannedPosMap => 1.0,
            _ => 0.0,
        }
    }

    /// the budget is a whole number, named without a decimal point unless scaled
    pub fn whole_budget(self) -> bool {
        matches!(self, Self::PosMap | Self::LinearScannedPosMap)
    }

    pub fn unsafe_optimization(self) -> bool {
        matches!(self, Self::StrawmanUnsafe | Self::PosMap)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Strategy {
    type Err = NamingError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.name() == value)
            .ok_or_else(|| NamingError::UnknownStrategy(value.to_owned()))
    }
}

/// Padded datasets only hide how often values occur, not the values
/// themselves, and get a hundredth of the privacy budget.
pub fn hides_value_counts(dataset: &str) -> bool {
    dataset.ends_with("_padded")
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExperimentCell {
    pub size: SizeCategory,
    pub samples_per_round: u64,
    pub dataset: String,
    pub strategy: Strategy,
}

/// A fully expanded cell, everything run mode needs to invoke the engine
#[derive(Clone, Debug, PartialEq)]
pub struct RunConfig {
    pub cell: ExperimentCell,
    pub artifact: ArtifactId,
    pub num_rounds: u64,
    pub epsilon: f64,
    pub unsafe_optimization: bool,
    pub buffer: &'static str,
    pub trace_file: PathBuf,
}

impl RunConfig {
    pub fn dir_name(&self) -> RunDirName {
        RunDirName {
            size: self.cell.size.name.clone(),
            strategy: self.cell.strategy,
            dataset: self.cell.dataset.clone(),
            samples_per_round: self.cell.samples_per_round,
            num_rounds: self.num_rounds,
            artifact: self.artifact.clone(),
            buffer: self.buffer.to_owned(),
            epsilon: self.epsilon,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ExperimentMatrix<'a> {
    config: &'a BenchConfig,
}

impl<'a> ExperimentMatrix<'a> {
    pub fn new(config: &'a BenchConfig) -> Self {
        Self { config }
    }

    /// the artifact a size category is built into for one engine variant
    pub fn vector(&self, size: &SizeCategory, variant: EngineVariant) -> OramParameterVector {
        let oram = &self.config.oram;

        OramParameterVector {
            variant,
            num_entries: size.entries,
            entry_size: size.entry_size,
            page_size: oram.page_size,
            position_map_size: oram.position_map_size,
            levels_per_page: match variant.layout() {
                Layout::Flat => 1,
                Layout::Tree => size.tree_levels_per_page,
            },
            load_factor: oram.load_factor,
            tree_order: oram.tree_order,
            crypto_module: oram.crypto_module.clone(),
        }
    }

    /// one vector per (size category, engine variant)
    pub fn build_vectors(&self) -> Vec<OramParameterVector> {
        iproduct!(self.config.matrix.sizes.iter(), EngineVariant::ALL)
            .map(|(size, variant)| self.vector(size, variant))
            .collect()
    }

    pub fn cells(&self) -> Vec<ExperimentCell> {
        let matrix = &self.config.matrix;
        let cutoff = self.config.run.linear_scan_cutoff;
        let mut cells = Vec::new();

        for (size, &samples_per_round) in
            iproduct!(matrix.sizes.iter(), matrix.samples_per_round.iter())
        {
            let cell = |dataset: &str, strategy| ExperimentCell {
                size: size.clone(),
                samples_per_round,
                dataset: dataset.to_owned(),
                strategy,
            };

            cells.push(cell(matrix.baseline_dataset.as_str(), Strategy::PathOramWithBuffer));
            cells.push(cell(matrix.baseline_dataset.as_str(), Strategy::StrawmanSafe));
            if matrix.include_unsafe_strawman {
                cells.push(cell(matrix.baseline_dataset.as_str(), Strategy::StrawmanUnsafe));
            }

            for dataset in matrix.datasets.iter() {
                cells.push(cell(dataset.as_str(), Strategy::PosMap));

                // the scan over the position map grows with every request of a round
                if samples_per_round <= cutoff {
                    cells.push(cell(dataset.as_str(), Strategy::LinearScannedPosMap));
                }
            }
        }

        debug!("Generated {} experiment cells", cells.len());

        cells
    }

    pub fn expand(&self, cell: ExperimentCell) -> RunConfig {
        let strategy = cell.strategy;
        let artifact = self.vector(&cell.size, strategy.engine()).artifact_id();

        let epsilon = if hides_value_counts(&cell.dataset) {
            strategy.base_epsilon() / 100.0
        } else {
            strategy.base_epsilon()
        };

        let trace_file = self.config.paths.trace_dir.join(format!(
            "{}_synthetic_15M_{}.txt",
            cell.dataset, cell.size.trace_label
        ));

        RunConfig {
            artifact,
            num_rounds: self.config.run.access_budget / cell.samples_per_round,
            epsilon,
            unsafe_optimization: strategy.unsafe_optimization(),
            buffer: strategy.buffer(),
            trace_file,
            cell,
        }
    }

    pub fn run_configs(&self) -> Vec<RunConfig> {
        self.cells()
            .into_iter()
            .map(|cell| self.expand(cell))
            .collect()
    }
}
