//! Turning completed run directories into [`DerivedMetricsRow`]s.
//!
//! Aggregation only reads. It must not overlap with a run pass over the same
//! experiment directory, a run in progress has half written documents.

use crate::{
    geometry::{GeometryError, StorageGeometry, TreeGeometry},
    metrics::DerivedMetricsRow,
};
use globset::{Glob, GlobMatcher};
use ignore::WalkBuilder;
use itertools::Itertools;
use orambench_ingest::documents::{
    ArtifactConfig, Document, DocumentError, EngineStats, MemoryStats, RunStats, StorageConfig,
    ARTIFACT_CONFIG_FILE, MEMORY_STATS_FILE, RUN_STATS_FILE, STORAGE_DIR,
};
use orambench_runner::{
    naming::{ArtifactId, ParsedArtifactId, RUN_DIR_PREFIX},
    BenchConfig, CapacitySolver, Layout, NamingError, NumericalError, RunDirName,
};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

#[derive(Error, Debug)]
pub enum AggregateError {
    #[error("Experiment directory {0:?} does not exist")]
    NoExperimentDir(PathBuf),
    #[error("Invalid run directory pattern")]
    Pattern(#[from] globset::Error),
    #[error(transparent)]
    Name(#[from] NamingError),
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error("Cannot reconstruct the storage geometry")]
    Geometry(#[from] GeometryError),
    #[error("Cannot recompute the eviction width")]
    Solver(#[from] NumericalError),
    #[error("Run stats report zero rounds")]
    NoRounds,
    #[error(
        "{artifact} was built with {recorded} accesses per eviction, but its parameters give {recomputed}"
    )]
    EvictionWidthMismatch {
        artifact: ArtifactId,
        recorded: u64,
        recomputed: u64,
    },
}

impl AggregateError {
    /// the run was simply not finished, as opposed to broken
    pub fn is_missing_document(&self) -> bool {
        matches!(self, Self::Document(err) if err.is_missing())
    }
}

/// A directory that looks like a run
#[derive(Clone, Debug, PartialEq)]
pub struct RunRecord {
    pub dir: PathBuf,
    pub name: RunDirName,
}

#[derive(Debug, Default)]
pub struct Aggregation {
    /// sorted by samples per round, engine variant and strategy
    pub rows: Vec<DerivedMetricsRow>,
    pub excluded: Vec<(RunDirName, AggregateError)>,
}

pub struct Aggregator {
    experiment_dir: PathBuf,
    oram_dir: PathBuf,
    solver: CapacitySolver,
}

fn run_dir_matcher() -> Result<GlobMatcher, globset::Error> {
    Ok(Glob::new(&format!("{RUN_DIR_PREFIX}-*"))?.compile_matcher())
}

impl Aggregator {
    pub fn new(config: &BenchConfig) -> Self {
        Self {
            experiment_dir: config.paths.experiment_dir.clone(),
            oram_dir: config.paths.oram_dir.clone(),
            solver: CapacitySolver::from(&config.solver),
        }
    }

    /// run directories directly below the experiment directory
    pub fn discover(&self) -> Result<Vec<RunRecord>, AggregateError> {
        if !self.experiment_dir.is_dir() {
            return Err(AggregateError::NoExperimentDir(self.experiment_dir.clone()));
        }

        let matcher = run_dir_matcher()?;

        let records = WalkBuilder::new(&self.experiment_dir)
            .standard_filters(false)
            .max_depth(Some(1))
            .build()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(err) => {
                    warn!("Failed to search for runs: {err}");
                    None
                }
            })
            .filter(|entry| entry.depth() == 1)
            .filter(|entry| entry.file_type().is_some_and(|kind| kind.is_dir()))
            .filter(|entry| matcher.is_match(entry.file_name()))
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy();

                match RunDirName::parse(&name) {
                    Ok(name) => Some(RunRecord {
                        dir: entry.path().to_path_buf(),
                        name,
                    }),
                    Err(err) => {
                        warn!("Ignoring {}: {err}", entry.path().display());
                        None
                    }
                }
            })
            .sorted_by(|a, b| a.dir.cmp(&b.dir))
            .collect_vec();

        debug!("Found {} run directories", records.len());

        Ok(records)
    }

    /// The artifact's build record against the value its parameters give.
    /// Only artifacts recording their eviction width can be checked.
    pub fn check_eviction_width(
        &self,
        artifact: &ParsedArtifactId,
        config: &ArtifactConfig,
    ) -> Result<(), AggregateError> {
        let Some(recorded) = config.num_accesses_per_eviction else {
            return Ok(());
        };

        // tree identifiers carry the bucket, widths are solved for the whole page
        let page_size = match (artifact.variant.layout(), config.levels_per_page) {
            (Layout::Tree, Some(levels)) => u32::try_from(levels)
                .ok()
                .and_then(|levels| artifact.page_term.checked_shl(levels))
                .unwrap_or(0),
            _ => artifact.page_term,
        };

        let recomputed = self.solver.for_page(page_size, artifact.entry_size)?;

        if recomputed == recorded {
            Ok(())
        } else {
            Err(AggregateError::EvictionWidthMismatch {
                artifact: artifact.id.clone(),
                recorded,
                recomputed,
            })
        }
    }

    fn geometry(
        &self,
        artifact: &ParsedArtifactId,
        artifact_dir: &Path,
        config: &ArtifactConfig,
    ) -> Result<StorageGeometry, AggregateError> {
        Ok(match artifact.variant.layout() {
            Layout::Tree => StorageGeometry::Tree(TreeGeometry::from_config(config)?),
            Layout::Flat => StorageGeometry::flat(&StorageConfig::load(
                &artifact_dir.join(STORAGE_DIR).join(ARTIFACT_CONFIG_FILE),
            )?),
        })
    }

    pub fn load(&self, record: &RunRecord) -> Result<DerivedMetricsRow, AggregateError> {
        let artifact = ParsedArtifactId::parse(record.name.artifact.as_str())?;

        let stats = RunStats::load(&record.dir.join(RUN_STATS_FILE))?;
        if stats.rounds == 0 {
            return Err(AggregateError::NoRounds);
        }
        let engine = EngineStats::load(&record.dir.join(artifact.variant.engine_stats_file()))?;
        let memory = MemoryStats::load(&record.dir.join(MEMORY_STATS_FILE))?;

        // geometry comes from the build, not from anything the run reports
        let artifact_dir = self.oram_dir.join(&artifact.id);
        let config = ArtifactConfig::load(&artifact_dir.join(ARTIFACT_CONFIG_FILE))?;
        self.check_eviction_width(&artifact, &config)?;
        let main_tree_size = self
            .geometry(&artifact, &artifact_dir, &config)?
            .main_tree_size()?;

        Ok(DerivedMetricsRow::derive(
            &record.name,
            &artifact,
            &stats,
            &engine,
            &memory,
            main_tree_size,
        ))
    }

    /// Every loadable run; a broken or unfinished run is logged and excluded
    /// without affecting the others.
    #[instrument(skip_all, level = "info")]
    pub fn aggregate(&self) -> Result<Aggregation, AggregateError> {
        let records = self.discover()?;
        let total = records.len();
        let mut aggregation = Aggregation::default();

        for record in records {
            match self.load(&record) {
                Ok(row) => aggregation.rows.push(row),
                Err(err) => {
                    if err.is_missing_document() {
                        warn!("Skipping {}: {err}", record.name);
                    } else {
                        error!("Excluding {}: {err}", record.name);
                    }
                    aggregation.excluded.push((record.name, err));
                }
            }
        }

        aggregation.rows.sort_by(|a, b| {
            (a.samples_per_round, a.variant.name(), a.strategy.name()).cmp(&(
                b.samples_per_round,
                b.variant.name(),
                b.strategy.name(),
            ))
        });

        info!("Aggregated {}/{total} runs", aggregation.rows.len());

        Ok(aggregation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orambench_ingest::documents::{FLAT_ENGINE_STATS_FILE, TREE_ENGINE_STATS_FILE};
    use orambench_runner::{EngineVariant, Strategy};
    use std::fs;
    use tempfile::TempDir;

    const FLAT: &str = "PageOptimizedRAWOram-10M-64B-4Ki-4Ki-aegis256";
    const TREE: &str = "BinaryPathOram2-10M-64B-256B-4Ki-aegis256";

    struct Fixture {
        dir: TempDir,
        config: BenchConfig,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let mut config = BenchConfig::default();
            config.paths.experiment_dir = dir.path().join("experiments");
            config.paths.oram_dir = dir.path().join("orams");
            fs::create_dir_all(&config.paths.experiment_dir).unwrap();

            let fixture = Self { dir, config };
            let width = CapacitySolver::default().for_page(4096, 64).unwrap();
            fixture.artifact(
                FLAT,
                &format!("levels = \"1\"\nnum_accesses_per_eviction = \"{width}\"\n"),
            );
            fixture.write(
                &fixture.config.paths.oram_dir.join(FLAT).join(STORAGE_DIR),
                ARTIFACT_CONFIG_FILE,
                "size = \"64GiB\"\n",
            );
            fixture.artifact(
                TREE,
                "levels = \"24\"\nlevels_per_page = \"4\"\npage_size = \"4Ki\"\n",
            );
            fixture
        }

        fn write(&self, dir: &Path, name: &str, contents: &str) {
            fs::create_dir_all(dir).unwrap();
            fs::write(dir.join(name), contents).unwrap();
        }

        fn artifact(&self, id: &str, config: &str) {
            self.write(
                &self.config.paths.oram_dir.join(id),
                ARTIFACT_CONFIG_FILE,
                config,
            );
        }

        /// a complete run directory, returns its path
        fn run(&self, strategy: &str, samples: u64, artifact: &str, buffer: &str) -> PathBuf {
            let rounds = 1_000_000 / samples;
            let dir = self.config.paths.experiment_dir.join(format!(
                "Recsys_Sim-Small-{strategy}-kaggle-{samples}-{rounds}-{artifact}-{buffer}-0.0"
            ));
            let engine_file = if artifact.starts_with("BinaryPathOram2") {
                TREE_ENGINE_STATS_FILE
            } else {
                FLAT_ENGINE_STATS_FILE
            };

            self.write(
                &dir,
                RUN_STATS_FILE,
                &format!(
                    "rounds = {rounds}\nsamples_per_round = {samples}\noverall_time_seconds = 100.0\nbuffer_time_seconds = 20.0\noram_time_seconds = 80.0\n"
                ),
            );
            self.write(
                &dir,
                engine_file,
                "path_read_ns = 30000000000\npath_write_ns = 20000000000\n",
            );
            self.write(
                &dir,
                MEMORY_STATS_FILE,
                "bytes_read = 1000000\nbytes_wrote = 500000\n",
            );

            dir
        }

        fn aggregate(&self) -> Aggregation {
            Aggregator::new(&self.config).aggregate().unwrap()
        }
    }

    #[test]
    fn aggregates_flat_and_tree_runs() {
        let fixture = Fixture::new();
        fixture.run("StrawmanSafe", 10_000, FLAT, "ORAMBuffer3RAW");
        fixture.run("PathORAMWithBuffer", 10_000, TREE, "ORAMBuffer3RAW");

        let aggregation = fixture.aggregate();
        assert!(aggregation.excluded.is_empty());
        assert_eq!(aggregation.rows.len(), 2);

        let tree = &aggregation.rows[0];
        assert_eq!(tree.variant, EngineVariant::BinaryPathOram2);
        assert_eq!(tree.main_tree_size, ((1u64 << 24) - 1) / 15 * 4096);
        assert_eq!(tree.disk_time, 50.0);
        assert_eq!(tree.non_disk_time, 50.0);
        assert_eq!(tree.time_per_round, 1.0);

        let flat = &aggregation.rows[1];
        assert_eq!(flat.variant, EngineVariant::PageOptimizedRawOram);
        assert_eq!(flat.main_tree_size, 64 << 30);
        assert_eq!(flat.strategy, Strategy::StrawmanSafe);
    }

    #[test]
    fn unfinished_runs_are_skipped() {
        let fixture = Fixture::new();
        fixture.run("StrawmanSafe", 10_000, FLAT, "ORAMBuffer3RAW");
        let partial = fixture.run("PosMap", 100_000, FLAT, "ORAMBufferDP");
        fs::remove_file(partial.join(RUN_STATS_FILE)).unwrap();
        let no_memory = fixture.run("PosMap", 10_000, FLAT, "ORAMBufferDP");
        fs::remove_file(no_memory.join(MEMORY_STATS_FILE)).unwrap();

        let aggregation = fixture.aggregate();

        assert_eq!(aggregation.rows.len(), 1);
        assert_eq!(aggregation.excluded.len(), 2);
        assert!(aggregation
            .excluded
            .iter()
            .all(|(_, err)| err.is_missing_document()));
    }

    #[test]
    fn broken_documents_are_typed_failures() {
        let fixture = Fixture::new();
        let dir = fixture.run("StrawmanSafe", 10_000, FLAT, "ORAMBuffer3RAW");
        fixture.write(&dir, MEMORY_STATS_FILE, "bytes_read = 1000000\n");

        let aggregation = fixture.aggregate();

        assert!(aggregation.rows.is_empty());
        assert!(matches!(
            aggregation.excluded[0].1,
            AggregateError::Document(DocumentError::Decode { .. })
        ));
    }

    #[test]
    fn eviction_width_mismatch_excludes_the_run() {
        let fixture = Fixture::new();
        fixture.artifact(FLAT, "levels = \"1\"\nnum_accesses_per_eviction = \"7\"\n");
        fixture.run("StrawmanSafe", 10_000, FLAT, "ORAMBuffer3RAW");
        fixture.run("PathORAMWithBuffer", 10_000, TREE, "ORAMBuffer3RAW");

        let aggregation = fixture.aggregate();

        assert_eq!(aggregation.rows.len(), 1);
        assert_eq!(aggregation.rows[0].variant, EngineVariant::BinaryPathOram2);
        match &aggregation.excluded[0].1 {
            AggregateError::EvictionWidthMismatch {
                recorded,
                recomputed,
                ..
            } => {
                assert_eq!(*recorded, 7);
                assert_eq!(
                    *recomputed,
                    CapacitySolver::default().for_page(4096, 64).unwrap()
                );
            }
            other => panic!("expected a width mismatch, got {other:?}"),
        }
    }

    #[test]
    fn rows_are_sorted_by_rate_variant_and_strategy() {
        let fixture = Fixture::new();
        fixture.run("StrawmanSafe", 100_000, FLAT, "ORAMBuffer3RAW");
        fixture.run("PosMap", 10_000, FLAT, "ORAMBufferDP");
        fixture.run("LinearScannedPosMap", 10_000, FLAT, "ORAMBufferDPLinearScanPosmap");
        fixture.run("PathORAMWithBuffer", 100_000, TREE, "ORAMBuffer3RAW");

        let order = fixture
            .aggregate()
            .rows
            .iter()
            .map(|row| (row.samples_per_round, row.strategy))
            .collect_vec();

        assert_eq!(
            order,
            vec![
                (10_000, Strategy::LinearScannedPosMap),
                (10_000, Strategy::PosMap),
                (100_000, Strategy::PathOramWithBuffer),
                (100_000, Strategy::StrawmanSafe),
            ]
        );
    }

    #[test]
    fn discovery_ignores_foreign_entries() {
        let fixture = Fixture::new();
        fixture.run("StrawmanSafe", 10_000, FLAT, "ORAMBuffer3RAW");
        let experiments = &fixture.config.paths.experiment_dir;
        fs::create_dir_all(experiments.join("scratch")).unwrap();
        fs::create_dir_all(experiments.join("Recsys_Sim-garbage")).unwrap();
        fs::write(experiments.join("Recsys_Sim-file"), "").unwrap();

        let records = Aggregator::new(&fixture.config).discover().unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name.strategy, Strategy::StrawmanSafe);
        assert!(fixture.dir.path().exists());
    }

    #[test]
    fn missing_experiment_dir_is_a_setup_error() {
        let fixture = Fixture::new();
        let mut config = fixture.config.clone();
        config.paths.experiment_dir = fixture.dir.path().join("nowhere");

        assert!(matches!(
            Aggregator::new(&config).aggregate(),
            Err(AggregateError::NoExperimentDir(_))
        ));
    }
}
