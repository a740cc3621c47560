use orambench_ingest::documents::{EngineStats, MemoryStats, RunStats};
use orambench_runner::{naming::ParsedArtifactId, EngineVariant, RunDirName, Strategy};

const NANOS_PER_SECOND: f64 = 1_000_000_000.0;

/// header of the result table, in the order of [`DerivedMetricsRow::record`]
pub const COLUMNS: [&str; 29] = [
    "Samples per Round",
    "ORAM Config",
    "Buffer Config",
    "Dataset",
    "Rounds",
    "Type",
    "Num Entries",
    "Entry Size",
    "Bucket Size",
    "Base Position Map Size",
    "Encryption",
    "Total Time",
    "Buffer Time",
    "ORAM Time",
    "Total Bytes Read",
    "Total Bytes Wrote",
    "Time per Round",
    "Buffer Time per Round",
    "ORAM Time per Round",
    "Bytes Read per Round",
    "Bytes Wrote per Round",
    "Main Tree Size",
    "Disk Read Time",
    "Disk Write Time",
    "Disk Time",
    "Non-disk Time",
    "k sum",
    "k_union sum",
    "reuse rate",
];

/// One completed run, all times in seconds
#[derive(Clone, Debug, PartialEq)]
pub struct DerivedMetricsRow {
    pub samples_per_round: u64,
    /// size category the run belongs to
    pub size: String,
    pub strategy: Strategy,
    pub dataset: String,
    pub rounds: u64,
    pub variant: EngineVariant,
    pub num_entries: u64,
    pub entry_size: u64,
    pub bucket_size: u64,
    pub position_map_size: u64,
    pub encryption: String,

    pub total_time: f64,
    pub buffer_time: f64,
    pub oram_time: f64,
    pub total_bytes_read: u64,
    pub total_bytes_wrote: u64,

    pub time_per_round: f64,
    pub buffer_time_per_round: f64,
    pub oram_time_per_round: f64,
    pub bytes_read_per_round: f64,
    pub bytes_wrote_per_round: f64,

    pub main_tree_size: u64,
    pub disk_read_time: f64,
    pub disk_write_time: f64,
    pub disk_time: f64,
    pub non_disk_time: f64,

    pub k_sum: u64,
    pub k_union_sum: u64,
    pub reuse_rate: f64,
}

impl DerivedMetricsRow {
    /// Combine the documents of one run. `stats.rounds` must not be zero.
    pub fn derive(
        name: &RunDirName,
        artifact: &ParsedArtifactId,
        stats: &RunStats,
        engine: &EngineStats,
        memory: &MemoryStats,
        main_tree_size: u64,
    ) -> Self {
        let rounds = stats.rounds as f64;

        let disk_read_time = engine.path_read_ns as f64 / NANOS_PER_SECOND;
        let disk_write_time = engine.path_write_ns as f64 / NANOS_PER_SECOND;
        let disk_time = disk_read_time + disk_write_time;

        let (k_sum, k_union_sum, reuse_rate) = match stats.top_k() {
            Some(top_k) => (
                top_k.k_sum,
                top_k.k_union_sum,
                1.0 - top_k.k_union_sum as f64 / (stats.samples_per_round as f64 * rounds),
            ),
            None => (0, 0, 0.0),
        };

        Self {
            samples_per_round: stats.samples_per_round,
            size: name.size.clone(),
            strategy: name.strategy,
            dataset: name.dataset.clone(),
            rounds: stats.rounds,
            variant: artifact.variant,
            num_entries: artifact.num_entries,
            entry_size: artifact.entry_size,
            bucket_size: artifact.page_term,
            position_map_size: artifact.position_map_size,
            encryption: artifact.encryption.clone(),

            total_time: stats.overall_time_seconds,
            buffer_time: stats.buffer_time_seconds,
            oram_time: stats.oram_time_seconds,
            total_bytes_read: memory.bytes_read,
            total_bytes_wrote: memory.bytes_wrote,

            time_per_round: stats.overall_time_seconds / rounds,
            buffer_time_per_round: stats.buffer_time_seconds / rounds,
            oram_time_per_round: stats.oram_time_seconds / rounds,
            bytes_read_per_round: memory.bytes_read as f64 / rounds,
            bytes_wrote_per_round: memory.bytes_wrote as f64 / rounds,

            main_tree_size,
            disk_read_time,
            disk_write_time,
            disk_time,
            non_disk_time: stats.overall_time_seconds - disk_time,

            k_sum,
            k_union_sum,
            reuse_rate,
        }
    }

    /// the row as table fields, matching [`COLUMNS`]
    pub fn record(&self) -> Vec<String> {
        vec![
            self.samples_per_round.to_string(),
            self.size.clone(),
            self.strategy.to_string(),
            self.dataset.clone(),
            self.rounds.to_string(),
            self.variant.to_string(),
            self.num_entries.to_string(),
            self.entry_size.to_string(),
            self.bucket_size.to_string(),
            self.position_map_size.to_string(),
            self.encryption.clone(),
            self.total_time.to_string(),
            self.buffer_time.to_string(),
            self.oram_time.to_string(),
            self.total_bytes_read.to_string(),
            self.total_bytes_wrote.to_string(),
            self.time_per_round.to_string(),
            self.buffer_time_per_round.to_string(),
            self.oram_time_per_round.to_string(),
            self.bytes_read_per_round.to_string(),
            self.bytes_wrote_per_round.to_string(),
            self.main_tree_size.to_string(),
            self.disk_read_time.to_string(),
            self.disk_write_time.to_string(),
            self.disk_time.to_string(),
            self.non_disk_time.to_string(),
            self.k_sum.to_string(),
            self.k_union_sum.to_string(),
            self.reuse_rate.to_string(),
        ]
    }
}
