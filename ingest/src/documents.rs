//! Typed schemas for the TOML documents written by the engine.
//!
//! Every document kind gets its own record type. Required keys are plain
//! fields, so a document missing one fails to decode with the key named in
//! the error instead of surfacing later as a lookup failure.

use crate::size::{deserialize_optional_size, deserialize_size};
use serde::{de::DeserializeOwned, Deserialize};
use std::{
    fs,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::debug;

/// primary stat document written by the `recsys_sim` subcommand
pub const RUN_STATS_FILE: &str = "recsys_sim-stat.toml";
/// per-level engine stats of the flat engine variant
pub const FLAT_ENGINE_STATS_FILE: &str = "page_optimized_raw_oram_stat.toml";
/// per-level engine stats of the tree engine variant
pub const TREE_ENGINE_STATS_FILE: &str = "level-0_binary_path_oram_2_stat.toml";
/// per-level stats of the backing storage
pub const MEMORY_STATS_FILE: &str = "level-0_untrusted_memory_stat.toml";
/// build time configuration inside an artifact directory
pub const ARTIFACT_CONFIG_FILE: &str = "config.toml";
/// directory of the backing storage inside an artifact directory
pub const STORAGE_DIR: &str = "untrusted_memory";

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("{kind} document {path:?} does not exist")]
    Missing { kind: &'static str, path: PathBuf },
    #[error("Failed to read {kind} document {path:?}")]
    Io {
        kind: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to decode {kind} document {path:?}: {source}")]
    Decode {
        kind: &'static str,
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl DocumentError {
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing { .. })
    }
}

/// A TOML document with a fixed schema
pub trait Document: DeserializeOwned {
    /// human readable name used in diagnostics
    const KIND: &'static str;

    fn load(path: &Path) -> Result<Self, DocumentError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(error) if error.kind() == ErrorKind::NotFound => {
                return Err(DocumentError::Missing {
                    kind: Self::KIND,
                    path: path.to_path_buf(),
                })
            }
            Err(source) => {
                return Err(DocumentError::Io {
                    kind: Self::KIND,
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let document = toml::from_str(&text).map_err(|source| DocumentError::Decode {
            kind: Self::KIND,
            path: path.to_path_buf(),
            source,
        })?;

        debug!(path = ?path, "Loaded {} document", Self::KIND);

        Ok(document)
    }
}

/// Outcome of one simulation run
#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct RunStats {
    pub rounds: u64,
    pub samples_per_round: u64,
    pub overall_time_seconds: f64,
    pub buffer_time_seconds: f64,
    pub oram_time_seconds: f64,
    // only written by buffers that reserve entries
    #[serde(default)]
    pub k_sum: Option<u64>,
    #[serde(default)]
    pub k_union_sum: Option<u64>,
}

/// Summed top-k counters of a run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TopK {
    pub k_sum: u64,
    pub k_union_sum: u64,
}

impl RunStats {
    /// top-k counters, only if the engine reported both of them
    pub fn top_k(&self) -> Option<TopK> {
        match (self.k_sum, self.k_union_sum) {
            (Some(k_sum), Some(k_union_sum)) => Some(TopK { k_sum, k_union_sum }),
            _ => None,
        }
    }
}

impl Document for RunStats {
    const KIND: &'static str = "run stats";
}

/// Path access timings of the top level engine
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineStats {
    pub path_read_ns: u64,
    pub path_write_ns: u64,
}

impl Document for EngineStats {
    const KIND: &'static str = "engine stats";
}

/// Traffic against the backing storage
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoryStats {
    pub bytes_read: u64,
    pub bytes_wrote: u64,
}

impl Document for MemoryStats {
    const KIND: &'static str = "memory stats";
}

/// Build time configuration of an artifact. The engine writes most values as
/// size strings, so all numeric fields accept both representations.
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ArtifactConfig {
    #[serde(deserialize_with = "deserialize_size")]
    pub levels: u64,
    #[serde(default, deserialize_with = "deserialize_optional_size")]
    pub levels_per_page: Option<u64>,
    #[serde(default, deserialize_with = "deserialize_optional_size")]
    pub page_size: Option<u64>,
    #[serde(default, deserialize_with = "deserialize_optional_size")]
    pub num_accesses_per_eviction: Option<u64>,
    #[serde(default)]
    pub crypto_module: Option<String>,
}

impl Document for ArtifactConfig {
    const KIND: &'static str = "artifact config";
}

/// Configuration of the backing storage of an artifact
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct StorageConfig {
    #[serde(deserialize_with = "deserialize_size")]
    pub size: u64,
}

impl Document for StorageConfig {
    const KIND: &'static str = "storage config";
}
