use crate::{
    naming::{ArtifactId, NamingError},
    solver::{estimate_width, NumericalError},
};
use orambench_ingest::documents::{FLAT_ENGINE_STATS_FILE, TREE_ENGINE_STATS_FILE};
use std::{fmt, str::FromStr};

/// How an engine variant lays its buckets out on storage
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Layout {
    /// size is whatever the backing storage reports
    Flat,
    /// complete binary tree of buckets, packed `levels_per_page` levels per page
    Tree,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EngineVariant {
    PageOptimizedRawOram,
    BinaryPathOram2,
}

impl EngineVariant {
    pub const ALL: [EngineVariant; 2] = [Self::PageOptimizedRawOram, Self::BinaryPathOram2];

    /// name used by the engine for `--type`
    pub fn name(self) -> &'static str {
        match self {
            Self::PageOptimizedRawOram => "PageOptimizedRAWOram",
            Self::BinaryPathOram2 => "BinaryPathOram2",
        }
    }

    pub fn layout(self) -> Layout {
        match self {
            Self::PageOptimizedRawOram => Layout::Flat,
            Self::BinaryPathOram2 => Layout::Tree,
        }
    }

    /// stat document holding the path timings of this variant
    pub fn engine_stats_file(self) -> &'static str {
        match self.layout() {
            Layout::Flat => FLAT_ENGINE_STATS_FILE,
            Layout::Tree => TREE_ENGINE_STATS_FILE,
        }
    }
}

impl fmt::Display for EngineVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EngineVariant {
    type Err = NamingError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|variant| variant.name() == value)
            .ok_or_else(|| NamingError::UnknownVariant(value.to_owned()))
    }
}

/// Parameters of one buildable artifact
#[derive(Clone, Debug, PartialEq)]
pub struct OramParameterVector {
    pub variant: EngineVariant,
    pub num_entries: u64,
    pub entry_size: u64,
    pub page_size: u64,
    pub position_map_size: u64,
    pub levels_per_page: u32,
    pub load_factor: f64,
    pub tree_order: u32,
    pub crypto_module: String,
}

impl OramParameterVector {
    /// total payload in bytes, `--size` of the build invocation
    pub fn total_size(&self) -> u128 {
        u128::from(self.num_entries) * u128::from(self.entry_size)
    }

    /// bytes of one bucket when several tree levels share a page
    pub fn effective_page_size(&self) -> u64 {
        if self.levels_per_page > 1 {
            self.page_size.checked_shr(self.levels_per_page).unwrap_or(0)
        } else {
            self.page_size
        }
    }

    pub fn eviction_width(&self) -> Result<u64, NumericalError> {
        estimate_width(self.page_size, self.entry_size)
    }

    pub fn artifact_id(&self) -> ArtifactId {
        ArtifactId::from_vector(self)
    }
}
