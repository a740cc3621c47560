//! Size of the main ORAM structure, reconstructed from an artifact's own
//! build-time configuration.
//!
//! Tree sizes reach hundreds of gigabytes, everything here is exact `u64`
//! arithmetic with overflow checks.

use orambench_ingest::documents::{ArtifactConfig, StorageConfig};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GeometryError {
    #[error("Artifact config lacks '{0}'")]
    MissingField(&'static str),
    #[error("levels_per_page must be at least 1")]
    NoLevelsPerPage,
    #[error("A tree of {levels} levels does not fit into 64 bit arithmetic")]
    Overflow { levels: u64 },
}

/// Complete binary tree of buckets, `levels_per_page` levels packed per page
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TreeGeometry {
    pub levels: u64,
    pub levels_per_page: u64,
    /// size of a page as stored, including encryption overhead
    pub page_size: u64,
}

/// `2^exponent - 1` without overflowing
fn full_tree(exponent: u64, levels: u64) -> Result<u64, GeometryError> {
    u32::try_from(exponent)
        .ok()
        .and_then(|exponent| 1u64.checked_shl(exponent))
        .map(|power| power - 1)
        .ok_or(GeometryError::Overflow { levels })
}

impl TreeGeometry {
    pub fn from_config(config: &ArtifactConfig) -> Result<Self, GeometryError> {
        Ok(Self {
            levels: config.levels,
            levels_per_page: config
                .levels_per_page
                .ok_or(GeometryError::MissingField("levels_per_page"))?,
            page_size: config
                .page_size
                .ok_or(GeometryError::MissingField("page_size"))?,
        })
    }

    pub fn total_buckets(&self) -> Result<u64, GeometryError> {
        full_tree(self.levels, self.levels)
    }

    pub fn buckets_per_page(&self) -> Result<u64, GeometryError> {
        if self.levels_per_page == 0 {
            return Err(GeometryError::NoLevelsPerPage);
        }

        full_tree(self.levels_per_page, self.levels)
    }

    pub fn num_pages(&self) -> Result<u64, GeometryError> {
        Ok(self.total_buckets()?.div_ceil(self.buckets_per_page()?))
    }

    pub fn tree_size(&self) -> Result<u64, GeometryError> {
        self.num_pages()?
            .checked_mul(self.page_size)
            .ok_or(GeometryError::Overflow {
                levels: self.levels,
            })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageGeometry {
    Tree(TreeGeometry),
    /// whatever the backing storage was created with
    Flat { size: u64 },
}

impl StorageGeometry {
    pub fn flat(storage: &StorageConfig) -> Self {
        Self::Flat { size: storage.size }
    }

    pub fn main_tree_size(&self) -> Result<u64, GeometryError> {
        match self {
            Self::Tree(tree) => tree.tree_size(),
            Self::Flat { size } => Ok(*size),
        }
    }
}
