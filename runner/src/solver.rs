//! Safe number of real blocks per bucket.
//!
//! With `Z` slots processed per eviction, the probability that a bucket ends
//! up with more than `A` real blocks is bounded by a large deviation bound
//! that reaches the target failure probability where
//!
//! `f(A) = Z·ln(2Z/A) + A/2 − Z − ln 4`
//!
//! crosses zero. The root is found with Newton-Raphson starting at `A = 1`
//! and always floored: rounding up would weaken the bound.

use crate::config::SolverOptions;
use thiserror::Error;
use tracing::debug;

/// bytes of every page reserved for the page header
pub const PAGE_HEADER_BYTES: u64 = 32;
/// per-entry metadata stored next to each entry
pub const ENTRY_METADATA_BYTES: u64 = 16;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NumericalError {
    #[error("Eviction width must be positive")]
    ZeroWidth,
    #[error("Page size {page_size} leaves no room for entries of {entry_size} bytes")]
    NoRoom { page_size: u64, entry_size: u64 },
    #[error("Newton iteration for Z = {width} did not converge within {iterations} steps")]
    NoConvergence { width: u64, iterations: u32 },
    #[error("Newton iteration for Z = {width} degenerated at A = {at}")]
    Degenerate { width: u64, at: f64 },
}

/// the overflow condition `f(A)` for eviction width `z`
pub fn overflow_condition(a: f64, z: f64) -> f64 {
    z * ((2.0 * z) / a).ln() + a / 2.0 - z - 4f64.ln()
}

fn overflow_condition_derivative(a: f64, z: f64) -> f64 {
    0.5 - z / a
}

/// Number of entries that fit on a page next to the page header, which is
/// the eviction width the engine works with
pub fn estimate_width(page_size: u64, entry_size: u64) -> Result<u64, NumericalError> {
    let width = entry_size
        .checked_add(ENTRY_METADATA_BYTES)
        .map_or(0, |slot| page_size.saturating_sub(PAGE_HEADER_BYTES) / slot);

    if width == 0 {
        Err(NumericalError::NoRoom {
            page_size,
            entry_size,
        })
    } else {
        Ok(width)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Capacity {
    pub width: u64,
    /// unfloored root of the overflow condition
    pub root: f64,
    pub max_real_blocks: u64,
    pub iterations: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct CapacitySolver {
    tolerance: f64,
    max_iterations: u32,
}

impl Default for CapacitySolver {
    fn default() -> Self {
        Self::from(&SolverOptions::default())
    }
}

impl From<&SolverOptions> for CapacitySolver {
    fn from(options: &SolverOptions) -> Self {
        Self::new(options.tolerance, options.max_iterations)
    }
}

impl CapacitySolver {
    pub fn new(tolerance: f64, max_iterations: u32) -> Self {
        Self {
            tolerance,
            max_iterations,
        }
    }

    pub fn solve(&self, width: u64) -> Result<Capacity, NumericalError> {
        if width == 0 {
            return Err(NumericalError::ZeroWidth);
        }

        let z = width as f64;
        let mut a = 1.0f64;

        for iteration in 1..=self.max_iterations {
            let slope = overflow_condition_derivative(a, z);

            if slope == 0.0 {
                return Err(NumericalError::Degenerate { width, at: a });
            }

            let step = overflow_condition(a, z) / slope;
            a -= step;

            if !a.is_finite() || a <= 0.0 {
                return Err(NumericalError::Degenerate { width, at: a });
            }

            if step.abs() < self.tolerance {
                debug!(width, root = a, iteration, "Solved overflow condition");

                return Ok(Capacity {
                    width,
                    root: a,
                    max_real_blocks: a.floor() as u64,
                    iterations: iteration,
                });
            }
        }

        Err(NumericalError::NoConvergence {
            width,
            iterations: self.max_iterations,
        })
    }

    /// the floored root, i.e. the `--num_accesses_per_eviction` handed to the engine
    pub fn max_real_blocks(&self, width: u64) -> Result<u64, NumericalError> {
        self.solve(width).map(|capacity| capacity.max_real_blocks)
    }

    /// solve for the width a page of `page_size` bytes provides
    pub fn for_page(&self, page_size: u64, entry_size: u64) -> Result<u64, NumericalError> {
        self.max_real_blocks(estimate_width(page_size, entry_size)?)
    }
}
