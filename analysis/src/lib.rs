//! Aggregation of finished OramSimulator runs into a numeric table, and the
//! reporting that consumes it.

pub mod aggregate;
pub mod endurance;
pub mod export;
pub mod geometry;
pub mod metrics;

pub use aggregate::{AggregateError, Aggregation, Aggregator, RunRecord};
pub use endurance::{Endurance, EnduranceModel};
pub use export::{write_report, write_report_file, write_table, write_table_file, ExportError};
pub use geometry::{GeometryError, StorageGeometry, TreeGeometry};
pub use metrics::{DerivedMetricsRow, COLUMNS};
