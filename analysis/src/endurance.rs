//! Projection of measured write volume onto drive lifetime.
//!
//! Only consumes finished [`DerivedMetricsRow`]s, the numeric table itself is
//! never modified.

use crate::metrics::DerivedMetricsRow;

const MINUTES_PER_YEAR: f64 = 60.0 * 24.0 * 365.25;

/// extra columns appended by [`EnduranceModel::project`]
pub const ENDURANCE_COLUMNS: [&str; 3] = ["Rounds per Hour", "Lifetime Rounds", "Lifetime Years"];

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EnduranceModel {
    /// full drive writes the medium is rated for
    pub rated_drive_writes: f64,
    /// fixed time per round spent outside the measured simulation
    pub overhead_minutes: f64,
}

impl Default for EnduranceModel {
    fn default() -> Self {
        Self {
            rated_drive_writes: 5437.0,
            overhead_minutes: 2.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Endurance {
    pub rounds_per_hour: f64,
    pub lifetime_rounds: f64,
    pub lifetime_years: f64,
}

impl Endurance {
    pub fn record(&self) -> [String; 3] {
        [
            self.rounds_per_hour.to_string(),
            self.lifetime_rounds.to_string(),
            self.lifetime_years.to_string(),
        ]
    }
}

impl EnduranceModel {
    pub fn project(&self, row: &DerivedMetricsRow) -> Endurance {
        // a run that never writes never wears the drive out
        let lifetime_rounds = if row.total_bytes_wrote == 0 {
            f64::INFINITY
        } else {
            row.main_tree_size as f64 * self.rated_drive_writes / row.total_bytes_wrote as f64
                * row.rounds as f64
        };

        Endurance {
            rounds_per_hour: 3600.0 / row.time_per_round,
            lifetime_rounds,
            lifetime_years: (row.time_per_round / 60.0 + self.overhead_minutes) * lifetime_rounds
                / MINUTES_PER_YEAR,
        }
    }
}
