use crate::{
    endurance::{EnduranceModel, ENDURANCE_COLUMNS},
    metrics::{DerivedMetricsRow, COLUMNS},
};
use std::{fs::File, io, path::Path};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to create {path:?}")]
    Create {
        path: std::path::PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to write table")]
    Csv(#[from] csv::Error),
    #[error("Failed to flush table")]
    Flush(#[from] io::Error),
}

/// the aggregated table, one record per row
pub fn write_table<W: io::Write>(rows: &[DerivedMetricsRow], writer: W) -> Result<(), ExportError> {
    let mut wtr = csv::Writer::from_writer(writer);

    wtr.write_record(COLUMNS)?;
    for row in rows {
        wtr.write_record(row.record())?;
    }
    wtr.flush()?;

    Ok(())
}

/// the aggregated table extended with the lifetime projection of every row
pub fn write_report<W: io::Write>(
    rows: &[DerivedMetricsRow],
    model: &EnduranceModel,
    writer: W,
) -> Result<(), ExportError> {
    let mut wtr = csv::Writer::from_writer(writer);

    wtr.write_record(COLUMNS.iter().chain(ENDURANCE_COLUMNS.iter()))?;
    for row in rows {
        let mut record = row.record();
        record.extend(model.project(row).record());
        wtr.write_record(record)?;
    }
    wtr.flush()?;

    Ok(())
}

fn create(path: &Path) -> Result<File, ExportError> {
    File::create(path).map_err(|source| ExportError::Create {
        path: path.to_path_buf(),
        source,
    })
}

pub fn write_table_file(rows: &[DerivedMetricsRow], path: &Path) -> Result<(), ExportError> {
    write_table(rows, create(path)?)?;
    info!("Wrote {} rows to {}", rows.len(), path.display());

    Ok(())
}

pub fn write_report_file(
    rows: &[DerivedMetricsRow],
    model: &EnduranceModel,
    path: &Path,
) -> Result<(), ExportError> {
    write_report(rows, model, create(path)?)?;
    info!("Wrote {} rows to {}", rows.len(), path.display());

    Ok(())
}
