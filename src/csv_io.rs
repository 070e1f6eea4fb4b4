use std::path::Path;

use tracing::info;

use crate::error::{EtlError, Result};
use crate::models::{EnrichedTable, Table};

/// Write the table as CSV, header first, replacing any existing file.
pub fn save_csv(table: &EnrichedTable, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let io_error = |e: csv::Error| EtlError::io(path, e.into());

    let mut writer = csv::Writer::from_path(path).map_err(io_error)?;
    writer.write_record(table.columns()).map_err(io_error)?;
    for row in table.rows() {
        writer
            .write_record(row.iter().map(|value| value.to_field()))
            .map_err(io_error)?;
    }
    writer.flush().map_err(|e| EtlError::io(path, e))?;

    info!("💾 Saved {} rows to {}", table.row_count(), path.display());
    Ok(())
}

/// Read a CSV file written by [`save_csv`] back into a typed table.
pub fn read_csv(path: impl AsRef<Path>) -> Result<Table> {
    let path = path.as_ref();
    let io_error = |e: csv::Error| EtlError::io(path, e.into());

    let mut reader = csv::Reader::from_path(path).map_err(io_error)?;
    let columns: Vec<String> = reader
        .headers()
        .map_err(io_error)?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(io_error)?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    Table::from_text_rows(columns, rows, None)
        .map_err(|e| EtlError::io(path, std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
}
