//! File-level readers and writers for the driver loop.

use std::path::Path;

use tracing::debug;

use biokb_shared::{BioKbError, Result};

use crate::table::ResultTable;

/// Read one column of query terms from a CSV file.
///
/// Blank cells are dropped and surrounding whitespace is trimmed, so a
/// spreadsheet column with gaps yields a clean term list.
pub fn read_column(path: &Path, column: &str) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path).map_err(|e| BioKbError::io(path, e))?;
    let table = ResultTable::from_csv(&content)?;

    let index = table
        .headers
        .iter()
        .position(|h| h == column)
        .ok_or_else(|| {
            BioKbError::validation(format!(
                "input file {} has no '{column}' column (found: {})",
                path.display(),
                table.headers.join(", ")
            ))
        })?;

    let terms: Vec<String> = table
        .rows
        .iter()
        .filter_map(|row| row.get(index))
        .map(|cell| cell.trim().to_string())
        .filter(|cell| !cell.is_empty())
        .collect();

    debug!(path = %path.display(), column, terms = terms.len(), "read query column");
    Ok(terms)
}

/// Write a table to a CSV file, creating parent directories as needed.
pub fn write_csv(path: &Path, table: &ResultTable) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| BioKbError::io(parent, e))?;
        }
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(&table.headers)
        .map_err(|e| BioKbError::parse(format!("CSV write: {e}")))?;
    for row in &table.rows {
        writer
            .write_record(row)
            .map_err(|e| BioKbError::parse(format!("CSV write: {e}")))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| BioKbError::parse(format!("CSV flush: {e}")))?;
    std::fs::write(path, bytes).map_err(|e| BioKbError::io(path, e))?;

    debug!(path = %path.display(), rows = table.row_count(), "wrote output file");
    Ok(())
}
