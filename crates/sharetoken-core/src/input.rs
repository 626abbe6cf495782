//! Input file loading.
//!
//! The required header set is checked before a single row is read, so a
//! file with the wrong shape fails the run without producing any output.

use std::path::Path;

use crate::error::InputError;
use crate::record::{InputRecord, REQUIRED_INPUT_COLUMNS};

/// Read all records of a CSV input file.
pub fn load_input(path: &Path) -> Result<Vec<InputRecord>, InputError> {
    if !path.exists() {
        return Err(InputError::NotFound(path.to_path_buf()));
    }
    tracing::info!(path = %path.display(), "reading input file");

    let csv_err = |source| InputError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(csv_err)?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(csv_err)?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();
    tracing::info!(columns = ?headers, "detected columns");

    let missing: Vec<String> = REQUIRED_INPUT_COLUMNS
        .iter()
        .filter(|required| !headers.iter().any(|h| h == *required))
        .map(|c| c.to_string())
        .collect();
    if !missing.is_empty() {
        tracing::error!(missing = ?missing, "input file is missing required columns");
        return Err(InputError::MissingColumns {
            path: path.to_path_buf(),
            missing,
        });
    }
    reader.set_headers(csv::StringRecord::from(headers));

    let records = reader
        .deserialize::<InputRecord>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(csv_err)?;

    tracing::info!(rows = records.len(), "input loaded");
    Ok(records)
}
