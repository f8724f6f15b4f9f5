//! CSV import of measured generation/load series.
//!
//! Expected columns: `timestamp` (RFC 3339), `generation_kw`, `load_kw`.
//! Extra columns are ignored.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use tracing::info;

use crate::error::SizingError;
use crate::series::{EnergyTimeSeries, Sample};

/// Loads a series from a CSV file.
///
/// # Errors
///
/// `Io` if the file cannot be opened, `Csv` for malformed rows or
/// timestamps, and every validation error of
/// [`EnergyTimeSeries::from_samples`].
pub fn load_series_csv(path: &Path, reference_kwp: f64) -> Result<EnergyTimeSeries, SizingError> {
    let file = File::open(path)?;
    let series = read_series_csv(file, reference_kwp)?;
    info!(
        path = %path.display(),
        samples = series.len(),
        step_hours = series.step_hours(),
        "loaded series"
    );
    Ok(series)
}

/// Reads a series from any CSV source.
///
/// # Errors
///
/// Same as [`load_series_csv`], minus file access.
pub fn read_series_csv(reader: impl Read, reference_kwp: f64) -> Result<EnergyTimeSeries, SizingError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let samples = rdr
        .deserialize::<Sample>()
        .collect::<Result<Vec<_>, _>>()?;
    EnergyTimeSeries::from_samples(samples, reference_kwp)
}
