//! CSV export of dispatch traces and optimizer evaluations.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use chrono::SecondsFormat;

use crate::optimize::CandidatePoint;
use crate::series::EnergyTimeSeries;
use crate::sim::SimulationResult;

/// Column header of the per-step dispatch trace.
const TRACE_HEADER: &str = "timestamp,generation_kw,load_kw,grid_import_kw,grid_export_kw,\
                            battery_charge_kw,battery_discharge_kw,soc_kwh,loss_kwh";

/// Column header of the evaluation trace.
const EVALUATION_HEADER: &str =
    "pv_kwp,battery_kwh,score,feasible,violation,self_sufficiency_pct,lifecycle_cost";

/// Exports the dispatch trace of `result` over `series` to a CSV file.
///
/// `series` must be the series `result` was simulated on (already scaled to
/// the candidate's PV capacity).
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_trace_csv(
    series: &EnergyTimeSeries,
    result: &SimulationResult,
    path: &Path,
) -> io::Result<()> {
    let file = File::create(path)?;
    write_trace_csv(series, result, io::BufWriter::new(file))
}

/// Writes the dispatch trace as CSV to any writer.
///
/// The first three columns match the import format, so a trace can be read
/// back as a series.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails or the trace length differs from
/// the series length.
pub fn write_trace_csv(
    series: &EnergyTimeSeries,
    result: &SimulationResult,
    writer: impl Write,
) -> io::Result<()> {
    if series.len() != result.len() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "trace has {} steps but series has {} samples",
                result.len(),
                series.len()
            ),
        ));
    }

    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    wtr.write_record(TRACE_HEADER.split(',').map(str::trim))?;

    for (i, s) in series.samples().iter().enumerate() {
        wtr.write_record(&[
            s.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            format!("{:.4}", s.generation_kw),
            format!("{:.4}", s.load_kw),
            format!("{:.4}", result.grid_import_kw[i]),
            format!("{:.4}", result.grid_export_kw[i]),
            format!("{:.4}", result.battery_charge_kw[i]),
            format!("{:.4}", result.battery_discharge_kw[i]),
            format!("{:.4}", result.soc_kwh[i]),
            format!("{:.4}", result.loss_kwh[i]),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

/// Exports evaluated candidates to a CSV file.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_evaluations_csv<'a>(
    points: impl IntoIterator<Item = &'a CandidatePoint>,
    path: &Path,
) -> io::Result<()> {
    let file = File::create(path)?;
    write_evaluations_csv(points, io::BufWriter::new(file))
}

/// Writes evaluated candidates as CSV to any writer, one row per
/// evaluation in the order given.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_evaluations_csv<'a>(
    points: impl IntoIterator<Item = &'a CandidatePoint>,
    writer: impl Write,
) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    wtr.write_record(EVALUATION_HEADER.split(','))?;

    for p in points {
        wtr.write_record(&[
            format!("{:.3}", p.pv_kwp),
            format!("{:.3}", p.battery_kwh),
            format!("{:.6}", p.score),
            p.feasible.to_string(),
            format!("{:.4}", p.violation),
            format!("{:.3}", p.self_sufficiency_pct),
            format!("{:.2}", p.lifecycle_cost),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{TimeDelta, TimeZone, Utc};

    use super::*;
    use crate::io::import::read_series_csv;
    use crate::sim::{BatteryConfig, simulate};

    fn series() -> EnergyTimeSeries {
        let start = Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap();
        EnergyTimeSeries::uniform(
            start,
            TimeDelta::minutes(30),
            &[0.0, 2.0, 3.5, 1.0],
            &[0.5, 0.5, 1.0, 2.0],
            3.0,
        )
        .unwrap()
    }

    fn csv_lines(buf: Vec<u8>) -> Vec<String> {
        String::from_utf8(buf)
            .unwrap_or_default()
            .lines()
            .map(str::to_owned)
            .collect()
    }

    #[test]
    fn trace_header_and_row_count() {
        let s = series();
        let r = simulate(&s, &BatteryConfig::new(2.0, 1.0)).unwrap();
        let mut buf = Vec::new();
        write_trace_csv(&s, &r, &mut buf).unwrap();
        let lines = csv_lines(buf);

        assert_eq!(
            lines[0],
            "timestamp,generation_kw,load_kw,grid_import_kw,grid_export_kw,\
             battery_charge_kw,battery_discharge_kw,soc_kwh,loss_kwh"
        );
        assert_eq!(lines.len(), 5);
        assert!(lines[1].starts_with("2024-07-01T00:00:00Z,"));
    }

    #[test]
    fn trace_reads_back_as_series() {
        let s = series();
        let r = simulate(&s, &BatteryConfig::new(0.0, 1.0)).unwrap();
        let mut buf = Vec::new();
        write_trace_csv(&s, &r, &mut buf).unwrap();

        let back = read_series_csv(buf.as_slice(), 3.0).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let s = series();
        let r = SimulationResult::default();
        assert!(write_trace_csv(&s, &r, Vec::new()).is_err());
    }

    #[test]
    fn evaluations_keep_order_and_parse() {
        let points: Vec<CandidatePoint> = (0..3)
            .map(|i| CandidatePoint {
                pv_kwp: f64::from(i),
                battery_kwh: 5.0,
                score: 1.5,
                feasible: i != 1,
                violation: if i == 1 { 2.0 } else { 0.0 },
                self_sufficiency_pct: 40.0,
                lifecycle_cost: 12_000.0,
            })
            .collect();
        let mut buf = Vec::new();
        write_evaluations_csv(&points, &mut buf).unwrap();

        let mut rdr = csv::ReaderBuilder::new().from_reader(buf.as_slice());
        let pv: Vec<f64> = rdr
            .records()
            .map(|rec| rec.unwrap()[0].parse().unwrap())
            .collect();
        assert_eq!(pv, vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn deterministic_output() {
        let s = series();
        let r = simulate(&s, &BatteryConfig::new(2.0, 1.0)).unwrap();
        let mut a = Vec::new();
        let mut b = Vec::new();
        write_trace_csv(&s, &r, &mut a).unwrap();
        write_trace_csv(&s, &r, &mut b).unwrap();
        assert_eq!(a, b);
    }
}
