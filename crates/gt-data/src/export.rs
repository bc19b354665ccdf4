//! CSV exports of extracted records and reference comparisons.
//!
//! Floats are written with their shortest round-trip representation, so a
//! re-read export reproduces the written values exactly.

use gt_types::{ArtifactRecord, ComparisonRow, DataError, ParameterVector};
use std::path::Path;

const RAW_COLUMNS: [&str; 3] = ["E_S0", "E_S1", "E_T1"];
const DERIVED_COLUMNS: [&str; 3] = ["S1", "T1", "S1-T1"];

const COMPARISON_HEADER: [&str; 9] = [
    "molecule",
    "S1_calculated",
    "S1_reference",
    "S1_diff",
    "T1_calculated",
    "T1_reference",
    "T1_diff",
    "S1_T1_diff",
    "valid",
];

/// One row of an extracted-values export.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedRow {
    pub params: ParameterVector,
    pub record: ArtifactRecord,
}

fn csv_error(path: &Path, e: impl std::fmt::Display) -> DataError {
    DataError::Csv {
        path: path.display().to_string(),
        message: e.to_string(),
    }
}

fn optional(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Overwrite `path` with one row per record, tagged with the trial's parameters.
pub fn write_extracted<P: AsRef<Path>>(
    path: P,
    params: &ParameterVector,
    records: &[ArtifactRecord],
) -> Result<(), DataError> {
    let path = path.as_ref();
    let mut writer = csv::Writer::from_path(path).map_err(|e| csv_error(path, e))?;

    let header: Vec<&str> = std::iter::once("molecule")
        .chain(params.names())
        .chain(RAW_COLUMNS)
        .chain(DERIVED_COLUMNS)
        .collect();
    writer.write_record(&header).map_err(|e| csv_error(path, e))?;

    for record in records {
        let row: Vec<String> = std::iter::once(record.molecule.clone())
            .chain(params.iter().map(|(_, value)| value.to_string()))
            .chain(
                [
                    record.s0,
                    record.s1,
                    record.t1,
                    record.s1_ev,
                    record.t1_ev,
                    record.gap_ev,
                ]
                .iter()
                .map(f64::to_string),
            )
            .collect();
        writer.write_record(&row).map_err(|e| csv_error(path, e))?;
    }

    writer.flush().map_err(|e| csv_error(path, e))?;
    tracing::debug!(path = %path.display(), rows = records.len(), "wrote extracted values");
    Ok(())
}

/// Read an export written by [`write_extracted`]. Every column between
/// `molecule` and `E_S0` is taken as a parameter.
pub fn read_extracted<P: AsRef<Path>>(path: P) -> Result<Vec<ExtractedRow>, DataError> {
    let path = path.as_ref();
    let path_str = path.display().to_string();
    let mut reader = csv::Reader::from_path(path).map_err(|e| csv_error(path, e))?;
    let headers = reader.headers().map_err(|e| csv_error(path, e))?.clone();

    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| DataError::MissingColumn {
                path: path_str.clone(),
                column: name.to_string(),
            })
    };

    let molecule_col = column("molecule")?;
    let raw_cols = [column("E_S0")?, column("E_S1")?, column("E_T1")?];
    let derived_cols = [column("S1")?, column("T1")?, column("S1-T1")?];
    let param_cols: Vec<(usize, String)> = (molecule_col + 1..raw_cols[0])
        .map(|i| (i, headers[i].to_string()))
        .collect();

    let mut rows = Vec::new();
    for (index, result) in reader.records().enumerate() {
        let line = index + 2;
        let record = result.map_err(|e| csv_error(path, e))?;

        let number = |col: usize| -> Result<f64, DataError> {
            let raw = record.get(col).unwrap_or_default();
            raw.trim().parse::<f64>().map_err(|_| DataError::InvalidValue {
                path: path_str.clone(),
                line,
                column: headers[col].to_string(),
                value: raw.to_string(),
            })
        };

        let params = param_cols
            .iter()
            .map(|(col, name)| number(*col).map(|value| (name.clone(), value)))
            .collect::<Result<Vec<_>, _>>()?;

        let gap_ev = number(derived_cols[2])?;
        rows.push(ExtractedRow {
            params: ParameterVector::new(params),
            record: ArtifactRecord {
                molecule: record.get(molecule_col).unwrap_or_default().to_string(),
                s0: number(raw_cols[0])?,
                s1: number(raw_cols[1])?,
                t1: number(raw_cols[2])?,
                s1_ev: number(derived_cols[0])?,
                t1_ev: number(derived_cols[1])?,
                gap_ev,
                valid: gap_ev < 0.0,
            },
        });
    }

    tracing::info!(path = %path_str, rows = rows.len(), "loaded extracted values");
    Ok(rows)
}

/// Overwrite `path` with per-molecule comparison rows. Missing references
/// are written as empty cells.
pub fn write_comparison<P: AsRef<Path>>(path: P, rows: &[ComparisonRow]) -> Result<(), DataError> {
    let path = path.as_ref();
    let mut writer = csv::Writer::from_path(path).map_err(|e| csv_error(path, e))?;
    writer
        .write_record(COMPARISON_HEADER)
        .map_err(|e| csv_error(path, e))?;

    for row in rows {
        writer
            .write_record([
                row.molecule.clone(),
                row.s1_calculated.to_string(),
                optional(row.s1_reference),
                optional(row.s1_diff),
                row.t1_calculated.to_string(),
                optional(row.t1_reference),
                optional(row.t1_diff),
                optional(row.gap_diff),
                row.valid.to_string(),
            ])
            .map_err(|e| csv_error(path, e))?;
    }

    writer.flush().map_err(|e| csv_error(path, e))?;
    Ok(())
}
