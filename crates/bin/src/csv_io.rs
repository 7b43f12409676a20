//! CSV observation import and result export.

use factorhub_data::SqliteStore;
use factorhub_factors::{DataSource, Observation};
use polars::prelude::{DataFrame, DataType, PolarsResult};
use serde_json::{Number, Value};
use std::collections::BTreeMap;
use std::error::Error;
use std::io::{Read, Write};
use tracing::info;

/// Header names accepted for the stock code column.
const CODE_COLUMNS: [&str; 2] = ["ts_code", "code"];

/// Rows and codes loaded by [`import_observations`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct ImportReport {
    pub(crate) rows: usize,
    pub(crate) codes: usize,
}

fn cell_value(raw: &str) -> Option<Value> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    Some(
        raw.parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map_or_else(|| Value::String(raw.to_string()), Value::Number),
    )
}

/// Load observations from CSV with a `ts_code`/`code` column, a `trade_date`
/// column and one column per field. Empty cells are left out.
pub(crate) fn import_observations<R: Read>(
    store: &SqliteStore,
    reader: R,
    source: DataSource,
) -> Result<ImportReport, Box<dyn Error>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let headers = rdr.headers()?.clone();

    let code_idx = headers
        .iter()
        .position(|h| CODE_COLUMNS.contains(&h))
        .ok_or("CSV needs a ts_code or code column")?;
    let date_idx = headers
        .iter()
        .position(|h| h == "trade_date")
        .ok_or("CSV needs a trade_date column")?;

    let mut by_code: BTreeMap<String, Vec<Observation>> = BTreeMap::new();
    for record in rdr.records() {
        let record = record?;
        let code = record.get(code_idx).unwrap_or_default().trim();
        let trade_date = record.get(date_idx).unwrap_or_default().trim();
        if code.is_empty() {
            continue;
        }

        let mut observation = Observation::new(trade_date);
        for (idx, (header, raw)) in headers.iter().zip(record.iter()).enumerate() {
            if idx == code_idx || idx == date_idx {
                continue;
            }
            if let Some(value) = cell_value(raw) {
                observation = observation.with(header, value);
            }
        }
        by_code.entry(code.to_string()).or_default().push(observation);
    }

    let mut report = ImportReport::default();
    for (code, rows) in &by_code {
        report.rows += store.put_observations(source, code, rows)?;
        report.codes += 1;
    }
    info!(%source, rows = report.rows, codes = report.codes, "imported observations");
    Ok(report)
}

/// Header and string cells of a result frame.
pub(crate) fn frame_rows(df: &DataFrame) -> PolarsResult<(Vec<String>, Vec<Vec<String>>)> {
    let header: Vec<String> = df
        .get_column_names_str()
        .into_iter()
        .map(str::to_string)
        .collect();

    let dates = df.column("trade_date")?.cast(&DataType::String)?;
    let dates = dates.str()?;
    let values = df
        .get_columns()
        .iter()
        .skip(1)
        .map(|column| column.f64().cloned())
        .collect::<PolarsResult<Vec<_>>>()?;

    let rows = (0..df.height())
        .map(|i| {
            let mut row = Vec::with_capacity(header.len());
            row.push(dates.get(i).unwrap_or_default().to_string());
            row.extend(
                values
                    .iter()
                    .map(|column| column.get(i).map(|v| v.to_string()).unwrap_or_default()),
            );
            row
        })
        .collect();

    Ok((header, rows))
}

/// Write a result frame as CSV.
pub(crate) fn write_frame_csv<W: Write>(df: &DataFrame, writer: W) -> Result<(), Box<dyn Error>> {
    let (header, rows) = frame_rows(df)?;
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(&header)?;
    for row in &rows {
        wtr.write_record(row)?;
    }
    wtr.flush()?;
    Ok(())
}
