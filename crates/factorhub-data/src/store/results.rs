//! Calculated factor values.

use super::{SqliteStore, date_at, date_to_sql, timestamp_at, timestamp_to_sql};
use crate::error::Result;
use crate::records::FactorResult;
use chrono::NaiveDate;
use polars::prelude::*;
use rusqlite::types::Value as SqlValue;
use rusqlite::{Row, params, params_from_iter};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

fn result_from_row(row: &Row<'_>) -> rusqlite::Result<FactorResult> {
    Ok(FactorResult {
        code: row.get(0)?,
        trade_date: date_at(row, 1)?,
        factor_name: row.get(2)?,
        value: row.get(3)?,
        created_by: row.get(4)?,
        created_at: timestamp_at(row, 5)?,
    })
}

/// Filter for result queries on one stock code.
fn result_filter(
    code: &str,
    factor_name: Option<&str>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> (String, Vec<SqlValue>) {
    let mut clause = String::from("r.code = ?");
    let mut args = vec![SqlValue::Text(code.to_string())];

    if let Some(factor_name) = factor_name {
        clause.push_str(" AND r.factor_name = ?");
        args.push(SqlValue::Text(factor_name.to_string()));
    }
    if let Some(start) = start {
        clause.push_str(" AND r.trade_date >= ?");
        args.push(SqlValue::Text(date_to_sql(start)));
    }
    if let Some(end) = end {
        clause.push_str(" AND r.trade_date <= ?");
        args.push(SqlValue::Text(date_to_sql(end)));
    }

    (clause, args)
}

impl SqliteStore {
    /// Upsert calculated values in one transaction.
    pub fn put_results(&self, results: &[FactorResult]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;

        for result in results {
            tx.execute(
                "INSERT OR REPLACE INTO factor_results
                 (code, trade_date, factor_name, value, created_by, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    result.code,
                    date_to_sql(result.trade_date),
                    result.factor_name,
                    result.value,
                    result.created_by,
                    timestamp_to_sql(result.created_at)
                ],
            )?;
        }

        tx.commit()?;
        debug!(rows = results.len(), "stored factor results");
        Ok(results.len())
    }

    /// Values for `code`, newest first.
    pub fn results(
        &self,
        code: &str,
        factor_name: Option<&str>,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<FactorResult>> {
        let (clause, args) = result_filter(code, factor_name, start, end);
        let mut stmt = self.conn.prepare(&format!(
            "SELECT r.code, r.trade_date, r.factor_name, r.value, r.created_by, r.created_at
             FROM factor_results r
             WHERE {clause}
             ORDER BY r.trade_date DESC, r.factor_name ASC"
        ))?;
        let rows = stmt.query_map(params_from_iter(args.iter()), result_from_row)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// Values for `code` pivoted to one row per trade date (newest first).
    ///
    /// Columns are `trade_date` followed by one column per factor, named by
    /// the factor's `column_name` (or its `factor_name` when the definition is
    /// gone). Missing values are null.
    pub fn results_frame(
        &self,
        code: &str,
        factor_name: Option<&str>,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<DataFrame> {
        let (clause, args) = result_filter(code, factor_name, start, end);
        let mut stmt = self.conn.prepare(&format!(
            "SELECT r.trade_date, COALESCE(d.column_name, r.factor_name), r.value
             FROM factor_results r
             LEFT JOIN factor_definitions d ON d.factor_name = r.factor_name
             WHERE {clause}"
        ))?;
        let rows = stmt.query_map(params_from_iter(args.iter()), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, f64>(2)?,
            ))
        })?;

        let mut by_date: BTreeMap<String, BTreeMap<String, f64>> = BTreeMap::new();
        let mut names = BTreeSet::new();
        for row in rows {
            let (trade_date, column, value) = row?;
            names.insert(column.clone());
            by_date.entry(trade_date).or_default().insert(column, value);
        }

        let dates: Vec<&String> = by_date.keys().rev().collect();
        let mut columns: Vec<Column> = Vec::with_capacity(names.len() + 1);
        columns.push(
            Series::new(
                "trade_date".into(),
                dates.iter().map(|d| d.as_str()).collect::<Vec<_>>(),
            )
            .into(),
        );
        for name in &names {
            let values: Vec<Option<f64>> = dates
                .iter()
                .map(|date| by_date.get(*date).and_then(|row| row.get(name)).copied())
                .collect();
            columns.push(Series::new(name.as_str().into(), values).into());
        }

        let df = DataFrame::new(columns)?;

        // Convert date strings to Date type
        let df = df
            .lazy()
            .with_column(col("trade_date").cast(DataType::Date))
            .collect()?;

        Ok(df)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::NewFactorDefinition;
    use chrono::Utc;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
    }

    fn result(code: &str, d: u32, factor_name: &str, value: f64) -> FactorResult {
        FactorResult {
            code: code.to_string(),
            trade_date: day(d),
            factor_name: factor_name.to_string(),
            value,
            created_by: Some("system".to_string()),
            created_at: Utc::now(),
        }
    }

    fn seeded() -> SqliteStore {
        let store = SqliteStore::in_memory().unwrap();
        store
            .insert_factor(&NewFactorDefinition {
                factor_name: "turnover_rate".to_string(),
                cn_name: "换手率".to_string(),
                column_name: Some("turnover".to_string()),
                enabled: true,
                ..Default::default()
            })
            .unwrap();
        store
            .put_results(&[
                result("000001.SZ", 6, "turnover_rate", 1.1),
                result("000001.SZ", 7, "turnover_rate", 1.2),
                result("000001.SZ", 7, "volume_ratio", 0.9),
                result("600000.SH", 7, "turnover_rate", 3.0),
            ])
            .unwrap();
        store
    }

    #[test]
    fn test_results_newest_first() {
        let store = seeded();
        let rows = store.results("000001.SZ", None, None, None).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].trade_date, day(7));
        assert_eq!(rows[2].trade_date, day(6));

        let filtered = store
            .results("000001.SZ", Some("turnover_rate"), Some(day(7)), None)
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].value, 1.2);
    }

    #[test]
    fn test_put_results_upserts() {
        let store = seeded();
        store
            .put_results(&[result("000001.SZ", 7, "turnover_rate", 5.0)])
            .unwrap();
        let rows = store
            .results("000001.SZ", Some("turnover_rate"), Some(day(7)), Some(day(7)))
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value, 5.0);
    }

    #[test]
    fn test_results_frame_pivots_by_column_name() {
        let store = seeded();
        let df = store.results_frame("000001.SZ", None, None, None).unwrap();

        assert_eq!(df.height(), 2);
        assert_eq!(
            df.get_column_names_str(),
            vec!["trade_date", "turnover", "volume_ratio"]
        );
        assert_eq!(df.column("trade_date").unwrap().dtype(), &DataType::Date);

        let turnover = df.column("turnover").unwrap().f64().unwrap();
        assert_eq!(turnover.get(0), Some(1.2));
        assert_eq!(turnover.get(1), Some(1.1));

        let ratio = df.column("volume_ratio").unwrap().f64().unwrap();
        assert_eq!(ratio.get(0), Some(0.9));
        assert_eq!(ratio.get(1), None);
    }

    #[test]
    fn test_results_frame_single_factor() {
        let store = seeded();
        let df = store
            .results_frame("000001.SZ", Some("turnover_rate"), None, None)
            .unwrap();
        assert_eq!(df.get_column_names_str(), vec!["trade_date", "turnover"]);
    }

    #[test]
    fn test_results_frame_empty() {
        let store = seeded();
        let df = store.results_frame("999999.SZ", None, None, None).unwrap();
        assert_eq!(df.height(), 0);
        assert_eq!(df.width(), 1);
    }
}
