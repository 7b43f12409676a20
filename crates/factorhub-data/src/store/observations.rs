//! Imported market observations.

use super::{SqliteStore, date_at, date_to_sql};
use crate::error::{DataError, Result};
use chrono::NaiveDate;
use factorhub_factors::{DataSource, Observation, ObservationSource, SourceError};
use rusqlite::params;
use serde_json::{Map, Value};
use tracing::debug;

impl SqliteStore {
    /// Upsert observation rows for one code.
    ///
    /// Trade dates are normalised to `YYYY-MM-DD`; a row whose date does not
    /// parse rejects the whole batch.
    pub fn put_observations(
        &self,
        source: DataSource,
        code: &str,
        rows: &[Observation],
    ) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;

        for row in rows {
            let date = row.date().ok_or_else(|| {
                DataError::Parse(format!("Invalid trade date for {code}: {}", row.trade_date))
            })?;
            let data = serde_json::to_string(&row.values)?;
            tx.execute(
                "INSERT OR REPLACE INTO observations (code, source, trade_date, data)
                 VALUES (?1, ?2, ?3, ?4)",
                params![code, source.as_str(), date_to_sql(date), data],
            )?;
        }

        tx.commit()?;
        debug!(code, %source, rows = rows.len(), "stored observations");
        Ok(rows.len())
    }

    /// Observation rows for `code` in `[start, end]`, oldest first.
    pub fn observations(
        &self,
        source: DataSource,
        code: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Observation>> {
        let mut stmt = self.conn.prepare(
            "SELECT trade_date, data FROM observations
             WHERE code = ?1 AND source = ?2 AND trade_date >= ?3 AND trade_date <= ?4
             ORDER BY trade_date ASC",
        )?;

        let rows = stmt.query_map(
            params![code, source.as_str(), date_to_sql(start), date_to_sql(end)],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        )?;

        let mut observations = Vec::new();
        for row in rows {
            let (trade_date, data) = row?;
            let values: Map<String, Value> = serde_json::from_str(&data)?;
            observations.push(Observation { trade_date, values });
        }
        Ok(observations)
    }

    /// Distinct codes with observations in `[start, end]`, sorted.
    pub fn observation_codes(
        &self,
        source: DataSource,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT code FROM observations
             WHERE source = ?1 AND trade_date >= ?2 AND trade_date <= ?3
             ORDER BY code",
        )?;
        let rows = stmt.query_map(
            params![source.as_str(), date_to_sql(start), date_to_sql(end)],
            |row| row.get::<_, String>(0),
        )?;

        let mut codes = Vec::new();
        for row in rows {
            codes.push(row?);
        }
        Ok(codes)
    }

    /// Dates with observations for `code` in `[start, end]`, ascending.
    pub fn trading_dates(
        &self,
        source: DataSource,
        code: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<NaiveDate>> {
        let mut stmt = self.conn.prepare(
            "SELECT trade_date FROM observations
             WHERE code = ?1 AND source = ?2 AND trade_date >= ?3 AND trade_date <= ?4
             ORDER BY trade_date ASC",
        )?;
        let rows = stmt.query_map(
            params![code, source.as_str(), date_to_sql(start), date_to_sql(end)],
            |row| date_at(row, 0),
        )?;

        let mut dates = Vec::new();
        for row in rows {
            dates.push(row?);
        }
        Ok(dates)
    }
}

impl ObservationSource for SqliteStore {
    fn fetch(
        &self,
        source: DataSource,
        code: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> std::result::Result<Vec<Observation>, SourceError> {
        self.observations(source, code, start, end)
            .map_err(SourceError::new)
    }
}
