//! Factor definitions, models and mapping configs.

use super::{SqliteStore, json_at, now, timestamp_at, timestamp_to_sql};
use crate::error::{DataError, Result};
use crate::query::FactorQuery;
use crate::records::{
    FactorDefinition, FactorDefinitionUpdate, FactorModel, FactorModelUpdate, NewFactorDefinition,
    NewFactorModel, StoredFactorConfig,
};
use factorhub_factors::{FactorConfig, ModelId};
use rusqlite::types::Value as SqlValue;
use rusqlite::{OptionalExtension, Row, params, params_from_iter};
use std::collections::BTreeSet;
use tracing::{debug, info};

const FACTOR_COLUMNS: &str = "id, factor_name, cn_name, en_name, column_name, description, \
     enabled, created_by, created_at, updated_by, updated_at";

const MODEL_COLUMNS: &str = "id, factor_id, model_name, model_code, config, is_default, \
     enabled, created_by, created_at, updated_by, updated_at";

const CONFIG_COLUMNS: &str = "factor_id, config, created_by, created_at, updated_by, updated_at";

fn factor_from_row(row: &Row<'_>) -> rusqlite::Result<FactorDefinition> {
    Ok(FactorDefinition {
        id: row.get(0)?,
        factor_name: row.get(1)?,
        cn_name: row.get(2)?,
        en_name: row.get(3)?,
        column_name: row.get(4)?,
        description: row.get(5)?,
        enabled: row.get(6)?,
        created_by: row.get(7)?,
        created_at: timestamp_at(row, 8)?,
        updated_by: row.get(9)?,
        updated_at: timestamp_at(row, 10)?,
    })
}

fn model_from_row(row: &Row<'_>) -> rusqlite::Result<FactorModel> {
    Ok(FactorModel {
        id: ModelId(row.get(0)?),
        factor_id: row.get(1)?,
        model_name: row.get(2)?,
        model_code: row.get(3)?,
        config: json_at(row, 4)?,
        is_default: row.get(5)?,
        enabled: row.get(6)?,
        created_by: row.get(7)?,
        created_at: timestamp_at(row, 8)?,
        updated_by: row.get(9)?,
        updated_at: timestamp_at(row, 10)?,
    })
}

fn config_from_row(row: &Row<'_>) -> rusqlite::Result<StoredFactorConfig> {
    Ok(StoredFactorConfig {
        factor_id: row.get(0)?,
        config: json_at(row, 1)?,
        created_by: row.get(2)?,
        created_at: timestamp_at(row, 3)?,
        updated_by: row.get(4)?,
        updated_at: timestamp_at(row, 5)?,
    })
}

impl SqliteStore {
    // ==================== Factor definitions ====================

    /// Insert a factor; names must be unique.
    pub fn insert_factor(&self, new: &NewFactorDefinition) -> Result<FactorDefinition> {
        if self.factor_by_name(&new.factor_name)?.is_some() {
            return Err(DataError::duplicate("factor", &new.factor_name));
        }

        let column_name = new
            .column_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(&new.factor_name);
        if self.column_in_use(column_name, None)? {
            return Err(DataError::duplicate("factor column", column_name));
        }
        let ts = timestamp_to_sql(now());

        self.conn.execute(
            "INSERT INTO factor_definitions
             (factor_name, cn_name, en_name, column_name, description, enabled,
              created_by, created_at, updated_by, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?7, ?8)",
            params![
                new.factor_name,
                new.cn_name,
                new.en_name,
                column_name,
                new.description,
                new.enabled,
                new.created_by,
                ts
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        info!(factor = %new.factor_name, id, "created factor definition");

        self.require_factor(id)
    }

    /// Factor by id.
    pub fn factor(&self, id: i64) -> Result<Option<FactorDefinition>> {
        let factor = self
            .conn
            .query_row(
                &format!("SELECT {FACTOR_COLUMNS} FROM factor_definitions WHERE id = ?1"),
                params![id],
                factor_from_row,
            )
            .optional()?;
        Ok(factor)
    }

    /// Factor by id, failing with `NotFound`.
    pub fn require_factor(&self, id: i64) -> Result<FactorDefinition> {
        self.factor(id)?
            .ok_or_else(|| DataError::not_found("factor", id))
    }

    /// Factor by unique name.
    pub fn factor_by_name(&self, factor_name: &str) -> Result<Option<FactorDefinition>> {
        let factor = self
            .conn
            .query_row(
                &format!("SELECT {FACTOR_COLUMNS} FROM factor_definitions WHERE factor_name = ?1"),
                params![factor_name],
                factor_from_row,
            )
            .optional()?;
        Ok(factor)
    }

    /// Whether another factor already writes results under `column_name`.
    fn column_in_use(&self, column_name: &str, except: Option<i64>) -> Result<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM factor_definitions
                 WHERE column_name = ?1 AND (?2 IS NULL OR id != ?2) LIMIT 1",
                params![column_name, except],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// List factors with filtering, paging and sorting.
    pub fn list_factors(&self, query: &FactorQuery) -> Result<Vec<FactorDefinition>> {
        let mut sql = format!("SELECT {FACTOR_COLUMNS} FROM factor_definitions");
        let mut args: Vec<SqlValue> = Vec::new();

        if let Some(enabled) = query.enabled {
            sql.push_str(" WHERE enabled = ?");
            args.push(SqlValue::Integer(i64::from(enabled)));
        }

        let (limit, offset) = query.page.bounds();
        sql.push_str(&format!(
            " ORDER BY {} {}, id ASC LIMIT ? OFFSET ?",
            query.order_by.column(),
            query.order.as_sql()
        ));
        args.push(SqlValue::Integer(limit));
        args.push(SqlValue::Integer(offset));

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), factor_from_row)?;

        let mut factors = Vec::new();
        for row in rows {
            factors.push(row?);
        }
        Ok(factors)
    }

    /// Apply a partial update to a factor.
    pub fn update_factor(&self, id: i64, update: &FactorDefinitionUpdate) -> Result<FactorDefinition> {
        let mut factor = self.require_factor(id)?;
        update.apply(&mut factor);
        if self.column_in_use(&factor.column_name, Some(id))? {
            return Err(DataError::duplicate("factor column", &factor.column_name));
        }
        factor.updated_at = now();

        self.conn.execute(
            "UPDATE factor_definitions
             SET cn_name = ?2, en_name = ?3, column_name = ?4, description = ?5,
                 enabled = ?6, updated_by = ?7, updated_at = ?8
             WHERE id = ?1",
            params![
                id,
                factor.cn_name,
                factor.en_name,
                factor.column_name,
                factor.description,
                factor.enabled,
                factor.updated_by,
                timestamp_to_sql(factor.updated_at)
            ],
        )?;
        info!(factor = %factor.factor_name, id, "updated factor definition");

        Ok(factor)
    }

    /// Delete a factor together with its models and config.
    pub fn delete_factor(&self, id: i64) -> Result<()> {
        let factor = self.require_factor(id)?;

        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM factor_configs WHERE factor_id = ?1", params![id])?;
        let models = tx.execute("DELETE FROM factor_models WHERE factor_id = ?1", params![id])?;
        tx.execute("DELETE FROM factor_definitions WHERE id = ?1", params![id])?;
        tx.commit()?;

        info!(factor = %factor.factor_name, id, models, "deleted factor definition");
        Ok(())
    }

    // ==================== Factor models ====================

    /// Insert a model; marking it default clears the flag on its siblings.
    pub fn insert_model(&self, new: &NewFactorModel) -> Result<FactorModel> {
        self.require_factor(new.factor_id)?;
        let config = serde_json::to_string(&new.config)?;
        let ts = timestamp_to_sql(now());

        let tx = self.conn.unchecked_transaction()?;
        if new.is_default {
            tx.execute(
                "UPDATE factor_models SET is_default = 0 WHERE factor_id = ?1",
                params![new.factor_id],
            )?;
        }
        tx.execute(
            "INSERT INTO factor_models
             (factor_id, model_name, model_code, config, is_default, enabled,
              created_by, created_at, updated_by, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?7, ?8)",
            params![
                new.factor_id,
                new.model_name,
                new.model_code,
                config,
                new.is_default,
                new.enabled,
                new.created_by,
                ts
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;
        info!(model = %new.model_code, id, factor_id = new.factor_id, "created factor model");

        self.require_model(ModelId(id))
    }

    /// Model by id.
    pub fn model(&self, id: ModelId) -> Result<Option<FactorModel>> {
        let model = self
            .conn
            .query_row(
                &format!("SELECT {MODEL_COLUMNS} FROM factor_models WHERE id = ?1"),
                params![id.0],
                model_from_row,
            )
            .optional()?;
        Ok(model)
    }

    /// Model by id, failing with `NotFound`.
    pub fn require_model(&self, id: ModelId) -> Result<FactorModel> {
        self.model(id)?.ok_or_else(|| DataError::not_found("model", id))
    }

    /// Models, optionally restricted to one factor, ordered by id.
    pub fn list_models(&self, factor_id: Option<i64>) -> Result<Vec<FactorModel>> {
        let (sql, args) = match factor_id {
            Some(factor_id) => (
                format!("SELECT {MODEL_COLUMNS} FROM factor_models WHERE factor_id = ?1 ORDER BY id"),
                vec![SqlValue::Integer(factor_id)],
            ),
            None => (
                format!("SELECT {MODEL_COLUMNS} FROM factor_models ORDER BY id"),
                Vec::new(),
            ),
        };

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), model_from_row)?;

        let mut models = Vec::new();
        for row in rows {
            models.push(row?);
        }
        Ok(models)
    }

    /// Ids of every stored model.
    pub fn model_ids(&self) -> Result<BTreeSet<ModelId>> {
        let mut stmt = self.conn.prepare("SELECT id FROM factor_models")?;
        let rows = stmt.query_map([], |row| row.get::<_, i64>(0))?;

        let mut ids = BTreeSet::new();
        for row in rows {
            ids.insert(ModelId(row?));
        }
        Ok(ids)
    }

    /// The factor's designated default model: flagged default and enabled.
    pub fn default_model(&self, factor_id: i64) -> Result<Option<FactorModel>> {
        let model = self
            .conn
            .query_row(
                &format!(
                    "SELECT {MODEL_COLUMNS} FROM factor_models
                     WHERE factor_id = ?1 AND is_default = 1 AND enabled = 1
                     ORDER BY id LIMIT 1"
                ),
                params![factor_id],
                model_from_row,
            )
            .optional()?;
        Ok(model)
    }

    /// Apply a partial update to a model.
    pub fn update_model(&self, id: ModelId, update: &FactorModelUpdate) -> Result<FactorModel> {
        let mut model = self.require_model(id)?;
        update.apply(&mut model);
        model.updated_at = now();
        let config = serde_json::to_string(&model.config)?;

        let tx = self.conn.unchecked_transaction()?;
        if model.is_default {
            tx.execute(
                "UPDATE factor_models SET is_default = 0 WHERE factor_id = ?1 AND id != ?2",
                params![model.factor_id, id.0],
            )?;
        }
        tx.execute(
            "UPDATE factor_models
             SET model_name = ?2, model_code = ?3, config = ?4, is_default = ?5,
                 enabled = ?6, updated_by = ?7, updated_at = ?8
             WHERE id = ?1",
            params![
                id.0,
                model.model_name,
                model.model_code,
                config,
                model.is_default,
                model.enabled,
                model.updated_by,
                timestamp_to_sql(model.updated_at)
            ],
        )?;
        tx.commit()?;
        info!(model = %model.model_code, %id, "updated factor model");

        Ok(model)
    }

    /// Delete a model.
    pub fn delete_model(&self, id: ModelId) -> Result<()> {
        let removed = self
            .conn
            .execute("DELETE FROM factor_models WHERE id = ?1", params![id.0])?;
        if removed == 0 {
            return Err(DataError::not_found("model", id));
        }
        info!(%id, "deleted factor model");
        Ok(())
    }

    // ==================== Factor configs ====================

    /// Insert the mapping config of a factor; at most one per factor.
    ///
    /// Validation of the mappings is the caller's responsibility.
    pub fn insert_config(
        &self,
        factor_id: i64,
        config: &FactorConfig,
        created_by: Option<&str>,
    ) -> Result<StoredFactorConfig> {
        self.require_factor(factor_id)?;
        if self.config(factor_id)?.is_some() {
            return Err(DataError::duplicate("factor config", factor_id));
        }

        let json = serde_json::to_string(config)?;
        let ts = timestamp_to_sql(now());
        self.conn.execute(
            "INSERT INTO factor_configs
             (factor_id, config, created_by, created_at, updated_by, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?3, ?4)",
            params![factor_id, json, created_by, ts],
        )?;
        info!(factor_id, mappings = config.mappings.len(), "created factor config");

        self.require_config(factor_id)
    }

    /// Mapping config of a factor.
    pub fn config(&self, factor_id: i64) -> Result<Option<StoredFactorConfig>> {
        let config = self
            .conn
            .query_row(
                &format!("SELECT {CONFIG_COLUMNS} FROM factor_configs WHERE factor_id = ?1"),
                params![factor_id],
                config_from_row,
            )
            .optional()?;
        Ok(config)
    }

    /// Mapping config of a factor, failing with `NotFound`.
    pub fn require_config(&self, factor_id: i64) -> Result<StoredFactorConfig> {
        self.config(factor_id)?
            .ok_or_else(|| DataError::not_found("factor config", factor_id))
    }

    /// Replace the mapping config of a factor.
    pub fn update_config(
        &self,
        factor_id: i64,
        config: &FactorConfig,
        updated_by: Option<&str>,
    ) -> Result<StoredFactorConfig> {
        let existing = self.require_config(factor_id)?;
        let json = serde_json::to_string(config)?;
        let updated_by = updated_by.map(str::to_string).or(existing.updated_by);

        self.conn.execute(
            "UPDATE factor_configs SET config = ?2, updated_by = ?3, updated_at = ?4
             WHERE factor_id = ?1",
            params![factor_id, json, updated_by, timestamp_to_sql(now())],
        )?;
        info!(factor_id, mappings = config.mappings.len(), "updated factor config");

        self.require_config(factor_id)
    }

    /// Delete the mapping config of a factor.
    pub fn delete_config(&self, factor_id: i64) -> Result<()> {
        let removed = self.conn.execute(
            "DELETE FROM factor_configs WHERE factor_id = ?1",
            params![factor_id],
        )?;
        if removed == 0 {
            return Err(DataError::not_found("factor config", factor_id));
        }
        debug!(factor_id, "deleted factor config");
        Ok(())
    }
}
