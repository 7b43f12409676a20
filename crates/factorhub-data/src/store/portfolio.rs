//! User positions and favorite stocks.
//!
//! Every lookup is scoped by `user_id`; a row owned by another user reads as
//! missing.

use super::{SqliteStore, date_to_sql, now, optional_date_at, timestamp_at, timestamp_to_sql};
use crate::error::{DataError, Result};
use crate::query::{FavoriteQuery, PositionQuery};
use crate::records::{Favorite, NewFavorite, NewPosition, Position, PositionUpdate};
use rusqlite::types::Value as SqlValue;
use rusqlite::{OptionalExtension, Row, params, params_from_iter};
use tracing::info;

const POSITION_COLUMNS: &str = "id, user_id, code, quantity, avg_cost, buy_date, current_price, \
     comment, created_by, created_at, updated_by, updated_at";

const FAVORITE_COLUMNS: &str = "id, user_id, code, comment, fav_datetime, created_by, \
     created_at, updated_by, updated_at";

fn position_from_row(row: &Row<'_>) -> rusqlite::Result<Position> {
    Ok(Position {
        id: row.get(0)?,
        user_id: row.get(1)?,
        code: row.get(2)?,
        quantity: row.get(3)?,
        avg_cost: row.get(4)?,
        buy_date: optional_date_at(row, 5)?,
        current_price: row.get(6)?,
        comment: row.get(7)?,
        created_by: row.get(8)?,
        created_at: timestamp_at(row, 9)?,
        updated_by: row.get(10)?,
        updated_at: timestamp_at(row, 11)?,
    })
}

fn favorite_from_row(row: &Row<'_>) -> rusqlite::Result<Favorite> {
    Ok(Favorite {
        id: row.get(0)?,
        user_id: row.get(1)?,
        code: row.get(2)?,
        comment: row.get(3)?,
        fav_datetime: timestamp_at(row, 4)?,
        created_by: row.get(5)?,
        created_at: timestamp_at(row, 6)?,
        updated_by: row.get(7)?,
        updated_at: timestamp_at(row, 8)?,
    })
}

impl SqliteStore {
    // ==================== Positions ====================

    /// Open a position.
    pub fn insert_position(&self, new: &NewPosition) -> Result<Position> {
        let ts = timestamp_to_sql(now());
        self.conn.execute(
            "INSERT INTO positions
             (user_id, code, quantity, avg_cost, buy_date, current_price, comment,
              created_by, created_at, updated_by, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?8, ?9)",
            params![
                new.user_id,
                new.code,
                new.quantity,
                new.avg_cost,
                new.buy_date.map(date_to_sql),
                new.current_price,
                new.comment,
                new.created_by,
                ts
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        info!(user_id = new.user_id, code = %new.code, id, "created position");

        self.require_position(new.user_id, id)
    }

    /// A user's position by id.
    pub fn position(&self, user_id: i64, id: i64) -> Result<Option<Position>> {
        let position = self
            .conn
            .query_row(
                &format!("SELECT {POSITION_COLUMNS} FROM positions WHERE id = ?1 AND user_id = ?2"),
                params![id, user_id],
                position_from_row,
            )
            .optional()?;
        Ok(position)
    }

    /// A user's position by id, failing with `NotFound`.
    pub fn require_position(&self, user_id: i64, id: i64) -> Result<Position> {
        self.position(user_id, id)?
            .ok_or_else(|| DataError::not_found("position", id))
    }

    /// A user's positions with filtering, paging and sorting.
    pub fn list_positions(&self, user_id: i64, query: &PositionQuery) -> Result<Vec<Position>> {
        let mut sql = format!("SELECT {POSITION_COLUMNS} FROM positions WHERE user_id = ?");
        let mut args = vec![SqlValue::Integer(user_id)];

        if let Some(code) = &query.code {
            sql.push_str(" AND code = ?");
            args.push(SqlValue::Text(code.clone()));
        }
        if let Some(start) = query.start_date {
            sql.push_str(" AND buy_date >= ?");
            args.push(SqlValue::Text(date_to_sql(start)));
        }
        if let Some(end) = query.end_date {
            sql.push_str(" AND buy_date <= ?");
            args.push(SqlValue::Text(date_to_sql(end)));
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
        let rows = stmt.query_map(params_from_iter(args.iter()), position_from_row)?;

        let mut positions = Vec::new();
        for row in rows {
            positions.push(row?);
        }
        Ok(positions)
    }

    /// Apply a partial update to a user's position.
    pub fn update_position(
        &self,
        user_id: i64,
        id: i64,
        update: &PositionUpdate,
    ) -> Result<Position> {
        let mut position = self.require_position(user_id, id)?;
        update.apply(&mut position);
        position.updated_at = now();

        self.conn.execute(
            "UPDATE positions
             SET quantity = ?3, avg_cost = ?4, buy_date = ?5, current_price = ?6,
                 comment = ?7, updated_by = ?8, updated_at = ?9
             WHERE id = ?1 AND user_id = ?2",
            params![
                id,
                user_id,
                position.quantity,
                position.avg_cost,
                position.buy_date.map(date_to_sql),
                position.current_price,
                position.comment,
                position.updated_by,
                timestamp_to_sql(position.updated_at)
            ],
        )?;
        info!(user_id, id, "updated position");

        Ok(position)
    }

    /// Delete a user's position.
    pub fn delete_position(&self, user_id: i64, id: i64) -> Result<()> {
        let removed = self.conn.execute(
            "DELETE FROM positions WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;
        if removed == 0 {
            return Err(DataError::not_found("position", id));
        }
        info!(user_id, id, "deleted position");
        Ok(())
    }

    // ==================== Favorites ====================

    /// Add a favorite; `(user_id, code)` must be unique.
    pub fn insert_favorite(&self, new: &NewFavorite) -> Result<Favorite> {
        if self.favorite_by_code(new.user_id, &new.code)?.is_some() {
            return Err(DataError::duplicate("favorite", &new.code));
        }

        let created = now();
        let fav_datetime = new.fav_datetime.unwrap_or(created);
        let ts = timestamp_to_sql(created);
        self.conn.execute(
            "INSERT INTO favorites
             (user_id, code, comment, fav_datetime, created_by, created_at, updated_by, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?5, ?6)",
            params![
                new.user_id,
                new.code,
                new.comment,
                timestamp_to_sql(fav_datetime),
                new.created_by,
                ts
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        info!(user_id = new.user_id, code = %new.code, id, "created favorite");

        self.require_favorite(new.user_id, id)
    }

    /// A user's favorite by id.
    pub fn favorite(&self, user_id: i64, id: i64) -> Result<Option<Favorite>> {
        let favorite = self
            .conn
            .query_row(
                &format!("SELECT {FAVORITE_COLUMNS} FROM favorites WHERE id = ?1 AND user_id = ?2"),
                params![id, user_id],
                favorite_from_row,
            )
            .optional()?;
        Ok(favorite)
    }

    /// A user's favorite by id, failing with `NotFound`.
    pub fn require_favorite(&self, user_id: i64, id: i64) -> Result<Favorite> {
        self.favorite(user_id, id)?
            .ok_or_else(|| DataError::not_found("favorite", id))
    }

    /// A user's favorite by stock code.
    pub fn favorite_by_code(&self, user_id: i64, code: &str) -> Result<Option<Favorite>> {
        let favorite = self
            .conn
            .query_row(
                &format!(
                    "SELECT {FAVORITE_COLUMNS} FROM favorites WHERE user_id = ?1 AND code = ?2"
                ),
                params![user_id, code],
                favorite_from_row,
            )
            .optional()?;
        Ok(favorite)
    }

    /// A user's favorites with filtering, paging and sorting.
    pub fn list_favorites(&self, user_id: i64, query: &FavoriteQuery) -> Result<Vec<Favorite>> {
        let mut sql = format!("SELECT {FAVORITE_COLUMNS} FROM favorites WHERE user_id = ?");
        let mut args = vec![SqlValue::Integer(user_id)];

        if let Some(code) = &query.code {
            sql.push_str(" AND code = ?");
            args.push(SqlValue::Text(code.clone()));
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
        let rows = stmt.query_map(params_from_iter(args.iter()), favorite_from_row)?;

        let mut favorites = Vec::new();
        for row in rows {
            favorites.push(row?);
        }
        Ok(favorites)
    }

    /// Replace the comment on a user's favorite.
    pub fn update_favorite_comment(
        &self,
        user_id: i64,
        id: i64,
        comment: Option<&str>,
        updated_by: Option<&str>,
    ) -> Result<Favorite> {
        let updated = self.conn.execute(
            "UPDATE favorites SET comment = ?3, updated_by = COALESCE(?4, updated_by), updated_at = ?5
             WHERE id = ?1 AND user_id = ?2",
            params![id, user_id, comment, updated_by, timestamp_to_sql(now())],
        )?;
        if updated == 0 {
            return Err(DataError::not_found("favorite", id));
        }
        info!(user_id, id, "updated favorite");

        self.require_favorite(user_id, id)
    }

    /// Delete a user's favorite.
    pub fn delete_favorite(&self, user_id: i64, id: i64) -> Result<()> {
        let removed = self.conn.execute(
            "DELETE FROM favorites WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;
        if removed == 0 {
            return Err(DataError::not_found("favorite", id));
        }
        info!(user_id, id, "deleted favorite");
        Ok(())
    }
}
