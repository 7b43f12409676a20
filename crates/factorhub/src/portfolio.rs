//! Portfolio Service
//!
//! Per-user positions and favorites.

use crate::error::{Result, ServiceError};
use factorhub_data::{
    Favorite, FavoriteQuery, NewFavorite, NewPosition, Position, PositionQuery, PositionUpdate,
    SqliteStore,
};

fn check_code(code: &str) -> Result<()> {
    if code.trim().is_empty() {
        return Err(ServiceError::validation("code must not be empty"));
    }
    Ok(())
}

fn check_amounts(quantity: Option<f64>, avg_cost: Option<f64>) -> Result<()> {
    if let Some(quantity) = quantity
        && !(quantity.is_finite() && quantity > 0.0)
    {
        return Err(ServiceError::validation(format!(
            "quantity must be positive, got {quantity}"
        )));
    }
    if let Some(avg_cost) = avg_cost
        && !(avg_cost.is_finite() && avg_cost >= 0.0)
    {
        return Err(ServiceError::validation(format!(
            "avg_cost must not be negative, got {avg_cost}"
        )));
    }
    Ok(())
}

/// Positions and favorites, always scoped to one user.
#[derive(Debug, Clone, Copy)]
pub struct PortfolioService<'a> {
    store: &'a SqliteStore,
}

impl<'a> PortfolioService<'a> {
    /// Service over `store`.
    pub const fn new(store: &'a SqliteStore) -> Self {
        Self { store }
    }

    /// Open a position.
    pub fn create_position(&self, new: &NewPosition) -> Result<Position> {
        check_code(&new.code)?;
        check_amounts(Some(new.quantity), Some(new.avg_cost))?;
        Ok(self.store.insert_position(new)?)
    }

    /// A user's position; another user's id is not found.
    pub fn position(&self, user_id: i64, id: i64) -> Result<Position> {
        Ok(self.store.require_position(user_id, id)?)
    }

    /// A user's positions.
    pub fn list_positions(&self, user_id: i64, query: &PositionQuery) -> Result<Vec<Position>> {
        if let (Some(start), Some(end)) = (query.start_date, query.end_date)
            && start > end
        {
            return Err(ServiceError::validation(format!(
                "start date {start} is after end date {end}"
            )));
        }
        Ok(self.store.list_positions(user_id, query)?)
    }

    /// Partially update a user's position.
    pub fn update_position(
        &self,
        user_id: i64,
        id: i64,
        update: &PositionUpdate,
    ) -> Result<Position> {
        check_amounts(update.quantity, update.avg_cost)?;
        Ok(self.store.update_position(user_id, id, update)?)
    }

    /// Close a user's position.
    pub fn delete_position(&self, user_id: i64, id: i64) -> Result<()> {
        Ok(self.store.delete_position(user_id, id)?)
    }

    /// Add a favorite.
    pub fn create_favorite(&self, new: &NewFavorite) -> Result<Favorite> {
        check_code(&new.code)?;
        Ok(self.store.insert_favorite(new)?)
    }

    /// A user's favorite.
    pub fn favorite(&self, user_id: i64, id: i64) -> Result<Favorite> {
        Ok(self.store.require_favorite(user_id, id)?)
    }

    /// A user's favorites.
    pub fn list_favorites(&self, user_id: i64, query: &FavoriteQuery) -> Result<Vec<Favorite>> {
        Ok(self.store.list_favorites(user_id, query)?)
    }

    /// Replace the comment on a user's favorite.
    pub fn update_favorite(
        &self,
        user_id: i64,
        id: i64,
        comment: Option<&str>,
        updated_by: Option<&str>,
    ) -> Result<Favorite> {
        Ok(self
            .store
            .update_favorite_comment(user_id, id, comment, updated_by)?)
    }

    /// Remove a user's favorite.
    pub fn delete_favorite(&self, user_id: i64, id: i64) -> Result<()> {
        Ok(self.store.delete_favorite(user_id, id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn new_position(quantity: f64, avg_cost: f64) -> NewPosition {
        NewPosition {
            user_id: 1,
            code: "000001.SZ".to_string(),
            quantity,
            avg_cost,
            ..Default::default()
        }
    }

    #[rstest]
    #[case(0.0, 10.0)]
    #[case(-5.0, 10.0)]
    #[case(100.0, -1.0)]
    #[case(f64::NAN, 10.0)]
    fn test_create_position_rejects_bad_amounts(#[case] quantity: f64, #[case] avg_cost: f64) {
        let store = SqliteStore::in_memory().unwrap();
        let service = PortfolioService::new(&store);
        let err = service
            .create_position(&new_position(quantity, avg_cost))
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert_eq!(store.stats().unwrap().positions, 0);
    }

    #[test]
    fn test_zero_cost_is_allowed() {
        let store = SqliteStore::in_memory().unwrap();
        let service = PortfolioService::new(&store);
        let position = service.create_position(&new_position(100.0, 0.0)).unwrap();
        assert_eq!(position.avg_cost, 0.0);
    }

    #[test]
    fn test_position_scoped_to_user() {
        let store = SqliteStore::in_memory().unwrap();
        let service = PortfolioService::new(&store);
        let position = service.create_position(&new_position(100.0, 10.0)).unwrap();

        assert!(service.position(2, position.id).unwrap_err().is_not_found());
        assert!(service.delete_position(2, position.id).unwrap_err().is_not_found());
        assert!(service.position(1, position.id).is_ok());
    }

    #[test]
    fn test_update_position_validates() {
        let store = SqliteStore::in_memory().unwrap();
        let service = PortfolioService::new(&store);
        let position = service.create_position(&new_position(100.0, 10.0)).unwrap();

        let err = service
            .update_position(
                1,
                position.id,
                &PositionUpdate {
                    quantity: Some(0.0),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert_eq!(service.position(1, position.id).unwrap().quantity, 100.0);
    }

    #[test]
    fn test_favorite_rejects_duplicate_and_empty_code() {
        let store = SqliteStore::in_memory().unwrap();
        let service = PortfolioService::new(&store);
        let favorite = NewFavorite {
            user_id: 1,
            code: "600000.SH".to_string(),
            comment: None,
            fav_datetime: None,
            created_by: None,
        };

        service.create_favorite(&favorite).unwrap();
        assert!(service.create_favorite(&favorite).is_err());

        let empty = NewFavorite {
            code: " ".to_string(),
            ..favorite
        };
        assert!(matches!(
            service.create_favorite(&empty).unwrap_err(),
            ServiceError::Validation(_)
        ));
    }
}
