//! Basket store
//!
//! Persistence seam for the basket aggregate. Updates are conditional on the
//! version the caller read (optimistic concurrency); a lost race surfaces as
//! `BasketError::Conflict`, never as silently merged state.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::aggregates::basket::{Basket, BasketStatus, LineItem};
use crate::domain::value_objects::Money;
use crate::error::{BasketError, Result};

#[async_trait]
pub trait BasketStore: Send + Sync {
    /// The user's single editable basket, if any.
    async fn find_active(&self, user_id: Uuid) -> Result<Option<Basket>>;
    async fn insert(&self, basket: &Basket) -> Result<()>;
    /// Conditional on `basket.version()`; fails with `Conflict` if another
    /// writer got there first.
    async fn update(&self, basket: &Basket) -> Result<()>;
    /// Every basket ever owned by the user, newest first.
    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Basket>>;
}

// ---------------------------------------------------------------------------
// Postgres
// ---------------------------------------------------------------------------

pub struct PgBasketStore {
    pool: sqlx::PgPool,
}

impl PgBasketStore {
    pub fn new(pool: sqlx::PgPool) -> Self { Self { pool } }
}

#[derive(sqlx::FromRow)]
struct BasketRow {
    id: Uuid,
    user_id: Uuid,
    active: bool,
    status: String,
    items: Json<Vec<LineItem>>,
    total_price: Decimal,
    currency: String,
    total_items: i32,
    version: i64,
    last_updated: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl BasketRow {
    fn into_basket(self) -> Result<Basket> {
        let status = BasketStatus::parse(&self.status)
            .ok_or_else(|| BasketError::Storage(format!("bad basket status in row: {}", self.status)))?;
        Ok(Basket::rehydrate(
            self.id,
            self.user_id,
            self.active,
            status,
            self.items.0,
            Money::new(self.total_price, &self.currency),
            self.total_items.max(0) as u32,
            self.version,
            self.last_updated,
            self.created_at,
            self.updated_at,
        ))
    }
}

#[async_trait]
impl BasketStore for PgBasketStore {
    async fn find_active(&self, user_id: Uuid) -> Result<Option<Basket>> {
        let row = sqlx::query_as::<_, BasketRow>("SELECT * FROM baskets WHERE user_id = $1 AND active")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(BasketRow::into_basket).transpose()
    }

    async fn insert(&self, b: &Basket) -> Result<()> {
        sqlx::query(
            "INSERT INTO baskets (id, user_id, active, status, items, total_price, currency, total_items, version, last_updated, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(b.id())
        .bind(b.user_id())
        .bind(b.is_active())
        .bind(b.status().as_str())
        .bind(Json(b.items().to_vec()))
        .bind(b.total_price().amount())
        .bind(b.total_price().currency())
        .bind(b.total_items() as i32)
        .bind(b.version())
        .bind(b.last_updated())
        .bind(b.created_at())
        .bind(b.updated_at())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update(&self, b: &Basket) -> Result<()> {
        let result = sqlx::query(
            "UPDATE baskets SET active = $2, status = $3, items = $4, total_price = $5, \
             total_items = $6, last_updated = $7, updated_at = $8, version = version + 1 \
             WHERE id = $1 AND version = $9",
        )
        .bind(b.id())
        .bind(b.is_active())
        .bind(b.status().as_str())
        .bind(Json(b.items().to_vec()))
        .bind(b.total_price().amount())
        .bind(b.total_items() as i32)
        .bind(b.last_updated())
        .bind(b.updated_at())
        .bind(b.version())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(BasketError::Conflict);
        }
        Ok(())
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Basket>> {
        let rows = sqlx::query_as::<_, BasketRow>(
            "SELECT * FROM baskets WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(BasketRow::into_basket).collect()
    }
}

// ---------------------------------------------------------------------------
// In-memory (tests, demos)
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryBasketStore {
    baskets: RwLock<HashMap<Uuid, Basket>>,
}

impl InMemoryBasketStore {
    pub fn new() -> Self { Self::default() }
}

#[async_trait]
impl BasketStore for InMemoryBasketStore {
    async fn find_active(&self, user_id: Uuid) -> Result<Option<Basket>> {
        Ok(self.baskets.read().await.values()
            .find(|b| b.user_id() == user_id && b.is_active())
            .cloned())
    }

    async fn insert(&self, basket: &Basket) -> Result<()> {
        let mut baskets = self.baskets.write().await;
        // same constraint as the partial unique index on (user_id) WHERE active
        if basket.is_active() && baskets.values().any(|b| b.user_id() == basket.user_id() && b.is_active()) {
            return Err(BasketError::Storage("active basket already exists for user".into()));
        }
        let mut stored = basket.clone();
        stored.take_events();
        baskets.insert(stored.id(), stored);
        Ok(())
    }

    async fn update(&self, basket: &Basket) -> Result<()> {
        let mut baskets = self.baskets.write().await;
        let current = baskets.get(&basket.id()).ok_or(BasketError::Conflict)?;
        if current.version() != basket.version() {
            return Err(BasketError::Conflict);
        }
        let mut stored = basket.clone();
        stored.take_events();
        stored.bump_version();
        baskets.insert(stored.id(), stored);
        Ok(())
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Basket>> {
        let mut baskets: Vec<Basket> = self.baskets.read().await.values()
            .filter(|b| b.user_id() == user_id)
            .cloned()
            .collect();
        baskets.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        Ok(baskets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_version_check() {
        let store = InMemoryBasketStore::new();
        let user = Uuid::new_v4();
        let mut basket = Basket::create(user, "USD");
        basket.take_events();
        store.insert(&basket).await.unwrap();

        // first conditional write at version 0 succeeds, replay of the same
        // version loses
        store.update(&basket).await.unwrap();
        assert!(matches!(store.update(&basket).await, Err(BasketError::Conflict)));

        let reloaded = store.find_active(user).await.unwrap().unwrap();
        assert_eq!(reloaded.version(), 1);
        store.update(&reloaded).await.unwrap();
    }

    #[tokio::test]
    async fn test_in_memory_single_active_basket() {
        let store = InMemoryBasketStore::new();
        let user = Uuid::new_v4();
        let mut first = Basket::create(user, "USD");
        first.take_events();
        store.insert(&first).await.unwrap();
        let second = Basket::create(user, "USD");
        assert!(store.insert(&second).await.is_err());
    }
}
