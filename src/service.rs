//! Basket lifecycle service
//!
//! The sole mutation entry point for baskets. Enforces the open-only
//! mutation rule, stock-aware add/update semantics, and the status
//! transition table. Mutations for the same user are serialized through a
//! per-user lock on top of the store's version check, so two concurrent
//! adds can never jointly exceed a product's stock.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::catalog::ProductCatalog;
use crate::domain::aggregates::basket::{Basket, BasketStatus};
use crate::domain::events::BasketEvent;
use crate::domain::value_objects::Money;
use crate::error::{BasketError, Result};
use crate::store::BasketStore;

/// A basket with line items resolved to product summaries.
#[derive(Clone, Debug, Serialize)]
pub struct BasketView {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: BasketStatus,
    pub items: Vec<LineItemView>,
    pub total_price: Money,
    pub total_items: u32,
    pub last_updated: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
pub struct LineItemView {
    pub product_id: Uuid,
    pub name: String,
    pub thumbnail: Option<String>,
    pub unit_price: Money,
    pub count: u32,
    pub line_total: Money,
    pub added_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
pub struct BasketSummary {
    pub total_items: u32,
    pub total_price: Money,
    pub item_count: usize,
    pub status: BasketStatus,
}

pub struct BasketService {
    catalog: Arc<dyn ProductCatalog>,
    baskets: Arc<dyn BasketStore>,
    events: Option<async_nats::Client>,
    currency: String,
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl BasketService {
    pub fn new(catalog: Arc<dyn ProductCatalog>, baskets: Arc<dyn BasketStore>, currency: impl Into<String>) -> Self {
        Self {
            catalog,
            baskets,
            events: None,
            currency: currency.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Publish basket events to NATS after each successful mutation.
    pub fn with_events(mut self, client: async_nats::Client) -> Self {
        self.events = Some(client);
        self
    }

    pub async fn get_or_create(&self, user_id: Uuid) -> Result<BasketView> {
        let lock = self.user_lock(user_id).await;
        let _guard = lock.lock().await;
        let basket = self.load_or_create(user_id).await?;
        self.view(basket).await
    }

    pub async fn add_item(&self, user_id: Uuid, product_id: Uuid, count: u32) -> Result<BasketView> {
        if count < 1 {
            return Err(BasketError::InvalidQuantity);
        }
        let lock = self.user_lock(user_id).await;
        let _guard = lock.lock().await;

        let mut basket = self.load_or_create(user_id).await?;
        let product = self.catalog.find(product_id).await?.ok_or(BasketError::ProductNotFound)?;
        if !product.is_in_stock() {
            return Err(BasketError::OutOfStock);
        }
        let already = basket.count_for(product_id);
        if already.saturating_add(count) > product.stock_quantity.value() {
            return Err(BasketError::InsufficientStock { available: product.available_beyond(already) });
        }
        basket.add_item(product_id, count)?;
        self.persist(&mut basket).await?;
        self.view(basket).await
    }

    /// Absolute set; a count of 0 removes the line item.
    pub async fn update_item_count(&self, user_id: Uuid, product_id: Uuid, new_count: u32) -> Result<BasketView> {
        let lock = self.user_lock(user_id).await;
        let _guard = lock.lock().await;

        let mut basket = self.load_or_create(user_id).await?;
        if new_count == 0 {
            basket.remove_item(product_id)?;
        } else {
            let product = self.catalog.find(product_id).await?.ok_or(BasketError::ProductNotFound)?;
            if new_count > product.stock_quantity.value() {
                return Err(BasketError::InsufficientStock { available: product.stock_quantity.value() });
            }
            basket.set_item_count(product_id, new_count)?;
        }
        self.persist(&mut basket).await?;
        self.view(basket).await
    }

    pub async fn remove_item(&self, user_id: Uuid, product_id: Uuid) -> Result<BasketView> {
        let lock = self.user_lock(user_id).await;
        let _guard = lock.lock().await;

        let mut basket = self.load_or_create(user_id).await?;
        basket.remove_item(product_id)?;
        self.persist(&mut basket).await?;
        self.view(basket).await
    }

    pub async fn clear(&self, user_id: Uuid) -> Result<BasketView> {
        let lock = self.user_lock(user_id).await;
        let _guard = lock.lock().await;

        let mut basket = self.load_or_create(user_id).await?;
        basket.clear()?;
        self.persist(&mut basket).await?;
        self.view(basket).await
    }

    /// Validated against the transition table. Finishing a basket archives
    /// it; the next access starts a fresh open one.
    pub async fn change_status(&self, user_id: Uuid, next: BasketStatus) -> Result<BasketView> {
        let lock = self.user_lock(user_id).await;
        let _guard = lock.lock().await;

        let mut basket = self.load_or_create(user_id).await?;
        basket.transition(next)?;
        self.persist(&mut basket).await?;
        self.view(basket).await
    }

    pub async fn summary(&self, user_id: Uuid) -> Result<BasketSummary> {
        let lock = self.user_lock(user_id).await;
        let _guard = lock.lock().await;

        let basket = self.load_or_create(user_id).await?;
        Ok(BasketSummary {
            total_items: basket.total_items(),
            total_price: basket.total_price().clone(),
            item_count: basket.items().len(),
            status: basket.status(),
        })
    }

    /// All of the user's baskets, newest first. Read-only.
    pub async fn history(&self, user_id: Uuid) -> Result<Vec<BasketView>> {
        let baskets = self.baskets.list_for_user(user_id).await?;
        let mut views = Vec::with_capacity(baskets.len());
        for basket in baskets {
            views.push(self.view(basket).await?);
        }
        Ok(views)
    }

    /// Single-flight handle per basket owner.
    async fn user_lock(&self, user_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(user_id).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    async fn load_or_create(&self, user_id: Uuid) -> Result<Basket> {
        if let Some(basket) = self.baskets.find_active(user_id).await? {
            return Ok(basket);
        }
        let mut basket = Basket::create(user_id, &self.currency);
        let events = basket.take_events();
        self.baskets.insert(&basket).await?;
        self.publish(events).await;
        tracing::debug!(user_id = %user_id, basket_id = %basket.id(), "created basket");
        Ok(basket)
    }

    /// Pre-write hook plus durable write: totals are recomputed from current
    /// catalog prices before every update.
    async fn persist(&self, basket: &mut Basket) -> Result<()> {
        let prices = self.price_map(basket).await?;
        basket.recompute(&prices);
        let events = basket.take_events();
        self.baskets.update(basket).await?;
        self.publish(events).await;
        Ok(())
    }

    async fn price_map(&self, basket: &Basket) -> Result<HashMap<Uuid, Money>> {
        let mut prices = HashMap::new();
        for item in basket.items() {
            if let Some(product) = self.catalog.find(item.product_id).await? {
                prices.insert(item.product_id, product.price);
            }
        }
        Ok(prices)
    }

    async fn publish(&self, events: Vec<BasketEvent>) {
        let Some(client) = &self.events else {
            return;
        };
        for event in events {
            let payload = match serde_json::to_vec(&event) {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to serialize basket event");
                    continue;
                }
            };
            if let Err(e) = client.publish(format!("storefront.{}", event.subject()), payload.into()).await {
                tracing::warn!(error = %e, subject = event.subject(), "failed to publish basket event");
            }
        }
    }

    async fn view(&self, basket: Basket) -> Result<BasketView> {
        let mut items = Vec::with_capacity(basket.items().len());
        for item in basket.items() {
            // dangling references carry no price and are left out of the view
            let Some(product) = self.catalog.find(item.product_id).await? else {
                continue;
            };
            items.push(LineItemView {
                product_id: item.product_id,
                name: product.name,
                thumbnail: product.thumbnail,
                unit_price: product.price.clone(),
                count: item.count,
                line_total: product.price.multiply(item.count),
                added_at: item.added_at,
            });
        }
        Ok(BasketView {
            id: basket.id(),
            user_id: basket.user_id(),
            status: basket.status(),
            items,
            total_price: basket.total_price().clone(),
            total_items: basket.total_items(),
            last_updated: basket.last_updated(),
            created_at: basket.created_at(),
        })
    }
}
