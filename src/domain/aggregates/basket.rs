//! Basket Aggregate
//!
//! One editable basket per user. Line items merge per product, totals are
//! derived, and every mutation is gated on the basket being `open`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

use crate::domain::events::BasketEvent;
use crate::domain::value_objects::Money;
use crate::error::BasketError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BasketStatus {
    #[default]
    Open,
    Pending,
    Finished,
}

impl BasketStatus {
    /// Allowed transitions: open -> pending (checkout), pending -> open
    /// (payment cancelled), pending -> finished (payment completed).
    pub fn can_transition_to(self, next: BasketStatus) -> bool {
        matches!(
            (self, next),
            (Self::Open, Self::Pending) | (Self::Pending, Self::Open) | (Self::Pending, Self::Finished)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Pending => "pending",
            Self::Finished => "finished",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(Self::Open),
            "pending" => Some(Self::Pending),
            "finished" => Some(Self::Finished),
            _ => None,
        }
    }
}

impl fmt::Display for BasketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.as_str()) }
}

/// One (product, count) pair. Persisted as JSONB alongside the basket row.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: Uuid,
    pub count: u32,
    pub added_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct Basket {
    id: Uuid,
    user_id: Uuid,
    active: bool,
    status: BasketStatus,
    items: Vec<LineItem>,
    total_price: Money,
    total_items: u32,
    version: i64,
    last_updated: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    events: Vec<BasketEvent>,
}

impl Basket {
    pub fn create(user_id: Uuid, currency: &str) -> Self {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let mut basket = Self {
            id, user_id, active: true, status: BasketStatus::Open,
            items: vec![], total_price: Money::zero(currency), total_items: 0,
            version: 0, last_updated: now, created_at: now, updated_at: now, events: vec![],
        };
        basket.raise_event(BasketEvent::Created { basket_id: id, user_id });
        basket
    }

    /// Reconstruct from storage. Raises no events.
    #[allow(clippy::too_many_arguments)]
    pub fn rehydrate(
        id: Uuid, user_id: Uuid, active: bool, status: BasketStatus, items: Vec<LineItem>,
        total_price: Money, total_items: u32, version: i64,
        last_updated: DateTime<Utc>, created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id, user_id, active, status, items, total_price, total_items,
            version, last_updated, created_at, updated_at, events: vec![],
        }
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn user_id(&self) -> Uuid { self.user_id }
    pub fn is_active(&self) -> bool { self.active }
    pub fn status(&self) -> BasketStatus { self.status }
    pub fn items(&self) -> &[LineItem] { &self.items }
    pub fn total_price(&self) -> &Money { &self.total_price }
    pub fn total_items(&self) -> u32 { self.total_items }
    pub fn version(&self) -> i64 { self.version }
    pub fn last_updated(&self) -> DateTime<Utc> { self.last_updated }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }

    /// Count already in the basket for a product, 0 if absent.
    pub fn count_for(&self, product_id: Uuid) -> u32 {
        self.items.iter().find(|i| i.product_id == product_id).map_or(0, |i| i.count)
    }

    fn ensure_open(&self) -> Result<(), BasketError> {
        if self.status != BasketStatus::Open {
            return Err(BasketError::BasketNotOpen { status: self.status });
        }
        Ok(())
    }

    /// Merge-or-append: at most one line item per product.
    pub fn add_item(&mut self, product_id: Uuid, count: u32) -> Result<(), BasketError> {
        self.ensure_open()?;
        if let Some(existing) = self.items.iter_mut().find(|i| i.product_id == product_id) {
            existing.count += count;
        } else {
            self.items.push(LineItem { product_id, count, added_at: Utc::now() });
        }
        self.raise_event(BasketEvent::ItemAdded { basket_id: self.id, product_id, count });
        Ok(())
    }

    /// Absolute set. A count of 0 removes the line item.
    pub fn set_item_count(&mut self, product_id: Uuid, count: u32) -> Result<(), BasketError> {
        self.ensure_open()?;
        if count == 0 {
            return self.remove_item(product_id);
        }
        let item = self.items.iter_mut().find(|i| i.product_id == product_id)
            .ok_or(BasketError::ItemNotInBasket)?;
        item.count = count;
        self.raise_event(BasketEvent::ItemQuantityChanged { basket_id: self.id, product_id, count });
        Ok(())
    }

    /// Idempotent: removing an absent product is not an error.
    pub fn remove_item(&mut self, product_id: Uuid) -> Result<(), BasketError> {
        self.ensure_open()?;
        let before = self.items.len();
        self.items.retain(|i| i.product_id != product_id);
        if self.items.len() < before {
            self.raise_event(BasketEvent::ItemRemoved { basket_id: self.id, product_id });
        }
        Ok(())
    }

    pub fn clear(&mut self) -> Result<(), BasketError> {
        self.ensure_open()?;
        self.items.clear();
        self.raise_event(BasketEvent::Cleared { basket_id: self.id });
        Ok(())
    }

    /// Validated against the transition table; `finished` archives the basket
    /// so a later access starts a fresh one.
    pub fn transition(&mut self, next: BasketStatus) -> Result<(), BasketError> {
        if !self.status.can_transition_to(next) {
            return Err(BasketError::InvalidTransition { from: self.status, to: next });
        }
        let from = self.status;
        self.status = next;
        if next == BasketStatus::Finished {
            self.active = false;
        }
        self.raise_event(BasketEvent::StatusChanged { basket_id: self.id, from, to: next });
        Ok(())
    }

    /// Pre-write hook: refresh the derived totals from current catalog
    /// prices. A line item whose product is missing from `prices` (deleted
    /// from the catalog, or priced in a foreign currency) contributes zero
    /// to both totals and is flagged.
    pub fn recompute(&mut self, prices: &HashMap<Uuid, Money>) {
        let mut total_price = Money::zero(self.total_price.currency());
        let mut total_items = 0u32;
        for item in &self.items {
            let Some(price) = prices.get(&item.product_id) else {
                tracing::warn!(basket_id = %self.id, product_id = %item.product_id,
                    "line item references unknown product, skipped from totals");
                continue;
            };
            match total_price.add(&price.multiply(item.count)) {
                Ok(sum) => {
                    total_price = sum;
                    total_items += item.count;
                }
                Err(_) => {
                    tracing::warn!(basket_id = %self.id, product_id = %item.product_id,
                        "line item priced in {} but basket is {}, skipped from totals",
                        price.currency(), self.total_price.currency());
                }
            }
        }
        self.total_price = total_price;
        self.total_items = total_items;
        self.last_updated = Utc::now();
        self.touch();
    }

    /// Storage seam: called by stores after a successful conditional write.
    pub fn bump_version(&mut self) { self.version += 1; }

    pub fn take_events(&mut self) -> Vec<BasketEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: BasketEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn prices(entries: &[(Uuid, i64)]) -> HashMap<Uuid, Money> {
        entries.iter().map(|(id, cents)| (*id, Money::new(Decimal::new(*cents, 2), "USD"))).collect()
    }

    #[test]
    fn test_add_merges_same_product() {
        let p = Uuid::new_v4();
        let mut basket = Basket::create(Uuid::new_v4(), "USD");
        basket.add_item(p, 2).unwrap();
        basket.add_item(p, 1).unwrap();
        assert_eq!(basket.items().len(), 1);
        assert_eq!(basket.count_for(p), 3);
    }

    #[test]
    fn test_recompute_totals() {
        let p1 = Uuid::new_v4();
        let p2 = Uuid::new_v4();
        let mut basket = Basket::create(Uuid::new_v4(), "USD");
        basket.add_item(p1, 2).unwrap();
        basket.add_item(p2, 1).unwrap();
        basket.recompute(&prices(&[(p1, 1000), (p2, 550)]));
        assert_eq!(basket.total_items(), 3);
        assert_eq!(basket.total_price().amount(), Decimal::new(2550, 2));
    }

    #[test]
    fn test_recompute_skips_dangling_reference() {
        let p1 = Uuid::new_v4();
        let gone = Uuid::new_v4();
        let mut basket = Basket::create(Uuid::new_v4(), "USD");
        basket.add_item(p1, 1).unwrap();
        basket.add_item(gone, 5).unwrap();
        basket.recompute(&prices(&[(p1, 1000)]));
        assert_eq!(basket.total_items(), 1);
        assert_eq!(basket.total_price().amount(), Decimal::new(1000, 2));
    }

    #[test]
    fn test_set_count_zero_removes() {
        let p = Uuid::new_v4();
        let mut basket = Basket::create(Uuid::new_v4(), "USD");
        basket.add_item(p, 3).unwrap();
        basket.set_item_count(p, 0).unwrap();
        assert!(basket.is_empty());
    }

    #[test]
    fn test_set_count_unknown_item() {
        let mut basket = Basket::create(Uuid::new_v4(), "USD");
        let err = basket.set_item_count(Uuid::new_v4(), 2).unwrap_err();
        assert!(matches!(err, BasketError::ItemNotInBasket));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let p = Uuid::new_v4();
        let mut basket = Basket::create(Uuid::new_v4(), "USD");
        basket.add_item(p, 1).unwrap();
        basket.remove_item(p).unwrap();
        basket.remove_item(p).unwrap();
        assert!(basket.is_empty());
    }

    #[test]
    fn test_mutation_gated_on_open() {
        let p = Uuid::new_v4();
        let mut basket = Basket::create(Uuid::new_v4(), "USD");
        basket.add_item(p, 1).unwrap();
        basket.transition(BasketStatus::Pending).unwrap();
        assert!(matches!(basket.add_item(p, 1), Err(BasketError::BasketNotOpen { .. })));
        assert!(matches!(basket.set_item_count(p, 2), Err(BasketError::BasketNotOpen { .. })));
        assert!(matches!(basket.remove_item(p), Err(BasketError::BasketNotOpen { .. })));
        assert!(matches!(basket.clear(), Err(BasketError::BasketNotOpen { .. })));
        basket.transition(BasketStatus::Open).unwrap();
        basket.add_item(p, 1).unwrap();
    }

    #[test]
    fn test_transition_table() {
        let mut basket = Basket::create(Uuid::new_v4(), "USD");
        assert!(matches!(
            basket.transition(BasketStatus::Finished),
            Err(BasketError::InvalidTransition { .. })
        ));
        basket.transition(BasketStatus::Pending).unwrap();
        basket.transition(BasketStatus::Finished).unwrap();
        assert!(!basket.is_active());
        assert!(matches!(
            basket.transition(BasketStatus::Open),
            Err(BasketError::InvalidTransition { .. })
        ));
    }
}
