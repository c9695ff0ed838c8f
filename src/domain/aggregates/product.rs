//! Product catalog record
//!
//! Read-mostly from the basket core's perspective: stock is checked against
//! `stock_quantity` on add/update but never decremented here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::value_objects::{Money, Quantity, Sku};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    #[default]
    Active,
    Archived,
}

impl ProductStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub sku: Sku,
    pub name: String,
    pub description: Option<String>,
    pub price: Money,
    pub stock_quantity: Quantity,
    pub thumbnail: Option<String>,
    pub status: ProductStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn new(sku: Sku, name: impl Into<String>, price: Money, stock: u32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(), sku, name: name.into(), description: None,
            price, stock_quantity: Quantity::new(stock), thumbnail: None,
            status: ProductStatus::Active, created_at: now, updated_at: now,
        }
    }

    pub fn is_in_stock(&self) -> bool { !self.stock_quantity.is_zero() }

    /// Units still addable on top of what a basket already holds.
    pub fn available_beyond(&self, already_in_basket: u32) -> u32 {
        self.stock_quantity.value().saturating_sub(already_in_basket)
    }
}
