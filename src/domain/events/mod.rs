//! Domain events raised by basket mutations
use serde::Serialize;
use uuid::Uuid;

use crate::domain::aggregates::basket::BasketStatus;

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BasketEvent {
    Created { basket_id: Uuid, user_id: Uuid },
    ItemAdded { basket_id: Uuid, product_id: Uuid, count: u32 },
    ItemQuantityChanged { basket_id: Uuid, product_id: Uuid, count: u32 },
    ItemRemoved { basket_id: Uuid, product_id: Uuid },
    Cleared { basket_id: Uuid },
    StatusChanged { basket_id: Uuid, from: BasketStatus, to: BasketStatus },
}

impl BasketEvent {
    /// NATS subject suffix for this event kind.
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Created { .. } => "basket.created",
            Self::ItemAdded { .. } => "basket.item_added",
            Self::ItemQuantityChanged { .. } => "basket.item_quantity_changed",
            Self::ItemRemoved { .. } => "basket.item_removed",
            Self::Cleared { .. } => "basket.cleared",
            Self::StatusChanged { .. } => "basket.status_changed",
        }
    }
}
