//! Error taxonomy for the basket core

use thiserror::Error;

use crate::domain::aggregates::basket::BasketStatus;

#[derive(Error, Debug)]
pub enum BasketError {
    #[error("basket is {status}, mutations require an open basket")]
    BasketNotOpen { status: BasketStatus },

    #[error("insufficient stock: only {available} more unit(s) can be added")]
    InsufficientStock { available: u32 },

    #[error("product is out of stock")]
    OutOfStock,

    #[error("product not found")]
    ProductNotFound,

    #[error("item not in basket")]
    ItemNotInBasket,

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: BasketStatus, to: BasketStatus },

    #[error("count must be at least 1")]
    InvalidQuantity,

    #[error("sku already exists")]
    DuplicateSku,

    #[error("basket was modified concurrently")]
    Conflict,

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<sqlx::Error> for BasketError {
    fn from(e: sqlx::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BasketError>;
