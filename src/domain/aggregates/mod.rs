//! Aggregates module
pub mod basket;
pub mod product;

pub use basket::{Basket, BasketStatus, LineItem};
pub use product::{Product, ProductStatus};
