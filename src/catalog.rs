//! Catalog store
//!
//! Product lookups for the basket core plus the small admin CRUD surface.
//! Backed by Postgres in production and an in-memory map in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::aggregates::product::{Product, ProductStatus};
use crate::domain::value_objects::{Money, Quantity, Sku};
use crate::error::{BasketError, Result};

#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn find(&self, id: Uuid) -> Result<Option<Product>>;
    async fn find_by_sku(&self, sku: &Sku) -> Result<Option<Product>>;
    /// Active products, newest first.
    async fn list(&self) -> Result<Vec<Product>>;
    async fn insert(&self, product: &Product) -> Result<()>;
    async fn update(&self, product: &Product) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Postgres
// ---------------------------------------------------------------------------

pub struct PgCatalog {
    pool: sqlx::PgPool,
}

impl PgCatalog {
    pub fn new(pool: sqlx::PgPool) -> Self { Self { pool } }
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid,
    sku: String,
    name: String,
    description: Option<String>,
    price: Decimal,
    currency: String,
    stock_quantity: i32,
    thumbnail: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ProductRow {
    fn into_product(self) -> Result<Product> {
        let sku = Sku::new(&self.sku).map_err(|e| BasketError::Storage(format!("bad sku in row: {e}")))?;
        let status = ProductStatus::parse(&self.status)
            .ok_or_else(|| BasketError::Storage(format!("bad product status in row: {}", self.status)))?;
        Ok(Product {
            id: self.id,
            sku,
            name: self.name,
            description: self.description,
            price: Money::new(self.price, &self.currency),
            stock_quantity: Quantity::new(self.stock_quantity.max(0) as u32),
            thumbnail: self.thumbnail,
            status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[async_trait]
impl ProductCatalog for PgCatalog {
    async fn find(&self, id: Uuid) -> Result<Option<Product>> {
        let row = sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(ProductRow::into_product).transpose()
    }

    async fn find_by_sku(&self, sku: &Sku) -> Result<Option<Product>> {
        let row = sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE sku = $1")
            .bind(sku.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(ProductRow::into_product).transpose()
    }

    async fn list(&self) -> Result<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>(
            "SELECT * FROM products WHERE status = 'active' ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ProductRow::into_product).collect()
    }

    async fn insert(&self, p: &Product) -> Result<()> {
        sqlx::query(
            "INSERT INTO products (id, sku, name, description, price, currency, stock_quantity, thumbnail, status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(p.id)
        .bind(p.sku.as_str())
        .bind(&p.name)
        .bind(&p.description)
        .bind(p.price.amount())
        .bind(p.price.currency())
        .bind(p.stock_quantity.value() as i32)
        .bind(&p.thumbnail)
        .bind(p.status.as_str())
        .bind(p.created_at)
        .bind(p.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update(&self, p: &Product) -> Result<()> {
        let result = sqlx::query(
            "UPDATE products SET name = $2, description = $3, price = $4, currency = $5, \
             stock_quantity = $6, thumbnail = $7, status = $8, updated_at = $9 WHERE id = $1",
        )
        .bind(p.id)
        .bind(&p.name)
        .bind(&p.description)
        .bind(p.price.amount())
        .bind(p.price.currency())
        .bind(p.stock_quantity.value() as i32)
        .bind(&p.thumbnail)
        .bind(p.status.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(BasketError::ProductNotFound);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory (tests, demos)
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryCatalog {
    products: RwLock<HashMap<Uuid, Product>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self { Self::default() }

    /// Hard-delete, leaving any basket line items dangling.
    pub async fn remove(&self, id: Uuid) -> Option<Product> {
        self.products.write().await.remove(&id)
    }
}

#[async_trait]
impl ProductCatalog for InMemoryCatalog {
    async fn find(&self, id: Uuid) -> Result<Option<Product>> {
        Ok(self.products.read().await.get(&id).cloned())
    }

    async fn find_by_sku(&self, sku: &Sku) -> Result<Option<Product>> {
        Ok(self.products.read().await.values().find(|p| &p.sku == sku).cloned())
    }

    async fn list(&self) -> Result<Vec<Product>> {
        let mut products: Vec<Product> = self.products.read().await.values()
            .filter(|p| p.status == ProductStatus::Active)
            .cloned()
            .collect();
        products.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(products)
    }

    async fn insert(&self, product: &Product) -> Result<()> {
        let mut products = self.products.write().await;
        if products.values().any(|p| p.sku == product.sku) {
            return Err(BasketError::DuplicateSku);
        }
        products.insert(product.id, product.clone());
        Ok(())
    }

    async fn update(&self, product: &Product) -> Result<()> {
        let mut products = self.products.write().await;
        if !products.contains_key(&product.id) {
            return Err(BasketError::ProductNotFound);
        }
        products.insert(product.id, product.clone());
        Ok(())
    }
}
