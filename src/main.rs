//! Storefront Basket - JSON REST surface over the basket lifecycle service

use anyhow::Result;
use axum::{extract::{Path, State}, http::StatusCode, routing::{get, post}, Json, Router};
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;
use validator::Validate;

use storefront_basket::catalog::{PgCatalog, ProductCatalog};
use storefront_basket::domain::aggregates::basket::BasketStatus;
use storefront_basket::domain::aggregates::product::Product;
use storefront_basket::domain::value_objects::{Money, Quantity, Sku};
use storefront_basket::error::BasketError;
use storefront_basket::service::{BasketService, BasketSummary, BasketView};
use storefront_basket::store::PgBasketStore;

#[derive(Clone)]
pub struct AppState { pub service: Arc<BasketService>, pub catalog: Arc<dyn ProductCatalog> }

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();
    let db = PgPoolOptions::new().max_connections(10).connect(&std::env::var("DATABASE_URL")?).await?;
    sqlx::migrate!("./migrations").run(&db).await?;

    let currency = std::env::var("STORE_CURRENCY").unwrap_or_else(|_| "USD".to_string());
    let catalog: Arc<dyn ProductCatalog> = Arc::new(PgCatalog::new(db.clone()));
    let mut service = BasketService::new(catalog.clone(), Arc::new(PgBasketStore::new(db)), currency.as_str());
    if let Ok(url) = std::env::var("NATS_URL") {
        match async_nats::connect(url.as_str()).await {
            Ok(client) => service = service.with_events(client),
            Err(e) => tracing::warn!(error = %e, "NATS unavailable, basket events disabled"),
        }
    }
    let state = AppState { service: Arc::new(service), catalog };

    let app = Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "storefront-basket"})) }))
        .route("/api/v1/products", get(list_products).post(create_product))
        .route("/api/v1/products/:id", get(get_product).put(update_product))
        .route("/api/v1/baskets/:user_id", get(get_basket).delete(clear_basket))
        .route("/api/v1/baskets/:user_id/items", post(add_item))
        .route("/api/v1/baskets/:user_id/items/:product_id", axum::routing::put(update_item).delete(remove_item))
        .route("/api/v1/baskets/:user_id/status", post(change_status))
        .route("/api/v1/baskets/:user_id/summary", get(get_summary))
        .route("/api/v1/baskets/:user_id/history", get(get_history))
        .layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()).with_state(state);

    let port = std::env::var("PORT").unwrap_or_else(|_| "8084".to_string());
    tracing::info!("🛒 Storefront Basket listening on 0.0.0.0:{}", port);
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?, app).await?;
    Ok(())
}

type ApiError = (StatusCode, String);

fn api_error(e: BasketError) -> ApiError {
    let status = match &e {
        BasketError::ProductNotFound | BasketError::ItemNotInBasket => StatusCode::NOT_FOUND,
        BasketError::BasketNotOpen { .. } | BasketError::InsufficientStock { .. } | BasketError::OutOfStock
        | BasketError::InvalidTransition { .. } | BasketError::DuplicateSku | BasketError::Conflict => StatusCode::CONFLICT,
        BasketError::InvalidQuantity => StatusCode::UNPROCESSABLE_ENTITY,
        BasketError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}

// --- catalog admin ---

#[derive(Debug, serde::Deserialize, Validate)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 50))] pub sku: String,
    #[validate(length(min = 1))] pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub currency: Option<String>,
    pub stock_quantity: Option<u32>,
    pub thumbnail: Option<String>,
}

#[derive(Debug, serde::Deserialize, Validate)]
pub struct UpdateProductRequest {
    #[validate(length(min = 1))] pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub stock_quantity: u32,
    pub thumbnail: Option<String>,
}

async fn list_products(State(s): State<AppState>) -> Result<Json<Vec<Product>>, ApiError> {
    s.catalog.list().await.map(Json).map_err(api_error)
}

async fn get_product(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Product>, ApiError> {
    s.catalog.find(id).await.map_err(api_error)?.map(Json).ok_or((StatusCode::NOT_FOUND, "Not found".to_string()))
}

async fn create_product(State(s): State<AppState>, Json(r): Json<CreateProductRequest>) -> Result<(StatusCode, Json<Product>), ApiError> {
    r.validate().map_err(|e| (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))?;
    if r.price < Decimal::ZERO { return Err((StatusCode::UNPROCESSABLE_ENTITY, "price must be non-negative".to_string())); }
    let sku = Sku::new(&r.sku).map_err(|e| (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))?;
    if s.catalog.find_by_sku(&sku).await.map_err(api_error)?.is_some() {
        return Err(api_error(BasketError::DuplicateSku));
    }
    let currency = r.currency.unwrap_or_else(|| "USD".to_string());
    let mut product = Product::new(sku, r.name, Money::new(r.price, &currency), r.stock_quantity.unwrap_or(0));
    product.description = r.description;
    product.thumbnail = r.thumbnail;
    s.catalog.insert(&product).await.map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(product)))
}

async fn update_product(State(s): State<AppState>, Path(id): Path<Uuid>, Json(r): Json<UpdateProductRequest>) -> Result<Json<Product>, ApiError> {
    r.validate().map_err(|e| (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))?;
    if r.price < Decimal::ZERO { return Err((StatusCode::UNPROCESSABLE_ENTITY, "price must be non-negative".to_string())); }
    let mut product = s.catalog.find(id).await.map_err(api_error)?.ok_or((StatusCode::NOT_FOUND, "Not found".to_string()))?;
    product.name = r.name;
    product.description = r.description;
    product.price = Money::new(r.price, product.price.currency());
    product.stock_quantity = Quantity::new(r.stock_quantity);
    product.thumbnail = r.thumbnail;
    s.catalog.update(&product).await.map_err(api_error)?;
    Ok(Json(product))
}

// --- basket lifecycle ---

#[derive(Debug, serde::Deserialize, Validate)]
pub struct AddItemRequest { pub product_id: Uuid, #[validate(range(min = 1))] pub count: u32 }

#[derive(Debug, serde::Deserialize)]
pub struct UpdateCountRequest { pub count: u32 }

#[derive(Debug, serde::Deserialize)]
pub struct ChangeStatusRequest { pub status: String }

async fn get_basket(State(s): State<AppState>, Path(user_id): Path<Uuid>) -> Result<Json<BasketView>, ApiError> {
    s.service.get_or_create(user_id).await.map(Json).map_err(api_error)
}

async fn add_item(State(s): State<AppState>, Path(user_id): Path<Uuid>, Json(r): Json<AddItemRequest>) -> Result<(StatusCode, Json<BasketView>), ApiError> {
    r.validate().map_err(|e| (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))?;
    let view = s.service.add_item(user_id, r.product_id, r.count).await.map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn update_item(State(s): State<AppState>, Path((user_id, product_id)): Path<(Uuid, Uuid)>, Json(r): Json<UpdateCountRequest>) -> Result<Json<BasketView>, ApiError> {
    s.service.update_item_count(user_id, product_id, r.count).await.map(Json).map_err(api_error)
}

async fn remove_item(State(s): State<AppState>, Path((user_id, product_id)): Path<(Uuid, Uuid)>) -> Result<Json<BasketView>, ApiError> {
    s.service.remove_item(user_id, product_id).await.map(Json).map_err(api_error)
}

async fn clear_basket(State(s): State<AppState>, Path(user_id): Path<Uuid>) -> Result<Json<BasketView>, ApiError> {
    s.service.clear(user_id).await.map(Json).map_err(api_error)
}

async fn change_status(State(s): State<AppState>, Path(user_id): Path<Uuid>, Json(r): Json<ChangeStatusRequest>) -> Result<Json<BasketView>, ApiError> {
    let status = BasketStatus::parse(&r.status).ok_or((StatusCode::UNPROCESSABLE_ENTITY, format!("unknown status: {}", r.status)))?;
    s.service.change_status(user_id, status).await.map(Json).map_err(api_error)
}

async fn get_summary(State(s): State<AppState>, Path(user_id): Path<Uuid>) -> Result<Json<BasketSummary>, ApiError> {
    s.service.summary(user_id).await.map(Json).map_err(api_error)
}

async fn get_history(State(s): State<AppState>, Path(user_id): Path<Uuid>) -> Result<Json<Vec<BasketView>>, ApiError> {
    s.service.history(user_id).await.map(Json).map_err(api_error)
}
