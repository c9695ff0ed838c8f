//! End-to-end basket lifecycle flows against the in-memory stores.

use std::sync::Arc;

use rust_decimal::Decimal;
use uuid::Uuid;

use storefront_basket::catalog::{InMemoryCatalog, ProductCatalog};
use storefront_basket::domain::aggregates::basket::BasketStatus;
use storefront_basket::domain::aggregates::product::Product;
use storefront_basket::domain::value_objects::{Money, Sku};
use storefront_basket::error::BasketError;
use storefront_basket::service::BasketService;
use storefront_basket::store::InMemoryBasketStore;

async fn setup(products: &[Product]) -> (Arc<BasketService>, Arc<InMemoryCatalog>) {
    let catalog = Arc::new(InMemoryCatalog::new());
    for p in products {
        catalog.insert(p).await.unwrap();
    }
    let service = BasketService::new(catalog.clone(), Arc::new(InMemoryBasketStore::new()), "USD");
    (Arc::new(service), catalog)
}

fn product(name: &str, cents: i64, stock: u32) -> Product {
    let sku = Sku::new(format!("{}-{}", name, Uuid::new_v4())).unwrap();
    Product::new(sku, name, Money::new(Decimal::new(cents, 2), "USD"), stock)
}

#[tokio::test]
async fn checkout_round_trip() {
    let shirt = product("shirt", 2500, 10);
    let mug = product("mug", 900, 4);
    let (service, _) = setup(&[shirt.clone(), mug.clone()]).await;
    let user = Uuid::new_v4();

    service.add_item(user, shirt.id, 2).await.unwrap();
    let view = service.add_item(user, mug.id, 1).await.unwrap();
    assert_eq!(view.total_items, 3);
    assert_eq!(view.total_price.amount(), Decimal::new(5900, 2));
    assert_eq!(view.items.len(), 2);

    // checkout, pay, done
    service.change_status(user, BasketStatus::Pending).await.unwrap();
    let finished = service.change_status(user, BasketStatus::Finished).await.unwrap();
    assert_eq!(finished.status, BasketStatus::Finished);

    // the finished basket is history; a fresh open one takes its place
    let fresh = service.get_or_create(user).await.unwrap();
    assert_ne!(fresh.id, finished.id);
    assert!(fresh.items.is_empty());

    let history = service.history(user).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].id, fresh.id);
    assert_eq!(history[1].id, finished.id);
    assert_eq!(history[1].total_price.amount(), Decimal::new(5900, 2));
    let shirt_line = history[1].items.iter().find(|i| i.product_id == shirt.id).unwrap();
    assert_eq!(shirt_line.name, "shirt");
    assert_eq!(shirt_line.line_total.amount(), Decimal::new(5000, 2));
}

#[tokio::test]
async fn cancelled_payment_reopens_basket() {
    let shirt = product("shirt", 2500, 10);
    let (service, _) = setup(&[shirt.clone()]).await;
    let user = Uuid::new_v4();

    service.add_item(user, shirt.id, 1).await.unwrap();
    service.change_status(user, BasketStatus::Pending).await.unwrap();
    assert!(matches!(
        service.add_item(user, shirt.id, 1).await,
        Err(BasketError::BasketNotOpen { .. })
    ));

    service.change_status(user, BasketStatus::Open).await.unwrap();
    let view = service.add_item(user, shirt.id, 1).await.unwrap();
    assert_eq!(view.total_items, 2);
}

#[tokio::test]
async fn concurrent_adds_cannot_exceed_stock() {
    let scarce = product("scarce", 1500, 5);
    let (service, _) = setup(&[scarce.clone()]).await;
    let user = Uuid::new_v4();

    let a = {
        let service = service.clone();
        let id = scarce.id;
        tokio::spawn(async move { service.add_item(user, id, 5).await })
    };
    let b = {
        let service = service.clone();
        let id = scarce.id;
        tokio::spawn(async move { service.add_item(user, id, 5).await })
    };
    let (a, b) = (a.await.unwrap(), b.await.unwrap());

    // exactly one wins; the loser sees the basket already full
    assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
    let loser = if a.is_err() { a } else { b };
    assert!(matches!(loser, Err(BasketError::InsufficientStock { available: 0 })));

    let summary = service.summary(user).await.unwrap();
    assert_eq!(summary.total_items, 5);
}

#[tokio::test]
async fn concurrent_users_do_not_interfere() {
    let shirt = product("shirt", 2500, 10);
    let (service, _) = setup(&[shirt.clone()]).await;
    let users: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();

    let handles: Vec<_> = users.iter().map(|&user| {
        let service = service.clone();
        let id = shirt.id;
        tokio::spawn(async move { service.add_item(user, id, 2).await })
    }).collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    for user in users {
        let summary = service.summary(user).await.unwrap();
        assert_eq!(summary.total_items, 2);
    }
}

#[tokio::test]
async fn totals_follow_current_catalog_price() {
    let shirt = product("shirt", 2500, 10);
    let (service, catalog) = setup(&[shirt.clone()]).await;
    let user = Uuid::new_v4();

    let view = service.add_item(user, shirt.id, 2).await.unwrap();
    assert_eq!(view.total_price.amount(), Decimal::new(5000, 2));

    // price change lands on the next recompute
    let mut repriced = shirt.clone();
    repriced.price = Money::new(Decimal::new(3000, 2), "USD");
    catalog.update(&repriced).await.unwrap();

    let view = service.update_item_count(user, shirt.id, 2).await.unwrap();
    assert_eq!(view.total_price.amount(), Decimal::new(6000, 2));
}

#[tokio::test]
async fn deleted_product_drops_out_of_totals() {
    let shirt = product("shirt", 2500, 10);
    let mug = product("mug", 900, 4);
    let (service, catalog) = setup(&[shirt.clone(), mug.clone()]).await;
    let user = Uuid::new_v4();

    service.add_item(user, shirt.id, 1).await.unwrap();
    service.add_item(user, mug.id, 2).await.unwrap();

    // catalog loses the mug; its line contributes zero from the next persist
    catalog.remove(mug.id).await.unwrap();

    let view = service.update_item_count(user, shirt.id, 1).await.unwrap();
    assert_eq!(view.total_items, 1);
    assert_eq!(view.total_price.amount(), Decimal::new(2500, 2));
    assert!(view.items.iter().all(|i| i.product_id != mug.id));
}
