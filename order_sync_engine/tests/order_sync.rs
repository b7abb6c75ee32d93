use order_sync_engine::{
    db_types::{NewRestaurant, OrderStatusType, Restaurant},
    events::EventProducers,
    ifood_types::WebhookEnvelope,
    traits::{NoEnrichment, OrderManagement, TenantManagement},
    OrderSyncApi,
    OrderSyncError,
    SqliteDatabase,
};
use rog_common::Money;
use serde_json::{json, Value};

mod support;
use support::prepare_env::{prepare_test_env, random_db_path, tear_down};

async fn setup() -> (OrderSyncApi<SqliteDatabase, NoEnrichment>, SqliteDatabase, Restaurant) {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    let mut restaurant = NewRestaurant::new("Cantina da Esquina");
    restaurant.whatsapp_number = Some("11 99999-9999".into());
    restaurant.ifood_merchant_id = Some("merchant-1".into());
    let restaurant = db.insert_restaurant(restaurant).await.expect("Error inserting restaurant");
    let api = OrderSyncApi::new(db.clone(), NoEnrichment, EventProducers::default());
    (api, db, restaurant)
}

fn envelope(event: &str, data: Value) -> WebhookEnvelope {
    serde_json::from_value(json!({"event": event, "data": data})).expect("valid envelope")
}

fn placed_payload(order_id: &str) -> Value {
    json!({
        "id": order_id,
        "displayId": "4821",
        "merchant": {"id": "merchant-1"},
        "customer": {"name": "Ana", "phone": "11 98888-7777"},
        "total": {"value": 64.5, "discount": 4.5, "currency": "BRL"},
        "delivery": {
            "deliveryFee": {"value": 9.0},
            "address": {"streetName": "Rua das Flores", "streetNumber": "100", "city": "São Paulo"}
        },
        "createdAt": "2025-12-16T18:00:00Z",
        "items": [
            {"name": "Pizza Margherita", "quantity": 1, "unitPrice": {"value": 45.0}, "totalPrice": {"value": 45.0}},
            {"name": "Refrigerante", "quantity": 2, "unitPrice": {"value": 9.75}, "totalPrice": {"value": 19.5}}
        ]
    })
}

#[tokio::test]
async fn replaying_an_event_is_idempotent() {
    let (api, mut db, restaurant) = setup().await;
    let first = api.process_event(envelope("PLACED", placed_payload("order-1"))).await.expect("first sync");
    let second = api.process_event(envelope("PLACED", placed_payload("order-1"))).await.expect("second sync");

    assert_eq!(first.id, second.id, "replay must hit the same ledger row");
    assert_eq!(second.status, OrderStatusType::Placed);
    assert_eq!(second.total_amount, Money::from_cents(6450));
    assert_eq!(second.items_count, 2);
    assert_eq!(second.customer_delivery_address.as_deref(), Some("Rua das Flores, 100, São Paulo"));

    let stored = db
        .fetch_order_by_upstream_id(restaurant.id, "order-1")
        .await
        .expect("fetch")
        .expect("order exists");
    assert_eq!(stored.id, first.id);
    let items = db.fetch_order_items(stored.id).await.expect("items");
    assert_eq!(items.len(), 2);
    tear_down(&mut db).await;
}

#[tokio::test]
async fn a_second_event_replaces_the_item_set() {
    let (api, mut db, _restaurant) = setup().await;
    let order = api.process_event(envelope("PLACED", placed_payload("order-2"))).await.expect("first sync");
    assert_eq!(order.items_count, 2);

    let mut update = placed_payload("order-2");
    update["status"] = json!("CONFIRMED");
    update["items"] = json!([
        {"name": "Pizza Margherita", "quantity": 1, "unitPrice": {"value": 45.0}, "totalPrice": {"value": 45.0}}
    ]);
    let updated = api.process_event(envelope("CONFIRMED", update)).await.expect("second sync");

    assert_eq!(updated.id, order.id);
    assert_eq!(updated.status, OrderStatusType::Confirmed);
    assert_eq!(updated.items_count, 1, "items_count comes from the stored rows");
    let items = db.fetch_order_items(updated.id).await.expect("items");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].name, "Pizza Margherita");
    tear_down(&mut db).await;
}

#[tokio::test]
async fn an_event_without_items_leaves_the_item_set_alone() {
    let (api, mut db, _restaurant) = setup().await;
    let order = api.process_event(envelope("PLACED", placed_payload("order-3"))).await.expect("first sync");

    let update = json!({
        "id": "order-3",
        "merchant": {"id": "merchant-1"},
        "status": "DISPATCHED",
        "dispatchedAt": "2025-12-16T18:40:00Z"
    });
    let updated = api.process_event(envelope("DISPATCHED", update)).await.expect("second sync");

    assert_eq!(updated.status, OrderStatusType::Dispatched);
    assert!(updated.dispatched_at.is_some());
    assert_eq!(updated.items_count, 2);
    let items = db.fetch_order_items(order.id).await.expect("items");
    assert_eq!(items.len(), 2);
    tear_down(&mut db).await;
}

#[tokio::test]
async fn status_defaults_to_the_event_type() {
    let (api, mut db, _restaurant) = setup().await;
    let data = json!({"id": "order-4", "merchant": {"id": "merchant-1"}});
    let order = api.process_event(envelope("DELIVERED", data)).await.expect("sync");
    assert_eq!(order.status, OrderStatusType::Delivered);
    tear_down(&mut db).await;
}

#[tokio::test]
async fn the_state_hint_resolves_the_tenant_when_the_merchant_is_unknown() {
    let (api, mut db, restaurant) = setup().await;
    let data = json!({"id": "order-5", "merchant": {"id": "some-other-merchant"}});
    let envelope: WebhookEnvelope = serde_json::from_value(json!({
        "event": "PLACED",
        "data": data,
        "state": restaurant.id.to_string()
    }))
    .unwrap();
    let order = api.process_event(envelope).await.expect("sync via state hint");
    assert_eq!(order.restaurant_id, restaurant.id);
    tear_down(&mut db).await;
}

#[tokio::test]
async fn an_unresolvable_tenant_drops_the_event() {
    let (api, mut db, _restaurant) = setup().await;
    let data = json!({"id": "order-6", "merchant": {"id": "nobody"}});
    let err = api.process_event(envelope("PLACED", data)).await.expect_err("must not sync");
    assert!(matches!(err, OrderSyncError::RestaurantNotFound));
    assert!(!err.is_retryable(), "retrying cannot create the missing mapping");
    tear_down(&mut db).await;
}

#[tokio::test]
async fn a_payload_without_an_order_id_is_rejected() {
    let (api, mut db, _restaurant) = setup().await;
    let data = json!({"merchant": {"id": "merchant-1"}, "total": {"value": 10.0}});
    let err = api.process_event(envelope("PLACED", data)).await.expect_err("must not sync");
    assert!(matches!(err, OrderSyncError::ValidationError(_)));
    assert!(!err.is_retryable());
    tear_down(&mut db).await;
}
