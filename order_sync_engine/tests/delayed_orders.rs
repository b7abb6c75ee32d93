use chrono::{Duration, Utc};
use order_sync_engine::{
    db_types::{NewRestaurant, NotificationStatus, NotificationType, OrderStatusType, Restaurant},
    traits::{NotificationManagement, OrderManagement, TenantManagement},
    NotificationApi,
    SqliteDatabase,
};

mod support;
use support::{
    prepare_env::{prepare_test_env, random_db_path, tear_down},
    snapshot,
    FailingGateway,
    RecordingGateway,
};

async fn setup() -> (SqliteDatabase, Restaurant) {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    let mut restaurant = NewRestaurant::new("Pizzaria Bella");
    restaurant.whatsapp_number = Some("11 97777-6666".into());
    let restaurant = db.insert_restaurant(restaurant).await.expect("Error inserting restaurant");
    (db, restaurant)
}

#[tokio::test]
async fn a_delayed_order_is_notified_exactly_once() {
    let (mut db, restaurant) = setup().await;
    let mut overdue = snapshot(restaurant.id, "late-1", OrderStatusType::Placed, 4000, Some(Utc::now()));
    overdue.expected_delivery_at = Some(Utc::now() - Duration::minutes(20));
    let order = db.sync_order(overdue).await.expect("seed order");

    let gateway = RecordingGateway::default();
    let api = NotificationApi::new(db.clone(), gateway.clone(), 0);

    let first_sweep = api.sweep_delayed_orders(Utc::now()).await.expect("sweep");
    assert_eq!(first_sweep, 1);
    assert_eq!(gateway.sent_count(), 1);
    assert!(db.has_sent_notification(order.id, NotificationType::DelayedOrder).await.unwrap());

    let second_sweep = api.sweep_delayed_orders(Utc::now()).await.expect("sweep");
    assert_eq!(second_sweep, 0, "the sent notification suppresses further sweeps");
    assert_eq!(gateway.sent_count(), 1);
    tear_down(&mut db).await;
}

#[tokio::test]
async fn terminal_and_on_time_orders_are_not_swept() {
    let (mut db, restaurant) = setup().await;
    let mut delivered = snapshot(restaurant.id, "done-1", OrderStatusType::Delivered, 4000, Some(Utc::now()));
    delivered.expected_delivery_at = Some(Utc::now() - Duration::minutes(20));
    db.sync_order(delivered).await.expect("seed order");
    let mut on_time = snapshot(restaurant.id, "ok-1", OrderStatusType::Placed, 4000, Some(Utc::now()));
    on_time.expected_delivery_at = Some(Utc::now() + Duration::minutes(20));
    db.sync_order(on_time).await.expect("seed order");
    db.sync_order(snapshot(restaurant.id, "no-eta", OrderStatusType::Placed, 4000, Some(Utc::now())))
        .await
        .expect("seed order");

    let gateway = RecordingGateway::default();
    let api = NotificationApi::new(db.clone(), gateway.clone(), 0);
    assert_eq!(api.sweep_delayed_orders(Utc::now()).await.expect("sweep"), 0);
    assert_eq!(gateway.sent_count(), 0);
    tear_down(&mut db).await;
}

#[tokio::test]
async fn a_failed_send_leaves_the_order_eligible_for_the_next_sweep() {
    let (mut db, restaurant) = setup().await;
    let mut overdue = snapshot(restaurant.id, "late-2", OrderStatusType::Confirmed, 4000, Some(Utc::now()));
    overdue.expected_delivery_at = Some(Utc::now() - Duration::hours(1));
    let order = db.sync_order(overdue).await.expect("seed order");

    let failing_api = NotificationApi::new(db.clone(), FailingGateway, 0);
    failing_api.sweep_delayed_orders(Utc::now()).await.expect("sweep");
    assert!(!db.has_sent_notification(order.id, NotificationType::DelayedOrder).await.unwrap());

    // The gateway recovers; the next sweep creates a fresh notification row and sends it. The
    // failed row stays failed.
    let gateway = RecordingGateway::default();
    let api = NotificationApi::new(db.clone(), gateway.clone(), 0);
    assert_eq!(api.sweep_delayed_orders(Utc::now()).await.expect("sweep"), 1);
    assert_eq!(gateway.sent_count(), 1);

    let failed = db.fetch_notification(1).await.unwrap().expect("first row kept");
    assert_eq!(failed.status, NotificationStatus::Failed);
    tear_down(&mut db).await;
}
