use chrono::{Datelike, Duration, NaiveDate, TimeZone, Utc};
use order_sync_engine::{
    db_types::{NewRestaurant, OrderStatusType, PeriodType, Restaurant},
    traits::{OrderManagement, TenantManagement},
    MetricsApi,
    ReportApi,
    SqliteDatabase,
};
use rog_common::Money;

mod support;
use support::{
    prepare_env::{prepare_test_env, random_db_path, tear_down},
    snapshot,
};

async fn setup() -> (SqliteDatabase, Restaurant) {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    let restaurant =
        db.insert_restaurant(NewRestaurant::new("Sabor Mineiro")).await.expect("Error inserting restaurant");
    (db, restaurant)
}

#[tokio::test]
async fn daily_metrics_match_the_ledger() {
    let (mut db, restaurant) = setup().await;
    let day = NaiveDate::from_ymd_opt(2025, 12, 16).unwrap();
    let noon = Utc.with_ymd_and_hms(2025, 12, 16, 12, 0, 0).unwrap();
    db.sync_order(snapshot(restaurant.id, "m-1", OrderStatusType::Delivered, 5000, Some(noon))).await.unwrap();
    db.sync_order(snapshot(restaurant.id, "m-2", OrderStatusType::Delivered, 3000, Some(noon))).await.unwrap();
    db.sync_order(snapshot(restaurant.id, "m-3", OrderStatusType::Cancelled, 2000, Some(noon))).await.unwrap();
    // Outside the window: must not count.
    let next_day = Utc.with_ymd_and_hms(2025, 12, 17, 12, 0, 0).unwrap();
    db.sync_order(snapshot(restaurant.id, "m-4", OrderStatusType::Delivered, 9000, Some(next_day))).await.unwrap();

    let api = MetricsApi::new(db.clone());
    let metric = api.calculate(&restaurant, day, PeriodType::Daily).await.expect("calculate");

    assert_eq!(metric.total_orders, 3);
    assert_eq!(metric.delivered_orders, 2);
    assert_eq!(metric.cancelled_orders, 1);
    assert_eq!(metric.total_revenue, Money::from_cents(8000));
    assert_eq!(metric.average_order_value, Money::from_cents(4000));
    assert!(metric.average_preparation_time.is_none(), "no complete sub-intervals in the window");
    tear_down(&mut db).await;
}

#[tokio::test]
async fn recomputation_replaces_the_row() {
    let (mut db, restaurant) = setup().await;
    let day = NaiveDate::from_ymd_opt(2025, 12, 16).unwrap();
    let noon = Utc.with_ymd_and_hms(2025, 12, 16, 12, 0, 0).unwrap();
    db.sync_order(snapshot(restaurant.id, "m-1", OrderStatusType::Delivered, 5000, Some(noon))).await.unwrap();

    let api = MetricsApi::new(db.clone());
    let first = api.calculate(&restaurant, day, PeriodType::Daily).await.expect("calculate");
    assert_eq!(first.total_orders, 1);

    db.sync_order(snapshot(restaurant.id, "m-2", OrderStatusType::Delivered, 3000, Some(noon))).await.unwrap();
    let second = api.calculate(&restaurant, day, PeriodType::Daily).await.expect("recalculate");
    assert_eq!(second.total_orders, 2);
    assert_eq!(second.id, first.id, "same (restaurant, date, period) row");

    let rows = api.range(restaurant.id, day, day, PeriodType::Daily).await.expect("range");
    assert_eq!(rows.len(), 1);
    tear_down(&mut db).await;
}

#[tokio::test]
async fn weekly_window_spans_monday_to_sunday() {
    let (mut db, restaurant) = setup().await;
    // Week of Mon 2025-12-15 .. Sun 2025-12-21.
    let monday = Utc.with_ymd_and_hms(2025, 12, 15, 10, 0, 0).unwrap();
    let sunday = Utc.with_ymd_and_hms(2025, 12, 21, 22, 0, 0).unwrap();
    let next_monday = Utc.with_ymd_and_hms(2025, 12, 22, 0, 30, 0).unwrap();
    db.sync_order(snapshot(restaurant.id, "w-1", OrderStatusType::Delivered, 1000, Some(monday))).await.unwrap();
    db.sync_order(snapshot(restaurant.id, "w-2", OrderStatusType::Delivered, 1000, Some(sunday))).await.unwrap();
    db.sync_order(snapshot(restaurant.id, "w-3", OrderStatusType::Delivered, 1000, Some(next_monday))).await.unwrap();

    let api = MetricsApi::new(db.clone());
    let metric = api
        .calculate(&restaurant, NaiveDate::from_ymd_opt(2025, 12, 18).unwrap(), PeriodType::Weekly)
        .await
        .expect("calculate");
    assert_eq!(metric.total_orders, 2);
    tear_down(&mut db).await;
}

#[tokio::test]
async fn time_averages_come_from_delivered_orders_with_complete_intervals() {
    let (mut db, restaurant) = setup().await;
    let day = NaiveDate::from_ymd_opt(2025, 12, 16).unwrap();
    let at = |h: u32, m: u32| Utc.with_ymd_and_hms(2025, 12, 16, h, m, 0).unwrap();
    let mut order = snapshot(restaurant.id, "t-1", OrderStatusType::Delivered, 6000, Some(at(18, 0)));
    order.confirmed_at = Some(at(18, 5));
    order.dispatched_at = Some(at(18, 25));
    order.delivered_at = Some(at(18, 55));
    db.sync_order(order).await.unwrap();

    let api = MetricsApi::new(db.clone());
    let metric = api.calculate(&restaurant, day, PeriodType::Daily).await.expect("calculate");
    assert_eq!(metric.average_preparation_time, Some(20.0));
    assert_eq!(metric.average_delivery_time, Some(30.0));
    assert_eq!(metric.average_total_time, Some(55.0));
    tear_down(&mut db).await;
}

#[tokio::test]
async fn weekly_report_aggregates_and_recommends() {
    let (mut db, restaurant) = setup().await;
    // Current week, so the delayed predicate can look at "now".
    let now = Utc::now();
    let monday = now - Duration::days(now.date_naive().weekday().num_days_from_monday() as i64);
    let mut delivered = snapshot(restaurant.id, "r-1", OrderStatusType::Delivered, 8000, Some(monday));
    delivered.delivered_at = Some(monday + Duration::minutes(90));
    db.sync_order(delivered).await.unwrap();
    let mut late = snapshot(restaurant.id, "r-2", OrderStatusType::Placed, 4000, Some(monday));
    late.expected_delivery_at = Some(now - Duration::hours(1));
    db.sync_order(late).await.unwrap();

    let api = ReportApi::new(db.clone());
    let report = api.weekly(&restaurant, now.date_naive()).await.expect("report");
    assert_eq!(report.metrics.total_orders, 2);
    assert_eq!(report.metrics.total_revenue, Money::from_cents(12_000), "reports sum all orders");
    assert_eq!(report.metrics.delivered_orders, 1);
    assert_eq!(report.metrics.delayed_orders, 1);
    assert_eq!(report.metrics.average_delivery_time_minutes, Some(90.0));
    // 50% delayed and a 90-minute average both trip recommendations.
    assert!(report.recommendations.len() >= 2);
    tear_down(&mut db).await;
}

#[tokio::test]
async fn monthly_report_breaks_sales_down_by_day() {
    let (mut db, restaurant) = setup().await;
    let d10 = Utc.with_ymd_and_hms(2025, 11, 10, 12, 0, 0).unwrap();
    let d20 = Utc.with_ymd_and_hms(2025, 11, 20, 12, 0, 0).unwrap();
    db.sync_order(snapshot(restaurant.id, "n-1", OrderStatusType::Delivered, 2500, Some(d10))).await.unwrap();
    db.sync_order(snapshot(restaurant.id, "n-2", OrderStatusType::Delivered, 2500, Some(d10))).await.unwrap();
    db.sync_order(snapshot(restaurant.id, "n-3", OrderStatusType::Cancelled, 1000, Some(d20))).await.unwrap();

    let api = ReportApi::new(db.clone());
    let report =
        api.monthly(&restaurant, NaiveDate::from_ymd_opt(2025, 11, 15).unwrap()).await.expect("report");
    assert_eq!(report.metrics.total_orders, 3);
    assert_eq!(report.daily_breakdown.len(), 30, "November has 30 days");
    let day10 = &report.daily_breakdown[9];
    assert_eq!(day10.orders, 2);
    assert_eq!(day10.revenue, Money::from_cents(5000));
    assert_eq!(report.daily_breakdown[10].orders, 0);
    tear_down(&mut db).await;
}
