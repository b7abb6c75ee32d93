use chrono::NaiveDate;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewRestaurantMetric, PeriodType, RestaurantMetric},
    traits::LedgerError,
};

pub async fn upsert_metric(
    metric: NewRestaurantMetric,
    conn: &mut SqliteConnection,
) -> Result<RestaurantMetric, LedgerError> {
    let row = sqlx::query_as(
        r#"
            INSERT INTO restaurant_metrics (
                restaurant_id, period_date, period_type,
                total_orders, placed_orders, confirmed_orders, delivered_orders, cancelled_orders, delayed_orders,
                total_revenue, average_order_value, total_delivery_fees, total_discounts,
                average_preparation_time, average_delivery_time, average_total_time
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            ON CONFLICT (restaurant_id, period_date, period_type) DO UPDATE SET
                total_orders = excluded.total_orders,
                placed_orders = excluded.placed_orders,
                confirmed_orders = excluded.confirmed_orders,
                delivered_orders = excluded.delivered_orders,
                cancelled_orders = excluded.cancelled_orders,
                delayed_orders = excluded.delayed_orders,
                total_revenue = excluded.total_revenue,
                average_order_value = excluded.average_order_value,
                total_delivery_fees = excluded.total_delivery_fees,
                total_discounts = excluded.total_discounts,
                average_preparation_time = excluded.average_preparation_time,
                average_delivery_time = excluded.average_delivery_time,
                average_total_time = excluded.average_total_time,
                updated_at = CURRENT_TIMESTAMP
            RETURNING *;
        "#,
    )
    .bind(metric.restaurant_id)
    .bind(metric.period_date)
    .bind(metric.period_type)
    .bind(metric.total_orders)
    .bind(metric.placed_orders)
    .bind(metric.confirmed_orders)
    .bind(metric.delivered_orders)
    .bind(metric.cancelled_orders)
    .bind(metric.delayed_orders)
    .bind(metric.total_revenue.value())
    .bind(metric.average_order_value.value())
    .bind(metric.total_delivery_fees.value())
    .bind(metric.total_discounts.value())
    .bind(metric.average_preparation_time)
    .bind(metric.average_delivery_time)
    .bind(metric.average_total_time)
    .fetch_one(conn)
    .await?;
    Ok(row)
}

pub async fn fetch_metrics_range(
    restaurant_id: i64,
    from: NaiveDate,
    to: NaiveDate,
    period_type: PeriodType,
    conn: &mut SqliteConnection,
) -> Result<Vec<RestaurantMetric>, LedgerError> {
    let rows = sqlx::query_as(
        "SELECT * FROM restaurant_metrics WHERE restaurant_id = $1 AND period_type = $2 AND period_date >= $3 AND \
         period_date <= $4 ORDER BY period_date ASC",
    )
    .bind(restaurant_id)
    .bind(period_type)
    .bind(from)
    .bind(to)
    .fetch_all(conn)
    .await?;
    Ok(rows)
}
