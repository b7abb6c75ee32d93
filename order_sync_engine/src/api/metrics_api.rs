use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use log::*;
use rog_common::Money;
use serde::Serialize;

use crate::{
    db_types::{NewRestaurantMetric, Order, OrderStatusType, PeriodType, Restaurant, RestaurantMetric},
    traits::{LedgerError, MetricsManagement, OrderManagement},
};

/// Aggregate computation over the order ledger. `calculate` is idempotent: recomputing a period
/// replaces the existing row for (restaurant, period_date, period_type).
pub struct MetricsApi<B> {
    db: B,
}

impl<B> MetricsApi<B>
where B: MetricsManagement + OrderManagement
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub async fn calculate(
        &self,
        restaurant: &Restaurant,
        date: NaiveDate,
        period_type: PeriodType,
    ) -> Result<RestaurantMetric, LedgerError> {
        let (start, end) = period_bounds(date, period_type);
        let orders = self.db.fetch_orders_placed_between(restaurant.id, start, end).await?;
        let metric = compute_metric(restaurant.id, date, period_type, &orders, Utc::now());
        debug!(
            "📊️ {period_type} metrics for restaurant {} on {date}: {} orders, revenue {}",
            restaurant.id, metric.total_orders, metric.total_revenue
        );
        self.db.upsert_metric(metric).await
    }

    /// Stored metric rows for a date range, ordered by period date.
    pub async fn range(
        &self,
        restaurant_id: i64,
        from: NaiveDate,
        to: NaiveDate,
        period_type: PeriodType,
    ) -> Result<Vec<RestaurantMetric>, LedgerError> {
        self.db.fetch_metrics_range(restaurant_id, from, to, period_type).await
    }

    /// Dashboard summary over the last `days` days, computed directly from the ledger.
    pub async fn summary(&self, restaurant_id: i64, days: i64) -> Result<MetricsSummary, LedgerError> {
        let now = Utc::now();
        let orders = self.db.fetch_orders_placed_between(restaurant_id, now - Duration::days(days), now).await?;
        let today_start = now.date_naive().and_hms_opt(0, 0, 0).unwrap_or_default().and_utc();
        let today: Vec<&Order> =
            orders.iter().filter(|o| o.placed_at.map_or(false, |t| t >= today_start)).collect();
        let delivered: Vec<&Order> = orders.iter().filter(|o| o.status == OrderStatusType::Delivered).collect();
        let total_revenue: Money = delivered.iter().map(|o| o.total_amount).sum();
        let today_revenue: Money = today
            .iter()
            .filter(|o| o.status == OrderStatusType::Delivered)
            .map(|o| o.total_amount)
            .sum();
        Ok(MetricsSummary {
            total_orders: orders.len() as i64,
            today_orders: today.len() as i64,
            pending_orders: orders.iter().filter(|o| !o.status.is_terminal()).count() as i64,
            delivered_orders: delivered.len() as i64,
            cancelled_orders: orders.iter().filter(|o| o.status == OrderStatusType::Cancelled).count() as i64,
            total_revenue,
            today_revenue,
            average_order_value: average_value(total_revenue, delivered.len()),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    pub total_orders: i64,
    pub today_orders: i64,
    pub pending_orders: i64,
    pub delivered_orders: i64,
    pub cancelled_orders: i64,
    pub total_revenue: Money,
    pub today_revenue: Money,
    pub average_order_value: Money,
}

/// Half-open `[start, end)` UTC window for the period containing `date`. Weeks start on Monday.
pub fn period_bounds(date: NaiveDate, period_type: PeriodType) -> (DateTime<Utc>, DateTime<Utc>) {
    let (start_date, end_date) = match period_type {
        PeriodType::Daily => (date, date + Duration::days(1)),
        PeriodType::Weekly => {
            let start = date - Duration::days(date.weekday().num_days_from_monday() as i64);
            (start, start + Duration::days(7))
        },
        PeriodType::Monthly => {
            let start = date.with_day(1).unwrap_or(date);
            let end = if start.month() == 12 {
                start.with_year(start.year() + 1).and_then(|d| d.with_month(1))
            } else {
                start.with_month(start.month() + 1)
            }
            .unwrap_or(start + Duration::days(31));
            (start, end)
        },
    };
    let to_utc = |d: NaiveDate| d.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc();
    (to_utc(start_date), to_utc(end_date))
}

/// Derives the aggregate row from the orders placed in the window. Delayed orders are evaluated
/// against `now`, not against history: an order currently past its expected delivery and not yet
/// terminal counts, regardless of whether a sweep already notified about it.
pub fn compute_metric(
    restaurant_id: i64,
    period_date: NaiveDate,
    period_type: PeriodType,
    orders: &[Order],
    now: DateTime<Utc>,
) -> NewRestaurantMetric {
    let count_status =
        |status: OrderStatusType| orders.iter().filter(|o| o.status == status).count() as i64;
    let delivered: Vec<&Order> = orders.iter().filter(|o| o.status == OrderStatusType::Delivered).collect();
    let delayed_orders = orders
        .iter()
        .filter(|o| o.expected_delivery_at.map_or(false, |t| t < now) && !o.status.is_terminal())
        .count() as i64;
    let total_revenue: Money = delivered.iter().map(|o| o.total_amount).sum();
    let total_delivery_fees: Money = orders.iter().map(|o| o.delivery_fee).sum();
    let total_discounts: Money = orders.iter().map(|o| o.discount).sum();

    let minutes = |a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>| -> Option<f64> {
        match (a, b) {
            (Some(a), Some(b)) => Some((b - a).num_seconds() as f64 / 60.0),
            _ => None,
        }
    };
    let average_of = |samples: Vec<f64>| -> Option<f64> {
        if samples.is_empty() {
            None
        } else {
            Some(samples.iter().sum::<f64>() / samples.len() as f64)
        }
    };
    let average_preparation_time =
        average_of(delivered.iter().filter_map(|o| minutes(o.confirmed_at, o.dispatched_at)).collect());
    let average_delivery_time =
        average_of(delivered.iter().filter_map(|o| minutes(o.dispatched_at, o.delivered_at)).collect());
    let average_total_time =
        average_of(delivered.iter().filter_map(|o| minutes(o.placed_at, o.delivered_at)).collect());

    NewRestaurantMetric {
        restaurant_id,
        period_date,
        period_type,
        total_orders: orders.len() as i64,
        placed_orders: count_status(OrderStatusType::Placed),
        confirmed_orders: count_status(OrderStatusType::Confirmed),
        delivered_orders: delivered.len() as i64,
        cancelled_orders: count_status(OrderStatusType::Cancelled),
        delayed_orders,
        total_revenue,
        average_order_value: average_value(total_revenue, delivered.len()),
        total_delivery_fees,
        total_discounts,
        average_preparation_time,
        average_delivery_time,
        average_total_time,
    }
}

fn average_value(total: Money, count: usize) -> Money {
    if count == 0 {
        Money::default()
    } else {
        Money::from_cents((total.value() as f64 / count as f64).round() as i64)
    }
}
