use chrono::NaiveDate;

use crate::{
    db_types::{NewRestaurantMetric, PeriodType, RestaurantMetric},
    traits::LedgerError,
};

#[allow(async_fn_in_trait)]
pub trait MetricsManagement: Clone + Send + Sync + 'static {
    /// Insert-or-replace keyed by (restaurant, period_date, period_type).
    async fn upsert_metric(&self, metric: NewRestaurantMetric) -> Result<RestaurantMetric, LedgerError>;

    async fn fetch_metrics_range(
        &self,
        restaurant_id: i64,
        from: NaiveDate,
        to: NaiveDate,
        period_type: PeriodType,
    ) -> Result<Vec<RestaurantMetric>, LedgerError>;
}
