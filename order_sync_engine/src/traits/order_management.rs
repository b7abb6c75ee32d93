use chrono::{DateTime, Utc};

use crate::{
    db_types::{Order, OrderItem, OrderSnapshot},
    traits::LedgerError,
};

#[allow(async_fn_in_trait)]
pub trait OrderManagement: Clone + Send + Sync + 'static {
    /// Atomically find-or-create the order keyed by (restaurant, upstream order id), overwrite
    /// every mutable field from the snapshot, replace the item set wholesale and recompute the
    /// stored item count from the rows that were written. Re-running with the same snapshot is a
    /// no-op in effect, which is what makes webhook redelivery safe.
    async fn sync_order(&self, snapshot: OrderSnapshot) -> Result<Order, LedgerError>;

    async fn fetch_order(&self, id: i64) -> Result<Option<Order>, LedgerError>;

    async fn fetch_order_by_upstream_id(
        &self,
        restaurant_id: i64,
        ifood_order_id: &str,
    ) -> Result<Option<Order>, LedgerError>;

    async fn fetch_order_items(&self, order_id: i64) -> Result<Vec<OrderItem>, LedgerError>;

    /// Orders with `placed_at` in `[since, until)` for one restaurant, the metrics window query.
    async fn fetch_orders_placed_between(
        &self,
        restaurant_id: i64,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Order>, LedgerError>;

    /// Orders past their expected delivery time, not yet terminal, and without a sent
    /// delayed-order notification. The negative existence check is the exactly-once guard for the
    /// sweep; there is no flag on the order itself.
    async fn fetch_delayed_orders_without_notification(&self, now: DateTime<Utc>) -> Result<Vec<Order>, LedgerError>;
}
