//! `SqliteDatabase` is the concrete storage backend: it implements every capability trait by
//! delegating to the connection-level functions in [`super::db`], adding transaction scope where
//! a call must be atomic.
use std::fmt::Debug;

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use sqlx::SqlitePool;

use super::db::{self, new_pool};
use crate::{
    db_types::{
        NewNotification,
        NewRestaurant,
        NewRestaurantMetric,
        Notification,
        NotificationType,
        Order,
        OrderItem,
        OrderSnapshot,
        PeriodType,
        Restaurant,
        RestaurantMetric,
    },
    traits::{
        LedgerError,
        MetricsManagement,
        NotificationManagement,
        OrderManagement,
        TenantManagement,
        TokenUpdate,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    pub async fn new(max_connections: u32) -> Result<Self, LedgerError> {
        let url = db::db_url();
        Self::new_with_url(&url, max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, LedgerError> {
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn run_migrations(&self) -> Result<(), LedgerError> {
        sqlx::migrate!("./src/sqlite/migrations")
            .run(&self.pool)
            .await
            .map_err(|e| LedgerError::DatabaseError(e.to_string()))
    }

    pub async fn close(&mut self) -> Result<(), LedgerError> {
        self.pool.close().await;
        Ok(())
    }
}

impl TenantManagement for SqliteDatabase {
    async fn insert_restaurant(&self, restaurant: NewRestaurant) -> Result<Restaurant, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        db::restaurants::insert_restaurant(restaurant, &mut conn).await
    }

    async fn fetch_restaurant(&self, id: i64) -> Result<Option<Restaurant>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        db::restaurants::fetch_restaurant(id, &mut conn).await
    }

    async fn fetch_restaurant_by_merchant_id(&self, merchant_id: &str) -> Result<Option<Restaurant>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        db::restaurants::fetch_restaurant_by_merchant_id(merchant_id, &mut conn).await
    }

    async fn fetch_active_restaurants(&self) -> Result<Vec<Restaurant>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        db::restaurants::fetch_active_restaurants(&mut conn).await
    }

    async fn store_user_code_verifier(
        &self,
        restaurant_id: i64,
        verifier: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        let mut conn = self.pool.acquire().await?;
        db::restaurants::store_user_code_verifier(restaurant_id, verifier, expires_at, &mut conn).await
    }

    async fn update_tokens(
        &self,
        restaurant_id: i64,
        update: TokenUpdate,
        expected_expiry: Option<DateTime<Utc>>,
    ) -> Result<bool, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        db::restaurants::update_tokens(restaurant_id, update, expected_expiry, &mut conn).await
    }

    async fn set_merchant_id(&self, restaurant_id: i64, merchant_id: &str) -> Result<(), LedgerError> {
        let mut conn = self.pool.acquire().await?;
        db::restaurants::set_merchant_id(restaurant_id, merchant_id, &mut conn).await
    }
}

impl OrderManagement for SqliteDatabase {
    async fn sync_order(&self, snapshot: OrderSnapshot) -> Result<Order, LedgerError> {
        // The whole upsert commits or nothing does: a failure mid-way must not leave a
        // half-filled order or an emptied item set behind.
        let mut tx = self.pool.begin().await?;
        let order = db::orders::sync_order(snapshot, &mut *tx).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn fetch_order(&self, id: i64) -> Result<Option<Order>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        db::orders::fetch_order(id, &mut conn).await
    }

    async fn fetch_order_by_upstream_id(
        &self,
        restaurant_id: i64,
        ifood_order_id: &str,
    ) -> Result<Option<Order>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        db::orders::fetch_order_by_upstream_id(restaurant_id, ifood_order_id, &mut conn).await
    }

    async fn fetch_order_items(&self, order_id: i64) -> Result<Vec<OrderItem>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        db::orders::fetch_order_items(order_id, &mut conn).await
    }

    async fn fetch_orders_placed_between(
        &self,
        restaurant_id: i64,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Order>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        db::orders::fetch_orders_placed_between(restaurant_id, since, until, &mut conn).await
    }

    async fn fetch_delayed_orders_without_notification(&self, now: DateTime<Utc>) -> Result<Vec<Order>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        db::orders::fetch_delayed_orders_without_notification(now, &mut conn).await
    }
}

impl NotificationManagement for SqliteDatabase {
    async fn insert_notification(&self, notification: NewNotification) -> Result<Notification, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        db::notifications::insert_notification(notification, &mut conn).await
    }

    async fn fetch_notification(&self, id: i64) -> Result<Option<Notification>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        db::notifications::fetch_notification(id, &mut conn).await
    }

    async fn mark_notification_sending(&self, id: i64) -> Result<(), LedgerError> {
        let mut conn = self.pool.acquire().await?;
        db::notifications::mark_sending(id, &mut conn).await
    }

    async fn mark_notification_sent(
        &self,
        id: i64,
        metadata: Value,
        sent_at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        let mut conn = self.pool.acquire().await?;
        db::notifications::mark_sent(id, metadata, sent_at, &mut conn).await
    }

    async fn mark_notification_failed(&self, id: i64, error: &str) -> Result<(), LedgerError> {
        let mut conn = self.pool.acquire().await?;
        db::notifications::mark_failed(id, error, &mut conn).await
    }

    async fn defer_notification(&self, id: i64, until: DateTime<Utc>) -> Result<(), LedgerError> {
        let mut conn = self.pool.acquire().await?;
        db::notifications::defer_notification(id, until, &mut conn).await
    }

    async fn fetch_due_deferred_notifications(&self, now: DateTime<Utc>) -> Result<Vec<Notification>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        db::notifications::fetch_due_deferred(now, &mut conn).await
    }

    async fn has_sent_notification(
        &self,
        order_id: i64,
        notification_type: NotificationType,
    ) -> Result<bool, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        db::notifications::has_sent_notification(order_id, notification_type, &mut conn).await
    }
}

impl MetricsManagement for SqliteDatabase {
    async fn upsert_metric(&self, metric: NewRestaurantMetric) -> Result<RestaurantMetric, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        db::metrics::upsert_metric(metric, &mut conn).await
    }

    async fn fetch_metrics_range(
        &self,
        restaurant_id: i64,
        from: NaiveDate,
        to: NaiveDate,
        period_type: PeriodType,
    ) -> Result<Vec<RestaurantMetric>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        db::metrics::fetch_metrics_range(restaurant_id, from, to, period_type, &mut conn).await
    }
}
