use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::{
    db_types::{NewNotification, Notification, NotificationType},
    traits::LedgerError,
};

#[allow(async_fn_in_trait)]
pub trait NotificationManagement: Clone + Send + Sync + 'static {
    /// Creates the notification row in `pending` state, before any send attempt.
    async fn insert_notification(&self, notification: NewNotification) -> Result<Notification, LedgerError>;

    async fn fetch_notification(&self, id: i64) -> Result<Option<Notification>, LedgerError>;

    async fn mark_notification_sending(&self, id: i64) -> Result<(), LedgerError>;

    async fn mark_notification_sent(
        &self,
        id: i64,
        metadata: Value,
        sent_at: DateTime<Utc>,
    ) -> Result<(), LedgerError>;

    async fn mark_notification_failed(&self, id: i64, error: &str) -> Result<(), LedgerError>;

    /// Parks a pending notification until the given instant (quiet-hours deferral).
    async fn defer_notification(&self, id: i64, until: DateTime<Utc>) -> Result<(), LedgerError>;

    /// Pending notifications whose deferral has elapsed.
    async fn fetch_due_deferred_notifications(&self, now: DateTime<Utc>) -> Result<Vec<Notification>, LedgerError>;

    /// Whether a notification of this type has already been sent for the order.
    async fn has_sent_notification(
        &self,
        order_id: i64,
        notification_type: NotificationType,
    ) -> Result<bool, LedgerError>;
}
