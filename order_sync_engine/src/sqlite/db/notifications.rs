use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{types::Json, SqliteConnection};

use crate::{
    db_types::{NewNotification, Notification, NotificationType},
    traits::LedgerError,
};

pub async fn insert_notification(
    notification: NewNotification,
    conn: &mut SqliteConnection,
) -> Result<Notification, LedgerError> {
    let row = sqlx::query_as(
        r#"
            INSERT INTO notifications (restaurant_id, order_id, type, channel, status, message, recipient)
            VALUES ($1, $2, $3, $4, 'pending', $5, $6)
            RETURNING *;
        "#,
    )
    .bind(notification.restaurant_id)
    .bind(notification.order_id)
    .bind(notification.notification_type)
    .bind(notification.channel)
    .bind(notification.message)
    .bind(notification.recipient)
    .fetch_one(conn)
    .await?;
    Ok(row)
}

pub async fn fetch_notification(id: i64, conn: &mut SqliteConnection) -> Result<Option<Notification>, LedgerError> {
    let row = sqlx::query_as("SELECT * FROM notifications WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(row)
}

pub async fn mark_sending(id: i64, conn: &mut SqliteConnection) -> Result<(), LedgerError> {
    let result =
        sqlx::query("UPDATE notifications SET status = 'sending', updated_at = CURRENT_TIMESTAMP WHERE id = $1")
            .bind(id)
            .execute(conn)
            .await?;
    ensure_found(id, result.rows_affected())
}

pub async fn mark_sent(
    id: i64,
    metadata: Value,
    sent_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), LedgerError> {
    let result = sqlx::query(
        "UPDATE notifications SET status = 'sent', metadata = $2, sent_at = $3, deferred_until = NULL, updated_at = \
         CURRENT_TIMESTAMP WHERE id = $1",
    )
    .bind(id)
    .bind(Json(metadata))
    .bind(sent_at)
    .execute(conn)
    .await?;
    ensure_found(id, result.rows_affected())
}

pub async fn mark_failed(id: i64, error: &str, conn: &mut SqliteConnection) -> Result<(), LedgerError> {
    let result = sqlx::query(
        "UPDATE notifications SET status = 'failed', error_message = $2, deferred_until = NULL, updated_at = \
         CURRENT_TIMESTAMP WHERE id = $1",
    )
    .bind(id)
    .bind(error)
    .execute(conn)
    .await?;
    ensure_found(id, result.rows_affected())
}

pub async fn defer_notification(id: i64, until: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<(), LedgerError> {
    let result =
        sqlx::query("UPDATE notifications SET deferred_until = $2, updated_at = CURRENT_TIMESTAMP WHERE id = $1")
            .bind(id)
            .bind(until)
            .execute(conn)
            .await?;
    ensure_found(id, result.rows_affected())
}

pub async fn fetch_due_deferred(
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<Notification>, LedgerError> {
    let rows = sqlx::query_as(
        "SELECT * FROM notifications WHERE status = 'pending' AND deferred_until IS NOT NULL AND deferred_until <= \
         $1 ORDER BY deferred_until ASC",
    )
    .bind(now)
    .fetch_all(conn)
    .await?;
    Ok(rows)
}

pub async fn has_sent_notification(
    order_id: i64,
    notification_type: NotificationType,
    conn: &mut SqliteConnection,
) -> Result<bool, LedgerError> {
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM notifications WHERE order_id = $1 AND type = $2 AND status = 'sent'")
            .bind(order_id)
            .bind(notification_type)
            .fetch_one(conn)
            .await?;
    Ok(count > 0)
}

fn ensure_found(id: i64, rows_affected: u64) -> Result<(), LedgerError> {
    if rows_affected == 0 {
        Err(LedgerError::NotificationNotFound(id))
    } else {
        Ok(())
    }
}
