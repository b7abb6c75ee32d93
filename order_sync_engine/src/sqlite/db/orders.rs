use chrono::{DateTime, Utc};
use log::debug;
use sqlx::{types::Json, SqliteConnection};

use crate::{
    db_types::{NewOrderItem, Order, OrderItem, OrderSnapshot},
    traits::LedgerError,
};

/// Find-or-create plus full overwrite for one order, then wholesale item replacement and an item
/// count recomputed from the rows actually written. Not atomic by itself: run it inside a
/// transaction by passing `&mut *tx`.
pub async fn sync_order(snapshot: OrderSnapshot, conn: &mut SqliteConnection) -> Result<Order, LedgerError> {
    let existing: Option<(i64,)> =
        sqlx::query_as("SELECT id FROM orders WHERE restaurant_id = $1 AND ifood_order_id = $2")
            .bind(snapshot.restaurant_id)
            .bind(snapshot.ifood_order_id.as_str())
            .fetch_optional(&mut *conn)
            .await?;
    let order_id = match existing {
        Some((id,)) => {
            overwrite_order(id, &snapshot, conn).await?;
            id
        },
        None => {
            let id = insert_order(&snapshot, conn).await?;
            debug!("📝️ Order [{}] inserted with id {id}", snapshot.ifood_order_id);
            id
        },
    };
    if let Some(items) = &snapshot.items {
        replace_items(order_id, items, conn).await?;
    }
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM order_items WHERE order_id = $1")
        .bind(order_id)
        .fetch_one(&mut *conn)
        .await?;
    sqlx::query("UPDATE orders SET items_count = $2 WHERE id = $1")
        .bind(order_id)
        .bind(count)
        .execute(&mut *conn)
        .await?;
    fetch_order(order_id, conn).await?.ok_or(LedgerError::OrderNotFound(order_id))
}

async fn insert_order(snapshot: &OrderSnapshot, conn: &mut SqliteConnection) -> Result<i64, LedgerError> {
    let (id,): (i64,) = sqlx::query_as(
        r#"
            INSERT INTO orders (
                restaurant_id, ifood_order_id, short_reference, display_id, status, sub_status,
                customer_name, customer_phone, customer_delivery_address,
                total_amount, delivery_fee, discount, currency, notes,
                payment_methods, delivery_method,
                placed_at, confirmed_at, dispatched_at, delivered_at, cancelled_at, expected_delivery_at,
                ifood_data
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                $17, $18, $19, $20, $21, $22, $23
            )
            RETURNING id;
        "#,
    )
    .bind(snapshot.restaurant_id)
    .bind(snapshot.ifood_order_id.as_str())
    .bind(snapshot.short_reference.as_deref())
    .bind(snapshot.display_id.as_deref())
    .bind(snapshot.status)
    .bind(snapshot.sub_status.as_deref())
    .bind(snapshot.customer_name.as_deref())
    .bind(snapshot.customer_phone.as_deref())
    .bind(snapshot.customer_delivery_address.as_deref())
    .bind(snapshot.total_amount.value())
    .bind(snapshot.delivery_fee.value())
    .bind(snapshot.discount.value())
    .bind(snapshot.currency.as_str())
    .bind(snapshot.notes.as_deref())
    .bind(snapshot.payment_methods.clone().map(Json))
    .bind(snapshot.delivery_method.clone().map(Json))
    .bind(snapshot.placed_at)
    .bind(snapshot.confirmed_at)
    .bind(snapshot.dispatched_at)
    .bind(snapshot.delivered_at)
    .bind(snapshot.cancelled_at)
    .bind(snapshot.expected_delivery_at)
    .bind(Json(snapshot.ifood_data.clone()))
    .fetch_one(conn)
    .await?;
    Ok(id)
}

/// Full replace of the mutable fields, not a patch: absent payload fields overwrite with NULL.
async fn overwrite_order(id: i64, snapshot: &OrderSnapshot, conn: &mut SqliteConnection) -> Result<(), LedgerError> {
    sqlx::query(
        r#"
            UPDATE orders SET
                short_reference = $2, display_id = $3, status = $4, sub_status = $5,
                customer_name = $6, customer_phone = $7, customer_delivery_address = $8,
                total_amount = $9, delivery_fee = $10, discount = $11, currency = $12, notes = $13,
                payment_methods = $14, delivery_method = $15,
                placed_at = $16, confirmed_at = $17, dispatched_at = $18, delivered_at = $19,
                cancelled_at = $20, expected_delivery_at = $21,
                ifood_data = $22,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $1;
        "#,
    )
    .bind(id)
    .bind(snapshot.short_reference.as_deref())
    .bind(snapshot.display_id.as_deref())
    .bind(snapshot.status)
    .bind(snapshot.sub_status.as_deref())
    .bind(snapshot.customer_name.as_deref())
    .bind(snapshot.customer_phone.as_deref())
    .bind(snapshot.customer_delivery_address.as_deref())
    .bind(snapshot.total_amount.value())
    .bind(snapshot.delivery_fee.value())
    .bind(snapshot.discount.value())
    .bind(snapshot.currency.as_str())
    .bind(snapshot.notes.as_deref())
    .bind(snapshot.payment_methods.clone().map(Json))
    .bind(snapshot.delivery_method.clone().map(Json))
    .bind(snapshot.placed_at)
    .bind(snapshot.confirmed_at)
    .bind(snapshot.dispatched_at)
    .bind(snapshot.delivered_at)
    .bind(snapshot.cancelled_at)
    .bind(snapshot.expected_delivery_at)
    .bind(Json(snapshot.ifood_data.clone()))
    .execute(conn)
    .await?;
    Ok(())
}

async fn replace_items(
    order_id: i64,
    items: &[NewOrderItem],
    conn: &mut SqliteConnection,
) -> Result<(), LedgerError> {
    sqlx::query("DELETE FROM order_items WHERE order_id = $1").bind(order_id).execute(&mut *conn).await?;
    for item in items {
        sqlx::query(
            r#"
                INSERT INTO order_items (
                    order_id, ifood_item_id, name, description, quantity, unit_price, total_price,
                    category, modifiers, observations, ifood_data
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11);
            "#,
        )
        .bind(order_id)
        .bind(item.ifood_item_id.as_deref())
        .bind(item.name.as_str())
        .bind(item.description.as_deref())
        .bind(item.quantity)
        .bind(item.unit_price.value())
        .bind(item.total_price.value())
        .bind(item.category.as_deref())
        .bind(item.modifiers.clone().map(Json))
        .bind(item.observations.clone().map(Json))
        .bind(Json(item.ifood_data.clone()))
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

pub async fn fetch_order(id: i64, conn: &mut SqliteConnection) -> Result<Option<Order>, LedgerError> {
    let row = sqlx::query_as("SELECT * FROM orders WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(row)
}

pub async fn fetch_order_by_upstream_id(
    restaurant_id: i64,
    ifood_order_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, LedgerError> {
    let row = sqlx::query_as("SELECT * FROM orders WHERE restaurant_id = $1 AND ifood_order_id = $2")
        .bind(restaurant_id)
        .bind(ifood_order_id)
        .fetch_optional(conn)
        .await?;
    Ok(row)
}

pub async fn fetch_order_items(order_id: i64, conn: &mut SqliteConnection) -> Result<Vec<OrderItem>, LedgerError> {
    let rows = sqlx::query_as("SELECT * FROM order_items WHERE order_id = $1 ORDER BY id")
        .bind(order_id)
        .fetch_all(conn)
        .await?;
    Ok(rows)
}

pub async fn fetch_orders_placed_between(
    restaurant_id: i64,
    since: DateTime<Utc>,
    until: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, LedgerError> {
    let rows = sqlx::query_as(
        "SELECT * FROM orders WHERE restaurant_id = $1 AND placed_at >= $2 AND placed_at < $3 ORDER BY placed_at ASC",
    )
    .bind(restaurant_id)
    .bind(since)
    .bind(until)
    .fetch_all(conn)
    .await?;
    Ok(rows)
}

/// The delayed-order sweep query. The NOT EXISTS clause is the exactly-once guard: once a
/// delayed-order notification reaches `sent`, the order never matches again.
pub async fn fetch_delayed_orders_without_notification(
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, LedgerError> {
    let rows = sqlx::query_as(
        r#"
            SELECT * FROM orders
            WHERE expected_delivery_at IS NOT NULL
              AND expected_delivery_at < $1
              AND status NOT IN ('DELIVERED', 'CANCELLED')
              AND NOT EXISTS (
                  SELECT 1 FROM notifications
                  WHERE notifications.order_id = orders.id
                    AND notifications.type = 'delayed_order'
                    AND notifications.status = 'sent'
              )
            ORDER BY expected_delivery_at ASC;
        "#,
    )
    .bind(now)
    .fetch_all(conn)
    .await?;
    Ok(rows)
}
