use chrono::{DateTime, Utc};
use log::debug;
use sqlx::{types::Json, SqliteConnection};

use crate::{
    db_types::{NewRestaurant, Restaurant},
    traits::{LedgerError, TokenUpdate},
};

pub async fn insert_restaurant(
    restaurant: NewRestaurant,
    conn: &mut SqliteConnection,
) -> Result<Restaurant, LedgerError> {
    let row = sqlx::query_as(
        r#"
            INSERT INTO restaurants (
                name,
                whatsapp_number,
                ifood_client_id,
                ifood_client_secret,
                ifood_merchant_id,
                notification_settings,
                is_active
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *;
        "#,
    )
    .bind(restaurant.name)
    .bind(restaurant.whatsapp_number)
    .bind(restaurant.ifood_client_id)
    .bind(restaurant.ifood_client_secret)
    .bind(restaurant.ifood_merchant_id)
    .bind(restaurant.notification_settings.map(Json))
    .bind(restaurant.is_active)
    .fetch_one(conn)
    .await?;
    Ok(row)
}

pub async fn fetch_restaurant(id: i64, conn: &mut SqliteConnection) -> Result<Option<Restaurant>, LedgerError> {
    let row = sqlx::query_as("SELECT * FROM restaurants WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(row)
}

pub async fn fetch_restaurant_by_merchant_id(
    merchant_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Restaurant>, LedgerError> {
    let row = sqlx::query_as("SELECT * FROM restaurants WHERE ifood_merchant_id = $1")
        .bind(merchant_id)
        .fetch_optional(conn)
        .await?;
    Ok(row)
}

pub async fn fetch_active_restaurants(conn: &mut SqliteConnection) -> Result<Vec<Restaurant>, LedgerError> {
    let rows = sqlx::query_as("SELECT * FROM restaurants WHERE is_active = 1 ORDER BY id").fetch_all(conn).await?;
    Ok(rows)
}

pub async fn store_user_code_verifier(
    restaurant_id: i64,
    verifier: &str,
    expires_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), LedgerError> {
    let result = sqlx::query(
        "UPDATE restaurants SET ifood_authorization_code_verifier = $2, ifood_user_code_expires_at = $3, updated_at \
         = CURRENT_TIMESTAMP WHERE id = $1",
    )
    .bind(restaurant_id)
    .bind(verifier)
    .bind(expires_at)
    .execute(conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(LedgerError::RestaurantNotFound(restaurant_id));
    }
    Ok(())
}

/// Token persistence with a compare-and-swap on the previously observed expiry. A refresh racing
/// another writer loses the swap and leaves the newer token in place.
pub async fn update_tokens(
    restaurant_id: i64,
    update: TokenUpdate,
    expected_expiry: Option<DateTime<Utc>>,
    conn: &mut SqliteConnection,
) -> Result<bool, LedgerError> {
    let result = sqlx::query(
        r#"
            UPDATE restaurants SET
                ifood_access_token = $2,
                ifood_refresh_token = COALESCE($3, ifood_refresh_token),
                ifood_token_expires_at = $4,
                ifood_authorization_code_verifier = CASE WHEN $5 THEN NULL ELSE ifood_authorization_code_verifier END,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $1 AND ifood_token_expires_at IS $6;
        "#,
    )
    .bind(restaurant_id)
    .bind(update.access_token)
    .bind(update.refresh_token)
    .bind(update.expires_at)
    .bind(update.clear_verifier)
    .bind(expected_expiry)
    .execute(conn)
    .await?;
    let written = result.rows_affected() > 0;
    if !written {
        debug!("📝️ Token update for restaurant {restaurant_id} lost a compare-and-swap, skipping write");
    }
    Ok(written)
}

pub async fn set_merchant_id(
    restaurant_id: i64,
    merchant_id: &str,
    conn: &mut SqliteConnection,
) -> Result<(), LedgerError> {
    let result =
        sqlx::query("UPDATE restaurants SET ifood_merchant_id = $2, updated_at = CURRENT_TIMESTAMP WHERE id = $1")
            .bind(restaurant_id)
            .bind(merchant_id)
            .execute(conn)
            .await?;
    if result.rows_affected() == 0 {
        return Err(LedgerError::RestaurantNotFound(restaurant_id));
    }
    Ok(())
}
