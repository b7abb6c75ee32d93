use chrono::{DateTime, Utc};

use crate::{
    db_types::{NewRestaurant, Restaurant},
    traits::LedgerError,
};

/// Replacement token set persisted after a successful grant or refresh.
#[derive(Debug, Clone)]
pub struct TokenUpdate {
    pub access_token: String,
    /// `None` keeps the currently stored refresh token (the provider does not always reissue one).
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    /// Set after a successful verifier exchange so the one-shot verifier cannot be replayed.
    pub clear_verifier: bool,
}

#[allow(async_fn_in_trait)]
pub trait TenantManagement: Clone + Send + Sync + 'static {
    async fn insert_restaurant(&self, restaurant: NewRestaurant) -> Result<Restaurant, LedgerError>;

    async fn fetch_restaurant(&self, id: i64) -> Result<Option<Restaurant>, LedgerError>;

    async fn fetch_restaurant_by_merchant_id(&self, merchant_id: &str) -> Result<Option<Restaurant>, LedgerError>;

    async fn fetch_active_restaurants(&self) -> Result<Vec<Restaurant>, LedgerError>;

    /// Stores the one-shot authorization-code verifier obtained from the user-code endpoint,
    /// replacing any previous one.
    async fn store_user_code_verifier(
        &self,
        restaurant_id: i64,
        verifier: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), LedgerError>;

    /// Persists a token update, guarded by a compare-and-swap on the expiry the caller last
    /// observed. Returns `false` without writing when another writer got there first.
    async fn update_tokens(
        &self,
        restaurant_id: i64,
        update: TokenUpdate,
        expected_expiry: Option<DateTime<Utc>>,
    ) -> Result<bool, LedgerError>;

    async fn set_merchant_id(&self, restaurant_id: i64, merchant_id: &str) -> Result<(), LedgerError>;
}
