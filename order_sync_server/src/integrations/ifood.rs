//! Token lifecycle management and the authenticated upstream client.
//!
//! [`TokenManager`] owns the per-tenant credential state: it drives the user-code, verifier,
//! client-credentials, authorization-code and refresh grants against the provider's authorization
//! endpoint and persists the resulting tokens. Refreshes are serialized per tenant with an
//! in-process lock, and every persist goes through a compare-and-swap on the previously observed
//! expiry, so two racing writers cannot clobber a newer token with an older one.
//!
//! [`UpstreamClient`] wraps bearer-authenticated calls to the order/merchant API, with exactly one
//! refresh-and-retry cycle on a 401.
use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use ifood_tools::{IfoodApi, IfoodApiError, IfoodConfig, Merchant, TokenGrant, TokenResponse, UserCodeResponse};
use log::*;
use order_sync_engine::{
    db_types::Restaurant,
    traits::{TenantManagement, TokenUpdate, UpstreamOrderSource},
};
use reqwest::Method;
use rog_common::Secret;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Tokens within this much of their expiry are refreshed before use.
pub const TOKEN_REFRESH_MARGIN: Duration = Duration::minutes(5);
const DEFAULT_TOKEN_TTL_SECS: i64 = 3600;
const DEFAULT_USER_CODE_TTL_SECS: i64 = 600;

#[derive(Debug, Error)]
pub enum TokenError {
    /// Credentials or prerequisites are missing on the tenant. Operator action required.
    #[error("iFood credentials are not configured: {0}")]
    Configuration(String),
    /// The authorization endpoint rejected the request. The message is relayed to the admin.
    #[error("{0}")]
    UpstreamAuth(String),
    #[error("Backend error: {0}")]
    Backend(String),
}

impl From<order_sync_engine::traits::LedgerError> for TokenError {
    fn from(e: order_sync_engine::traits::LedgerError) -> Self {
        Self::Backend(e.to_string())
    }
}

/// Outcome of a verifier exchange. `Pending` is the expected state while the restaurant owner has
/// not yet confirmed the user code in the provider's portal; it is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeOutcome {
    Connected,
    Pending,
}

/// What the admin UI shows after requesting a user code.
#[derive(Debug, Clone, Serialize)]
pub struct UserCodeGrant {
    pub user_code: String,
    pub verification_url: String,
    pub verification_url_complete: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// Seam over the provider's HTTP surface, so the grant flows can be exercised against scripted
/// endpoints in tests. [`IfoodApi`] is the production implementation.
#[allow(async_fn_in_trait)]
pub trait AuthEndpoint: Clone + Send + Sync + 'static {
    async fn request_user_code(&self, client_id: &str) -> Result<UserCodeResponse, IfoodApiError>;
    async fn request_token(&self, grant: &TokenGrant<'_>) -> Result<TokenResponse, IfoodApiError>;
    async fn request(
        &self,
        token: &str,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, IfoodApiError>;
}

impl AuthEndpoint for IfoodApi {
    async fn request_user_code(&self, client_id: &str) -> Result<UserCodeResponse, IfoodApiError> {
        IfoodApi::request_user_code(self, client_id).await
    }

    async fn request_token(&self, grant: &TokenGrant<'_>) -> Result<TokenResponse, IfoodApiError> {
        IfoodApi::request_token(self, grant).await
    }

    async fn request(
        &self,
        token: &str,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, IfoodApiError> {
        IfoodApi::request(self, token, method, path, body).await
    }
}

/// True when the stored expiry is absent or within [`TOKEN_REFRESH_MARGIN`] of `now`.
pub fn needs_refresh(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match expires_at {
        None => true,
        Some(t) => t < now + TOKEN_REFRESH_MARGIN,
    }
}

pub struct TokenManager<B, A> {
    db: B,
    endpoint: A,
    fallback_client_id: Option<String>,
    fallback_client_secret: Option<Secret<String>>,
    refresh_locks: Arc<std::sync::Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>>,
}

impl<B: Clone, A: Clone> Clone for TokenManager<B, A> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            endpoint: self.endpoint.clone(),
            fallback_client_id: self.fallback_client_id.clone(),
            fallback_client_secret: self.fallback_client_secret.clone(),
            // Shared across clones: the per-tenant serialization must hold process-wide.
            refresh_locks: Arc::clone(&self.refresh_locks),
        }
    }
}

impl<B, A> TokenManager<B, A>
where
    B: TenantManagement,
    A: AuthEndpoint,
{
    pub fn new(db: B, endpoint: A, config: &IfoodConfig) -> Self {
        Self {
            db,
            endpoint,
            fallback_client_id: config.client_id.clone(),
            fallback_client_secret: config.client_secret.clone(),
            refresh_locks: Arc::new(std::sync::Mutex::new(HashMap::new())),
        }
    }

    fn client_id_for(&self, restaurant: &Restaurant) -> Result<String, TokenError> {
        restaurant
            .ifood_client_id
            .clone()
            .filter(|s| !s.is_empty())
            .or_else(|| self.fallback_client_id.clone())
            .ok_or_else(|| {
                TokenError::Configuration(
                    "no client id is configured for this restaurant and no global fallback is set".into(),
                )
            })
    }

    fn credentials_for(&self, restaurant: &Restaurant) -> Result<(String, String), TokenError> {
        let client_id = self.client_id_for(restaurant)?;
        let client_secret = restaurant
            .ifood_client_secret
            .clone()
            .filter(|s| !s.is_empty())
            .or_else(|| self.fallback_client_secret.as_ref().map(|s| s.reveal().clone()))
            .ok_or_else(|| {
                TokenError::Configuration(
                    "no client secret is configured for this restaurant and no global fallback is set".into(),
                )
            })?;
        Ok((client_id, client_secret))
    }

    fn tenant_lock(&self, restaurant_id: i64) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = match self.refresh_locks.lock() {
            Ok(locks) => locks,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(locks.entry(restaurant_id).or_default())
    }

    /// Device-style flow, step 1: obtain a user code for the restaurant owner to confirm in the
    /// provider's portal, and persist the one-shot verifier for the later exchange.
    pub async fn request_user_code(&self, restaurant: &Restaurant) -> Result<UserCodeGrant, TokenError> {
        let client_id = self.client_id_for(restaurant)?;
        match self.endpoint.request_user_code(&client_id).await {
            Ok(response) => {
                let expires_at =
                    Utc::now() + Duration::seconds(response.expires_in.unwrap_or(DEFAULT_USER_CODE_TTL_SECS));
                self.db
                    .store_user_code_verifier(restaurant.id, &response.authorization_code_verifier, expires_at)
                    .await?;
                info!("🍔️ Obtained user code {} for restaurant {}", response.user_code, restaurant.id);
                Ok(UserCodeGrant {
                    user_code: response.user_code,
                    verification_url: response.verification_url,
                    verification_url_complete: response.verification_url_complete,
                    expires_at,
                })
            },
            Err(IfoodApiError::QueryError { status, message }) => {
                error!("🍔️ User code request for restaurant {} failed with {status}: {message}", restaurant.id);
                Err(TokenError::UpstreamAuth(rewrite_grant_error(message)))
            },
            Err(e) => {
                error!("🍔️ User code request for restaurant {} failed: {e}", restaurant.id);
                Err(TokenError::UpstreamAuth(e.to_string()))
            },
        }
    }

    /// Device-style flow, step 2: trade the stored verifier for tokens. Until the owner confirms
    /// the code upstream, the endpoint answers with an error, which is the *expected*
    /// [`ExchangeOutcome::Pending`] state, never a failure of this call.
    pub async fn exchange_verifier(&self, restaurant: &Restaurant) -> Result<ExchangeOutcome, TokenError> {
        let (client_id, client_secret) = self.credentials_for(restaurant)?;
        let verifier = restaurant.ifood_authorization_code_verifier.clone().ok_or_else(|| {
            TokenError::Configuration("no pending authorization; request a user code first".into())
        })?;
        if restaurant.ifood_user_code_expires_at.map_or(false, |t| t < Utc::now()) {
            return Err(TokenError::Configuration(
                "the pending authorization has expired; request a new user code".into(),
            ));
        }
        let grant = TokenGrant::AuthorizationCodeVerifier {
            verifier: &verifier,
            client_id: &client_id,
            client_secret: &client_secret,
        };
        match self.endpoint.request_token(&grant).await {
            Ok(tokens) => {
                self.persist_tokens(restaurant.id, tokens, true).await?;
                self.capture_merchant_id(restaurant.id).await;
                info!("🍔️ Restaurant {} connected via user-code flow", restaurant.id);
                Ok(ExchangeOutcome::Connected)
            },
            Err(e) => {
                debug!("🍔️ Verifier exchange for restaurant {} still pending: {e}", restaurant.id);
                Ok(ExchangeOutcome::Pending)
            },
        }
    }

    /// Client-credentials flow for centralized applications.
    pub async fn connect_client_credentials(&self, restaurant: &Restaurant) -> Result<(), TokenError> {
        let (client_id, client_secret) = self.credentials_for(restaurant)?;
        let grant = TokenGrant::ClientCredentials { client_id: &client_id, client_secret: &client_secret };
        match self.endpoint.request_token(&grant).await {
            Ok(tokens) => {
                self.persist_tokens(restaurant.id, tokens, false).await?;
                self.capture_merchant_id(restaurant.id).await;
                info!("🍔️ Restaurant {} connected via client credentials", restaurant.id);
                Ok(())
            },
            Err(IfoodApiError::QueryError { status, message }) => {
                error!("🍔️ Client-credentials grant for restaurant {} failed with {status}: {message}", restaurant.id);
                Err(TokenError::UpstreamAuth(rewrite_grant_error(message)))
            },
            Err(e) => Err(TokenError::UpstreamAuth(e.to_string())),
        }
    }

    /// Legacy authorization-code exchange (the redirect-based flow). Upstream rejection is
    /// reported as `false`, not an error: the admin simply retries the authorization.
    pub async fn exchange_code(
        &self,
        code: &str,
        restaurant: &Restaurant,
        redirect_uri: &str,
    ) -> Result<bool, TokenError> {
        let (client_id, client_secret) = self.credentials_for(restaurant)?;
        let grant = TokenGrant::AuthorizationCode {
            code,
            redirect_uri,
            client_id: &client_id,
            client_secret: &client_secret,
        };
        match self.endpoint.request_token(&grant).await {
            Ok(tokens) => {
                self.persist_tokens(restaurant.id, tokens, false).await?;
                info!("🍔️ Restaurant {} connected via authorization code", restaurant.id);
                Ok(true)
            },
            Err(e) => {
                error!("🍔️ Authorization-code exchange for restaurant {} failed: {e}", restaurant.id);
                Ok(false)
            },
        }
    }

    /// Refreshes the stored token. Never errors: refresh failure is routine on a request path and
    /// reports `false` instead. Serialized per tenant; a waiter that finds the token already
    /// rotated by the previous holder reports success without another upstream call.
    pub async fn refresh(&self, restaurant: &Restaurant) -> bool {
        let lock = self.tenant_lock(restaurant.id);
        let _guard = lock.lock().await;
        let fresh = match self.db.fetch_restaurant(restaurant.id).await {
            Ok(Some(r)) => r,
            _ => return false,
        };
        if fresh.ifood_token_expires_at != restaurant.ifood_token_expires_at
            && !needs_refresh(fresh.ifood_token_expires_at, Utc::now())
        {
            trace!("🍔️ Token for restaurant {} was already refreshed by another task", restaurant.id);
            return true;
        }
        let Some(refresh_token) = fresh.ifood_refresh_token.clone() else {
            return false;
        };
        let (client_id, client_secret) = match self.credentials_for(&fresh) {
            Ok(credentials) => credentials,
            Err(e) => {
                error!("🍔️ Cannot refresh token for restaurant {}: {e}", fresh.id);
                return false;
            },
        };
        let grant = TokenGrant::RefreshToken {
            refresh_token: &refresh_token,
            client_id: &client_id,
            client_secret: &client_secret,
        };
        match self.endpoint.request_token(&grant).await {
            Ok(tokens) => {
                let update = TokenUpdate {
                    access_token: tokens.access_token,
                    refresh_token: tokens.refresh_token,
                    expires_at: Utc::now() + Duration::seconds(tokens.expires_in.unwrap_or(DEFAULT_TOKEN_TTL_SECS)),
                    clear_verifier: false,
                };
                match self.db.update_tokens(fresh.id, update, fresh.ifood_token_expires_at).await {
                    Ok(_) => true,
                    Err(e) => {
                        error!("🍔️ Could not persist refreshed token for restaurant {}: {e}", fresh.id);
                        false
                    },
                }
            },
            Err(e) => {
                error!("🍔️ Failed to refresh token for restaurant {}: {e}", fresh.id);
                false
            },
        }
    }

    /// The stored access token, refreshed first when absent-expiry or inside the safety margin.
    /// `None` means the restaurant needs to re-authorize.
    pub async fn get_valid_token(&self, restaurant: &Restaurant) -> Option<String> {
        restaurant.ifood_access_token.as_ref()?;
        if needs_refresh(restaurant.ifood_token_expires_at, Utc::now()) && !self.refresh(restaurant).await {
            return None;
        }
        self.stored_token(restaurant.id).await
    }

    pub async fn stored_token(&self, restaurant_id: i64) -> Option<String> {
        match self.db.fetch_restaurant(restaurant_id).await {
            Ok(Some(fresh)) => fresh.ifood_access_token,
            _ => None,
        }
    }

    async fn persist_tokens(
        &self,
        restaurant_id: i64,
        tokens: TokenResponse,
        clear_verifier: bool,
    ) -> Result<(), TokenError> {
        let current = self
            .db
            .fetch_restaurant(restaurant_id)
            .await?
            .ok_or_else(|| TokenError::Backend(format!("restaurant {restaurant_id} disappeared")))?;
        let update = TokenUpdate {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            expires_at: Utc::now() + Duration::seconds(tokens.expires_in.unwrap_or(DEFAULT_TOKEN_TTL_SECS)),
            clear_verifier,
        };
        let written = self.db.update_tokens(restaurant_id, update, current.ifood_token_expires_at).await?;
        if !written {
            warn!("🍔️ Token grant for restaurant {restaurant_id} lost a write race; keeping the newer token");
        }
        Ok(())
    }

    /// Best effort: fetch the merchant behind the new token and remember its id for webhook tenant
    /// resolution. Failures are logged, never surfaced.
    async fn capture_merchant_id(&self, restaurant_id: i64) {
        let Some(token) = self.stored_token(restaurant_id).await else {
            return;
        };
        match self.endpoint.request(&token, Method::GET, "/merchant/v1.0/merchants/me", None).await {
            Ok(value) => match serde_json::from_value::<Merchant>(value) {
                Ok(merchant) => {
                    if let Err(e) = self.db.set_merchant_id(restaurant_id, &merchant.id).await {
                        error!("🍔️ Could not store merchant id for restaurant {restaurant_id}: {e}");
                    } else {
                        info!("🍔️ Restaurant {restaurant_id} mapped to merchant {}", merchant.id);
                    }
                },
                Err(e) => warn!("🍔️ Unusable merchant payload for restaurant {restaurant_id}: {e}"),
            },
            Err(e) => warn!("🍔️ Could not fetch merchant for restaurant {restaurant_id}: {e}"),
        }
    }
}

/// The provider's "grant type not authorized" message is opaque to restaurant admins; reword it
/// into the action they actually need to take.
fn rewrite_grant_error(message: String) -> String {
    if message.to_lowercase().contains("grant type not authorized") {
        "The user-code authorization flow is not enabled for this client id. Enable the authorization-code grant for \
         this application in the provider's developer portal."
            .to_string()
    } else {
        message
    }
}

//-------------------------------------- UpstreamClient ---------------------------------------------------------------

/// Authenticated façade over the order/merchant API. Callers treat `None` as "could not fetch":
/// enrichment degrades gracefully and nothing on a webhook path fails because the provider is
/// down.
pub struct UpstreamClient<B, A> {
    tokens: TokenManager<B, A>,
    endpoint: A,
}

impl<B: Clone, A: Clone> Clone for UpstreamClient<B, A> {
    fn clone(&self) -> Self {
        Self { tokens: self.tokens.clone(), endpoint: self.endpoint.clone() }
    }
}

impl<B, A> UpstreamClient<B, A>
where
    B: TenantManagement,
    A: AuthEndpoint,
{
    pub fn new(tokens: TokenManager<B, A>, endpoint: A) -> Self {
        Self { tokens, endpoint }
    }

    pub async fn request(
        &self,
        restaurant: &Restaurant,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Option<Value> {
        let Some(token) = self.tokens.get_valid_token(restaurant).await else {
            error!("🍔️ No valid access token for restaurant {}", restaurant.id);
            return None;
        };
        match self.endpoint.request(&token, method.clone(), path, body.clone()).await {
            Ok(value) => Some(value),
            Err(IfoodApiError::QueryError { status: 401, .. }) => {
                debug!("🍔️ 401 from upstream for restaurant {}; refreshing once", restaurant.id);
                if !self.tokens.refresh(restaurant).await {
                    return None;
                }
                let token = self.tokens.stored_token(restaurant.id).await?;
                match self.endpoint.request(&token, method, path, body).await {
                    Ok(value) => Some(value),
                    Err(e) => {
                        error!("🍔️ Upstream request {path} failed after token refresh: {e}");
                        None
                    },
                }
            },
            Err(e) => {
                error!("🍔️ Upstream request {path} failed for restaurant {}: {e}", restaurant.id);
                None
            },
        }
    }

    pub async fn get_order(&self, restaurant: &Restaurant, order_id: &str) -> Option<Value> {
        self.request(restaurant, Method::GET, &format!("/order/v1.0/orders/{order_id}"), None).await
    }

    pub async fn get_merchant(&self, restaurant: &Restaurant) -> Option<Value> {
        self.request(restaurant, Method::GET, "/merchant/v1.0/merchants/me", None).await
    }
}

impl<B, A> UpstreamOrderSource for UpstreamClient<B, A>
where
    B: TenantManagement,
    A: AuthEndpoint,
{
    async fn fetch_order(&self, restaurant: &Restaurant, order_id: &str) -> Option<Value> {
        self.get_order(restaurant, order_id).await
    }
}

#[cfg(test)]
mod test {
    use std::{
        collections::{HashMap, VecDeque},
        sync::{Arc, Mutex},
    };

    use chrono::TimeZone;
    use order_sync_engine::{db_types::NewRestaurant, traits::LedgerError};
    use serde_json::json;

    use super::*;

    #[test]
    fn refresh_margin_is_five_minutes() {
        let now = Utc.with_ymd_and_hms(2025, 12, 16, 12, 0, 0).unwrap();
        assert!(needs_refresh(None, now));
        assert!(needs_refresh(Some(now + Duration::minutes(4)), now));
        assert!(needs_refresh(Some(now + Duration::minutes(5) - Duration::seconds(1)), now));
        assert!(!needs_refresh(Some(now + Duration::minutes(5) + Duration::seconds(1)), now));
        assert!(!needs_refresh(Some(now + Duration::hours(2)), now));
    }

    #[test]
    fn grant_error_rewording() {
        let reworded = rewrite_grant_error("Grant Type Not Authorized for client".into());
        assert!(reworded.contains("developer portal"));
        assert_eq!(rewrite_grant_error("invalid client".into()), "invalid client");
    }

    //---------------------------------- in-memory fakes --------------------------------------

    /// Tenant store backed by a HashMap; just enough of `TenantManagement` for the flows.
    #[derive(Clone, Default)]
    struct FakeDb {
        rows: Arc<Mutex<HashMap<i64, Restaurant>>>,
        next_id: Arc<Mutex<i64>>,
    }

    impl FakeDb {
        fn get(&self, id: i64) -> Restaurant {
            self.rows.lock().unwrap().get(&id).cloned().expect("restaurant exists")
        }
    }

    impl TenantManagement for FakeDb {
        async fn insert_restaurant(&self, restaurant: NewRestaurant) -> Result<Restaurant, LedgerError> {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            let row = Restaurant {
                id: *next,
                name: restaurant.name,
                whatsapp_number: restaurant.whatsapp_number,
                ifood_client_id: restaurant.ifood_client_id,
                ifood_client_secret: restaurant.ifood_client_secret,
                ifood_access_token: None,
                ifood_refresh_token: None,
                ifood_token_expires_at: None,
                ifood_merchant_id: restaurant.ifood_merchant_id,
                ifood_authorization_code_verifier: None,
                ifood_user_code_expires_at: None,
                // The token flows never look at notification policy.
                notification_settings: None,
                is_active: restaurant.is_active,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            };
            self.rows.lock().unwrap().insert(row.id, row.clone());
            Ok(row)
        }

        async fn fetch_restaurant(&self, id: i64) -> Result<Option<Restaurant>, LedgerError> {
            Ok(self.rows.lock().unwrap().get(&id).cloned())
        }

        async fn fetch_restaurant_by_merchant_id(&self, merchant_id: &str) -> Result<Option<Restaurant>, LedgerError> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .values()
                .find(|r| r.ifood_merchant_id.as_deref() == Some(merchant_id))
                .cloned())
        }

        async fn fetch_active_restaurants(&self) -> Result<Vec<Restaurant>, LedgerError> {
            Ok(self.rows.lock().unwrap().values().filter(|r| r.is_active).cloned().collect())
        }

        async fn store_user_code_verifier(
            &self,
            restaurant_id: i64,
            verifier: &str,
            expires_at: DateTime<Utc>,
        ) -> Result<(), LedgerError> {
            let mut rows = self.rows.lock().unwrap();
            let row = rows.get_mut(&restaurant_id).ok_or(LedgerError::RestaurantNotFound(restaurant_id))?;
            row.ifood_authorization_code_verifier = Some(verifier.to_string());
            row.ifood_user_code_expires_at = Some(expires_at);
            Ok(())
        }

        async fn update_tokens(
            &self,
            restaurant_id: i64,
            update: TokenUpdate,
            expected_expiry: Option<DateTime<Utc>>,
        ) -> Result<bool, LedgerError> {
            let mut rows = self.rows.lock().unwrap();
            let row = rows.get_mut(&restaurant_id).ok_or(LedgerError::RestaurantNotFound(restaurant_id))?;
            if row.ifood_token_expires_at != expected_expiry {
                return Ok(false);
            }
            row.ifood_access_token = Some(update.access_token);
            if let Some(refresh) = update.refresh_token {
                row.ifood_refresh_token = Some(refresh);
            }
            row.ifood_token_expires_at = Some(update.expires_at);
            if update.clear_verifier {
                row.ifood_authorization_code_verifier = None;
            }
            Ok(true)
        }

        async fn set_merchant_id(&self, restaurant_id: i64, merchant_id: &str) -> Result<(), LedgerError> {
            let mut rows = self.rows.lock().unwrap();
            let row = rows.get_mut(&restaurant_id).ok_or(LedgerError::RestaurantNotFound(restaurant_id))?;
            row.ifood_merchant_id = Some(merchant_id.to_string());
            Ok(())
        }
    }

    type TokenScript = VecDeque<Result<TokenResponse, (u16, String)>>;

    /// Scripted authorization endpoint: pops token responses in order and records every call.
    #[derive(Clone, Default)]
    struct FakeEndpoint {
        user_code: Arc<Mutex<Option<Result<UserCodeResponse, (u16, String)>>>>,
        token_script: Arc<Mutex<TokenScript>>,
        api_script: Arc<Mutex<VecDeque<Result<Value, (u16, String)>>>>,
        grants_seen: Arc<Mutex<Vec<String>>>,
        api_calls: Arc<Mutex<Vec<String>>>,
    }

    impl FakeEndpoint {
        fn push_token(&self, result: Result<TokenResponse, (u16, String)>) {
            self.token_script.lock().unwrap().push_back(result);
        }

        fn push_api(&self, result: Result<Value, (u16, String)>) {
            self.api_script.lock().unwrap().push_back(result);
        }

        fn grants(&self) -> Vec<String> {
            self.grants_seen.lock().unwrap().clone()
        }
    }

    impl AuthEndpoint for FakeEndpoint {
        async fn request_user_code(&self, _client_id: &str) -> Result<UserCodeResponse, IfoodApiError> {
            match self.user_code.lock().unwrap().clone() {
                Some(Ok(response)) => Ok(response),
                Some(Err((status, message))) => Err(IfoodApiError::QueryError { status, message }),
                None => Err(IfoodApiError::Transport("no script".into())),
            }
        }

        async fn request_token(&self, grant: &TokenGrant<'_>) -> Result<TokenResponse, IfoodApiError> {
            self.grants_seen.lock().unwrap().push(grant.name().to_string());
            match self.token_script.lock().unwrap().pop_front() {
                Some(Ok(tokens)) => Ok(tokens),
                Some(Err((status, message))) => Err(IfoodApiError::QueryError { status, message }),
                None => Err(IfoodApiError::Transport("token script exhausted".into())),
            }
        }

        async fn request(
            &self,
            _token: &str,
            _method: Method,
            path: &str,
            _body: Option<Value>,
        ) -> Result<Value, IfoodApiError> {
            self.api_calls.lock().unwrap().push(path.to_string());
            match self.api_script.lock().unwrap().pop_front() {
                Some(Ok(value)) => Ok(value),
                Some(Err((status, message))) => Err(IfoodApiError::QueryError { status, message }),
                None => Err(IfoodApiError::Transport("api script exhausted".into())),
            }
        }
    }

    fn tokens_ok(ttl: Option<i64>) -> TokenResponse {
        TokenResponse { access_token: "tok-new".into(), refresh_token: Some("refresh-new".into()), expires_in: ttl }
    }

    async fn seeded(db: &FakeDb, with_credentials: bool) -> Restaurant {
        let mut restaurant = NewRestaurant::new("Test Kitchen");
        if with_credentials {
            restaurant.ifood_client_id = Some("client-1".into());
            restaurant.ifood_client_secret = Some("secret-1".into());
        }
        db.insert_restaurant(restaurant).await.unwrap()
    }

    fn manager(db: &FakeDb, endpoint: &FakeEndpoint) -> TokenManager<FakeDb, FakeEndpoint> {
        TokenManager::new(db.clone(), endpoint.clone(), &IfoodConfig::default())
    }

    #[tokio::test]
    async fn user_code_flow_persists_the_verifier() {
        let db = FakeDb::default();
        let endpoint = FakeEndpoint::default();
        *endpoint.user_code.lock().unwrap() = Some(Ok(UserCodeResponse {
            user_code: "ABCD-EFGH".into(),
            authorization_code_verifier: "verifier-1".into(),
            verification_url: "https://portal.example/code".into(),
            verification_url_complete: None,
            expires_in: None,
        }));
        let restaurant = seeded(&db, true).await;
        let grant = manager(&db, &endpoint).request_user_code(&restaurant).await.expect("user code");
        assert_eq!(grant.user_code, "ABCD-EFGH");
        let stored = db.get(restaurant.id);
        assert_eq!(stored.ifood_authorization_code_verifier.as_deref(), Some("verifier-1"));
        // Default TTL of 600 s applies when the endpoint omits expiresIn.
        let ttl = stored.ifood_user_code_expires_at.unwrap() - Utc::now();
        assert!(ttl > Duration::seconds(590) && ttl <= Duration::seconds(600));
    }

    #[tokio::test]
    async fn user_code_without_any_client_id_is_a_configuration_error() {
        let db = FakeDb::default();
        let endpoint = FakeEndpoint::default();
        let restaurant = seeded(&db, false).await;
        let err = manager(&db, &endpoint).request_user_code(&restaurant).await.expect_err("no client id");
        assert!(matches!(err, TokenError::Configuration(_)));
        assert!(endpoint.grants().is_empty(), "no upstream call without credentials");
    }

    #[tokio::test]
    async fn verifier_exchange_reports_pending_until_authorized() {
        let db = FakeDb::default();
        let endpoint = FakeEndpoint::default();
        let restaurant = seeded(&db, true).await;
        db.store_user_code_verifier(restaurant.id, "verifier-1", Utc::now() + Duration::minutes(10)).await.unwrap();
        endpoint.push_token(Err((401, "user has not authorized yet".into())));
        let restaurant = db.get(restaurant.id);
        let outcome = manager(&db, &endpoint).exchange_verifier(&restaurant).await.expect("exchange");
        assert_eq!(outcome, ExchangeOutcome::Pending);
        // The verifier survives a pending exchange so the admin can retry.
        assert!(db.get(restaurant.id).ifood_authorization_code_verifier.is_some());
    }

    #[tokio::test]
    async fn verifier_exchange_persists_tokens_and_merchant_id() {
        let db = FakeDb::default();
        let endpoint = FakeEndpoint::default();
        let restaurant = seeded(&db, true).await;
        db.store_user_code_verifier(restaurant.id, "verifier-1", Utc::now() + Duration::minutes(10)).await.unwrap();
        endpoint.push_token(Ok(tokens_ok(Some(7200))));
        endpoint.push_api(Ok(json!({"id": "merchant-42", "name": "Test Kitchen"})));
        let restaurant = db.get(restaurant.id);
        let outcome = manager(&db, &endpoint).exchange_verifier(&restaurant).await.expect("exchange");
        assert_eq!(outcome, ExchangeOutcome::Connected);
        let stored = db.get(restaurant.id);
        assert_eq!(stored.ifood_access_token.as_deref(), Some("tok-new"));
        assert_eq!(stored.ifood_refresh_token.as_deref(), Some("refresh-new"));
        assert!(stored.ifood_authorization_code_verifier.is_none(), "one-shot verifier is cleared");
        assert_eq!(stored.ifood_merchant_id.as_deref(), Some("merchant-42"));
        let ttl = stored.ifood_token_expires_at.unwrap() - Utc::now();
        assert!(ttl > Duration::seconds(7100));
    }

    #[tokio::test]
    async fn verifier_exchange_without_a_verifier_is_a_configuration_error() {
        let db = FakeDb::default();
        let endpoint = FakeEndpoint::default();
        let restaurant = seeded(&db, true).await;
        let err = manager(&db, &endpoint).exchange_verifier(&restaurant).await.expect_err("no verifier");
        assert!(matches!(err, TokenError::Configuration(_)));
    }

    #[tokio::test]
    async fn an_expired_verifier_requires_a_new_user_code() {
        let db = FakeDb::default();
        let endpoint = FakeEndpoint::default();
        let restaurant = seeded(&db, true).await;
        db.store_user_code_verifier(restaurant.id, "verifier-1", Utc::now() - Duration::minutes(1)).await.unwrap();
        let restaurant = db.get(restaurant.id);
        let err = manager(&db, &endpoint).exchange_verifier(&restaurant).await.expect_err("expired");
        assert!(matches!(err, TokenError::Configuration(_)));
        assert!(endpoint.grants().is_empty());
    }

    #[tokio::test]
    async fn client_credentials_connects_and_applies_the_default_ttl() {
        let db = FakeDb::default();
        let endpoint = FakeEndpoint::default();
        let restaurant = seeded(&db, true).await;
        endpoint.push_token(Ok(TokenResponse {
            access_token: "tok-cc".into(),
            refresh_token: None,
            expires_in: None,
        }));
        endpoint.push_api(Ok(json!({"id": "merchant-7"})));
        manager(&db, &endpoint).connect_client_credentials(&restaurant).await.expect("connect");
        let stored = db.get(restaurant.id);
        assert_eq!(stored.ifood_access_token.as_deref(), Some("tok-cc"));
        let ttl = stored.ifood_token_expires_at.unwrap() - Utc::now();
        assert!(ttl > Duration::seconds(3590) && ttl <= Duration::seconds(3600));
        assert_eq!(endpoint.grants(), vec!["client_credentials".to_string()]);
    }

    #[tokio::test]
    async fn refresh_without_a_refresh_token_reports_false() {
        let db = FakeDb::default();
        let endpoint = FakeEndpoint::default();
        let restaurant = seeded(&db, true).await;
        assert!(!manager(&db, &endpoint).refresh(&restaurant).await);
        assert!(endpoint.grants().is_empty());
    }

    #[tokio::test]
    async fn get_valid_token_refreshes_only_inside_the_margin() {
        let db = FakeDb::default();
        let endpoint = FakeEndpoint::default();
        let restaurant = seeded(&db, true).await;
        // Far-future expiry: no refresh traffic at all.
        db.update_tokens(
            restaurant.id,
            TokenUpdate {
                access_token: "tok-old".into(),
                refresh_token: Some("refresh-old".into()),
                expires_at: Utc::now() + Duration::hours(2),
                clear_verifier: false,
            },
            None,
        )
        .await
        .unwrap();
        let tm = manager(&db, &endpoint);
        let token = tm.get_valid_token(&db.get(restaurant.id)).await;
        assert_eq!(token.as_deref(), Some("tok-old"));
        assert!(endpoint.grants().is_empty(), "a token with >5 minutes left must not refresh");

        // Pull the expiry inside the margin: exactly one refresh grant.
        let current = db.get(restaurant.id);
        db.update_tokens(
            restaurant.id,
            TokenUpdate {
                access_token: "tok-old".into(),
                refresh_token: None,
                expires_at: Utc::now() + Duration::minutes(2),
                clear_verifier: false,
            },
            current.ifood_token_expires_at,
        )
        .await
        .unwrap();
        endpoint.push_token(Ok(tokens_ok(Some(3600))));
        let token = tm.get_valid_token(&db.get(restaurant.id)).await;
        assert_eq!(token.as_deref(), Some("tok-new"));
        assert_eq!(endpoint.grants(), vec!["refresh_token".to_string()]);
    }

    #[tokio::test]
    async fn upstream_client_retries_exactly_once_on_401() {
        let db = FakeDb::default();
        let endpoint = FakeEndpoint::default();
        let restaurant = seeded(&db, true).await;
        db.update_tokens(
            restaurant.id,
            TokenUpdate {
                access_token: "tok-stale".into(),
                refresh_token: Some("refresh-old".into()),
                expires_at: Utc::now() + Duration::hours(2),
                clear_verifier: false,
            },
            None,
        )
        .await
        .unwrap();
        // First API call is rejected despite the unexpired token; the refresh succeeds and the
        // retry goes through.
        endpoint.push_api(Err((401, "token revoked".into())));
        endpoint.push_token(Ok(tokens_ok(Some(3600))));
        endpoint.push_api(Ok(json!({"id": "order-1", "status": "PLACED"})));

        let tm = manager(&db, &endpoint);
        let client = UpstreamClient::new(tm, endpoint.clone());
        let order = client.get_order(&db.get(restaurant.id), "order-1").await.expect("order fetched on retry");
        assert_eq!(order["id"], "order-1");
        assert_eq!(endpoint.api_calls.lock().unwrap().len(), 2, "one retry, no more");
        assert_eq!(endpoint.grants(), vec!["refresh_token".to_string()]);
    }

    #[tokio::test]
    async fn upstream_client_gives_up_after_a_failed_retry() {
        let db = FakeDb::default();
        let endpoint = FakeEndpoint::default();
        let restaurant = seeded(&db, true).await;
        db.update_tokens(
            restaurant.id,
            TokenUpdate {
                access_token: "tok-stale".into(),
                refresh_token: Some("refresh-old".into()),
                expires_at: Utc::now() + Duration::hours(2),
                clear_verifier: false,
            },
            None,
        )
        .await
        .unwrap();
        endpoint.push_api(Err((401, "token revoked".into())));
        endpoint.push_token(Ok(tokens_ok(Some(3600))));
        endpoint.push_api(Err((401, "still revoked".into())));

        let tm = manager(&db, &endpoint);
        let client = UpstreamClient::new(tm, endpoint.clone());
        assert!(client.get_order(&db.get(restaurant.id), "order-1").await.is_none());
        assert_eq!(endpoint.api_calls.lock().unwrap().len(), 2);
    }
}
