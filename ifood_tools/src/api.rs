use std::sync::Arc;

use log::*;
use reqwest::{header::{HeaderMap, HeaderValue}, Client, Method};
use serde_json::Value;

use crate::{
    config::IfoodConfig,
    data_objects::{Merchant, TokenGrant, TokenResponse, UserCodeResponse},
    helpers::extract_error_message,
    IfoodApiError,
};

#[derive(Clone)]
pub struct IfoodApi {
    config: IfoodConfig,
    client: Arc<Client>,
}

impl IfoodApi {
    pub fn new(config: IfoodConfig) -> Result<Self, IfoodApiError> {
        let mut headers = HeaderMap::with_capacity(1);
        headers.insert("Accept", HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| IfoodApiError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    pub fn config(&self) -> &IfoodConfig {
        &self.config
    }

    /// Requests a user code for the device-style authorization flow.
    pub async fn request_user_code(&self, client_id: &str) -> Result<UserCodeResponse, IfoodApiError> {
        let url = self.config.auth_url("userCode");
        debug!("🍔️ Requesting user code from {url}");
        let response = self
            .client
            .post(url)
            .form(&[("clientId", client_id)])
            .send()
            .await
            .map_err(|e| IfoodApiError::Transport(e.to_string()))?;
        if response.status().is_success() {
            let code = response.json::<UserCodeResponse>().await.map_err(|e| IfoodApiError::JsonError(e.to_string()))?;
            info!("🍔️ Obtained user code {}", code.user_code);
            Ok(code)
        } else {
            let status = response.status().as_u16();
            let body = response.text().await.map_err(|e| IfoodApiError::Transport(e.to_string()))?;
            Err(IfoodApiError::QueryError { status, message: extract_error_message(&body) })
        }
    }

    /// Requests an access token with any of the supported grant types.
    pub async fn request_token(&self, grant: &TokenGrant<'_>) -> Result<TokenResponse, IfoodApiError> {
        let url = self.config.auth_url("token");
        debug!("🍔️ Requesting token via {} grant", grant.name());
        let response = self
            .client
            .post(url)
            .form(&grant.form_fields())
            .send()
            .await
            .map_err(|e| IfoodApiError::Transport(e.to_string()))?;
        if response.status().is_success() {
            response.json::<TokenResponse>().await.map_err(|e| IfoodApiError::JsonError(e.to_string()))
        } else {
            let status = response.status().as_u16();
            let body = response.text().await.map_err(|e| IfoodApiError::Transport(e.to_string()))?;
            Err(IfoodApiError::QueryError { status, message: extract_error_message(&body) })
        }
    }

    /// Sends one bearer-authenticated request against the merchant API and returns the JSON body.
    pub async fn request(
        &self,
        token: &str,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, IfoodApiError> {
        let url = self.config.api_url(path);
        trace!("🍔️ {method} {url}");
        let mut req = self.client.request(method, url).bearer_auth(token);
        if let Some(body) = body {
            req = req.json(&body);
        }
        let response = req.send().await.map_err(|e| IfoodApiError::Transport(e.to_string()))?;
        if response.status().is_success() {
            response.json::<Value>().await.map_err(|e| IfoodApiError::JsonError(e.to_string()))
        } else {
            let status = response.status().as_u16();
            let body = response.text().await.map_err(|e| IfoodApiError::Transport(e.to_string()))?;
            Err(IfoodApiError::QueryError { status, message: extract_error_message(&body) })
        }
    }

    pub async fn get_order(&self, token: &str, order_id: &str) -> Result<Value, IfoodApiError> {
        let path = format!("/order/v1.0/orders/{order_id}");
        debug!("🍔️ Fetching order {order_id}");
        self.request(token, Method::GET, &path, None).await
    }

    pub async fn get_merchant(&self, token: &str) -> Result<Merchant, IfoodApiError> {
        let value = self.request(token, Method::GET, "/merchant/v1.0/merchants/me", None).await?;
        serde_json::from_value(value).map_err(|e| IfoodApiError::JsonError(e.to_string()))
    }
}
