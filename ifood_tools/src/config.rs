use std::time::Duration;

use log::*;
use rog_common::Secret;

const DEFAULT_BASE_URL: &str = "https://merchant-api.ifood.com.br";
const DEFAULT_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Clone)]
pub struct IfoodConfig {
    /// Base URL for both the authentication and merchant API surfaces.
    pub base_url: String,
    /// Global fallback client id, used when a restaurant has no credentials of its own.
    pub client_id: Option<String>,
    /// Global fallback client secret.
    pub client_secret: Option<Secret<String>>,
    /// Upper bound on any single HTTP exchange with the provider.
    pub timeout: Duration,
}

impl Default for IfoodConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            client_id: None,
            client_secret: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl IfoodConfig {
    pub fn from_env_or_default() -> Self {
        let base_url = std::env::var("IFOOD_BASE_URL").unwrap_or_else(|_| {
            info!("IFOOD_BASE_URL not set, using {DEFAULT_BASE_URL}");
            DEFAULT_BASE_URL.to_string()
        });
        let client_id = std::env::var("IFOOD_CLIENT_ID").ok().filter(|s| !s.is_empty());
        if client_id.is_none() {
            warn!("🍔️ IFOOD_CLIENT_ID not set. Only restaurants with their own credentials will be able to connect.");
        }
        let client_secret =
            std::env::var("IFOOD_CLIENT_SECRET").ok().filter(|s| !s.is_empty()).map(Secret::new);
        let timeout = std::env::var("IFOOD_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        Self { base_url, client_id, client_secret, timeout }
    }

    pub fn auth_url(&self, endpoint: &str) -> String {
        format!("{}/authentication/v1.0/oauth/{endpoint}", self.base_url.trim_end_matches('/'))
    }

    pub fn api_url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.trim_end_matches('/'))
    }
}
