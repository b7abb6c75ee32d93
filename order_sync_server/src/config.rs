use std::{env, time::Duration};

use evolution_tools::EvolutionConfig;
use ifood_tools::IfoodConfig;
use log::*;
use rog_common::{helpers::parse_boolean_flag, Secret};

const DEFAULT_ROG_HOST: &str = "127.0.0.1";
const DEFAULT_ROG_PORT: u16 = 8460;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;
const DEFAULT_WEBHOOK_QUEUE_DEPTH: usize = 64;
/// Brasília time; quiet-hour windows are wall clock in this offset unless overridden.
const DEFAULT_QUIET_HOURS_UTC_OFFSET_MINUTES: i32 = -180;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Public base URL of this deployment, used to derive the OAuth callback URI. When unset (or
    /// a localhost placeholder) the callback URI falls back to the origin of the current request.
    pub base_url: Option<String>,
    /// Secret the webhook signature middleware verifies request bodies against.
    pub webhook_hmac_secret: Secret<String>,
    /// Disable only for local development; inbound webhooks are unauthenticated otherwise.
    pub webhook_hmac_checks: bool,
    pub webhook_queue_depth: usize,
    /// Cadence of the delayed-order sweep and deferred-notification flush.
    pub sweep_interval: Duration,
    pub quiet_hours_utc_offset_minutes: i32,
    pub ifood: IfoodConfig,
    pub evolution: EvolutionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_ROG_HOST.to_string(),
            port: DEFAULT_ROG_PORT,
            database_url: String::default(),
            base_url: None,
            webhook_hmac_secret: Secret::default(),
            webhook_hmac_checks: true,
            webhook_queue_depth: DEFAULT_WEBHOOK_QUEUE_DEPTH,
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            quiet_hours_utc_offset_minutes: DEFAULT_QUIET_HOURS_UTC_OFFSET_MINUTES,
            ifood: IfoodConfig::default(),
            evolution: EvolutionConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_env_or_default() -> Self {
        let host = env::var("ROG_HOST").ok().unwrap_or_else(|| DEFAULT_ROG_HOST.into());
        let port = env::var("ROG_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!("🪛️ {s} is not a valid port for ROG_PORT. {e} Using the default, {DEFAULT_ROG_PORT}.");
                    DEFAULT_ROG_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_ROG_PORT);
        let database_url = env::var("ROG_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ ROG_DATABASE_URL is not set. Please set it to the URL for the gateway database.");
            String::default()
        });
        let base_url = env::var("ROG_BASE_URL").ok().filter(|s| !s.is_empty());
        if base_url.is_none() {
            warn!("🪛️ ROG_BASE_URL is not set. OAuth callback URIs will be derived from request origins.");
        }
        let webhook_hmac_secret = Secret::new(env::var("ROG_WEBHOOK_HMAC_SECRET").unwrap_or_else(|_| {
            warn!("🪛️ ROG_WEBHOOK_HMAC_SECRET is not set. Webhook signatures cannot be verified.");
            String::default()
        }));
        let webhook_hmac_checks = parse_boolean_flag(env::var("ROG_WEBHOOK_HMAC_CHECKS").ok(), true);
        if !webhook_hmac_checks {
            warn!("🚨️ Webhook HMAC checks are disabled. Do not run production like this.");
        }
        let webhook_queue_depth = env::var("ROG_WEBHOOK_QUEUE_DEPTH")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(DEFAULT_WEBHOOK_QUEUE_DEPTH);
        let sweep_interval = env::var("ROG_SWEEP_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS));
        let quiet_hours_utc_offset_minutes = env::var("ROG_QUIET_HOURS_UTC_OFFSET_MINUTES")
            .ok()
            .and_then(|s| s.parse::<i32>().ok())
            .unwrap_or(DEFAULT_QUIET_HOURS_UTC_OFFSET_MINUTES);
        Self {
            host,
            port,
            database_url,
            base_url,
            webhook_hmac_secret,
            webhook_hmac_checks,
            webhook_queue_depth,
            sweep_interval,
            quiet_hours_utc_offset_minutes,
            ifood: IfoodConfig::from_env_or_default(),
            evolution: EvolutionConfig::from_env_or_default(),
        }
    }
}
