use std::time::Duration;

use log::*;
use rog_common::Secret;

const DEFAULT_INSTANCE_NAME: &str = "default";
const DEFAULT_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Clone)]
pub struct EvolutionConfig {
    pub base_url: String,
    pub api_key: Secret<String>,
    pub instance_name: String,
    pub timeout: Duration,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            base_url: String::default(),
            api_key: Secret::default(),
            instance_name: DEFAULT_INSTANCE_NAME.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl EvolutionConfig {
    pub fn from_env_or_default() -> Self {
        let base_url = std::env::var("EVOLUTION_API_URL").unwrap_or_else(|_| {
            warn!("💬️ EVOLUTION_API_URL not set. WhatsApp sends will fail until it is configured.");
            String::default()
        });
        let api_key = Secret::new(std::env::var("EVOLUTION_API_KEY").unwrap_or_else(|_| {
            warn!("💬️ EVOLUTION_API_KEY not set. WhatsApp sends will fail until it is configured.");
            String::default()
        }));
        let instance_name = std::env::var("EVOLUTION_API_INSTANCE_NAME").unwrap_or_else(|_| {
            info!("EVOLUTION_API_INSTANCE_NAME not set, using {DEFAULT_INSTANCE_NAME}");
            DEFAULT_INSTANCE_NAME.to_string()
        });
        let timeout = std::env::var("EVOLUTION_API_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        Self { base_url, api_key, instance_name, timeout }
    }
}
