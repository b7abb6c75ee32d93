use std::sync::Arc;

use log::*;
use reqwest::{header::{HeaderMap, HeaderValue}, Client};
use serde::Serialize;
use serde_json::Value;

use crate::{config::EvolutionConfig, EvolutionApiError};

const DEFAULT_COUNTRY_CODE: &str = "55";

#[derive(Clone)]
pub struct EvolutionApi {
    config: EvolutionConfig,
    client: Arc<Client>,
}

#[derive(Serialize)]
struct SendTextBody<'a> {
    number: &'a str,
    text: &'a str,
}

impl EvolutionApi {
    pub fn new(config: EvolutionConfig) -> Result<Self, EvolutionApiError> {
        let mut headers = HeaderMap::with_capacity(1);
        let key = HeaderValue::from_str(config.api_key.reveal().as_str())
            .map_err(|e| EvolutionApiError::Initialization(e.to_string()))?;
        headers.insert("apikey", key);
        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| EvolutionApiError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    /// Sends a text message to an already-normalized phone number and returns the provider's
    /// response payload (stored as notification metadata by callers).
    pub async fn send_text(&self, number: &str, text: &str) -> Result<Value, EvolutionApiError> {
        let url = format!(
            "{}/message/sendText/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.instance_name
        );
        debug!("💬️ Sending WhatsApp message to {number}");
        let body = SendTextBody { number, text };
        let response =
            self.client.post(url).json(&body).send().await.map_err(|e| EvolutionApiError::Transport(e.to_string()))?;
        if response.status().is_success() {
            let value = response.json::<Value>().await.map_err(|e| EvolutionApiError::JsonError(e.to_string()))?;
            info!("💬️ WhatsApp message sent to {number}");
            Ok(value)
        } else {
            let status = response.status().as_u16();
            let message = response.text().await.map_err(|e| EvolutionApiError::Transport(e.to_string()))?;
            error!("💬️ Failed to send WhatsApp message to {number}. Status {status}");
            Err(EvolutionApiError::SendError { status, message })
        }
    }
}

/// Normalizes a phone number to the gateway's expected shape: digits only, with the Brazilian
/// country code prefixed when the number does not already carry one.
pub fn format_phone_number(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if !digits.starts_with(DEFAULT_COUNTRY_CODE) && digits.len() <= 11 {
        format!("{DEFAULT_COUNTRY_CODE}{digits}")
    } else {
        digits
    }
}

#[cfg(test)]
mod test {
    use super::format_phone_number;

    #[test]
    fn strips_formatting_characters() {
        assert_eq!(format_phone_number("+55 (11) 99999-9999"), "5511999999999");
    }

    #[test]
    fn prefixes_country_code_when_absent() {
        assert_eq!(format_phone_number("(11) 98888-7777"), "5511988887777");
    }

    #[test]
    fn keeps_existing_country_code() {
        assert_eq!(format_phone_number("5511999999999"), "5511999999999");
    }

    #[test]
    fn long_foreign_numbers_are_left_alone() {
        assert_eq!(format_phone_number("4915123456789"), "4915123456789");
    }
}
