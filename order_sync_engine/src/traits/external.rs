use serde_json::Value;
use thiserror::Error;

use crate::db_types::Restaurant;

/// Source of full order documents, used to enrich partial webhook payloads. Implemented by the
/// server's authenticated upstream client. `None` means "could not fetch" — a timeout, a missing
/// token or an upstream error are all treated the same way and the synchronizer proceeds with the
/// webhook data alone.
#[allow(async_fn_in_trait)]
pub trait UpstreamOrderSource: Clone + Send + Sync + 'static {
    async fn fetch_order(&self, restaurant: &Restaurant, order_id: &str) -> Option<Value>;
}

/// Enricher that never fetches anything. Used in tests and when processing must not touch the
/// upstream API.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEnrichment;

impl UpstreamOrderSource for NoEnrichment {
    async fn fetch_order(&self, _restaurant: &Restaurant, _order_id: &str) -> Option<Value> {
        None
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("The channel gateway rejected the message: {0}")]
    Rejected(String),
    #[error("Could not reach the channel gateway: {0}")]
    Unavailable(String),
}

/// Outbound message channel. Implemented by the server over the WhatsApp gateway client; tests use
/// in-memory fakes.
#[allow(async_fn_in_trait)]
pub trait MessageGateway: Clone + Send + Sync + 'static {
    /// Normalizes a stored recipient address into what the channel expects.
    fn format_recipient(&self, raw: &str) -> String;

    /// Performs one send attempt and returns the provider's response metadata.
    async fn send_text(&self, recipient: &str, message: &str) -> Result<Value, GatewayError>;
}
