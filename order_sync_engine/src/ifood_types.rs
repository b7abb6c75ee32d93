//! Shapes of the marketplace's webhook and order payloads.
//!
//! The engine keeps its own copy of these types so it never depends on the HTTP client crate. The
//! payload view is deliberately all-optional: webhook bodies are partial, and the synchronizer
//! treats every absent field as `None` rather than "unchanged".
use chrono::{DateTime, Utc};
use log::warn;
use serde::Deserialize;
use serde_json::Value;

/// The webhook body: `{"event": "...", "data": {...}, "state": "..."}`. `state` is the tenant id
/// hint carried through the authorization flow, used when the merchant id cannot be matched.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEnvelope {
    pub event: String,
    pub data: Value,
    #[serde(default)]
    pub state: Option<String>,
}

impl WebhookEnvelope {
    /// Shallow structural acceptance: an event name and an object-shaped data envelope. Anything
    /// deeper (order id, field types) is checked during processing, not at ingestion.
    pub fn is_well_formed(&self) -> bool {
        !self.event.is_empty() && self.data.is_object()
    }
}

/// Shallow top-level merge of two JSON objects: every key present in `overlay` replaces the same
/// key in `base`. A freshly fetched order is merged over the webhook payload this way, so fetched
/// fields win wholesale rather than being combined key-by-key at depth.
pub fn merge_payloads(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                base_map.insert(key, value);
            }
        },
        (base_slot, overlay) if !overlay.is_null() => *base_slot = overlay,
        _ => {},
    }
}

/// Typed read-only view over a (possibly merged) order payload.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPayload {
    pub id: Option<String>,
    pub short_reference: Option<String>,
    pub display_id: Option<String>,
    pub status: Option<String>,
    pub sub_status: Option<String>,
    pub merchant: Option<MerchantRef>,
    pub customer: Option<CustomerPayload>,
    pub total: Option<TotalPayload>,
    pub delivery: Option<DeliveryPayload>,
    pub payments: Option<Value>,
    pub notes: Option<String>,
    pub created_at: Option<String>,
    pub confirmed_at: Option<String>,
    pub dispatched_at: Option<String>,
    pub delivered_at: Option<String>,
    pub cancelled_at: Option<String>,
    pub expected_delivery_at: Option<String>,
    #[serde(default)]
    pub items: Vec<ItemPayload>,
}

impl OrderPayload {
    pub fn from_value(value: &Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value.clone())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MerchantRef {
    pub id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustomerPayload {
    pub name: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TotalPayload {
    pub value: Option<f64>,
    pub discount: Option<f64>,
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryPayload {
    pub delivery_fee: Option<AmountPayload>,
    pub address: Option<AddressPayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AmountPayload {
    pub value: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressPayload {
    pub street_name: Option<String>,
    pub street_number: Option<String>,
    pub neighborhood: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
}

impl AddressPayload {
    /// Joins the non-empty address components into the single line stored on the order.
    pub fn formatted(&self) -> Option<String> {
        let parts: Vec<&str> = [
            self.street_name.as_deref(),
            self.street_number.as_deref(),
            self.neighborhood.as_deref(),
            self.city.as_deref(),
            self.state.as_deref(),
            self.postal_code.as_deref(),
        ]
        .into_iter()
        .flatten()
        .filter(|s| !s.is_empty())
        .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(", "))
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemPayload {
    pub id: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub quantity: Option<i64>,
    pub unit_price: Option<AmountPayload>,
    pub total_price: Option<AmountPayload>,
    pub category: Option<String>,
    pub modifiers: Option<Value>,
    pub observations: Option<Value>,
}

/// Parses an upstream timestamp, tolerating the few shapes the provider emits. A malformed value
/// is logged and mapped to `None`, never a processing failure.
pub fn parse_timestamp(value: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = value?;
    let parsed = DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| raw.parse::<DateTime<Utc>>());
    match parsed {
        Ok(dt) => Some(dt),
        Err(e) => {
            warn!("🔄️ Could not parse upstream timestamp {raw:?}: {e}");
            None
        },
    }
}
