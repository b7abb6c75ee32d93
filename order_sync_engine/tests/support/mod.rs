// Not every integration-test binary uses every helper.
#![allow(dead_code)]

pub mod prepare_env;

use chrono::{DateTime, Utc};
use order_sync_engine::db_types::{NewOrderItem, OrderSnapshot, OrderStatusType};
use rog_common::Money;
use serde_json::json;

/// A minimal, valid order snapshot for seeding the ledger directly in tests.
pub fn snapshot(
    restaurant_id: i64,
    ifood_order_id: &str,
    status: OrderStatusType,
    total_cents: i64,
    placed_at: Option<DateTime<Utc>>,
) -> OrderSnapshot {
    OrderSnapshot {
        restaurant_id,
        ifood_order_id: ifood_order_id.to_string(),
        short_reference: None,
        display_id: None,
        status,
        sub_status: None,
        customer_name: Some("Cliente Teste".into()),
        customer_phone: None,
        customer_delivery_address: None,
        total_amount: Money::from_cents(total_cents),
        delivery_fee: Money::default(),
        discount: Money::default(),
        currency: "BRL".into(),
        notes: None,
        payment_methods: None,
        delivery_method: None,
        placed_at,
        confirmed_at: None,
        dispatched_at: None,
        delivered_at: None,
        cancelled_at: None,
        expected_delivery_at: None,
        ifood_data: json!({"id": ifood_order_id}),
        items: None,
    }
}

/// Gateway fake that records every send and succeeds.
#[derive(Clone, Default)]
pub struct RecordingGateway {
    pub sent: std::sync::Arc<std::sync::Mutex<Vec<(String, String)>>>,
}

impl RecordingGateway {
    pub fn sent_count(&self) -> usize {
        self.sent.lock().expect("gateway mutex").len()
    }
}

impl order_sync_engine::traits::MessageGateway for RecordingGateway {
    fn format_recipient(&self, raw: &str) -> String {
        raw.chars().filter(|c| c.is_ascii_digit()).collect()
    }

    async fn send_text(
        &self,
        recipient: &str,
        message: &str,
    ) -> Result<serde_json::Value, order_sync_engine::traits::GatewayError> {
        self.sent.lock().expect("gateway mutex").push((recipient.to_string(), message.to_string()));
        Ok(json!({"messageId": "wamid-test"}))
    }
}

/// Gateway fake that always fails, for exercising the failed-notification path.
#[derive(Clone, Default)]
pub struct FailingGateway;

impl order_sync_engine::traits::MessageGateway for FailingGateway {
    fn format_recipient(&self, raw: &str) -> String {
        raw.to_string()
    }

    async fn send_text(
        &self,
        _recipient: &str,
        _message: &str,
    ) -> Result<serde_json::Value, order_sync_engine::traits::GatewayError> {
        Err(order_sync_engine::traits::GatewayError::Unavailable("connection refused".into()))
    }
}

pub fn item(name: &str, quantity: i64, total_cents: i64) -> NewOrderItem {
    NewOrderItem {
        ifood_item_id: None,
        name: name.to_string(),
        description: None,
        quantity,
        unit_price: Money::from_cents(if quantity == 0 { 0 } else { total_cents / quantity }),
        total_price: Money::from_cents(total_cents),
        category: None,
        modifiers: None,
        observations: None,
        ifood_data: json!({"name": name}),
    }
}
