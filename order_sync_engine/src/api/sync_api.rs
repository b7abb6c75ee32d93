use log::*;
use rog_common::Money;
use serde_json::Value;

use crate::{
    api::OrderSyncError,
    db_types::{NewOrderItem, Order, OrderSnapshot, OrderStatusType, Restaurant},
    events::{EventProducers, OrderCancelledEvent, OrderDeliveredEvent, OrderPlacedEvent},
    ifood_types::{merge_payloads, parse_timestamp, ItemPayload, OrderPayload, WebhookEnvelope},
    traits::{OrderManagement, TenantManagement, UpstreamOrderSource},
};

/// Reconciles one webhook event into the order ledger.
///
/// The write path is a full overwrite of the order keyed by (restaurant, upstream order id), with
/// wholesale item replacement, all in one transaction. Replaying an event therefore converges on
/// the same row; out-of-order delivery converges on the last-written payload, which is the
/// documented best effort without upstream sequence numbers.
#[derive(Clone)]
pub struct OrderSyncApi<B, S> {
    db: B,
    enricher: S,
    producers: EventProducers,
}

impl<B, S> OrderSyncApi<B, S>
where
    B: OrderManagement + TenantManagement,
    S: UpstreamOrderSource,
{
    pub fn new(db: B, enricher: S, producers: EventProducers) -> Self {
        Self { db, enricher, producers }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    /// Processes one webhook event end to end: resolve the tenant, enrich the payload, overwrite
    /// the ledger entry, and publish the lifecycle event matching the *event type* (not the
    /// resulting stored status). Event publication happens after the write has committed, so a
    /// failing notification path can never roll back the ledger.
    pub async fn process_event(&self, envelope: WebhookEnvelope) -> Result<Order, OrderSyncError> {
        if !envelope.is_well_formed() {
            return Err(OrderSyncError::ValidationError("missing event type or data envelope".into()));
        }
        let mut payload_value = envelope.data.clone();
        let restaurant = self.resolve_restaurant(&payload_value, envelope.state.as_deref()).await?;
        let order_id = payload_value["id"].as_str().map(str::to_string);

        if let Some(order_id) = &order_id {
            if let Some(fetched) = self.enricher.fetch_order(&restaurant, order_id).await {
                trace!("🔄️ Enriched order {order_id} from the upstream API");
                merge_payloads(&mut payload_value, fetched);
            }
        }

        let payload = OrderPayload::from_value(&payload_value)
            .map_err(|e| OrderSyncError::ValidationError(format!("unusable order payload: {e}")))?;
        let order_id = payload
            .id
            .clone()
            .ok_or_else(|| OrderSyncError::ValidationError("order id not found in webhook data".into()))?;

        let status = resolve_status(&payload, &envelope.event);
        let snapshot = build_snapshot(&restaurant, &payload, &payload_value, status);
        let order = self.db.sync_order(snapshot).await?;
        debug!(
            "🔄️ Order [{order_id}] synced for restaurant {} with status {} ({} items)",
            restaurant.id, order.status, order.items_count
        );

        self.publish_lifecycle_event(&envelope.event, &order).await;
        Ok(order)
    }

    /// Tenant resolution: the payload's merchant id first, then the tenant hint the envelope
    /// carries from the authorization flow.
    async fn resolve_restaurant(&self, payload: &Value, state: Option<&str>) -> Result<Restaurant, OrderSyncError> {
        if let Some(merchant_id) = payload["merchant"]["id"].as_str() {
            if let Some(restaurant) = self.db.fetch_restaurant_by_merchant_id(merchant_id).await? {
                return Ok(restaurant);
            }
        }
        if let Some(state) = state {
            if let Ok(id) = state.parse::<i64>() {
                if let Some(restaurant) = self.db.fetch_restaurant(id).await? {
                    return Ok(restaurant);
                }
            }
        }
        warn!("🔄️ No restaurant matched the incoming event (merchant {:?})", payload["merchant"]["id"]);
        Err(OrderSyncError::RestaurantNotFound)
    }

    async fn publish_lifecycle_event(&self, event_type: &str, order: &Order) {
        match event_type {
            "PLACED" => {
                for producer in &self.producers.order_placed_producers {
                    producer.publish_event(OrderPlacedEvent::new(order.clone())).await;
                }
            },
            "DELIVERED" => {
                for producer in &self.producers.order_delivered_producers {
                    producer.publish_event(OrderDeliveredEvent::new(order.clone())).await;
                }
            },
            "CANCELLED" => {
                for producer in &self.producers.order_cancelled_producers {
                    producer.publish_event(OrderCancelledEvent::new(order.clone())).await;
                }
            },
            _ => {},
        }
    }
}

/// The stored status comes from the payload when it carries one, otherwise from the event type.
/// A string neither recognizes degrades to PLACED with an error log; the raw value survives in
/// the retained payload.
fn resolve_status(payload: &OrderPayload, event_type: &str) -> OrderStatusType {
    let candidate = payload.status.as_deref().unwrap_or(event_type);
    candidate.parse::<OrderStatusType>().unwrap_or_else(|_| {
        event_type.parse::<OrderStatusType>().unwrap_or_else(|_| {
            error!("🔄️ Neither payload status nor event type ({candidate}, {event_type}) is a known status. Storing PLACED.");
            OrderStatusType::Placed
        })
    })
}

fn build_snapshot(
    restaurant: &Restaurant,
    payload: &OrderPayload,
    raw: &Value,
    status: OrderStatusType,
) -> OrderSnapshot {
    let total = payload.total.as_ref();
    let delivery = payload.delivery.as_ref();
    let items = raw["items"].as_array().map(|raw_items| {
        payload.items.iter().zip(raw_items.iter()).map(|(item, raw_item)| build_item(item, raw_item)).collect()
    });
    OrderSnapshot {
        restaurant_id: restaurant.id,
        ifood_order_id: payload.id.clone().unwrap_or_default(),
        short_reference: payload.short_reference.clone(),
        display_id: payload.display_id.clone(),
        status,
        sub_status: payload.sub_status.clone(),
        customer_name: payload.customer.as_ref().and_then(|c| c.name.clone()),
        customer_phone: payload.customer.as_ref().and_then(|c| c.phone.clone()),
        customer_delivery_address: delivery.and_then(|d| d.address.as_ref()).and_then(|a| a.formatted()),
        total_amount: money_from(total.and_then(|t| t.value)),
        delivery_fee: money_from(delivery.and_then(|d| d.delivery_fee.as_ref()).and_then(|f| f.value)),
        discount: money_from(total.and_then(|t| t.discount)),
        currency: total
            .and_then(|t| t.currency.clone())
            .unwrap_or_else(|| rog_common::DEFAULT_CURRENCY_CODE.to_string()),
        notes: payload.notes.clone(),
        payment_methods: payload.payments.clone(),
        delivery_method: raw.get("delivery").cloned().filter(|v| !v.is_null()),
        placed_at: parse_timestamp(payload.created_at.as_deref()),
        confirmed_at: parse_timestamp(payload.confirmed_at.as_deref()),
        dispatched_at: parse_timestamp(payload.dispatched_at.as_deref()),
        delivered_at: parse_timestamp(payload.delivered_at.as_deref()),
        cancelled_at: parse_timestamp(payload.cancelled_at.as_deref()),
        expected_delivery_at: parse_timestamp(payload.expected_delivery_at.as_deref()),
        ifood_data: raw.clone(),
        items,
    }
}

fn build_item(item: &ItemPayload, raw: &Value) -> NewOrderItem {
    NewOrderItem {
        ifood_item_id: item.id.clone(),
        name: item.name.clone().unwrap_or_else(|| "Item sem nome".to_string()),
        description: item.description.clone(),
        quantity: item.quantity.unwrap_or(1),
        unit_price: money_from(item.unit_price.as_ref().and_then(|p| p.value)),
        total_price: money_from(item.total_price.as_ref().and_then(|p| p.value)),
        category: item.category.clone(),
        modifiers: item.modifiers.clone(),
        observations: item.observations.clone(),
        ifood_data: raw.clone(),
    }
}

fn money_from(value: Option<f64>) -> Money {
    value.and_then(|v| Money::from_major_units(v).ok()).unwrap_or_default()
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    fn payload_with_status(status: Option<&str>) -> OrderPayload {
        OrderPayload { status: status.map(str::to_string), ..Default::default() }
    }

    #[test]
    fn status_prefers_payload_over_event() {
        let payload = payload_with_status(Some("CONFIRMED"));
        assert_eq!(resolve_status(&payload, "PLACED"), OrderStatusType::Confirmed);
    }

    #[test]
    fn status_falls_back_to_event_type() {
        let payload = payload_with_status(None);
        assert_eq!(resolve_status(&payload, "DELIVERED"), OrderStatusType::Delivered);
        let unknown = payload_with_status(Some("WAITING_PICKUP"));
        assert_eq!(resolve_status(&unknown, "DISPATCHED"), OrderStatusType::Dispatched);
    }

    #[test]
    fn status_degrades_to_placed_when_nothing_parses() {
        let payload = payload_with_status(None);
        assert_eq!(resolve_status(&payload, "KEEP_ALIVE"), OrderStatusType::Placed);
    }

    #[test]
    fn snapshot_captures_money_and_address() {
        let raw = json!({
            "id": "o-1",
            "total": {"value": 42.9, "discount": 2.0, "currency": "BRL"},
            "delivery": {
                "deliveryFee": {"value": 8.5},
                "address": {"streetName": "Rua A", "streetNumber": "10"}
            },
            "items": [
                {"name": "Pizza", "quantity": 2, "unitPrice": {"value": 20.0}, "totalPrice": {"value": 40.0}},
                {"quantity": 1}
            ]
        });
        let payload = OrderPayload::from_value(&raw).unwrap();
        let restaurant = restaurant_fixture();
        let snapshot = build_snapshot(&restaurant, &payload, &raw, OrderStatusType::Placed);
        assert_eq!(snapshot.total_amount, Money::from_cents(4290));
        assert_eq!(snapshot.delivery_fee, Money::from_cents(850));
        assert_eq!(snapshot.discount, Money::from_cents(200));
        assert_eq!(snapshot.customer_delivery_address.as_deref(), Some("Rua A, 10"));
        let items = snapshot.items.expect("items key present, so the set is replaced");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].total_price, Money::from_cents(4000));
        assert_eq!(items[1].name, "Item sem nome");
        assert_eq!(items[1].quantity, 1);
    }

    #[test]
    fn snapshot_without_items_key_leaves_items_alone() {
        let raw = json!({"id": "o-2", "status": "CONFIRMED"});
        let payload = OrderPayload::from_value(&raw).unwrap();
        let snapshot = build_snapshot(&restaurant_fixture(), &payload, &raw, OrderStatusType::Confirmed);
        assert!(snapshot.items.is_none());
    }

    fn restaurant_fixture() -> Restaurant {
        use chrono::Utc;
        Restaurant {
            id: 7,
            name: "Cantina da Ana".into(),
            whatsapp_number: Some("11 99999-9999".into()),
            ifood_client_id: None,
            ifood_client_secret: None,
            ifood_access_token: None,
            ifood_refresh_token: None,
            ifood_token_expires_at: None,
            ifood_merchant_id: Some("m-1".into()),
            ifood_authorization_code_verifier: None,
            ifood_user_code_expires_at: None,
            notification_settings: None,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}
