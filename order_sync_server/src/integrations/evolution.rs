//! WhatsApp gateway glue: the engine's `MessageGateway` seam implemented over the Evolution API
//! client, and the event hooks that turn ledger lifecycle events into notification dispatches.
use evolution_tools::{format_phone_number, EvolutionApi, EvolutionApiError};
use log::*;
use order_sync_engine::{
    events::{EventHandlers, EventHooks},
    traits::{GatewayError, MessageGateway},
    NotificationApi,
    SqliteDatabase,
};
use serde_json::Value;

pub const NOTIFICATION_EVENT_BUFFER_SIZE: usize = 25;

#[derive(Clone)]
pub struct WhatsAppGateway {
    api: EvolutionApi,
}

impl WhatsAppGateway {
    pub fn new(api: EvolutionApi) -> Self {
        Self { api }
    }
}

impl MessageGateway for WhatsAppGateway {
    fn format_recipient(&self, raw: &str) -> String {
        format_phone_number(raw)
    }

    async fn send_text(&self, recipient: &str, message: &str) -> Result<Value, GatewayError> {
        self.api.send_text(recipient, message).await.map_err(|e| match e {
            EvolutionApiError::Transport(msg) => GatewayError::Unavailable(msg),
            other => GatewayError::Rejected(other.to_string()),
        })
    }
}

/// Wires the placed/delivered/cancelled events to the notification dispatcher. The handlers run
/// on their own tasks, so a slow or failing WhatsApp send can never reach back into the webhook
/// processing path.
pub fn create_notification_event_handlers(
    api: NotificationApi<SqliteDatabase, WhatsAppGateway>,
) -> EventHandlers {
    let mut hooks = EventHooks::default();
    let placed_api = api.clone();
    hooks.on_order_placed(move |ev| {
        let api = placed_api.clone();
        Box::pin(async move {
            if let Err(e) = api.notify_new_order(&ev.order).await {
                error!("📣️ Could not dispatch new-order notification for order {}: {e}", ev.order.id);
            }
        })
    });
    let delivered_api = api.clone();
    hooks.on_order_delivered(move |ev| {
        let api = delivered_api.clone();
        Box::pin(async move {
            if let Err(e) = api.notify_delivered_order(&ev.order).await {
                error!("📣️ Could not dispatch delivered-order notification for order {}: {e}", ev.order.id);
            }
        })
    });
    hooks.on_order_cancelled(move |ev| {
        let api = api.clone();
        Box::pin(async move {
            if let Err(e) = api.notify_cancelled_order(&ev.order).await {
                error!("📣️ Could not dispatch cancelled-order notification for order {}: {e}", ev.order.id);
            }
        })
    });
    EventHandlers::new(NOTIFICATION_EVENT_BUFFER_SIZE, hooks)
}
