use chrono::{DateTime, Duration, FixedOffset, TimeZone, Utc};
use log::*;

use crate::{
    api::NotificationError,
    db_types::{
        NewNotification,
        Notification,
        NotificationChannel,
        NotificationType,
        Order,
        QuietHours,
        Restaurant,
    },
    traits::{LedgerError, MessageGateway, NotificationManagement, OrderManagement, TenantManagement},
};

/// Upper bound on how long a quiet-hours deferral may park a notification. Guards against
/// misconfigured windows holding messages forever.
const MAX_QUIET_DEFERRAL: Duration = Duration::hours(12);

/// Policy-gated notification dispatch.
///
/// Every outbound message is recorded as a Notification row before the send attempt, and a row
/// sees at most one attempt: `pending → sending → sent | failed`. A failed row stays failed; the
/// delayed-order sweep may create a *new* row later, but rows are never re-sent.
pub struct NotificationApi<B, G> {
    db: B,
    gateway: G,
    quiet_offset: FixedOffset,
}

impl<B: Clone, G: Clone> Clone for NotificationApi<B, G> {
    fn clone(&self) -> Self {
        Self { db: self.db.clone(), gateway: self.gateway.clone(), quiet_offset: self.quiet_offset }
    }
}

impl<B, G> NotificationApi<B, G>
where
    B: NotificationManagement + OrderManagement + TenantManagement,
    G: MessageGateway,
{
    /// `utc_offset_minutes` is the wall-clock offset quiet-hour windows are interpreted in.
    pub fn new(db: B, gateway: G, utc_offset_minutes: i32) -> Self {
        let quiet_offset = FixedOffset::east_opt(utc_offset_minutes * 60).unwrap_or_else(|| {
            warn!("📣️ Invalid quiet-hours UTC offset ({utc_offset_minutes} min), falling back to UTC");
            FixedOffset::east_opt(0).unwrap()
        });
        Self { db, gateway, quiet_offset }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    /// Policy gate. Inactive tenants and tenants without a recipient never get notifications; a
    /// tenant without an `enabled_events` list gets all of them.
    pub fn should_notify(restaurant: &Restaurant, notification_type: NotificationType) -> bool {
        if !restaurant.is_active || restaurant.whatsapp_number.as_deref().map_or(true, str::is_empty) {
            return false;
        }
        match restaurant.settings().enabled_events {
            None => true,
            Some(events) => events.iter().any(|e| e == notification_type.as_str()),
        }
    }

    pub async fn notify_new_order(&self, order: &Order) -> Result<Option<Notification>, NotificationError> {
        self.notify(order, NotificationType::NewOrder).await
    }

    pub async fn notify_delivered_order(&self, order: &Order) -> Result<Option<Notification>, NotificationError> {
        self.notify(order, NotificationType::DeliveredOrder).await
    }

    pub async fn notify_cancelled_order(&self, order: &Order) -> Result<Option<Notification>, NotificationError> {
        self.notify(order, NotificationType::CancelledOrder).await
    }

    pub async fn notify_delayed_order(&self, order: &Order) -> Result<Option<Notification>, NotificationError> {
        self.notify(order, NotificationType::DelayedOrder).await
    }

    async fn notify(
        &self,
        order: &Order,
        notification_type: NotificationType,
    ) -> Result<Option<Notification>, NotificationError> {
        let restaurant = self
            .db
            .fetch_restaurant(order.restaurant_id)
            .await?
            .ok_or(LedgerError::RestaurantNotFound(order.restaurant_id))?;
        if !Self::should_notify(&restaurant, notification_type) {
            trace!("📣️ {notification_type} notification suppressed by policy for restaurant {}", restaurant.id);
            return Ok(None);
        }
        let message = match notification_type {
            NotificationType::NewOrder => format_new_order_message(order),
            NotificationType::DelayedOrder => format_delayed_order_message(order),
            NotificationType::DeliveredOrder => format_delivered_order_message(order),
            NotificationType::CancelledOrder => format_cancelled_order_message(order),
        };
        let notification = self
            .db
            .insert_notification(NewNotification {
                restaurant_id: restaurant.id,
                order_id: Some(order.id),
                notification_type,
                channel: NotificationChannel::Whatsapp,
                message,
                recipient: restaurant.whatsapp_number.clone(),
            })
            .await?;

        let now = Utc::now();
        if let Some(until) = restaurant
            .settings()
            .quiet_hours
            .as_ref()
            .and_then(|w| quiet_deferral(w, self.quiet_offset, now))
        {
            info!(
                "📣️ Inside quiet hours for restaurant {}. Notification {} deferred until {until}",
                restaurant.id, notification.id
            );
            self.db.defer_notification(notification.id, until).await?;
        } else {
            self.send_now(&notification).await?;
        }
        let stored = self
            .db
            .fetch_notification(notification.id)
            .await?
            .ok_or(LedgerError::NotificationNotFound(notification.id))?;
        Ok(Some(stored))
    }

    /// One send attempt. Gateway failures are terminal for the row and are never propagated; only
    /// storage failures bubble up.
    async fn send_now(&self, notification: &Notification) -> Result<(), NotificationError> {
        self.db.mark_notification_sending(notification.id).await?;
        let recipient = self.gateway.format_recipient(notification.recipient.as_deref().unwrap_or_default());
        match self.gateway.send_text(&recipient, notification.message.as_deref().unwrap_or_default()).await {
            Ok(metadata) => {
                self.db.mark_notification_sent(notification.id, metadata, Utc::now()).await?;
                debug!("📣️ Notification {} sent to {recipient}", notification.id);
            },
            Err(e) => {
                warn!("📣️ Notification {} failed: {e}", notification.id);
                self.db.mark_notification_failed(notification.id, &e.to_string()).await?;
            },
        }
        Ok(())
    }

    /// The delayed-order sweep. Exactly-once delivery is guaranteed by the ledger query, which
    /// skips orders that already have a *sent* delayed-order notification. One order's failure
    /// never aborts the sweep.
    pub async fn sweep_delayed_orders(&self, now: DateTime<Utc>) -> Result<usize, NotificationError> {
        let delayed = self.db.fetch_delayed_orders_without_notification(now).await?;
        let total = delayed.len();
        let mut notified = 0usize;
        for order in delayed {
            match self.notify_delayed_order(&order).await {
                Ok(Some(_)) => notified += 1,
                Ok(None) => {},
                Err(e) => {
                    error!("🕰️ Error sending delayed-order notification for order {}: {e}", order.id);
                },
            }
        }
        info!("🕰️ Checked delayed orders: {total} delayed, {notified} notified");
        Ok(notified)
    }

    /// Sends notifications whose quiet-hours deferral has elapsed.
    pub async fn flush_deferred(&self, now: DateTime<Utc>) -> Result<usize, NotificationError> {
        let due = self.db.fetch_due_deferred_notifications(now).await?;
        let count = due.len();
        for notification in due {
            self.send_now(&notification).await?;
        }
        if count > 0 {
            info!("📣️ Flushed {count} deferred notifications");
        }
        Ok(count)
    }
}

/// When `now` falls inside the quiet window, the instant the notification may be sent: the window
/// end in the configured wall clock, capped at [`MAX_QUIET_DEFERRAL`].
pub fn quiet_deferral(window: &QuietHours, offset: FixedOffset, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let (start, end) = window.bounds()?;
    let local = now.with_timezone(&offset);
    let time = local.time();
    if !window.contains(time) {
        return None;
    }
    // For a wrap-around window the end lands tomorrow when we are in the pre-midnight leg.
    let end_date = if start <= end || time < end {
        local.date_naive()
    } else {
        local.date_naive() + Duration::days(1)
    };
    let end_utc = offset
        .from_local_datetime(&end_date.and_time(end))
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(now + MAX_QUIET_DEFERRAL);
    Some(end_utc.min(now + MAX_QUIET_DEFERRAL))
}

//-------------------------------------- Message templates ------------------------------------------------------------
// Pure functions of the order snapshot so the wording is directly testable.

pub fn format_new_order_message(order: &Order) -> String {
    format!(
        "🍽️ *Novo Pedido Recebido*\n\nPedido: #{}\nCliente: {}\nTotal: R$ {}\nItens: {}\n\nAcesse o painel para mais \
         detalhes.",
        order.reference(),
        order.customer_name.as_deref().unwrap_or_default(),
        order.total_amount.format_brl(),
        order.items_count
    )
}

pub fn format_delayed_order_message(order: &Order) -> String {
    format!(
        "⚠️ *Pedido em Atraso*\n\nPedido: #{}\nCliente: {}\nStatus: {}\n\nVerifique o status do pedido no painel.",
        order.reference(),
        order.customer_name.as_deref().unwrap_or_default(),
        order.status
    )
}

pub fn format_delivered_order_message(order: &Order) -> String {
    let delivered_at =
        order.delivered_at.map(|dt| dt.format("%d/%m/%Y %H:%M").to_string()).unwrap_or_default();
    format!(
        "✅ *Pedido Entregue*\n\nPedido: #{}\nCliente: {}\nTotal: R$ {}\nEntregue em: {}\n\nPedido finalizado com \
         sucesso!",
        order.reference(),
        order.customer_name.as_deref().unwrap_or_default(),
        order.total_amount.format_brl(),
        delivered_at
    )
}

pub fn format_cancelled_order_message(order: &Order) -> String {
    format!(
        "❌ *Pedido Cancelado*\n\nPedido: #{}\nCliente: {}\nMotivo: {}\n\nVerifique os detalhes no painel.",
        order.reference(),
        order.customer_name.as_deref().unwrap_or_default(),
        order.sub_status.as_deref().unwrap_or_default()
    )
}
