use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rog_common::Money;
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid value: {0}")]
pub struct ConversionError(pub String);

//--------------------------------------   OrderStatusType    ---------------------------------------------------------
/// Lifecycle status of an order as reported by the marketplace. Transitions are not validated:
/// every sync overwrites the stored status with whatever the latest event carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatusType {
    Placed,
    Confirmed,
    Dispatched,
    Delivered,
    Cancelled,
}

impl OrderStatusType {
    /// Delivered and cancelled orders are terminal: they are excluded from delayed-order checks.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatusType::Delivered | OrderStatusType::Cancelled)
    }
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderStatusType::Placed => "PLACED",
            OrderStatusType::Confirmed => "CONFIRMED",
            OrderStatusType::Dispatched => "DISPATCHED",
            OrderStatusType::Delivered => "DELIVERED",
            OrderStatusType::Cancelled => "CANCELLED",
        };
        write!(f, "{s}")
    }
}

impl FromStr for OrderStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PLACED" => Ok(Self::Placed),
            "CONFIRMED" => Ok(Self::Confirmed),
            "DISPATCHED" => Ok(Self::Dispatched),
            "DELIVERED" => Ok(Self::Delivered),
            "CANCELLED" => Ok(Self::Cancelled),
            s => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

//--------------------------------------   NotificationType   ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    NewOrder,
    DelayedOrder,
    DeliveredOrder,
    CancelledOrder,
}

impl NotificationType {
    /// The key used in a restaurant's `enabled_events` policy list.
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::NewOrder => "new_order",
            NotificationType::DelayedOrder => "delayed_order",
            NotificationType::DeliveredOrder => "delivered_order",
            NotificationType::CancelledOrder => "cancelled_order",
        }
    }
}

impl Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

//--------------------------------------  NotificationStatus  ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Pending,
    Sending,
    Sent,
    Failed,
}

impl Display for NotificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NotificationStatus::Pending => "pending",
            NotificationStatus::Sending => "sending",
            NotificationStatus::Sent => "sent",
            NotificationStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NotificationChannel {
    Whatsapp,
}

impl Display for NotificationChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "whatsapp")
    }
}

//--------------------------------------      PeriodType      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PeriodType {
    Daily,
    Weekly,
    Monthly,
}

impl Display for PeriodType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PeriodType::Daily => "daily",
            PeriodType::Weekly => "weekly",
            PeriodType::Monthly => "monthly",
        };
        write!(f, "{s}")
    }
}

impl FromStr for PeriodType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            s => Err(ConversionError(format!("Invalid period type: {s}"))),
        }
    }
}

//--------------------------------------  NotificationSettings ---------------------------------------------------------
/// Per-restaurant notification policy, stored as a JSON column. A missing `enabled_events` key
/// means "notify for everything" (fail-open for tenants configured before the key existed).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled_events: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quiet_hours: Option<QuietHours>,
}

/// A daily do-not-disturb window. `start`/`end` are "HH:MM" wall-clock strings; a window with
/// `start > end` wraps past midnight.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuietHours {
    pub start: String,
    pub end: String,
}

impl QuietHours {
    pub fn bounds(&self) -> Option<(NaiveTime, NaiveTime)> {
        let start = parse_wall_clock(&self.start)?;
        let end = parse_wall_clock(&self.end)?;
        Some((start, end))
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        match self.bounds() {
            Some((start, end)) if start <= end => time >= start && time < end,
            // Wrap-around window, e.g. 22:00 - 08:00
            Some((start, end)) => time >= start || time < end,
            None => false,
        }
    }
}

fn parse_wall_clock(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M").or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S")).ok()
}

//--------------------------------------      Restaurant      ---------------------------------------------------------
/// A tenant. Owns its orders, notifications and metrics; holds the marketplace credential set and
/// the notification policy. Created by the admin surface (external to this engine), mutated here
/// only through token-lifecycle and merchant-id updates.
#[derive(Debug, Clone, FromRow)]
pub struct Restaurant {
    pub id: i64,
    pub name: String,
    pub whatsapp_number: Option<String>,
    pub ifood_client_id: Option<String>,
    pub ifood_client_secret: Option<String>,
    pub ifood_access_token: Option<String>,
    pub ifood_refresh_token: Option<String>,
    pub ifood_token_expires_at: Option<DateTime<Utc>>,
    pub ifood_merchant_id: Option<String>,
    pub ifood_authorization_code_verifier: Option<String>,
    pub ifood_user_code_expires_at: Option<DateTime<Utc>>,
    pub notification_settings: Option<Json<NotificationSettings>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Restaurant {
    pub fn settings(&self) -> NotificationSettings {
        self.notification_settings.as_ref().map(|j| j.0.clone()).unwrap_or_default()
    }
}

/// Tenant insertion record, used by the admin seam and by tests.
#[derive(Debug, Clone, Default)]
pub struct NewRestaurant {
    pub name: String,
    pub whatsapp_number: Option<String>,
    pub ifood_client_id: Option<String>,
    pub ifood_client_secret: Option<String>,
    pub ifood_merchant_id: Option<String>,
    pub notification_settings: Option<NotificationSettings>,
    pub is_active: bool,
}

impl NewRestaurant {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self { name: name.into(), is_active: true, ..Default::default() }
    }
}

//--------------------------------------        Order         ---------------------------------------------------------
#[derive(Debug, Clone, FromRow)]
pub struct Order {
    pub id: i64,
    pub restaurant_id: i64,
    pub ifood_order_id: String,
    pub short_reference: Option<String>,
    pub display_id: Option<String>,
    pub status: OrderStatusType,
    pub sub_status: Option<String>,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub customer_delivery_address: Option<String>,
    pub total_amount: Money,
    pub delivery_fee: Money,
    pub discount: Money,
    pub currency: String,
    pub items_count: i64,
    pub notes: Option<String>,
    pub payment_methods: Option<Json<serde_json::Value>>,
    pub delivery_method: Option<Json<serde_json::Value>>,
    pub placed_at: Option<DateTime<Utc>>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub expected_delivery_at: Option<DateTime<Utc>>,
    pub ifood_data: Option<Json<serde_json::Value>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// The identifier shown to restaurant staff: the short reference when the marketplace assigns
    /// one, then the display id, then the raw order id.
    pub fn reference(&self) -> &str {
        self.short_reference
            .as_deref()
            .or(self.display_id.as_deref())
            .unwrap_or(self.ifood_order_id.as_str())
    }
}

/// Everything the synchronizer writes on an order. Every field overwrites its column on each sync;
/// absent payload fields map to `None`, not to "unchanged".
#[derive(Debug, Clone)]
pub struct OrderSnapshot {
    pub restaurant_id: i64,
    pub ifood_order_id: String,
    pub short_reference: Option<String>,
    pub display_id: Option<String>,
    pub status: OrderStatusType,
    pub sub_status: Option<String>,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub customer_delivery_address: Option<String>,
    pub total_amount: Money,
    pub delivery_fee: Money,
    pub discount: Money,
    pub currency: String,
    pub notes: Option<String>,
    pub payment_methods: Option<serde_json::Value>,
    pub delivery_method: Option<serde_json::Value>,
    pub placed_at: Option<DateTime<Utc>>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub expected_delivery_at: Option<DateTime<Utc>>,
    pub ifood_data: serde_json::Value,
    /// `Some` replaces the item set wholesale; `None` (payload without an items key) leaves the
    /// stored items untouched.
    pub items: Option<Vec<NewOrderItem>>,
}

//--------------------------------------      OrderItem       ---------------------------------------------------------
#[derive(Debug, Clone, FromRow)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub ifood_item_id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub quantity: i64,
    pub unit_price: Money,
    pub total_price: Money,
    pub category: Option<String>,
    pub modifiers: Option<Json<serde_json::Value>>,
    pub observations: Option<Json<serde_json::Value>>,
    pub ifood_data: Option<Json<serde_json::Value>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub ifood_item_id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub quantity: i64,
    pub unit_price: Money,
    pub total_price: Money,
    pub category: Option<String>,
    pub modifiers: Option<serde_json::Value>,
    pub observations: Option<serde_json::Value>,
    pub ifood_data: serde_json::Value,
}

//--------------------------------------     Notification     ---------------------------------------------------------
/// One outbound message attempt. At most one send per row; a failed row stays failed.
#[derive(Debug, Clone, FromRow)]
pub struct Notification {
    pub id: i64,
    pub restaurant_id: i64,
    pub order_id: Option<i64>,
    #[sqlx(rename = "type")]
    pub notification_type: NotificationType,
    pub channel: NotificationChannel,
    pub status: NotificationStatus,
    pub message: Option<String>,
    pub recipient: Option<String>,
    pub error_message: Option<String>,
    pub metadata: Option<Json<serde_json::Value>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
    pub deferred_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub restaurant_id: i64,
    pub order_id: Option<i64>,
    pub notification_type: NotificationType,
    pub channel: NotificationChannel,
    pub message: String,
    pub recipient: Option<String>,
}

//--------------------------------------   RestaurantMetric   ---------------------------------------------------------
/// Aggregates for one (restaurant, period_date, period_type). Recomputation replaces the row.
#[derive(Debug, Clone, FromRow)]
pub struct RestaurantMetric {
    pub id: i64,
    pub restaurant_id: i64,
    pub period_date: NaiveDate,
    pub period_type: PeriodType,
    pub total_orders: i64,
    pub placed_orders: i64,
    pub confirmed_orders: i64,
    pub delivered_orders: i64,
    pub cancelled_orders: i64,
    pub delayed_orders: i64,
    pub total_revenue: Money,
    pub average_order_value: Money,
    pub total_delivery_fees: Money,
    pub total_discounts: Money,
    pub average_preparation_time: Option<f64>,
    pub average_delivery_time: Option<f64>,
    pub average_total_time: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewRestaurantMetric {
    pub restaurant_id: i64,
    pub period_date: NaiveDate,
    pub period_type: PeriodType,
    pub total_orders: i64,
    pub placed_orders: i64,
    pub confirmed_orders: i64,
    pub delivered_orders: i64,
    pub cancelled_orders: i64,
    pub delayed_orders: i64,
    pub total_revenue: Money,
    pub average_order_value: Money,
    pub total_delivery_fees: Money,
    pub total_discounts: Money,
    pub average_preparation_time: Option<f64>,
    pub average_delivery_time: Option<f64>,
    pub average_total_time: Option<f64>,
}
