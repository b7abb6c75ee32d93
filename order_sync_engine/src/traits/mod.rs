//! Capability traits implemented by storage backends, plus the two seams to the outside world
//! (the upstream order API and the message gateway).
//!
//! The engine APIs are generic over these traits; `SqliteDatabase` implements all of the storage
//! ones. Keeping one trait per concern means a test can satisfy exactly the capabilities it
//! exercises.
mod external;
mod metrics_management;
mod notification_management;
mod order_management;
mod tenant_management;

pub use external::{GatewayError, MessageGateway, NoEnrichment, UpstreamOrderSource};
pub use metrics_management::MetricsManagement;
pub use notification_management::NotificationManagement;
pub use order_management::OrderManagement;
pub use tenant_management::{TenantManagement, TokenUpdate};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Restaurant {0} does not exist")]
    RestaurantNotFound(i64),
    #[error("Order {0} does not exist")]
    OrderNotFound(i64),
    #[error("Notification {0} does not exist")]
    NotificationNotFound(i64),
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        Self::DatabaseError(e.to_string())
    }
}
