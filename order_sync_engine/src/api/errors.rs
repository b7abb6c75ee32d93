use thiserror::Error;

use crate::traits::{GatewayError, LedgerError};

#[derive(Debug, Error)]
pub enum OrderSyncError {
    /// The payload cannot be used (missing order id, malformed fields). Retrying will not help.
    #[error("Invalid webhook payload: {0}")]
    ValidationError(String),
    /// Neither the merchant id nor the envelope's tenant hint matched a restaurant. Retrying will
    /// not create the missing mapping.
    #[error("No restaurant matches the incoming event")]
    RestaurantNotFound,
    #[error(transparent)]
    DatabaseError(#[from] LedgerError),
}

impl OrderSyncError {
    /// Whether the triggering task should be retried by the queue. Validation and resolution
    /// failures are dropped; storage failures are assumed transient.
    pub fn is_retryable(&self) -> bool {
        matches!(self, OrderSyncError::DatabaseError(_))
    }
}

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error(transparent)]
    DatabaseError(#[from] LedgerError),
    #[error(transparent)]
    GatewayError(#[from] GatewayError),
}
