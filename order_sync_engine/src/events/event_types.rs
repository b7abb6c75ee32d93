use crate::db_types::Order;

/// Published when a PLACED event has been written to the ledger.
#[derive(Debug, Clone)]
pub struct OrderPlacedEvent {
    pub order: Order,
}

impl OrderPlacedEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

/// Published when a DELIVERED event has been written to the ledger.
#[derive(Debug, Clone)]
pub struct OrderDeliveredEvent {
    pub order: Order,
}

impl OrderDeliveredEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

/// Published when a CANCELLED event has been written to the ledger.
#[derive(Debug, Clone)]
pub struct OrderCancelledEvent {
    pub order: Order,
}

impl OrderCancelledEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}
