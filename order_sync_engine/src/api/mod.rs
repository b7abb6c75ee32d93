pub mod metrics_api;
pub mod notification_api;
pub mod report_api;
pub mod sync_api;

mod errors;

pub use errors::{NotificationError, OrderSyncError};
