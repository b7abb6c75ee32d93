//! Restaurant Order Sync Engine
//!
//! Core logic for mirroring a delivery marketplace's orders into a local ledger and reacting to
//! lifecycle changes. The crate is split into:
//!
//! 1. Database management ([`mod@sqlite`]): the SQLite backend and the low-level query functions.
//!    Access goes through the capability traits in [`mod@traits`]; the data types live in
//!    [`mod@db_types`].
//! 2. The engine APIs ([`mod@api`]): order synchronization, notification policy and dispatch, the
//!    delayed-order sweep, metrics aggregation and report building. All of them are generic over
//!    the storage traits so tests can run against throwaway databases.
//!
//! Lifecycle changes are also published on a small pub/sub layer ([`mod@events`]) so that side
//! effects such as WhatsApp sends stay out of the synchronization transaction path.
pub mod api;
pub mod db_types;
pub mod events;
pub mod ifood_types;
pub mod traits;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use api::{
    metrics_api::{MetricsApi, MetricsSummary},
    notification_api::NotificationApi,
    report_api::{MonthlyReport, ReportApi, WeeklyReport},
    sync_api::OrderSyncApi,
    OrderSyncError,
};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
