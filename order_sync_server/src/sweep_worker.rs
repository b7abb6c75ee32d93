use chrono::Utc;
use log::*;
use order_sync_engine::{NotificationApi, SqliteDatabase};
use tokio::task::JoinHandle;

use crate::integrations::evolution::WhatsAppGateway;

/// Starts the scheduled sweep: delayed-order detection plus the quiet-hours deferral flush. Do
/// not await the returned JoinHandle, as it will run indefinitely.
pub fn start_sweep_worker(
    api: NotificationApi<SqliteDatabase, WhatsAppGateway>,
    interval: std::time::Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        info!("🕰️ Delayed-order sweep worker started ({}s interval)", interval.as_secs());
        loop {
            timer.tick().await;
            match api.sweep_delayed_orders(Utc::now()).await {
                Ok(notified) => debug!("🕰️ Sweep complete, {notified} delayed orders notified"),
                Err(e) => error!("🕰️ Error running delayed-order sweep: {e}"),
            }
            match api.flush_deferred(Utc::now()).await {
                Ok(flushed) if flushed > 0 => debug!("🕰️ {flushed} deferred notifications flushed"),
                Ok(_) => {},
                Err(e) => error!("🕰️ Error flushing deferred notifications: {e}"),
            }
        }
    })
}
