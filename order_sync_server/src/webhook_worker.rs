//! Asynchronous webhook processing.
//!
//! The HTTP handler only validates shape and enqueues; this worker drains the queue and runs the
//! synchronizer. Each task is processed on its own spawned task, so two events for different
//! orders proceed concurrently (there is deliberately no cross-order ordering guarantee — the
//! ledger upsert is idempotent per event). Retryable failures go back on the queue with
//! exponential backoff; validation and tenant-resolution failures are dropped, since retrying
//! cannot fix them.
use ifood_tools::IfoodApi;
use log::*;
use order_sync_engine::{ifood_types::WebhookEnvelope, OrderSyncApi, SqliteDatabase};
use tokio::{sync::mpsc, task::JoinHandle};

use crate::{errors::ServerError, integrations::ifood::UpstreamClient};

const MAX_ATTEMPTS: u32 = 5;
const BASE_BACKOFF_MS: u64 = 500;

type SyncApi = OrderSyncApi<SqliteDatabase, UpstreamClient<SqliteDatabase, IfoodApi>>;

#[derive(Debug, Clone)]
pub struct WebhookTask {
    pub envelope: WebhookEnvelope,
    pub attempt: u32,
}

/// Producer side handed to the HTTP layer. `enqueue` never blocks the acknowledgement: a full
/// queue is the only failure, reported as 503 so the provider redelivers later.
#[derive(Clone)]
pub struct WebhookQueue {
    sender: mpsc::Sender<WebhookTask>,
}

impl WebhookQueue {
    pub fn new(sender: mpsc::Sender<WebhookTask>) -> Self {
        Self { sender }
    }

    pub fn enqueue(&self, envelope: WebhookEnvelope) -> Result<(), ServerError> {
        self.sender.try_send(WebhookTask { envelope, attempt: 0 }).map_err(|e| {
            error!("🔄️ Could not enqueue webhook task: {e}");
            ServerError::QueueFull
        })
    }
}

/// Starts the processing worker. Do not await the returned JoinHandle, it runs for the lifetime
/// of the server.
pub fn start_webhook_worker(api: SyncApi, queue_depth: usize) -> (WebhookQueue, JoinHandle<()>) {
    let (sender, mut receiver) = mpsc::channel::<WebhookTask>(queue_depth);
    let requeue = sender.clone();
    let handle = tokio::spawn(async move {
        info!("🔄️ Webhook processing worker started");
        while let Some(task) = receiver.recv().await {
            let api = api.clone();
            let requeue = requeue.clone();
            tokio::spawn(async move {
                process_task(&api, task, &requeue).await;
            });
        }
        info!("🔄️ Webhook processing worker shut down");
    });
    (WebhookQueue::new(sender), handle)
}

async fn process_task(api: &SyncApi, task: WebhookTask, requeue: &mpsc::Sender<WebhookTask>) {
    let event = task.envelope.event.clone();
    match api.process_event(task.envelope.clone()).await {
        Ok(order) => {
            info!("🔄️ Webhook {event} processed for order [{}]", order.ifood_order_id);
        },
        Err(e) if e.is_retryable() => {
            let next_attempt = task.attempt + 1;
            if next_attempt >= MAX_ATTEMPTS {
                error!(
                    "🔄️ Webhook {event} dead-lettered after {MAX_ATTEMPTS} attempts: {e}. Payload: {}",
                    task.envelope.data
                );
                return;
            }
            let backoff = BASE_BACKOFF_MS << task.attempt;
            warn!("🔄️ Webhook {event} failed (attempt {next_attempt}/{MAX_ATTEMPTS}), retrying in {backoff} ms: {e}");
            tokio::time::sleep(std::time::Duration::from_millis(backoff)).await;
            let retry = WebhookTask { envelope: task.envelope, attempt: next_attempt };
            if requeue.send(retry).await.is_err() {
                error!("🔄️ Could not requeue webhook {event}; the queue is gone");
            }
        },
        Err(e) => {
            warn!("🔄️ Webhook {event} dropped: {e}");
        },
    }
}
