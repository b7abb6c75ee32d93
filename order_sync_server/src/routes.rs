//! Request handler definitions.
//!
//! Handlers are concrete over [`SqliteDatabase`] and registered explicitly in
//! [`crate::server::create_server_instance`]. Anything that talks to the network runs as a
//! future; the webhook handler in particular does no processing work at all — it validates shape,
//! enqueues, and acknowledges.
use actix_web::{get, web, HttpRequest, HttpResponse, Responder};
use chrono::Utc;
use ifood_tools::IfoodApi;
use log::*;
use order_sync_engine::{
    api::report_api::{previous_month, previous_week},
    db_types::PeriodType,
    ifood_types::WebhookEnvelope,
    traits::TenantManagement,
    MetricsApi,
    NotificationApi,
    ReportApi,
    SqliteDatabase,
};
use serde_json::{json, Value};

use crate::{
    config::ServerConfig,
    data_objects::{CallbackQuery, JsonResponse, MetricsJobParams},
    errors::ServerError,
    helpers::{derive_redirect_uri, request_origin},
    integrations::{
        evolution::WhatsAppGateway,
        ifood::{ExchangeOutcome, TokenManager},
    },
    webhook_worker::WebhookQueue,
};

pub type Tokens = TokenManager<SqliteDatabase, IfoodApi>;
pub type Notifications = NotificationApi<SqliteDatabase, WhatsAppGateway>;

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Webhook  ----------------------------------------------------
/// `POST /api/webhooks/ifood`. Always answers 200 for payloads we cannot use: the provider must
/// not see a malformed (to us) body as a delivery failure and start a retry storm. Only a full
/// queue surfaces as an error, so the provider redelivers once there is capacity again.
pub async fn ifood_webhook(
    body: web::Json<Value>,
    queue: web::Data<WebhookQueue>,
) -> Result<HttpResponse, ServerError> {
    let payload = body.into_inner();
    let accepted = json!({"status": "received"});
    let envelope = match serde_json::from_value::<WebhookEnvelope>(payload.clone()) {
        Ok(envelope) if envelope.is_well_formed() => envelope,
        _ => {
            warn!("📥️ Dropping malformed webhook payload: {payload}");
            return Ok(HttpResponse::Ok().json(accepted));
        },
    };
    debug!("📥️ Webhook {} accepted", envelope.event);
    queue.enqueue(envelope)?;
    Ok(HttpResponse::Ok().json(accepted))
}

//----------------------------------------------   Token lifecycle  --------------------------------------------
async fn load_restaurant(
    db: &SqliteDatabase,
    id: i64,
) -> Result<order_sync_engine::db_types::Restaurant, ServerError> {
    db.fetch_restaurant(id).await?.ok_or_else(|| ServerError::NoRecordFound(format!("restaurant {id}")))
}

/// `POST /api/restaurants/{id}/ifood/user-code` — start the device-style authorization flow.
pub async fn ifood_user_code(
    path: web::Path<i64>,
    db: web::Data<SqliteDatabase>,
    tokens: web::Data<Tokens>,
) -> Result<HttpResponse, ServerError> {
    let restaurant = load_restaurant(&db, path.into_inner()).await?;
    let grant = tokens.request_user_code(&restaurant).await?;
    Ok(HttpResponse::Ok().json(grant))
}

/// `POST /api/restaurants/{id}/ifood/exchange` — trade the stored verifier for tokens. 202 while
/// the owner has not yet confirmed the code upstream.
pub async fn ifood_exchange(
    path: web::Path<i64>,
    db: web::Data<SqliteDatabase>,
    tokens: web::Data<Tokens>,
) -> Result<HttpResponse, ServerError> {
    let restaurant = load_restaurant(&db, path.into_inner()).await?;
    match tokens.exchange_verifier(&restaurant).await? {
        ExchangeOutcome::Connected => {
            Ok(HttpResponse::Ok().json(JsonResponse::success("Restaurant connected to iFood.")))
        },
        ExchangeOutcome::Pending => Ok(HttpResponse::Accepted().json(json!({
            "status": "pending",
            "message": "Authorization not confirmed yet. Confirm the user code and try again."
        }))),
    }
}

/// `POST /api/restaurants/{id}/ifood/connect` — client-credentials flow.
pub async fn ifood_connect(
    path: web::Path<i64>,
    db: web::Data<SqliteDatabase>,
    tokens: web::Data<Tokens>,
) -> Result<HttpResponse, ServerError> {
    let restaurant = load_restaurant(&db, path.into_inner()).await?;
    tokens.connect_client_credentials(&restaurant).await?;
    Ok(HttpResponse::Ok().json(JsonResponse::success("Restaurant connected to iFood.")))
}

/// `GET /restaurants/{id}/ifood/callback` — the redirect target of the legacy authorization-code
/// flow.
pub async fn ifood_callback(
    req: HttpRequest,
    path: web::Path<i64>,
    query: web::Query<CallbackQuery>,
    config: web::Data<ServerConfig>,
    db: web::Data<SqliteDatabase>,
    tokens: web::Data<Tokens>,
) -> Result<HttpResponse, ServerError> {
    let id = path.into_inner();
    let restaurant = load_restaurant(&db, id).await?;
    let redirect_uri = derive_redirect_uri(config.base_url.as_deref(), &request_origin(&req), id);
    if tokens.exchange_code(&query.code, &restaurant, &redirect_uri).await? {
        Ok(HttpResponse::Ok().json(JsonResponse::success("Restaurant connected to iFood.")))
    } else {
        Ok(HttpResponse::BadGateway()
            .json(JsonResponse::failure("The authorization code could not be exchanged. Please try again.")))
    }
}

//----------------------------------------------   Job triggers  -----------------------------------------------
// Idempotent entry points for the external scheduler. Recomputation is always safe: metric rows
// are keyed upserts and the delayed sweep carries its own exactly-once guard.

/// `POST /api/jobs/delayed-sweep`
pub async fn trigger_delayed_sweep(api: web::Data<Notifications>) -> Result<HttpResponse, ServerError> {
    let notified =
        api.sweep_delayed_orders(Utc::now()).await.map_err(|e| ServerError::BackendError(e.to_string()))?;
    let flushed = api.flush_deferred(Utc::now()).await.map_err(|e| ServerError::BackendError(e.to_string()))?;
    Ok(HttpResponse::Ok().json(json!({"notified": notified, "flushed": flushed})))
}

/// `POST /api/jobs/metrics` — recompute one period's metric row for every active restaurant.
pub async fn trigger_metrics(
    body: Option<web::Json<MetricsJobParams>>,
    db: web::Data<SqliteDatabase>,
) -> Result<HttpResponse, ServerError> {
    let params = body.map(|b| b.into_inner()).unwrap_or_default();
    let date = params.date.unwrap_or_else(|| Utc::now().date_naive());
    let period = params
        .period_type
        .as_deref()
        .unwrap_or("daily")
        .parse::<PeriodType>()
        .map_err(|e| ServerError::InvalidRequestBody(e.to_string()))?;
    let api = MetricsApi::new(db.get_ref().clone());
    let mut computed = 0usize;
    for restaurant in db.fetch_active_restaurants().await? {
        api.calculate(&restaurant, date, period).await?;
        computed += 1;
    }
    info!("📊️ Metrics job complete: {computed} restaurants, {period} {date}");
    Ok(HttpResponse::Ok().json(json!({"computed": computed, "period_type": period.to_string(), "date": date})))
}

/// `POST /api/jobs/reports/weekly` — build last week's report for every active restaurant (and
/// keep the weekly metric rows current). The response body is what the external mailer consumes.
pub async fn trigger_weekly_reports(db: web::Data<SqliteDatabase>) -> Result<HttpResponse, ServerError> {
    let week = previous_week(Utc::now().date_naive());
    let reports_api = ReportApi::new(db.get_ref().clone());
    let metrics_api = MetricsApi::new(db.get_ref().clone());
    let mut reports = Vec::new();
    for restaurant in db.fetch_active_restaurants().await? {
        if let Err(e) = metrics_api.calculate(&restaurant, week, PeriodType::Weekly).await {
            error!("📊️ Could not refresh weekly metrics for restaurant {}: {e}", restaurant.id);
        }
        match reports_api.weekly(&restaurant, week).await {
            Ok(report) => reports.push(report),
            Err(e) => error!("📊️ Could not build weekly report for restaurant {}: {e}", restaurant.id),
        }
    }
    info!("📊️ Weekly report job complete: {} reports", reports.len());
    Ok(HttpResponse::Ok().json(reports))
}

/// `POST /api/jobs/reports/monthly`
pub async fn trigger_monthly_reports(db: web::Data<SqliteDatabase>) -> Result<HttpResponse, ServerError> {
    let month = previous_month(Utc::now().date_naive());
    let reports_api = ReportApi::new(db.get_ref().clone());
    let metrics_api = MetricsApi::new(db.get_ref().clone());
    let mut reports = Vec::new();
    for restaurant in db.fetch_active_restaurants().await? {
        if let Err(e) = metrics_api.calculate(&restaurant, month, PeriodType::Monthly).await {
            error!("📊️ Could not refresh monthly metrics for restaurant {}: {e}", restaurant.id);
        }
        match reports_api.monthly(&restaurant, month).await {
            Ok(report) => reports.push(report),
            Err(e) => error!("📊️ Could not build monthly report for restaurant {}: {e}", restaurant.id),
        }
    }
    info!("📊️ Monthly report job complete: {} reports", reports.len());
    Ok(HttpResponse::Ok().json(reports))
}

#[cfg(test)]
mod test {
    use actix_web::{test, web, App};
    use serde_json::json;
    use tokio::sync::mpsc;

    use super::*;
    use crate::webhook_worker::{WebhookQueue, WebhookTask};

    async fn webhook_app(
        queue: WebhookQueue,
    ) -> impl actix_web::dev::Service<
        actix_http::Request,
        Response = actix_web::dev::ServiceResponse,
        Error = actix_web::Error,
    > {
        test::init_service(
            App::new()
                .app_data(web::Data::new(queue))
                .service(web::resource("/api/webhooks/ifood").route(web::post().to(ifood_webhook))),
        )
        .await
    }

    #[actix_web::test]
    async fn a_well_formed_webhook_is_acknowledged_and_enqueued() {
        let (sender, mut receiver) = mpsc::channel::<WebhookTask>(4);
        let app = webhook_app(WebhookQueue::new(sender)).await;
        let req = test::TestRequest::post()
            .uri("/api/webhooks/ifood")
            .set_json(json!({"event": "PLACED", "data": {"id": "o-1"}}))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "received");
        let task = receiver.try_recv().expect("one task enqueued");
        assert_eq!(task.envelope.event, "PLACED");
        assert_eq!(task.attempt, 0);
        assert!(receiver.try_recv().is_err(), "exactly one task per call");
    }

    #[actix_web::test]
    async fn a_malformed_webhook_is_acknowledged_but_dropped() {
        let (sender, mut receiver) = mpsc::channel::<WebhookTask>(4);
        let app = webhook_app(WebhookQueue::new(sender)).await;
        for payload in [json!({"foo": "bar"}), json!({"event": "", "data": {}}), json!({"event": "PLACED", "data": "x"})]
        {
            let req = test::TestRequest::post().uri("/api/webhooks/ifood").set_json(payload).to_request();
            let body: Value = test::call_and_read_body_json(&app, req).await;
            assert_eq!(body["status"], "received", "the provider must not see a delivery failure");
        }
        assert!(receiver.try_recv().is_err(), "nothing enqueued for unusable payloads");
    }

    #[actix_web::test]
    async fn a_saturated_queue_surfaces_as_an_ingestion_failure() {
        let (sender, _receiver) = mpsc::channel::<WebhookTask>(1);
        let queue = WebhookQueue::new(sender);
        let app = webhook_app(queue.clone()).await;
        let payload = json!({"event": "PLACED", "data": {"id": "o-1"}});
        let ok = test::TestRequest::post().uri("/api/webhooks/ifood").set_json(payload.clone()).to_request();
        assert!(test::call_service(&app, ok).await.status().is_success());
        let full = test::TestRequest::post().uri("/api/webhooks/ifood").set_json(payload).to_request();
        let response = test::call_service(&app, full).await;
        assert_eq!(response.status().as_u16(), 500);
    }
}
