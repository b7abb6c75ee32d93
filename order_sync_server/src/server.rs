use std::time::Duration;

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use evolution_tools::EvolutionApi;
use ifood_tools::IfoodApi;
use log::*;
use order_sync_engine::{NotificationApi, OrderSyncApi, SqliteDatabase};

use crate::{
    config::ServerConfig,
    errors::ServerError,
    integrations::{
        evolution::{create_notification_event_handlers, WhatsAppGateway},
        ifood::{TokenManager, UpstreamClient},
    },
    middleware::HmacMiddlewareFactory,
    routes::{
        health,
        ifood_callback,
        ifood_connect,
        ifood_exchange,
        ifood_user_code,
        ifood_webhook,
        trigger_delayed_sweep,
        trigger_metrics,
        trigger_monthly_reports,
        trigger_weekly_reports,
    },
    sweep_worker::start_sweep_worker,
    webhook_worker::start_webhook_worker,
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.run_migrations().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let srv = create_server_instance(config, db)?;
    srv.await.map_err(|e| ServerError::BackendError(e.to_string()))
}

/// Builds the HTTP server plus everything that lives beside it: the notification event handlers,
/// the webhook processing queue and the delayed-order sweep worker. Must be called from within a
/// running async runtime.
pub fn create_server_instance(config: ServerConfig, db: SqliteDatabase) -> Result<Server, ServerError> {
    let ifood_api = IfoodApi::new(config.ifood.clone()).map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let evolution_api =
        EvolutionApi::new(config.evolution.clone()).map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let gateway = WhatsAppGateway::new(evolution_api);
    let notification_api =
        NotificationApi::new(db.clone(), gateway, config.quiet_hours_utc_offset_minutes);

    // Lifecycle events fan out to the notification dispatcher on their own tasks.
    let handlers = create_notification_event_handlers(notification_api.clone());
    let producers = handlers.producers();
    tokio::spawn(handlers.start_handlers());

    let token_manager = TokenManager::new(db.clone(), ifood_api.clone(), &config.ifood);
    let upstream = UpstreamClient::new(token_manager.clone(), ifood_api);
    let sync_api = OrderSyncApi::new(db.clone(), upstream, producers);
    let (queue, _worker) = start_webhook_worker(sync_api, config.webhook_queue_depth);
    start_sweep_worker(notification_api.clone(), config.sweep_interval);

    let hmac_secret = config.webhook_hmac_secret.clone();
    let hmac_checks = config.webhook_hmac_checks;
    info!("💻️ Webhook signature checks are {}", if hmac_checks { "enabled" } else { "DISABLED" });

    let host = config.host.clone();
    let port = config.port;
    let srv = HttpServer::new(move || {
        let api_scope = web::scope("/api")
            .service(
                web::resource("/webhooks/ifood")
                    .wrap(HmacMiddlewareFactory::new(hmac_secret.clone(), hmac_checks))
                    .route(web::post().to(ifood_webhook)),
            )
            .service(web::resource("/restaurants/{id}/ifood/user-code").route(web::post().to(ifood_user_code)))
            .service(web::resource("/restaurants/{id}/ifood/exchange").route(web::post().to(ifood_exchange)))
            .service(web::resource("/restaurants/{id}/ifood/connect").route(web::post().to(ifood_connect)))
            .service(web::resource("/jobs/delayed-sweep").route(web::post().to(trigger_delayed_sweep)))
            .service(web::resource("/jobs/metrics").route(web::post().to(trigger_metrics)))
            .service(web::resource("/jobs/reports/weekly").route(web::post().to(trigger_weekly_reports)))
            .service(web::resource("/jobs/reports/monthly").route(web::post().to(trigger_monthly_reports)));
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("rog::access_log"))
            .app_data(web::Data::new(config.clone()))
            .app_data(web::Data::new(db.clone()))
            .app_data(web::Data::new(queue.clone()))
            .app_data(web::Data::new(token_manager.clone()))
            .app_data(web::Data::new(notification_api.clone()))
            .service(health)
            .service(api_scope)
            .service(web::resource("/restaurants/{id}/ifood/callback").route(web::get().to(ifood_callback)))
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((host.as_str(), port))?
    .run();
    Ok(srv)
}
