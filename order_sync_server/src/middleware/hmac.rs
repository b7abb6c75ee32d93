//! HMAC verification middleware for the webhook endpoint.
//!
//! The provider signs the raw request body with a shared secret and sends the hex digest in the
//! `X-IFood-Signature` header. The middleware recomputes the digest over the exact bytes it
//! received and rejects mismatches before the handler runs. The body is re-injected into the
//! request so extraction downstream still works.
use std::{
    future::{ready, Ready},
    rc::Rc,
};

use actix_http::h1;
use actix_web::{
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    error::{ErrorBadRequest, ErrorForbidden},
    web,
    Error,
};
use log::{trace, warn};
use rog_common::Secret;

use crate::helpers::calculate_hmac;

pub const SIGNATURE_HEADER: &str = "X-IFood-Signature";

pub struct HmacMiddlewareFactory {
    key: Secret<String>,
    // When false the middleware lets every call through (development only).
    enabled: bool,
}

impl HmacMiddlewareFactory {
    pub fn new(key: Secret<String>, enabled: bool) -> Self {
        HmacMiddlewareFactory { key, enabled }
    }
}

impl<S, B> Transform<S, ServiceRequest> for HmacMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = HmacMiddlewareService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(HmacMiddlewareService { key: self.key.clone(), enabled: self.enabled, service: Rc::new(service) }))
    }
}

pub struct HmacMiddlewareService<S> {
    key: Secret<String>,
    enabled: bool,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for HmacMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = futures::future::LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;
    type Response = ServiceResponse<B>;

    forward_ready!(service);

    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let secret = self.key.reveal().clone();
        let enabled = self.enabled;
        Box::pin(async move {
            trace!("🔐️ Checking webhook signature");
            if !enabled {
                trace!("🔐️ Signature checks are disabled. Allowing request.");
                return service.call(req).await;
            }
            let data = req.extract::<web::Bytes>().await.map_err(|e| {
                warn!("🔐️ Failed to extract request body: {e:?}");
                ErrorBadRequest("Failed to extract request body.")
            })?;
            let expected = calculate_hmac(&secret, data.as_ref());
            let provided = req
                .headers()
                .get(SIGNATURE_HEADER)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| {
                    warn!("🔐️ No webhook signature found in request. Denying access.");
                    ErrorForbidden("No webhook signature found.")
                })?;
            if provided.eq_ignore_ascii_case(&expected) {
                trace!("🔐️ Webhook signature check ✅️");
                req.set_payload(bytes_to_payload(data));
                service.call(req).await
            } else {
                warn!("🔐️ Invalid webhook signature. Denying access.");
                Err(ErrorForbidden("Invalid webhook signature."))
            }
        })
    }
}

fn bytes_to_payload(buf: web::Bytes) -> Payload {
    let (_, mut pl) = h1::Payload::create(true);
    pl.unread_data(buf);
    Payload::from(pl)
}
