use actix_web::HttpRequest;
use hmac::{Hmac, Mac};
use log::error;
use sha2::Sha256;

/// Base URLs that mean "not really configured": development placeholders that must not leak into
/// OAuth callback URIs.
const LOCAL_PLACEHOLDERS: [&str; 2] = ["http://localhost", "http://127.0.0.1:8000"];

/// Hex-encoded HMAC-SHA256 of `data`, as carried in the webhook signature header.
pub fn calculate_hmac(secret: &str, data: &[u8]) -> String {
    let mut mac = match Hmac::<Sha256>::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(e) => {
            error!("🔐️ Could not initialize HMAC: {e}");
            return String::default();
        },
    };
    mac.update(data);
    mac.finalize().into_bytes().iter().fold(String::with_capacity(64), |mut acc, b| {
        acc.push_str(&format!("{b:02x}"));
        acc
    })
}

/// Derives the OAuth callback URI for a restaurant. Pure function of the configured base URL, the
/// inbound request's origin and the tenant id: the configured base wins unless it is absent or a
/// localhost placeholder, trailing slashes are stripped, and the tenant-scoped callback path is
/// appended.
pub fn derive_redirect_uri(base_url: Option<&str>, request_origin: &str, restaurant_id: i64) -> String {
    let base = match base_url {
        Some(b) if !b.is_empty() && !LOCAL_PLACEHOLDERS.contains(&b) => b,
        _ => request_origin,
    };
    format!("{}/restaurants/{restaurant_id}/ifood/callback", base.trim_end_matches('/'))
}

/// Scheme and host of the inbound request, honoring the reverse proxy's forwarded headers the way
/// actix's connection info does.
pub fn request_origin(req: &HttpRequest) -> String {
    let info = req.connection_info();
    format!("{}://{}", info.scheme(), info.host())
}
