//! Thin HTTP façade over the iFood merchant APIs.
//!
//! Two upstream surfaces are covered:
//! * the authentication endpoints (`oauth/userCode` and `oauth/token`, form-encoded, covering the
//!   user-code, verifier-exchange, client-credentials, authorization-code and refresh grants), and
//! * the bearer-authenticated order/merchant API (`/order/v1.0/orders/{id}`,
//!   `/merchant/v1.0/merchants/me`).
//!
//! This crate performs no persistence. Token storage, refresh scheduling and retry policy live
//! with the caller; everything here is a single request/response exchange with typed results.
pub mod api;
pub mod config;
pub mod data_objects;
pub mod error;
pub mod helpers;

pub use api::IfoodApi;
pub use config::IfoodConfig;
pub use data_objects::{Merchant, TokenGrant, TokenResponse, UserCodeResponse};
pub use error::IfoodApiError;
