//! # Restaurant Order Gateway server
//!
//! The HTTP surface and background workers around the order sync engine:
//! * `POST /api/webhooks/ifood` — signature-checked webhook intake, acknowledged immediately and
//!   processed by a retrying background queue.
//! * Token-lifecycle routes for connecting a restaurant to the marketplace (user-code flow,
//!   verifier exchange, client credentials, authorization-code callback).
//! * Cron-facing job routes for the delayed-order sweep, metrics recomputation and weekly/monthly
//!   report generation.
//!
//! Configuration comes from environment variables (see [`config`]); one `.env` file is loaded at
//! startup.
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod helpers;
pub mod integrations;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod sweep_worker;
pub mod webhook_worker;
