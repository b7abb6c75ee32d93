//! Client for the Evolution API WhatsApp gateway.
//!
//! The gateway exposes a single relevant endpoint, `POST {base}/message/sendText/{instance}`,
//! authenticated with an `apikey` header. Recipients are digits-only phone numbers with a country
//! code; [`format_phone_number`] normalizes arbitrary user input into that shape.
pub mod api;
pub mod config;
pub mod error;

pub use api::{format_phone_number, EvolutionApi};
pub use config::EvolutionConfig;
pub use error::EvolutionApiError;
