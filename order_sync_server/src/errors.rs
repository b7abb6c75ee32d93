use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use order_sync_engine::traits::LedgerError;
use thiserror::Error;

use crate::integrations::ifood::TokenError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("The upstream authorization endpoint rejected the request. {0}")]
    UpstreamAuthError(String),
    #[error("Could not read request path: {0}")]
    InvalidRequestPath(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("The webhook processing queue is full")]
    QueueFull,
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            // Missing credentials need operator action, not a retry.
            Self::ConfigurationError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::UpstreamAuthError(_) => StatusCode::BAD_GATEWAY,
            Self::InvalidRequestPath(_) => StatusCode::BAD_REQUEST,
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            // The provider treats anything non-2xx as "redeliver later", which is what we want
            // when the queue is saturated.
            Self::QueueFull => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

impl From<LedgerError> for ServerError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::RestaurantNotFound(id) => Self::NoRecordFound(format!("restaurant {id}")),
            LedgerError::OrderNotFound(id) => Self::NoRecordFound(format!("order {id}")),
            other => Self::BackendError(other.to_string()),
        }
    }
}

impl From<TokenError> for ServerError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Configuration(msg) => Self::ConfigurationError(msg),
            TokenError::UpstreamAuth(msg) => Self::UpstreamAuthError(msg),
            TokenError::Backend(msg) => Self::BackendError(msg),
        }
    }
}
