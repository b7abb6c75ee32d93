use thiserror::Error;

#[derive(Debug, Error)]
pub enum IfoodApiError {
    #[error("Could not initialize client: {0}")]
    Initialization(String),
    #[error("Could not reach the iFood API: {0}")]
    Transport(String),
    #[error("Could not deserialize response: {0}")]
    JsonError(String),
    #[error("Request failed. Error {status}. {message}")]
    QueryError { status: u16, message: String },
}
