use thiserror::Error;

#[derive(Debug, Error)]
pub enum EvolutionApiError {
    #[error("Could not initialize client: {0}")]
    Initialization(String),
    #[error("Could not reach the Evolution API: {0}")]
    Transport(String),
    #[error("Could not deserialize response: {0}")]
    JsonError(String),
    #[error("Send failed. Error {status}. {message}")]
    SendError { status: u16, message: String },
}
