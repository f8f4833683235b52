use thiserror::Error;

#[derive(Debug, Error)]
pub enum StudioError {
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Request error: {0}")]
    RequestError(String),
    #[error("Response error: {0}")]
    ResponseError(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// 401 from the backend. The stored credential has already been cleared.
    #[error("Session expired, please log in again")]
    SessionExpired,
    /// 402 from the backend, carrying the backend's reason.
    #[error("Insufficient balance: {0}")]
    InsufficientBalance(String),
    /// 504 from the backend. The task is most likely still running server side.
    #[error("Backend is still processing the task, check history later")]
    BackendTimeout,
    #[error("Request timed out")]
    Timeout,
    #[error("HTTP {status}: {message}")]
    HttpStatus { status: u16, message: String },
}

impl StudioError {
    /// Conditions that must reach the caller instead of being absorbed by
    /// per-image retry.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StudioError::SessionExpired
                | StudioError::InsufficientBalance(_)
                | StudioError::BackendTimeout
        )
    }

    pub fn is_still_processing(&self) -> bool {
        matches!(self, StudioError::BackendTimeout)
    }

    pub fn is_session_expired(&self) -> bool {
        matches!(self, StudioError::SessionExpired)
    }

    /// Message suitable for showing to an end user.
    pub fn user_message(&self) -> String {
        match self {
            StudioError::BackendTimeout => {
                "Generation is taking longer than usual and continues in the background.\nRefresh your history later to see the result.".to_string()
            }
            StudioError::InsufficientBalance(reason) => reason.clone(),
            StudioError::HttpStatus { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for StudioError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            StudioError::Timeout
        } else if err.is_decode() {
            StudioError::ResponseError(err.to_string())
        } else {
            StudioError::RequestError(err.to_string())
        }
    }
}

impl From<serde_json::Error> for StudioError {
    fn from(err: serde_json::Error) -> Self {
        StudioError::SerializationError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StudioError>;
