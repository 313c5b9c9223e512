use thiserror::Error;

/// Failure of one completion call, classified by what a caller can do about it.
#[derive(Debug, Error)]
pub enum LLMError {
    #[error("api key is missing")]
    MissingApiKey,
    #[error("authentication failed")]
    AuthenticationFailed,
    #[error("rate limited")]
    RateLimited,
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("server error: {0}")]
    ServerError(String),
    #[error("timeout")]
    Timeout,
    #[error("parse error: {0}")]
    ParseError(String),
    #[error("provider error: {0}")]
    ProviderError(String),
}
