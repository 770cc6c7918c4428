//! Error types for the assistant gateway

use thiserror::Error;

/// Result type alias for infrastructure operations
pub type Result<T> = std::result::Result<T, Error>;

/// Infrastructure failures: cache storage, startup, task plumbing
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// `SQLite` error
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A blocking task panicked or was cancelled
    #[error("task error: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for Error {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Task(e.to_string())
    }
}

/// Failures reported by a remote generation backend
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The transport gave up waiting for the remote service
    #[error("remote call timed out")]
    Timeout,

    /// The remote service rejected the credential
    #[error("authentication rejected: {0}")]
    Auth(String),

    /// Any other error reported by the remote service or transport
    #[error("remote error: {0}")]
    Remote(String),
}

/// Terminal outcome of a generation request
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    /// Missing, implausible, or rejected API key
    #[error("invalid or missing API credential")]
    InvalidCredential,

    /// The remote call exceeded its timeout budget
    #[error("generation timed out")]
    Timeout,

    /// The remote API reported an error
    #[error("remote API error: {0}")]
    RemoteError(String),

    /// Quota exhausted. Recovered internally by backoff, never returned by the client.
    #[error("rate limited")]
    RateLimited,
}

impl GenerationError {
    /// Short label used in logs and the `kind` metric label
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidCredential => "invalid_credential",
            Self::Timeout => "timeout",
            Self::RemoteError(_) => "remote_error",
            Self::RateLimited => "rate_limited",
        }
    }

    /// Apology shown to the person asking the question
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::InvalidCredential => {
                "I'm sorry, I can't reach the language service because the API key is missing or invalid."
            }
            Self::Timeout => "I'm sorry, the language service took too long to answer. Please try again.",
            Self::RemoteError(_) => "I'm sorry, an error occurred while generating a response.",
            Self::RateLimited => "I'm sorry, I'm receiving too many requests right now. Please try again shortly.",
        }
    }
}

impl From<BackendError> for GenerationError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::Timeout => Self::Timeout,
            BackendError::Auth(_) => Self::InvalidCredential,
            BackendError::Remote(msg) => Self::RemoteError(msg),
        }
    }
}
