use thiserror::Error;

/// Errors raised by configuration loading.
#[derive(Debug, Error)]
pub enum MurmurError {
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Failure of a collaborator lookup (history, reply parent, user, members, symbols).
///
/// Callers in the conversation core never propagate this: a failed lookup
/// degrades to "absent" at the call site.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("not found")]
    NotFound,

    #[error("permission denied")]
    Forbidden,

    #[error("timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, MurmurError>;
