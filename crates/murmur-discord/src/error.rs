use std::future::Future;
use std::time::Duration;

use murmur_core::error::FetchError;

/// Upper bound on a single REST lookup made on behalf of the pipeline.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Errors produced by the Discord adapter.
#[derive(Debug, thiserror::Error)]
pub enum DiscordError {
    #[error("serenity error: {0}")]
    Serenity(#[from] serenity::Error),

    #[error("no bot token configured")]
    NoToken,

    #[error("reply is empty after sanitizing")]
    EmptyReply,
}

/// Map a serenity failure onto the collaborator error the pipeline understands.
pub(crate) fn fetch_error(err: serenity::Error) -> FetchError {
    if let serenity::Error::Http(http) = &err {
        match http.status_code().map(|s| s.as_u16()) {
            Some(404) => return FetchError::NotFound,
            Some(403) => return FetchError::Forbidden,
            _ => {}
        }
    }
    FetchError::Transport(err.to_string())
}

/// Run a REST call under [`FETCH_TIMEOUT`].
pub(crate) async fn bounded<T>(
    fut: impl Future<Output = Result<T, serenity::Error>>,
) -> Result<T, FetchError> {
    match tokio::time::timeout(FETCH_TIMEOUT, fut).await {
        Ok(result) => result.map_err(fetch_error),
        Err(_) => Err(FetchError::Timeout),
    }
}
