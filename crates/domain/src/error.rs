/// Shared error type used across all gateway/node crates.
///
/// Variants map onto the error taxonomy: configuration failures are fatal at
/// startup, auth/protocol/quota failures close or reject at the connection
/// boundary, transient failures are retried by the caller.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration: {0}")]
    Configuration(String),

    #[error("auth: {0}")]
    Auth(String),

    #[error("protocol: {0}")]
    Protocol(String),

    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("quota: {0}")]
    Quota(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("invariant violation: {0}")]
    Invariant(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
