#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceAuthError {
    #[error("no credential presented")]
    NoCredential,

    #[error("token mismatch")]
    TokenMismatch,

    #[error("signature verification failed")]
    SignatureInvalid,

    #[error("JWT expired")]
    JwtExpired,

    #[error("JWT subject does not match announced node id")]
    SubjectMismatch,

    #[error("device key unknown")]
    DeviceKeyUnknown,

    #[error("pinned device key mismatch")]
    DeviceKeyMismatch,

    #[error("device key registry is full")]
    RegistryFull,

    #[error("auth circuit open for this node")]
    CircuitOpen,
}

/// Every rejection collapses to this one generic message before it reaches
/// the wire — callers must never surface `DeviceAuthError`'s `Display` to
/// the node, only this constant, so a probing client can't learn which
/// check failed.
pub const GENERIC_REJECTION_DETAIL: &str = "registration rejected";
