//! Error handling in [`schlussel`][crate]

use thiserror::Error;

/// Possible errors when working with [`schlussel`][crate]
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed input from a caller, or corrupted data read back from storage.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// A formula or a set of overrides cannot produce a valid, executable plan.
    #[error("configuration error: {0}")]
    ConfigurationError(String),

    /// An OAuth endpoint does not satisfy the HTTPS-or-loopback requirement.
    #[error("insecure endpoint: {0}")]
    InsecureEndpoint(String),

    /// Neither an explicit override nor a named client nor a formula default
    /// produced a `client_id`.
    #[error("missing client_id")]
    MissingClientId,

    /// A formula document is missing a required field.
    #[error("missing field: {0}")]
    MissingField(String),

    /// A formula document has a field of the wrong JSON type.
    #[error("invalid field: {0}")]
    InvalidField(String),

    /// A formula document fails some other structural rule (unknown schema version, etc).
    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    /// The credential store backend failed to save, load, or delete a token.
    #[error("storage error: {0}")]
    StorageError(String),

    /// The cross-process lock could not be acquired or released.
    #[error("lock error: {0}")]
    LockError(String),

    /// Transport-level HTTP failure distinct from a non-2xx/schema-violating response.
    #[error("http error: {0}")]
    HttpError(String),

    /// The TLS connection to an OAuth endpoint could not be established.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// An HTTP operation did not complete within its budget.
    #[error("timed out waiting for {0}")]
    Timeout(String),

    /// A response body exceeded the 1 MiB cap.
    #[error("response exceeded the maximum allowed size")]
    ResponseTooLarge,

    /// The OAuth server returned a non-2xx status, or a 2xx body that does not
    /// match the schema this flow requires.
    #[error("server error: {0}")]
    ServerError(String),

    /// The user (or the provider) denied the authorization request.
    #[error("authorization denied")]
    AuthorizationDenied,

    /// The stored token has expired and has no `refresh_token` to renew it with.
    #[error("no refresh token available")]
    NoRefreshToken,

    /// A token was looked up by key and no entry exists.
    #[error("token not found")]
    TokenNotFound,

    /// A device-code flow's `expires_in` deadline (or iteration cap) elapsed
    /// before authorization completed.
    #[error("device code expired")]
    DeviceCodeExpired,

    /// The `state` echoed back on the authorization-code callback does not
    /// match the one this flow sent; a CSRF indicator.
    #[error("state mismatch")]
    InvalidState,

    /// Failed to parse or serialize a JSON payload.
    #[error("json error")]
    JsonError(#[from] serde_json::Error),

    /// Failed to perform a filesystem operation.
    #[error("io error")]
    IoError(#[from] std::io::Error),

    /// A caller invoked an operation that this backend/flow does not support.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),
}

/// Convenient alias for `Result<T, schlussel::Error>`.
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout(err.to_string())
        } else if err.is_connect() {
            Error::ConnectionFailed(err.to_string())
        } else {
            Error::HttpError(err.to_string())
        }
    }
}
